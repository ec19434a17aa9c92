//! Mock implementations for testing
//!
//! These mocks enable integration testing without real I/O.

#![allow(clippy::cast_possible_wrap)]

use super::traits::*;
use super::SessionRuntime;
use crate::config::Limits;
use crate::db::{
    NewPatient, NewPrescription, OperatorId, Patient, PatientId, Prescription,
};
use crate::menu::Keyboard;
use crate::state_machine::OperatorContext;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

// ============================================================================
// In-Memory Record Store
// ============================================================================

/// Record store backed by vectors, with switchable failure
#[derive(Default)]
pub struct InMemoryStore {
    patients: Mutex<Vec<Patient>>,
    prescriptions: Mutex<Vec<Prescription>>,
    failing: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn patients(&self) -> Vec<Patient> {
        self.patients.lock().unwrap().clone()
    }

    pub fn prescriptions(&self) -> Vec<Prescription> {
        self.prescriptions.lock().unwrap().clone()
    }

    fn check(&self) -> Result<(), String> {
        if self.failing.load(Ordering::SeqCst) {
            Err("store unavailable".to_string())
        } else {
            Ok(())
        }
    }

    fn owner_of(&self, patient_id: PatientId) -> Option<OperatorId> {
        self.patients
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == patient_id)
            .map(|p| p.operator_id)
    }

    fn operator_prescriptions(&self, operator_id: OperatorId) -> Vec<Prescription> {
        self.prescriptions
            .lock()
            .unwrap()
            .iter()
            .filter(|rx| self.owner_of(rx.patient_id) == Some(operator_id))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn insert_patient(&self, patient: &NewPatient) -> Result<Patient, String> {
        self.check()?;
        let mut patients = self.patients.lock().unwrap();
        let record = Patient {
            id: patients.len() as i64 + 1,
            name: patient.name.clone(),
            age: patient.age,
            phone: patient.phone.clone(),
            operator_id: patient.operator_id,
            created_at: Utc::now(),
        };
        patients.push(record.clone());
        Ok(record)
    }

    async fn recent_patients(
        &self,
        operator_id: OperatorId,
        limit: usize,
    ) -> Result<Vec<Patient>, String> {
        self.check()?;
        Ok(self
            .patients
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|p| p.operator_id == operator_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_patient(&self, id: PatientId) -> Result<Option<Patient>, String> {
        self.check()?;
        Ok(self
            .patients
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == id)
            .cloned())
    }

    async fn insert_prescription(
        &self,
        prescription: &NewPrescription,
    ) -> Result<Prescription, String> {
        self.check()?;
        let patient_name = self
            .patients
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == prescription.patient_id)
            .map(|p| p.name.clone())
            .ok_or_else(|| "FOREIGN KEY constraint failed".to_string())?;

        let mut prescriptions = self.prescriptions.lock().unwrap();
        let record = Prescription {
            id: prescriptions.len() as i64 + 1,
            patient_id: prescription.patient_id,
            patient_name,
            diagnosis: prescription.diagnosis.clone(),
            admission_date: prescription.admission_date,
            discharge_date: prescription.discharge_date,
            medications: prescription.medications.clone(),
            created_at: Utc::now(),
        };
        prescriptions.push(record.clone());
        Ok(record)
    }

    async fn recent_prescriptions(
        &self,
        operator_id: OperatorId,
        limit: usize,
    ) -> Result<Vec<Prescription>, String> {
        self.check()?;
        Ok(self
            .operator_prescriptions(operator_id)
            .into_iter()
            .rev()
            .take(limit)
            .collect())
    }

    async fn search_patients(
        &self,
        operator_id: OperatorId,
        term: &str,
    ) -> Result<Vec<Patient>, String> {
        self.check()?;
        let needle = term.to_lowercase();
        Ok(self
            .patients
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.operator_id == operator_id)
            .filter(|p| {
                p.name.to_lowercase().contains(&needle) || p.phone.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect())
    }

    async fn count_patients(&self, operator_id: OperatorId) -> Result<i64, String> {
        self.check()?;
        let patients = self.patients.lock().unwrap();
        Ok(patients.iter().filter(|p| p.operator_id == operator_id).count() as i64)
    }

    async fn count_prescriptions(&self, operator_id: OperatorId) -> Result<i64, String> {
        self.check()?;
        Ok(self.operator_prescriptions(operator_id).len() as i64)
    }

    async fn count_prescriptions_on(
        &self,
        operator_id: OperatorId,
        day: NaiveDate,
    ) -> Result<i64, String> {
        self.check()?;
        Ok(self
            .operator_prescriptions(operator_id)
            .iter()
            .filter(|rx| rx.admission_date == day)
            .count() as i64)
    }
}

// ============================================================================
// Recording Channel
// ============================================================================

/// One outbound message as the channel received it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentReply {
    pub operator_id: OperatorId,
    pub text: String,
    pub keyboard: Keyboard,
}

/// Channel that records everything sent through it
#[derive(Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<SentReply>>,
    errors: Mutex<Vec<String>>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentReply> {
        self.sent.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<SentReply> {
        self.sent.lock().unwrap().last().cloned()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }
}

#[async_trait]
impl Channel for RecordingChannel {
    async fn send(
        &self,
        operator_id: OperatorId,
        text: &str,
        keyboard: &Keyboard,
    ) -> Result<(), String> {
        self.sent.lock().unwrap().push(SentReply {
            operator_id,
            text: text.to_string(),
            keyboard: keyboard.clone(),
        });
        Ok(())
    }

    async fn report_error(&self, _operator_id: OperatorId, message: &str) -> Result<(), String> {
        self.errors.lock().unwrap().push(message.to_string());
        Ok(())
    }
}

// ============================================================================
// Fixed Clock
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

// ============================================================================
// Test Session Builder
// ============================================================================

pub type TestRuntime = SessionRuntime<Arc<InMemoryStore>, Arc<RecordingChannel>, FixedClock>;

pub fn test_today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
}

/// Runtime for `operator_id` over shared in-memory doubles
pub fn test_runtime(
    operator_id: OperatorId,
    store: &Arc<InMemoryStore>,
    channel: &Arc<RecordingChannel>,
) -> TestRuntime {
    SessionRuntime::new(
        OperatorContext::new(operator_id, Limits::default()),
        Arc::clone(store),
        Arc::clone(channel),
        FixedClock(test_today()),
    )
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::menu;
    use crate::replies;
    use crate::runtime::{ChannelEvent, RuntimeError, SessionManager, SessionSnapshot};
    use crate::state_machine::{Event, SessionContext, SessionState, TransitionError};
    use std::time::Duration;

    struct Harness {
        store: Arc<InMemoryStore>,
        channel: Arc<RecordingChannel>,
        runtime: TestRuntime,
    }

    impl Harness {
        fn new() -> Self {
            let store = Arc::new(InMemoryStore::new());
            let channel = Arc::new(RecordingChannel::new());
            let runtime = test_runtime(1, &store, &channel);
            Self {
                store,
                channel,
                runtime,
            }
        }

        async fn say(&mut self, text: &str) -> Result<(), RuntimeError> {
            self.runtime.handle_event(Event::user_message(text)).await
        }

        async fn register(&mut self, name: &str, age: &str, phone: &str) {
            for text in [menu::ADD_PATIENT, name, age, phone] {
                self.say(text).await.unwrap();
            }
        }

        fn last_text(&self) -> String {
            self.channel.last().map(|r| r.text).unwrap_or_default()
        }
    }

    #[tokio::test]
    async fn test_register_then_prescribe_end_to_end() {
        let mut h = Harness::new();

        h.register("Jane Doe", "40", "555-1234").await;
        let patients = h.store.patients();
        assert_eq!(patients.len(), 1);
        assert_eq!(patients[0].id, 1);
        assert_eq!(patients[0].name, "Jane Doe");
        assert_eq!(patients[0].age, 40);
        assert_eq!(patients[0].phone, "555-1234");
        assert_eq!(h.runtime.state(), SessionState::Idle);
        assert_eq!(h.channel.last().unwrap().keyboard, menu::after_patient_saved());

        h.say(menu::CREATE_PRESCRIPTION).await.unwrap();
        assert_eq!(h.runtime.state(), SessionState::SelectPatient);
        let choice = menu::patient_choice_label(&patients[0]);
        assert_eq!(
            h.channel.last().unwrap().keyboard,
            menu::patient_choices(&patients)
        );

        h.say(&choice).await.unwrap();
        assert_eq!(h.runtime.state(), SessionState::CollectDiagnosis);
        assert_eq!(h.runtime.context().patient_id, Some(1));

        h.say("Acute gastritis").await.unwrap();
        assert_eq!(h.runtime.state(), SessionState::CollectMedications);

        h.say("h.pylori").await.unwrap();
        assert_eq!(h.runtime.state(), SessionState::Review);
        let preview = h.last_text();
        assert!(preview.contains("**Patient:** Jane Doe (Age: 40)"));
        assert!(preview.contains("**4. Bismuth 525mg**"));
        assert!(preview.contains("19-10-2026"));

        h.say(menu::CONFIRM_SAVE).await.unwrap();
        assert_eq!(h.runtime.state(), SessionState::Idle);
        assert!(h.runtime.context().is_empty());

        let prescriptions = h.store.prescriptions();
        assert_eq!(prescriptions.len(), 1);
        let rx = &prescriptions[0];
        assert_eq!(rx.patient_id, 1);
        assert_eq!(rx.diagnosis, "Acute gastritis");
        assert_eq!(rx.medications.len(), 4);
        assert_eq!(rx.admission_date, test_today());
        assert_eq!(rx.discharge_date, test_today());
        assert_eq!(h.channel.last().unwrap().keyboard, menu::after_prescription_saved());
        assert!(h.channel.sent().iter().all(|r| r.operator_id == 1));
        assert!(h.channel.errors().is_empty());
    }

    #[tokio::test]
    async fn test_prescription_without_patients() {
        let mut h = Harness::new();
        h.say(menu::CREATE_PRESCRIPTION).await.unwrap();

        assert_eq!(h.runtime.state(), SessionState::Idle);
        let last = h.channel.last().unwrap();
        assert_eq!(last.text, replies::no_patients_for_prescription());
        assert_eq!(last.keyboard, menu::add_patient_only());
    }

    #[tokio::test]
    async fn test_store_failure_rolls_turn_back() {
        let mut h = Harness::new();
        for text in [menu::ADD_PATIENT, "Jane Doe", "40"] {
            h.say(text).await.unwrap();
        }
        let before = h.runtime.context().clone();

        h.store.set_failing(true);
        let result = h.say("555-1234").await;
        assert!(matches!(result, Err(RuntimeError::Store(_))));
        assert_eq!(h.runtime.state(), SessionState::CollectPhone);
        assert_eq!(h.runtime.context(), &before);
        assert_eq!(h.last_text(), replies::store_unavailable());

        // Resending the same input succeeds once the store is back
        h.store.set_failing(false);
        h.say("555-1234").await.unwrap();
        assert_eq!(h.runtime.state(), SessionState::Idle);
        assert_eq!(h.store.patients().len(), 1);
    }

    #[tokio::test]
    async fn test_foreign_patient_is_never_prescribed() {
        let store = Arc::new(InMemoryStore::new());
        let channel = Arc::new(RecordingChannel::new());

        let mut other = test_runtime(2, &store, &channel);
        for text in [menu::ADD_PATIENT, "Someone Else", "50", "555-0000"] {
            other.handle_event(Event::user_message(text)).await.unwrap();
        }

        let mut mine = test_runtime(1, &store, &channel);
        for text in [
            menu::CREATE_PRESCRIPTION,
            menu::ADD_PATIENT,
            "Jane Doe",
            "40",
            "555-1234",
            menu::CREATE_PRESCRIPTION,
            "Someone Else (Age: 50) - ID: 1",
            "Acute gastritis",
            "h.pylori",
        ] {
            mine.handle_event(Event::user_message(text)).await.unwrap();
        }

        assert_eq!(mine.state(), SessionState::Idle);
        assert_eq!(
            channel.last().map(|r| r.text),
            Some(replies::patient_missing())
        );
        assert!(store.prescriptions().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_mid_flow_leaves_nothing_behind() {
        let mut h = Harness::new();
        h.register("Jane Doe", "40", "555-1234").await;

        for text in [menu::CREATE_PRESCRIPTION, "Jane Doe (Age: 40) - ID: 1", "Flu"] {
            h.say(text).await.unwrap();
        }
        h.runtime.handle_event(Event::cancel()).await.unwrap();
        assert_eq!(h.runtime.state(), SessionState::Idle);
        assert_eq!(h.runtime.context(), &SessionContext::default());
        assert_eq!(h.last_text(), replies::cancelled());

        h.say(menu::CREATE_PRESCRIPTION).await.unwrap();
        assert_eq!(h.runtime.context().diagnosis, None);
        assert_eq!(h.runtime.context().patient_id, None);
    }

    #[tokio::test]
    async fn test_reports_answer_with_main_menu() {
        let mut h = Harness::new();
        h.register("Jane Doe", "40", "555-1234").await;
        h.register("John Roe", "52", "555-9876").await;

        h.say(menu::VIEW_PATIENTS).await.unwrap();
        let listing = h.last_text();
        assert!(listing.find("John Roe") < listing.find("Jane Doe"));

        h.say(menu::SEARCH_PATIENT).await.unwrap();
        assert_eq!(h.runtime.state(), SessionState::AwaitingSearchTerm);
        h.say("JANE").await.unwrap();
        assert_eq!(h.runtime.state(), SessionState::Idle);
        let results = h.last_text();
        assert!(results.contains("Jane Doe"));
        assert!(!results.contains("John Roe"));

        h.say(menu::STATISTICS).await.unwrap();
        let stats = h.channel.last().unwrap();
        assert!(stats.text.contains("**Total Patients:** 2"));
        assert!(stats.text.contains("per patient: 0.0"));
        assert_eq!(stats.keyboard, menu::main_menu());
    }

    #[tokio::test]
    async fn test_operators_are_isolated() {
        let store = Arc::new(InMemoryStore::new());
        let channel = Arc::new(RecordingChannel::new());
        let mut first = test_runtime(1, &store, &channel);
        let mut second = test_runtime(2, &store, &channel);

        first
            .handle_event(Event::user_message(menu::ADD_PATIENT))
            .await
            .unwrap();
        first
            .handle_event(Event::user_message("Jane Doe"))
            .await
            .unwrap();

        assert_eq!(second.state(), SessionState::Idle);
        second
            .handle_event(Event::user_message(menu::STATISTICS))
            .await
            .unwrap();
        assert_eq!(first.state(), SessionState::CollectAge);
        assert!(channel
            .last()
            .is_some_and(|r| r.operator_id == 2 && r.text.contains("**Total Patients:** 0")));
    }

    #[tokio::test]
    async fn test_manager_streams_replies() {
        let db = Database::open_in_memory().unwrap();
        let manager = SessionManager::new(db, Limits::default());

        let (mut rx, snapshot) = manager.subscribe(9).await;
        assert_eq!(snapshot.state, SessionState::Idle);

        manager
            .send_event(9, Event::user_message(menu::ADD_PATIENT))
            .await
            .unwrap();

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out")
            .unwrap();
        match event {
            ChannelEvent::Reply { text, keyboard } => {
                assert_eq!(text, replies::name_prompt());
                assert_eq!(keyboard, Keyboard::Remove);
            }
            ChannelEvent::Error { message } => panic!("Unexpected error: {message}"),
        }

        // The snapshot is published once the turn completes
        let settled = tokio::time::timeout(Duration::from_secs(2), async {
            while manager.snapshot(9).await.state != SessionState::CollectName {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(settled.is_ok(), "session never reached collect_name");
        assert_eq!(manager.snapshot(10).await, SessionSnapshot::default());
    }

    #[tokio::test]
    async fn test_missing_field_resets_session() {
        let store = Arc::new(InMemoryStore::new());
        let channel = Arc::new(RecordingChannel::new());
        let context = SessionContext {
            patient_id: Some(1),
            diagnosis: Some("Acute gastritis".to_string()),
            ..SessionContext::default()
        };
        let mut runtime =
            test_runtime(1, &store, &channel).with_session(SessionState::Review, context);

        let result = runtime
            .handle_event(Event::user_message(menu::CONFIRM_SAVE))
            .await;

        assert!(matches!(
            result,
            Err(RuntimeError::Transition(TransitionError::MissingField("medications")))
        ));
        assert_eq!(runtime.state(), SessionState::Idle);
        assert!(runtime.context().is_empty());
        assert!(store.prescriptions().is_empty());

        let sent = channel.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].text, replies::session_lost());
        assert_eq!(sent[0].keyboard, menu::main_menu());
    }

    async fn run_to_completion(runtime: TestRuntime, events: Vec<Event>) {
        let (tx, rx) = tokio::sync::mpsc::channel(8);
        let task = tokio::spawn(runtime.run(rx));
        for event in events {
            tx.send(event).await.unwrap();
        }
        drop(tx);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_run_answers_failed_turn_once() {
        let store = Arc::new(InMemoryStore::new());
        let channel = Arc::new(RecordingChannel::new());
        store.set_failing(true);

        run_to_completion(
            test_runtime(1, &store, &channel),
            vec![Event::user_message(menu::VIEW_PATIENTS)],
        )
        .await;

        // Store details stay in the logs
        assert!(channel.errors().is_empty());
        let texts: Vec<String> = channel.sent().into_iter().map(|r| r.text).collect();
        assert_eq!(texts, vec![replies::store_unavailable()]);
    }

    #[tokio::test]
    async fn test_run_reports_unexpected_events() {
        let store = Arc::new(InMemoryStore::new());
        let channel = Arc::new(RecordingChannel::new());

        run_to_completion(
            test_runtime(1, &store, &channel),
            vec![Event::PatientMissing { patient_id: 3 }],
        )
        .await;

        assert!(channel.sent().is_empty());
        let errors = channel.errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("Invalid transition: patient_missing"));
    }
}
