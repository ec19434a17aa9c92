//! Session runtime executor

use super::traits::{Channel, Clock, RecordStore};
use super::SessionSnapshot;
use crate::db::{NewPrescription, Patient, PatientId, Statistics};
use crate::menu::{self, Keyboard};
use crate::replies;
use crate::state_machine::{
    transition, Effect, Event, OperatorContext, SessionContext, SessionState, TransitionError,
};
use thiserror::Error;
use tokio::sync::{mpsc, watch};

/// A turn that could not complete
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Record store failure: {0}")]
    Store(String),
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

impl RuntimeError {
    /// Whether the turn already replied to the operator about this failure
    fn answered(&self) -> bool {
        !matches!(
            self,
            RuntimeError::Transition(TransitionError::InvalidTransition { .. })
        )
    }
}

/// Drives one operator's session: runs transitions and executes their effects
pub struct SessionRuntime<S, C, K>
where
    S: RecordStore + 'static,
    C: Channel + 'static,
    K: Clock + 'static,
{
    operator: OperatorContext,
    state: SessionState,
    context: SessionContext,
    store: S,
    channel: C,
    clock: K,
    /// Publishes the session after every turn
    snapshot_tx: Option<watch::Sender<SessionSnapshot>>,
}

impl<S, C, K> SessionRuntime<S, C, K>
where
    S: RecordStore + 'static,
    C: Channel + 'static,
    K: Clock + 'static,
{
    pub fn new(operator: OperatorContext, store: S, channel: C, clock: K) -> Self {
        Self {
            operator,
            state: SessionState::Idle,
            context: SessionContext::default(),
            store,
            channel,
            clock,
            snapshot_tx: None,
        }
    }

    /// Resume a session already in progress
    #[cfg(test)]
    pub fn with_session(mut self, state: SessionState, context: SessionContext) -> Self {
        self.state = state;
        self.context = context;
        self
    }

    pub fn with_snapshots(mut self, snapshot_tx: watch::Sender<SessionSnapshot>) -> Self {
        self.snapshot_tx = Some(snapshot_tx);
        self
    }

    #[allow(dead_code)] // Used in tests
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[allow(dead_code)] // Used in tests
    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub async fn run(mut self, mut event_rx: mpsc::Receiver<Event>) {
        let operator_id = self.operator.operator_id;
        tracing::info!(operator_id, "Starting session runtime");

        while let Some(event) = event_rx.recv().await {
            let Err(e) = self.handle_event(event).await else {
                continue;
            };
            tracing::error!(operator_id, error = %e, "Turn failed");
            if e.answered() {
                continue;
            }
            if let Err(send_err) = self.channel.report_error(operator_id, &e.to_string()).await {
                tracing::warn!(operator_id, error = %send_err, "Failed to report error");
            }
        }

        tracing::info!(operator_id, "Session runtime stopped");
    }

    /// Handle one inbound event to completion.
    ///
    /// A store failure rolls state and context back to where the turn
    /// started and asks the operator to resend.
    pub async fn handle_event(&mut self, event: Event) -> Result<(), RuntimeError> {
        let checkpoint = (self.state, self.context.clone());

        let outcome = self.process_event(event).await;
        match &outcome {
            Ok(()) => {}
            Err(RuntimeError::Store(_)) => {
                (self.state, self.context) = checkpoint;
                self.reply(replies::store_unavailable(), Keyboard::Unchanged)
                    .await;
            }
            Err(RuntimeError::Transition(TransitionError::MissingField(field))) => {
                tracing::warn!(
                    operator_id = self.operator.operator_id,
                    field = *field,
                    "Session lost a required field, resetting"
                );
                self.state = SessionState::Idle;
                self.context = SessionContext::default();
                self.reply(replies::session_lost(), menu::main_menu()).await;
            }
            Err(RuntimeError::Transition(TransitionError::InvalidTransition { .. })) => {
                (self.state, self.context) = checkpoint;
            }
        }

        self.publish();
        outcome
    }

    async fn process_event(&mut self, event: Event) -> Result<(), RuntimeError> {
        // Store outcomes are fed back in the same turn
        let mut events_to_process = vec![event];

        while let Some(current_event) = events_to_process.pop() {
            let kind = current_event.kind();
            let result = transition(&self.state, &self.context, &self.operator, current_event)?;

            tracing::debug!(
                operator_id = self.operator.operator_id,
                event = kind,
                from = ?self.state,
                to = ?result.new_state,
                "Transition"
            );
            self.state = result.new_state;
            self.context = result.new_context;

            for effect in result.effects {
                if let Some(generated_event) = self.execute_effect(effect).await? {
                    events_to_process.push(generated_event);
                }
            }
        }

        Ok(())
    }

    /// Execute an effect and optionally return a generated event
    async fn execute_effect(&mut self, effect: Effect) -> Result<Option<Event>, RuntimeError> {
        let operator_id = self.operator.operator_id;

        match effect {
            Effect::Reply { text, keyboard } => {
                self.reply(text, keyboard).await;
                Ok(None)
            }

            Effect::SavePatient { patient } => {
                let patient = self
                    .store
                    .insert_patient(&patient)
                    .await
                    .map_err(RuntimeError::Store)?;
                tracing::info!(operator_id, patient_id = patient.id, "Patient registered");
                Ok(Some(Event::PatientSaved { patient }))
            }

            Effect::LoadPatientChoices { limit } => {
                let patients = self
                    .store
                    .recent_patients(operator_id, limit)
                    .await
                    .map_err(RuntimeError::Store)?;
                Ok(Some(Event::PatientChoicesLoaded { patients }))
            }

            Effect::LoadPreviewPatient { patient_id } => {
                Ok(Some(match self.owned_patient(patient_id).await? {
                    Some(patient) => Event::PreviewPatientLoaded {
                        patient,
                        today: self.clock.today(),
                    },
                    None => Event::PatientMissing { patient_id },
                }))
            }

            Effect::SavePrescription {
                patient_id,
                diagnosis,
                medications,
            } => {
                if self.owned_patient(patient_id).await?.is_none() {
                    return Ok(Some(Event::PatientMissing { patient_id }));
                }

                let today = self.clock.today();
                let prescription = self
                    .store
                    .insert_prescription(&NewPrescription {
                        patient_id,
                        diagnosis,
                        admission_date: today,
                        discharge_date: today,
                        medications,
                    })
                    .await
                    .map_err(RuntimeError::Store)?;
                tracing::info!(
                    operator_id,
                    patient_id,
                    prescription_id = prescription.id,
                    medications = prescription.medications.len(),
                    "Prescription saved"
                );
                Ok(Some(Event::PrescriptionSaved { prescription }))
            }

            Effect::ShowPatients { limit } => {
                let patients = self
                    .store
                    .recent_patients(operator_id, limit)
                    .await
                    .map_err(RuntimeError::Store)?;
                self.reply(replies::patient_list(&patients), menu::main_menu())
                    .await;
                Ok(None)
            }

            Effect::ShowPrescriptions { limit } => {
                let prescriptions = self
                    .store
                    .recent_prescriptions(operator_id, limit)
                    .await
                    .map_err(RuntimeError::Store)?;
                self.reply(replies::prescription_list(&prescriptions), menu::main_menu())
                    .await;
                Ok(None)
            }

            Effect::SearchPatients { term } => {
                let patients = self
                    .store
                    .search_patients(operator_id, &term)
                    .await
                    .map_err(RuntimeError::Store)?;
                self.reply(replies::search_results(&term, &patients), menu::main_menu())
                    .await;
                Ok(None)
            }

            Effect::ShowStatistics => {
                let stats = self.statistics().await?;
                self.reply(replies::statistics(&stats), menu::main_menu())
                    .await;
                Ok(None)
            }
        }
    }

    /// The patient, if it exists and belongs to this operator
    async fn owned_patient(&self, patient_id: PatientId) -> Result<Option<Patient>, RuntimeError> {
        let patient = self
            .store
            .get_patient(patient_id)
            .await
            .map_err(RuntimeError::Store)?;

        Ok(patient.filter(|p| {
            let owned = p.is_owned_by(self.operator.operator_id);
            if !owned {
                tracing::warn!(
                    operator_id = self.operator.operator_id,
                    patient_id,
                    "Patient belongs to another operator"
                );
            }
            owned
        }))
    }

    async fn statistics(&self) -> Result<Statistics, RuntimeError> {
        let operator_id = self.operator.operator_id;
        let patients = self
            .store
            .count_patients(operator_id)
            .await
            .map_err(RuntimeError::Store)?;
        let prescriptions = self
            .store
            .count_prescriptions(operator_id)
            .await
            .map_err(RuntimeError::Store)?;
        let prescriptions_today = self
            .store
            .count_prescriptions_on(operator_id, self.clock.today())
            .await
            .map_err(RuntimeError::Store)?;

        Ok(Statistics {
            patients,
            prescriptions,
            prescriptions_today,
        })
    }

    /// Delivery failures are logged, never fatal to the turn
    async fn reply(&self, text: String, keyboard: Keyboard) {
        let operator_id = self.operator.operator_id;
        if let Err(e) = self.channel.send(operator_id, &text, &keyboard).await {
            tracing::warn!(operator_id, error = %e, "Failed to deliver reply");
        }
    }

    fn publish(&self) {
        if let Some(tx) = &self.snapshot_tx {
            tx.send_replace(SessionSnapshot {
                state: self.state,
                context: self.context.clone(),
            });
        }
    }
}
