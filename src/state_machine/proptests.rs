//! Property-based tests for the state machine
//!
//! These tests verify key invariants hold across all possible inputs.

use super::*;
use crate::config::Limits;
use crate::db::{MedicationEntry, Patient, Prescription};
use crate::menu;
use chrono::{NaiveDate, TimeZone, Utc};
use proptest::prelude::*;

// ============================================================================
// Test Helpers
// ============================================================================

fn test_operator() -> OperatorContext {
    OperatorContext::new(1, Limits::default())
}

fn test_today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
}

fn stored_patient(id: i64) -> Patient {
    Patient {
        id,
        name: "Jane Doe".to_string(),
        age: 40,
        phone: "555-1234".to_string(),
        operator_id: 1,
        created_at: Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap(),
    }
}

/// Answer a store effect the way a healthy store would
fn store_outcome(effect: &Effect) -> Option<Event> {
    match effect {
        Effect::SavePatient { patient } => Some(Event::PatientSaved {
            patient: Patient {
                name: patient.name.clone(),
                age: patient.age,
                phone: patient.phone.clone(),
                ..stored_patient(1)
            },
        }),
        Effect::LoadPatientChoices { .. } => Some(Event::PatientChoicesLoaded {
            patients: vec![stored_patient(1)],
        }),
        Effect::LoadPreviewPatient { patient_id } => Some(Event::PreviewPatientLoaded {
            patient: stored_patient(*patient_id),
            today: test_today(),
        }),
        Effect::SavePrescription {
            patient_id,
            diagnosis,
            medications,
        } => Some(Event::PrescriptionSaved {
            prescription: Prescription {
                id: 1,
                patient_id: *patient_id,
                patient_name: "Jane Doe".to_string(),
                diagnosis: diagnosis.clone(),
                admission_date: test_today(),
                discharge_date: test_today(),
                medications: medications.clone(),
                created_at: Utc::now(),
            },
        }),
        _ => None,
    }
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_state() -> impl Strategy<Value = SessionState> {
    prop_oneof![
        Just(SessionState::Idle),
        Just(SessionState::AwaitingSearchTerm),
        Just(SessionState::CollectName),
        Just(SessionState::CollectAge),
        Just(SessionState::CollectPhone),
        Just(SessionState::SelectPatient),
        Just(SessionState::CollectDiagnosis),
        Just(SessionState::CollectMedications),
        Just(SessionState::Review),
    ]
}

fn arb_non_idle_state() -> impl Strategy<Value = SessionState> {
    arb_state().prop_filter("non-idle", |s| !s.is_idle())
}

fn arb_medication() -> impl Strategy<Value = MedicationEntry> {
    ("[A-Za-z]{1,10}", "[0-9]{1,3}mg", "[0-9]{1,2} tablets", "[a-z ]{1,20}")
        .prop_map(|(n, d, q, i)| MedicationEntry::new(n, d, q, i))
}

fn arb_context() -> impl Strategy<Value = SessionContext> {
    (
        proptest::option::of("[A-Za-z ]{1,20}"),
        proptest::option::of(0i64..120),
        proptest::option::of("[0-9-]{3,12}"),
        proptest::option::of(1i64..100),
        proptest::option::of("[A-Za-z ]{1,30}"),
        proptest::collection::vec(arb_medication(), 0..4),
    )
        .prop_map(
            |(patient_name, patient_age, patient_phone, patient_id, diagnosis, medications)| {
                SessionContext {
                    patient_name,
                    patient_age,
                    patient_phone,
                    patient_id,
                    diagnosis,
                    medications,
                }
            },
        )
}

/// Menu labels, control labels, plausible field values and noise
fn arb_message() -> impl Strategy<Value = String> {
    prop_oneof![
        prop_oneof![
            Just(menu::ADD_PATIENT),
            Just(menu::VIEW_PATIENTS),
            Just(menu::CREATE_PRESCRIPTION),
            Just(menu::VIEW_PRESCRIPTIONS),
            Just(menu::SEARCH_PATIENT),
            Just(menu::STATISTICS),
            Just(menu::MAIN_MENU),
            Just(menu::NEW_PRESCRIPTION),
            Just(menu::CONFIRM_SAVE),
            Just(menu::EDIT),
            Just(menu::CANCEL),
            Just("/start"),
            Just("h.pylori"),
            Just("Jane Doe (Age: 40) - ID: 1"),
            Just("A | 1mg | 2 tablets | daily"),
        ]
        .prop_map(String::from),
        (0i64..120).prop_map(|n| n.to_string()),
        "[a-zA-Z ]{0,20}",
    ]
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    // A conversation driven by arbitrary messages, with a healthy store
    // answering every store effect, never persists an empty prescription
    // and never leaves leftovers in an idle session.
    #[test]
    fn prop_sessions_stay_consistent(messages in proptest::collection::vec(arb_message(), 0..30)) {
        let operator = test_operator();
        let mut state = SessionState::Idle;
        let mut context = SessionContext::default();

        for text in messages {
            let mut pending = vec![Event::user_message(text)];
            while let Some(event) = pending.pop() {
                let Ok(result) = transition(&state, &context, &operator, event) else {
                    continue;
                };
                for effect in &result.effects {
                    if let Effect::SavePrescription { medications, diagnosis, .. } = effect {
                        prop_assert!(!medications.is_empty(), "Saved an empty prescription");
                        prop_assert!(!diagnosis.trim().is_empty());
                    }
                    pending.extend(store_outcome(effect));
                }
                state = result.new_state;
                context = result.new_context;
            }

            if state.is_idle() {
                let leftover = SessionContext {
                    patient_id: None,
                    ..context.clone()
                };
                prop_assert!(leftover.is_empty(), "Idle session holds {:?}", context);
            }
        }
    }

    // Global cancel from any non-idle state clears everything
    #[test]
    fn prop_cancel_clears_session(state in arb_non_idle_state(), context in arb_context()) {
        let result = transition(&state, &context, &test_operator(), Event::cancel()).unwrap();
        prop_assert_eq!(result.new_state, SessionState::Idle);
        prop_assert!(result.new_context.is_empty());
        prop_assert_eq!(
            result.effects,
            vec![Effect::reply(crate::replies::cancelled(), menu::main_menu())]
        );
    }

    // A sub-flow started after a cancel sees nothing from the cancelled attempt
    #[test]
    fn prop_restart_after_cancel_is_clean(state in arb_non_idle_state(), context in arb_context()) {
        let operator = test_operator();
        let cancelled = transition(&state, &context, &operator, Event::cancel()).unwrap();
        for label in [menu::ADD_PATIENT, menu::CREATE_PRESCRIPTION] {
            let started = transition(
                &cancelled.new_state,
                &cancelled.new_context,
                &operator,
                Event::user_message(label),
            )
            .unwrap();
            prop_assert!(started.new_context.is_empty());
        }
    }

    // Confirm never emits a save without medications
    #[test]
    fn prop_confirm_requires_medications(context in arb_context()) {
        let result = transition(
            &SessionState::Review,
            &context,
            &test_operator(),
            Event::user_message(menu::CONFIRM_SAVE),
        );
        match result {
            Ok(result) => {
                prop_assert!(!context.medications.is_empty());
                let saves_medications = result
                    .effects
                    .iter()
                    .any(|e| matches!(e, Effect::SavePrescription { medications, .. } if !medications.is_empty()));
                prop_assert!(saves_medications, "confirm emitted no save with medications");
            }
            Err(_) => {
                prop_assert!(
                    context.medications.is_empty()
                        || context.patient_id.is_none()
                        || context.diagnosis.is_none()
                );
            }
        }
    }

    // Non-numeric age never advances or mutates
    #[test]
    fn prop_bad_age_is_inert(text in "[a-zA-Z .]{0,12}", context in arb_context()) {
        prop_assume!(text.trim().parse::<i64>().is_err());
        let result = transition(&SessionState::CollectAge, &context, &test_operator(), Event::user_message(text)).unwrap();
        prop_assert_eq!(result.new_state, SessionState::CollectAge);
        prop_assert_eq!(result.new_context, context);
    }

    // Any integer age advances and is stored as given
    #[test]
    fn prop_integer_age_advances(age in any::<i64>()) {
        let context = SessionContext {
            patient_name: Some("Jane Doe".to_string()),
            ..SessionContext::default()
        };
        let result = transition(
            &SessionState::CollectAge,
            &context,
            &test_operator(),
            Event::user_message(format!(" {age} ")),
        )
        .unwrap();
        prop_assert_eq!(result.new_state, SessionState::CollectPhone);
        prop_assert_eq!(result.new_context.patient_age, Some(age));
    }

    // The identifier after the marker is what gets selected
    #[test]
    fn prop_selection_reads_marker(name in "[A-Za-z ]{1,20}", age in 0i64..120, id in 1i64..1_000_000) {
        let label = format!("{name} (Age: {age}) - ID: {id}");
        let result = transition(
            &SessionState::SelectPatient,
            &SessionContext::default(),
            &test_operator(),
            Event::user_message(label),
        )
        .unwrap();
        prop_assert_eq!(result.new_state, SessionState::CollectDiagnosis);
        prop_assert_eq!(result.new_context.patient_id, Some(id));
    }

    // An unparsable prescription body leaves everything as it was
    #[test]
    fn prop_unparsable_body_is_inert(
        state in prop_oneof![Just(SessionState::CollectMedications), Just(SessionState::Review)],
        text in "[a-zA-Z ,.]{0,40}",
        context in arb_context(),
    ) {
        prop_assume!(!text.trim().eq_ignore_ascii_case("h.pylori"));
        let result = transition(&state, &context, &test_operator(), Event::user_message(text)).unwrap();
        prop_assert_eq!(result.new_state, state);
        prop_assert_eq!(result.new_context, context);
    }
}
