//! Pure state transition function
//!
//! Every inbound message and every store outcome passes through
//! `transition`. It performs no I/O and reads no clock: store access and
//! replies come back as effects for the runtime to execute.

use super::{Effect, Event, OperatorContext, SessionContext, SessionState};
use crate::db::NewPatient;
use crate::menu::{self, Intent, Keyboard, MenuAction};
use crate::parser::parse_medications;
use crate::replies;
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: SessionState,
    pub new_context: SessionContext,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: SessionState, context: SessionContext) -> Self {
        Self {
            new_state: state,
            new_context: context,
            effects: vec![],
        }
    }

    /// Remain in `state` with the context untouched
    fn stay(state: SessionState, context: &SessionContext) -> Self {
        Self::new(state, context.clone())
    }

    /// Back to idle with everything entered so far discarded
    fn idle() -> Self {
        Self::new(SessionState::Idle, SessionContext::default())
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    fn reply(self, text: String, keyboard: Keyboard) -> Self {
        self.with_effect(Effect::reply(text, keyboard))
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Invalid transition: {event} in state {state:?}")]
    InvalidTransition {
        state: SessionState,
        event: &'static str,
    },
    #[error("Session is missing the {0}")]
    MissingField(&'static str),
}

/// Pure transition function
///
/// Given the same inputs it always produces the same outputs. Validation
/// failures are not errors: they re-prompt and leave state and context as
/// they were.
pub fn transition(
    state: &SessionState,
    context: &SessionContext,
    operator: &OperatorContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match (*state, event) {
        // ============================================================
        // Global Cancel
        // ============================================================
        (
            _,
            Event::UserMessage {
                intent: Intent::Cancel,
                ..
            },
        ) => Ok(TransitionResult::idle().reply(replies::cancelled(), menu::main_menu())),

        // ============================================================
        // Idle Dispatch
        // ============================================================
        (
            SessionState::Idle,
            Event::UserMessage {
                intent: Intent::Menu(action),
                ..
            },
        ) => Ok(menu_action(action, context, operator)),

        (SessionState::Idle, Event::UserMessage { .. }) => Ok(TransitionResult::stay(
            SessionState::Idle,
            context,
        )
        .reply(replies::idle_hint(), menu::main_menu())),

        // Whatever arrives is the term, menu labels included
        (SessionState::AwaitingSearchTerm, Event::UserMessage { text, .. }) => {
            Ok(TransitionResult::idle().with_effect(Effect::SearchPatients {
                term: text.trim().to_string(),
            }))
        }

        // ============================================================
        // Patient Registration
        // ============================================================
        (SessionState::CollectName, Event::UserMessage { text, .. }) => {
            if text.trim().is_empty() {
                return Ok(TransitionResult::stay(SessionState::CollectName, context)
                    .reply(replies::name_required(), Keyboard::Unchanged));
            }
            let prompt = replies::age_prompt(&text);
            let context = SessionContext {
                patient_name: Some(text),
                ..context.clone()
            };
            Ok(TransitionResult::new(SessionState::CollectAge, context)
                .reply(prompt, Keyboard::Unchanged))
        }

        (SessionState::CollectAge, Event::UserMessage { text, .. }) => {
            let Ok(age) = text.trim().parse::<i64>() else {
                return Ok(TransitionResult::stay(SessionState::CollectAge, context)
                    .reply(replies::invalid_age(), Keyboard::Unchanged));
            };
            let context = SessionContext {
                patient_age: Some(age),
                ..context.clone()
            };
            Ok(TransitionResult::new(SessionState::CollectPhone, context)
                .reply(replies::phone_prompt(age), Keyboard::Unchanged))
        }

        // Phone is taken verbatim and the patient is saved straight away
        (SessionState::CollectPhone, Event::UserMessage { text, .. }) => {
            let name = context
                .patient_name
                .clone()
                .ok_or(TransitionError::MissingField("patient name"))?;
            let age = context
                .patient_age
                .ok_or(TransitionError::MissingField("patient age"))?;
            let patient = NewPatient {
                name,
                age,
                phone: text.clone(),
                operator_id: operator.operator_id,
            };
            let context = SessionContext {
                patient_phone: Some(text),
                ..context.clone()
            };
            Ok(TransitionResult::new(SessionState::CollectPhone, context)
                .with_effect(Effect::SavePatient { patient }))
        }

        (SessionState::CollectPhone, Event::PatientSaved { patient }) => {
            let context = SessionContext {
                patient_id: Some(patient.id),
                ..SessionContext::default()
            };
            Ok(TransitionResult::new(SessionState::Idle, context)
                .reply(replies::patient_added(&patient), menu::after_patient_saved()))
        }

        // ============================================================
        // Prescription Authoring
        // ============================================================
        (SessionState::SelectPatient, Event::PatientChoicesLoaded { patients }) => {
            if patients.is_empty() {
                return Ok(TransitionResult::idle().reply(
                    replies::no_patients_for_prescription(),
                    menu::add_patient_only(),
                ));
            }
            Ok(TransitionResult::stay(SessionState::SelectPatient, context).reply(
                replies::select_patient_prompt(),
                menu::patient_choices(&patients),
            ))
        }

        (SessionState::SelectPatient, Event::UserMessage { text, .. }) => {
            let Some(patient_id) = menu::extract_patient_id(&text) else {
                return Ok(TransitionResult::stay(SessionState::SelectPatient, context)
                    .reply(replies::select_patient_retry(), Keyboard::Unchanged));
            };
            let context = SessionContext {
                patient_id: Some(patient_id),
                ..context.clone()
            };
            Ok(TransitionResult::new(SessionState::CollectDiagnosis, context)
                .reply(replies::diagnosis_prompt(), Keyboard::Remove))
        }

        (SessionState::CollectDiagnosis, Event::UserMessage { text, .. }) => {
            if text.trim().is_empty() {
                return Ok(TransitionResult::stay(SessionState::CollectDiagnosis, context)
                    .reply(replies::diagnosis_required(), Keyboard::Unchanged));
            }
            let context = SessionContext {
                diagnosis: Some(text),
                ..context.clone()
            };
            Ok(TransitionResult::new(SessionState::CollectMedications, context)
                .reply(replies::medication_prompt(), Keyboard::Unchanged))
        }

        (
            SessionState::Review,
            Event::UserMessage {
                intent: Intent::Confirm,
                ..
            },
        ) => commit(context),

        // Stays in review; the next text is the replacement body
        (
            SessionState::Review,
            Event::UserMessage {
                intent: Intent::Edit,
                ..
            },
        ) => Ok(TransitionResult::stay(SessionState::Review, context)
            .reply(replies::edit_prompt(), Keyboard::Remove)),

        // Medication body, or a replacement body while reviewing
        (
            current @ (SessionState::CollectMedications | SessionState::Review),
            Event::UserMessage { text, .. },
        ) => {
            let Ok(medications) = parse_medications(&text) else {
                return Ok(TransitionResult::stay(current, context)
                    .reply(replies::invalid_prescription(), Keyboard::Unchanged));
            };
            let patient_id = context
                .patient_id
                .ok_or(TransitionError::MissingField("selected patient"))?;
            let context = SessionContext {
                medications,
                ..context.clone()
            };
            Ok(TransitionResult::new(SessionState::Review, context)
                .with_effect(Effect::LoadPreviewPatient { patient_id }))
        }

        (SessionState::Review, Event::PreviewPatientLoaded { patient, today }) => {
            let diagnosis = context
                .diagnosis
                .as_deref()
                .ok_or(TransitionError::MissingField("diagnosis"))?;
            let text = replies::preview(&patient, diagnosis, today, &context.medications);
            Ok(TransitionResult::stay(SessionState::Review, context).reply(text, menu::review()))
        }

        (SessionState::Review, Event::PrescriptionSaved { prescription }) => {
            Ok(TransitionResult::idle().reply(
                replies::prescription_saved(&prescription),
                menu::after_prescription_saved(),
            ))
        }

        (SessionState::Review, Event::PatientMissing { .. }) => {
            Ok(TransitionResult::idle().reply(replies::patient_missing(), menu::main_menu()))
        }

        // ============================================================
        // Everything Else
        // ============================================================
        (state, event) => Err(TransitionError::InvalidTransition {
            state,
            event: event.kind(),
        }),
    }
}

fn menu_action(
    action: MenuAction,
    context: &SessionContext,
    operator: &OperatorContext,
) -> TransitionResult {
    let limits = operator.limits;
    match action {
        MenuAction::Start => {
            TransitionResult::idle().reply(replies::welcome(), menu::main_menu())
        }
        MenuAction::AddPatient => {
            TransitionResult::new(SessionState::CollectName, SessionContext::default())
                .reply(replies::name_prompt(), Keyboard::Remove)
        }
        MenuAction::CreatePrescription => {
            TransitionResult::new(SessionState::SelectPatient, SessionContext::default())
                .with_effect(Effect::LoadPatientChoices {
                    limit: limits.patient_choices,
                })
        }
        MenuAction::SearchPatient => {
            TransitionResult::new(SessionState::AwaitingSearchTerm, SessionContext::default())
                .reply(replies::search_prompt(), Keyboard::Remove)
        }
        MenuAction::ViewPatients => TransitionResult::stay(SessionState::Idle, context)
            .with_effect(Effect::ShowPatients {
                limit: limits.patient_list,
            }),
        MenuAction::ViewPrescriptions => TransitionResult::stay(SessionState::Idle, context)
            .with_effect(Effect::ShowPrescriptions {
                limit: limits.prescription_list,
            }),
        MenuAction::Statistics => {
            TransitionResult::stay(SessionState::Idle, context).with_effect(Effect::ShowStatistics)
        }
    }
}

/// Confirm in review. Refuses to emit a save without every field present.
fn commit(context: &SessionContext) -> Result<TransitionResult, TransitionError> {
    let patient_id = context
        .patient_id
        .ok_or(TransitionError::MissingField("selected patient"))?;
    let diagnosis = context
        .diagnosis
        .clone()
        .ok_or(TransitionError::MissingField("diagnosis"))?;
    if context.medications.is_empty() {
        return Err(TransitionError::MissingField("medications"));
    }

    Ok(
        TransitionResult::stay(SessionState::Review, context).with_effect(
            Effect::SavePrescription {
                patient_id,
                diagnosis,
                medications: context.medications.clone(),
            },
        ),
    )
}
