//! crates/training_portal_core/src/reducer.rs
//!
//! The pure half of the application store: `reduce` turns the previous
//! snapshot and an action into the next snapshot plus a description of the
//! remote writes the action implies. No I/O happens here.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::domain::{
    normalize_email, AppSnapshot, FormSubmission, PasscodeEntry, RequestComplaint, RequestStatus,
    SafetyObservation, TrainingAssignment, TrainingModule, TrainingProgress, UserSession,
};
use crate::passcode::{self, is_numeric_code, RejectReason};
use crate::ports::{Collection, PortError, PortResult, RemoteStore};

//=========================================================================================
// Errors
//=========================================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Passcode {0} has already been used")]
    AlreadyUsed(Uuid),
    #[error("Passcode rejected: {0}")]
    PasscodeRejected(RejectReason),
    #[error("No user is logged in")]
    NoSession,
    #[error("Remote service error: {0}")]
    Remote(#[from] PortError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<passcode::PasscodeError> for StoreError {
    fn from(err: passcode::PasscodeError) -> Self {
        match err {
            passcode::PasscodeError::Validation(msg) => StoreError::Validation(msg),
            passcode::PasscodeError::AlreadyUsed(id) => StoreError::AlreadyUsed(id),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

//=========================================================================================
// Actions and Effects
//=========================================================================================

#[derive(Debug, Clone)]
pub enum Action {
    SetUser(UserSession),
    Logout,
    SaveForm(FormSubmission),
    SubmitObservation(SafetyObservation),
    AddPasscode(PasscodeEntry),
    MarkPasscodeUsed { id: Uuid },
    /// Validate a trainee's code, consume it and open their session, as one step.
    PasscodeLogin {
        trainee_email: String,
        code: String,
        name: Option<String>,
    },
    AssignTraining(TrainingAssignment),
    CompleteModule {
        trainee_email: String,
        module: TrainingModule,
    },
    SubmitRequest(RequestComplaint),
    UpdateRequestStatus { id: Uuid, status: RequestStatus },
    /// Remote state pulled by a sync; replaces the passcode registry and one assignment.
    ApplySync {
        passcodes: Vec<PasscodeEntry>,
        trainee_email: Option<String>,
        assignment: Option<TrainingAssignment>,
    },
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::SetUser(_) => "set_user",
            Action::Logout => "logout",
            Action::SaveForm(_) => "save_form",
            Action::SubmitObservation(_) => "submit_observation",
            Action::AddPasscode(_) => "add_passcode",
            Action::MarkPasscodeUsed { .. } => "mark_passcode_used",
            Action::PasscodeLogin { .. } => "passcode_login",
            Action::AssignTraining(_) => "assign_training_modules",
            Action::CompleteModule { .. } => "complete_module",
            Action::SubmitRequest(_) => "submit_request",
            Action::UpdateRequestStatus { .. } => "update_request_status",
            Action::ApplySync { .. } => "apply_sync",
        }
    }
}

/// A single delta to push to the remote service.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteWrite {
    Insert {
        collection: Collection,
        record: Value,
    },
    Update {
        collection: Collection,
        id: String,
        patch: Value,
    },
}

impl RemoteWrite {
    pub fn collection(&self) -> Collection {
        match self {
            RemoteWrite::Insert { collection, .. } | RemoteWrite::Update { collection, .. } => {
                *collection
            }
        }
    }

    pub async fn apply(self, remote: &dyn RemoteStore) -> PortResult<()> {
        match self {
            RemoteWrite::Insert { collection, record } => {
                remote.insert(collection, record).await.map(|_| ())
            }
            RemoteWrite::Update {
                collection,
                id,
                patch,
            } => remote.update(collection, &id, patch).await,
        }
    }
}

/// The committed result of one action.
#[derive(Debug, Clone)]
pub struct Transition {
    pub state: AppSnapshot,
    pub effects: Vec<RemoteWrite>,
}

//=========================================================================================
// Reducer
//=========================================================================================

fn require(value: &str, what: &str) -> StoreResult<()> {
    if value.trim().is_empty() {
        return Err(StoreError::Validation(format!("{} is required", what)));
    }
    Ok(())
}

/// Serializes `value` and stamps it with `id`, unless it already carries one.
fn record_with_id<T: Serialize>(value: &T, id: Uuid) -> StoreResult<Value> {
    let mut record = serde_json::to_value(value)?;
    if let Value::Object(fields) = &mut record {
        fields
            .entry("id")
            .or_insert_with(|| Value::String(id.to_string()));
    }
    Ok(record)
}

fn insert<T: Serialize>(collection: Collection, value: &T) -> StoreResult<RemoteWrite> {
    Ok(RemoteWrite::Insert {
        collection,
        record: record_with_id(value, Uuid::new_v4())?,
    })
}

fn passcode_used_patch(entry: &PasscodeEntry) -> RemoteWrite {
    RemoteWrite::Update {
        collection: Collection::Passcodes,
        id: entry.id.to_string(),
        patch: json!({ "is_used": true, "used_at": entry.used_at }),
    }
}

fn user_record(user: &UserSession, now: DateTime<Utc>) -> Value {
    json!({
        "id": Uuid::new_v4().to_string(),
        "email": user.email,
        "role": user.role,
        "name": user.name,
        "logged_in_at": now,
    })
}

fn mark_used_in(
    passcodes: &mut [PasscodeEntry],
    id: Uuid,
    now: DateTime<Utc>,
) -> StoreResult<PasscodeEntry> {
    let slot = passcodes
        .iter_mut()
        .find(|p| p.id == id)
        .ok_or_else(|| StoreError::NotFound(format!("passcode {}", id)))?;
    let used = passcode::mark_used(slot, now)?;
    *slot = used.clone();
    Ok(used)
}

/// Computes the next snapshot. Fails without side effects on invalid input.
pub fn reduce(state: &AppSnapshot, action: &Action, now: DateTime<Utc>) -> StoreResult<Transition> {
    let mut next = state.clone();
    let mut effects = Vec::new();

    match action {
        Action::SetUser(user) => {
            require(&user.email, "email")?;
            next.user = Some(user.clone());
            effects.push(RemoteWrite::Insert {
                collection: Collection::Users,
                record: user_record(user, now),
            });
        }
        Action::Logout => {
            next.user = None;
        }
        Action::SaveForm(form) => {
            require(&form.submitted_by, "submitted_by")?;
            if form.fields.is_empty() {
                return Err(StoreError::Validation(format!(
                    "{} form has no fields",
                    form.kind.as_str()
                )));
            }
            next.forms.insert(form.kind, form.clone());
            effects.push(insert(Collection::Forms(form.kind), form)?);
        }
        Action::SubmitObservation(observation) => {
            require(&observation.observer_email, "observer email")?;
            require(&observation.location, "location")?;
            require(&observation.description, "description")?;
            next.observations.push(observation.clone());
            effects.push(insert(Collection::SafetyObservations, observation)?);
        }
        Action::AddPasscode(entry) => {
            require(&entry.trainee_email, "trainee email")?;
            if !is_numeric_code(&entry.code) {
                return Err(StoreError::Validation(format!(
                    "passcode '{}' must contain digits only",
                    entry.code
                )));
            }
            if entry.expires_at <= entry.created_at {
                return Err(StoreError::Validation(
                    "passcode must expire after it is created".to_string(),
                ));
            }
            if state.passcodes.iter().any(|p| p.id == entry.id) {
                return Err(StoreError::Validation(format!(
                    "passcode {} is already registered",
                    entry.id
                )));
            }
            next.passcodes.push(entry.clone());
            effects.push(insert(Collection::Passcodes, entry)?);
        }
        Action::MarkPasscodeUsed { id } => {
            let used = mark_used_in(&mut next.passcodes, *id, now)?;
            effects.push(passcode_used_patch(&used));
        }
        Action::PasscodeLogin {
            trainee_email,
            code,
            name,
        } => {
            let entry_id = passcode::validate(&state.passcodes, trainee_email, code, now)
                .map_err(StoreError::PasscodeRejected)?
                .id;
            let used = mark_used_in(&mut next.passcodes, entry_id, now)?;
            let user = UserSession {
                email: trainee_email.trim().to_string(),
                role: crate::domain::Role::Trainee,
                name: name.clone(),
                passcode: Some(used.code.clone()),
            };
            effects.push(passcode_used_patch(&used));
            effects.push(RemoteWrite::Insert {
                collection: Collection::Users,
                record: user_record(&user, now),
            });
            next.user = Some(user);
        }
        Action::AssignTraining(assignment) => {
            require(&assignment.trainee_email, "trainee email")?;
            if assignment.modules.is_empty() {
                return Err(StoreError::Validation(
                    "at least one training module is required".to_string(),
                ));
            }
            let mut modules = Vec::with_capacity(assignment.modules.len());
            for module in &assignment.modules {
                if !modules.contains(module) {
                    modules.push(*module);
                }
            }
            let key = normalize_email(&assignment.trainee_email);
            let assignment = TrainingAssignment {
                trainee_email: key.clone(),
                modules,
                ..assignment.clone()
            };
            effects.push(insert(Collection::TrainingAssignments, &assignment)?);
            next.assignments.insert(key, assignment);
        }
        Action::CompleteModule {
            trainee_email,
            module,
        } => {
            let key = normalize_email(trainee_email);
            let assigned = state
                .assignments
                .get(&key)
                .ok_or_else(|| StoreError::NotFound(format!("training assignment for {}", key)))?;
            if !assigned.modules.contains(module) {
                return Err(StoreError::Validation(format!(
                    "{} is not assigned to {}",
                    module, key
                )));
            }
            next.completions.entry(key.clone()).or_default().insert(*module);
            effects.push(insert(
                Collection::TrainingCompletions,
                &json!({ "trainee_email": key, "module": module, "completed_at": now }),
            )?);
        }
        Action::SubmitRequest(request) => {
            require(&request.submitted_by, "submitted_by")?;
            require(&request.subject, "subject")?;
            next.requests.push(request.clone());
            effects.push(insert(Collection::RequestsComplaints, request)?);
        }
        Action::UpdateRequestStatus { id, status } => {
            let request = next
                .requests
                .iter_mut()
                .find(|r| r.id == *id)
                .ok_or_else(|| StoreError::NotFound(format!("request {}", id)))?;
            request.status = *status;
            request.updated_at = now;
            effects.push(RemoteWrite::Update {
                collection: Collection::RequestsComplaints,
                id: id.to_string(),
                patch: json!({ "status": status, "updated_at": now }),
            });
        }
        Action::ApplySync {
            passcodes,
            trainee_email,
            assignment,
        } => {
            next.passcodes = passcodes.clone();
            if let Some(email) = trainee_email {
                let key = normalize_email(email);
                match assignment {
                    Some(assignment) => {
                        next.assignments.insert(key, assignment.clone());
                    }
                    None => {
                        next.assignments.remove(&key);
                    }
                }
            }
        }
    }

    Ok(Transition {
        state: next,
        effects,
    })
}

/// Completion figures for a trainee, against their current assignment.
pub fn progress(state: &AppSnapshot, trainee_email: &str) -> Option<TrainingProgress> {
    let key = normalize_email(trainee_email);
    let assignment = state.assignments.get(&key)?;
    let done = state.completions.get(&key);
    let (completed, remaining): (Vec<TrainingModule>, Vec<TrainingModule>) = assignment
        .modules
        .iter()
        .partition(|m| done.is_some_and(|d| d.contains(*m)));
    let total = assignment.modules.len();
    let percent_complete = if total == 0 {
        0
    } else {
        (completed.len() * 100 / total) as u8
    };
    Some(TrainingProgress {
        assigned: assignment.modules.clone(),
        completed,
        remaining,
        percent_complete,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FormKind, RequestKind, Role};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, 8, 30, 0).unwrap()
    }

    fn assignment(email: &str, modules: &[TrainingModule]) -> TrainingAssignment {
        TrainingAssignment {
            trainee_email: email.to_string(),
            modules: modules.to_vec(),
            assigned_by: Some("coord@x.com".to_string()),
            assigned_at: now(),
        }
    }

    fn entry(code: &str) -> PasscodeEntry {
        PasscodeEntry {
            id: Uuid::new_v4(),
            code: code.to_string(),
            trainee_email: "t@x.com".to_string(),
            is_used: false,
            created_at: now(),
            expires_at: now() + Duration::days(7),
            used_at: None,
            issued_by: None,
        }
    }

    #[test]
    fn reducer_leaves_previous_state_untouched() {
        let before = AppSnapshot::default();
        let action = Action::SetUser(UserSession::new("a@b.com", Role::Nurse));
        let t = reduce(&before, &action, now()).unwrap();
        assert!(before.user.is_none());
        assert_eq!(t.state.user.unwrap().role, Role::Nurse);
        assert_eq!(t.effects.len(), 1);
        assert_eq!(t.effects[0].collection(), Collection::Users);
    }

    #[test]
    fn empty_email_blocks_set_user() {
        let err = reduce(
            &AppSnapshot::default(),
            &Action::SetUser(UserSession::new("  ", Role::Nurse)),
            now(),
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn assignment_overwrites_and_dedupes() {
        let s0 = AppSnapshot::default();
        let s1 = reduce(
            &s0,
            &Action::AssignTraining(assignment("T@x.com", &[TrainingModule::Bosiet])),
            now(),
        )
        .unwrap()
        .state;
        let s2 = reduce(
            &s1,
            &Action::AssignTraining(assignment(
                "t@x.com",
                &[TrainingModule::FireWatch, TrainingModule::FireWatch],
            )),
            now(),
        )
        .unwrap()
        .state;
        assert_eq!(s2.assignments.len(), 1);
        assert_eq!(s2.assignments["t@x.com"].modules, vec![TrainingModule::FireWatch]);
    }

    #[test]
    fn passcode_login_consumes_code_and_opens_trainee_session() {
        let mut state = AppSnapshot::default();
        state.passcodes.push(entry("4821"));
        let action = Action::PasscodeLogin {
            trainee_email: "t@x.com".to_string(),
            code: "4821".to_string(),
            name: Some("Tess".to_string()),
        };
        let t = reduce(&state, &action, now()).unwrap();
        assert!(t.state.passcodes[0].is_used);
        assert_eq!(t.state.user.as_ref().unwrap().role, Role::Trainee);
        assert_eq!(t.effects.len(), 2);

        let err = reduce(&t.state, &action, now()).unwrap_err();
        assert!(matches!(
            err,
            StoreError::PasscodeRejected(RejectReason::AlreadyUsed)
        ));
    }

    #[test]
    fn mark_used_twice_fails() {
        let mut state = AppSnapshot::default();
        let e = entry("1234");
        state.passcodes.push(e.clone());
        let once = reduce(&state, &Action::MarkPasscodeUsed { id: e.id }, now())
            .unwrap()
            .state;
        let err = reduce(&once, &Action::MarkPasscodeUsed { id: e.id }, now()).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyUsed(id) if id == e.id));
        let missing = reduce(&once, &Action::MarkPasscodeUsed { id: Uuid::new_v4() }, now());
        assert!(matches!(missing, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn add_passcode_rejects_malformed_entries() {
        let state = AppSnapshot::default();
        let bad = entry("12a4");
        assert!(reduce(&state, &Action::AddPasscode(bad), now()).is_err());
        let mut backwards = entry("1234");
        backwards.expires_at = backwards.created_at;
        assert!(reduce(&state, &Action::AddPasscode(backwards), now()).is_err());
    }

    #[test]
    fn empty_form_is_rejected_and_second_save_replaces_slot() {
        let state = AppSnapshot::default();
        let mut form = FormSubmission {
            id: Uuid::new_v4(),
            kind: FormKind::Onboarding,
            submitted_by: "a@b.com".to_string(),
            submitted_at: now(),
            fields: serde_json::Map::new(),
        };
        assert!(reduce(&state, &Action::SaveForm(form.clone()), now()).is_err());

        form.fields.insert("full_name".to_string(), json!("Ada"));
        let s1 = reduce(&state, &Action::SaveForm(form.clone()), now()).unwrap().state;
        form.fields.insert("full_name".to_string(), json!("Ada L."));
        let s2 = reduce(&s1, &Action::SaveForm(form), now()).unwrap().state;
        assert_eq!(s2.forms.len(), 1);
        assert_eq!(s2.forms[&FormKind::Onboarding].fields["full_name"], json!("Ada L."));
    }

    #[test]
    fn request_status_update_touches_timestamp() {
        let mut state = AppSnapshot::default();
        let id = Uuid::new_v4();
        state.requests.push(RequestComplaint {
            id,
            kind: RequestKind::Complaint,
            submitted_by: "a@b.com".to_string(),
            subject: "Cold showers".to_string(),
            details: String::new(),
            status: RequestStatus::Open,
            created_at: now(),
            updated_at: now(),
        });
        let later = now() + Duration::hours(3);
        let t = reduce(
            &state,
            &Action::UpdateRequestStatus {
                id,
                status: RequestStatus::Resolved,
            },
            later,
        )
        .unwrap();
        assert_eq!(t.state.requests[0].status, RequestStatus::Resolved);
        assert_eq!(t.state.requests[0].updated_at, later);
        assert!(matches!(
            &t.effects[0],
            RemoteWrite::Update { collection: Collection::RequestsComplaints, .. }
        ));
    }

    #[test]
    fn progress_counts_completed_assigned_modules() {
        let mut state = AppSnapshot::default();
        state = reduce(
            &state,
            &Action::AssignTraining(assignment(
                "t@x.com",
                &[TrainingModule::Bosiet, TrainingModule::FireWatch, TrainingModule::FirstAid],
            )),
            now(),
        )
        .unwrap()
        .state;
        state = reduce(
            &state,
            &Action::CompleteModule {
                trainee_email: "t@x.com".to_string(),
                module: TrainingModule::FireWatch,
            },
            now(),
        )
        .unwrap()
        .state;
        let p = progress(&state, "T@X.com").unwrap();
        assert_eq!(p.completed, vec![TrainingModule::FireWatch]);
        assert_eq!(p.remaining, vec![TrainingModule::Bosiet, TrainingModule::FirstAid]);
        assert_eq!(p.percent_complete, 33);

        let unassigned = reduce(
            &state,
            &Action::CompleteModule {
                trainee_email: "t@x.com".to_string(),
                module: TrainingModule::Huet,
            },
            now(),
        );
        assert!(matches!(unassigned, Err(StoreError::Validation(_))));
    }
}
