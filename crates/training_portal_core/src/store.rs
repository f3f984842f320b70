//! crates/training_portal_core/src/store.rs
//!
//! The application store: the single owner of the session and domain state.
//!
//! Every action runs the pure reducer under the state lock, commits, mirrors
//! the full snapshot into the local cache, and then fires the action's remote
//! deltas on the async runtime without waiting for them. Local state is never
//! rolled back because of a cache or remote failure; those are reported on the
//! event channel instead. `sync` is the one path where remote state replaces
//! local state.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{
    normalize_email, AppSnapshot, FormKind, FormSubmission, PasscodeEntry, RequestComplaint,
    RequestKind, RequestStatus, SafetyObservation, Severity, TrainingAssignment, TrainingModule,
    TrainingProgress, UserSession,
};
use crate::passcode::{self, PasscodeIssuer, PasscodePolicy, RejectReason};
use crate::ports::{Clock, Collection, Filter, LocalCache, RemoteStore, SystemClock};
use crate::reducer::{self, Action, RemoteWrite, StoreError, StoreResult};

pub const DEFAULT_CACHE_KEY: &str = "portal-state";

/// Non-fatal outcomes surfaced on the side channel.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    CacheWriteFailed { reason: String },
    RemoteWriteSucceeded { collection: Collection },
    RemoteWriteFailed { collection: Collection, reason: String },
    Synced { passcodes: usize, assignment_found: bool },
}

/// Construction options for [`AppStore`].
#[derive(Clone)]
pub struct StoreOptions {
    pub cache_key: String,
    pub passcode_policy: PasscodePolicy,
    pub clock: Arc<dyn Clock>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            cache_key: DEFAULT_CACHE_KEY.to_string(),
            passcode_policy: PasscodePolicy::default(),
            clock: Arc::new(SystemClock),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub passcodes: usize,
    pub assignment: Option<TrainingAssignment>,
}

pub struct AppStore {
    state: Mutex<AppSnapshot>,
    remote: Arc<dyn RemoteStore>,
    cache: Arc<dyn LocalCache>,
    clock: Arc<dyn Clock>,
    issuer: PasscodeIssuer,
    cache_key: String,
    events: broadcast::Sender<StoreEvent>,
}

impl AppStore {
    /// Creates the store, hydrating from the local cache when it holds a snapshot.
    pub fn open(
        remote: Arc<dyn RemoteStore>,
        cache: Arc<dyn LocalCache>,
        options: StoreOptions,
    ) -> Self {
        let initial = match cache.load(&options.cache_key) {
            Ok(Some(raw)) => match serde_json::from_str::<AppSnapshot>(&raw) {
                Ok(snapshot) => {
                    info!(key = %options.cache_key, "Restored state from local cache");
                    snapshot
                }
                Err(e) => {
                    warn!(key = %options.cache_key, error = %e, "Ignoring unreadable cached state");
                    AppSnapshot::default()
                }
            },
            Ok(None) => AppSnapshot::default(),
            Err(e) => {
                warn!(key = %options.cache_key, error = %e, "Failed to read local cache");
                AppSnapshot::default()
            }
        };

        let (events, _) = broadcast::channel(64);
        Self {
            state: Mutex::new(initial),
            remote,
            cache,
            clock: options.clock,
            issuer: PasscodeIssuer::new(options.passcode_policy),
            cache_key: options.cache_key,
            events,
        }
    }

    /// Receives cache/remote failures and sync notices from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn lock(&self) -> MutexGuard<'_, AppSnapshot> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: StoreEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    //=====================================================================================
    // Dispatch
    //=====================================================================================

    fn dispatch(&self, action: Action) -> StoreResult<AppSnapshot> {
        let now = self.clock.now();
        let mut state = self.lock();
        let transition = reducer::reduce(&state, &action, now)?;
        *state = transition.state;

        self.write_cache(&state);
        for write in transition.effects {
            self.spawn_remote(write);
        }
        debug!(action = action.name(), "Action committed");
        Ok(state.clone())
    }

    fn write_cache(&self, snapshot: &AppSnapshot) {
        let result = serde_json::to_string(snapshot)
            .map_err(StoreError::from)
            .and_then(|raw| self.cache.save(&self.cache_key, &raw).map_err(StoreError::from));
        if let Err(e) = result {
            warn!(key = %self.cache_key, error = %e, "Local cache write failed; keeping in-memory state");
            self.emit(StoreEvent::CacheWriteFailed {
                reason: e.to_string(),
            });
        }
    }

    fn spawn_remote(&self, write: RemoteWrite) {
        let collection = write.collection();
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(%collection, "No async runtime available; remote write dropped");
            self.emit(StoreEvent::RemoteWriteFailed {
                collection,
                reason: "no async runtime".to_string(),
            });
            return;
        };

        let remote = Arc::clone(&self.remote);
        let events = self.events.clone();
        runtime.spawn(async move {
            let event = match write.apply(remote.as_ref()).await {
                Ok(()) => {
                    debug!(%collection, "Remote write completed");
                    StoreEvent::RemoteWriteSucceeded { collection }
                }
                Err(e) => {
                    warn!(%collection, error = %e, "Remote write failed; local state kept");
                    StoreEvent::RemoteWriteFailed {
                        collection,
                        reason: e.to_string(),
                    }
                }
            };
            let _ = events.send(event);
        });
    }

    fn current_email(&self) -> StoreResult<String> {
        self.lock()
            .user
            .as_ref()
            .map(|u| u.email.clone())
            .ok_or(StoreError::NoSession)
    }

    //=====================================================================================
    // Session
    //=====================================================================================

    /// Replaces the current session.
    pub fn set_user(&self, user: UserSession) -> StoreResult<()> {
        self.dispatch(Action::SetUser(user))?;
        Ok(())
    }

    pub fn user(&self) -> Option<UserSession> {
        self.lock().user.clone()
    }

    /// Ends the session but keeps the rest of the state.
    pub fn logout(&self) -> StoreResult<()> {
        self.dispatch(Action::Logout)?;
        Ok(())
    }

    /// Clears all in-memory state and the local cache. Remote data is untouched.
    pub fn reset(&self) {
        let mut state = self.lock();
        *state = AppSnapshot::default();
        if let Err(e) = self.cache.remove(&self.cache_key) {
            warn!(key = %self.cache_key, error = %e, "Failed to clear local cache");
            self.emit(StoreEvent::CacheWriteFailed {
                reason: e.to_string(),
            });
        }
        info!("Store reset");
    }

    pub fn snapshot(&self) -> AppSnapshot {
        self.lock().clone()
    }

    //=====================================================================================
    // Passcodes
    //=====================================================================================

    /// Issues a code for a trainee and appends it to the registry.
    /// The current user, if any, is recorded as the issuer.
    pub fn issue_passcode(
        &self,
        trainee_email: &str,
        explicit_code: Option<&str>,
        valid_days: Option<i64>,
    ) -> StoreResult<PasscodeEntry> {
        let issued_by = self.user().map(|u| u.email);
        let entry = self.issuer.issue(
            trainee_email,
            explicit_code,
            valid_days,
            issued_by.as_deref(),
            self.clock.now(),
        )?;
        self.add_passcode(entry.clone())?;
        info!(trainee = %entry.trainee_email, expires_at = %entry.expires_at, "Passcode issued");
        Ok(entry)
    }

    pub fn add_passcode(&self, entry: PasscodeEntry) -> StoreResult<()> {
        self.dispatch(Action::AddPasscode(entry))?;
        Ok(())
    }

    /// Checks a code without consuming it.
    pub fn validate_passcode(
        &self,
        trainee_email: &str,
        code: &str,
    ) -> Result<PasscodeEntry, RejectReason> {
        let state = self.lock();
        passcode::validate(&state.passcodes, trainee_email, code, self.clock.now()).cloned()
    }

    pub fn mark_passcode_used(&self, id: Uuid) -> StoreResult<PasscodeEntry> {
        let state = self.dispatch(Action::MarkPasscodeUsed { id })?;
        state
            .passcodes
            .into_iter()
            .find(|p| p.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("passcode {}", id)))
    }

    /// Validates and consumes a trainee's code, then opens their session.
    pub fn login_with_passcode(
        &self,
        trainee_email: &str,
        code: &str,
        name: Option<String>,
    ) -> StoreResult<UserSession> {
        let state = self.dispatch(Action::PasscodeLogin {
            trainee_email: trainee_email.to_string(),
            code: code.to_string(),
            name,
        })?;
        state.user.ok_or(StoreError::NoSession)
    }

    pub fn passcodes(&self) -> Vec<PasscodeEntry> {
        self.lock().passcodes.clone()
    }

    //=====================================================================================
    // Training
    //=====================================================================================

    /// Overwrites the trainee's module list.
    pub fn assign_training_modules(
        &self,
        trainee_email: &str,
        modules: Vec<TrainingModule>,
    ) -> StoreResult<TrainingAssignment> {
        let assignment = TrainingAssignment {
            trainee_email: trainee_email.to_string(),
            modules,
            assigned_by: self.user().map(|u| u.email),
            assigned_at: self.clock.now(),
        };
        let state = self.dispatch(Action::AssignTraining(assignment))?;
        state
            .assignments
            .get(&normalize_email(trainee_email))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("training assignment for {}", trainee_email)))
    }

    pub fn trainee_assignments(&self, trainee_email: &str) -> Option<TrainingAssignment> {
        self.lock()
            .assignments
            .get(&normalize_email(trainee_email))
            .cloned()
    }

    pub fn complete_module(
        &self,
        trainee_email: &str,
        module: TrainingModule,
    ) -> StoreResult<TrainingProgress> {
        let state = self.dispatch(Action::CompleteModule {
            trainee_email: trainee_email.to_string(),
            module,
        })?;
        reducer::progress(&state, trainee_email)
            .ok_or_else(|| StoreError::NotFound(format!("training assignment for {}", trainee_email)))
    }

    pub fn training_progress(&self, trainee_email: &str) -> Option<TrainingProgress> {
        reducer::progress(&self.lock(), trainee_email)
    }

    //=====================================================================================
    // Forms, observations, requests
    //=====================================================================================

    /// Stores a submission in the form's slot, replacing any earlier one.
    pub fn save_form(&self, kind: FormKind, fields: Map<String, Value>) -> StoreResult<FormSubmission> {
        let form = FormSubmission {
            id: Uuid::new_v4(),
            kind,
            submitted_by: self.current_email()?,
            submitted_at: self.clock.now(),
            fields,
        };
        self.dispatch(Action::SaveForm(form.clone()))?;
        Ok(form)
    }

    pub fn form(&self, kind: FormKind) -> Option<FormSubmission> {
        self.lock().forms.get(&kind).cloned()
    }

    pub fn submit_observation(
        &self,
        location: &str,
        description: &str,
        severity: Severity,
    ) -> StoreResult<SafetyObservation> {
        let observation = SafetyObservation {
            id: Uuid::new_v4(),
            observer_email: self.current_email()?,
            location: location.trim().to_string(),
            description: description.trim().to_string(),
            severity,
            observed_at: self.clock.now(),
        };
        self.dispatch(Action::SubmitObservation(observation.clone()))?;
        Ok(observation)
    }

    pub fn observations(&self) -> Vec<SafetyObservation> {
        self.lock().observations.clone()
    }

    pub fn submit_request(
        &self,
        kind: RequestKind,
        subject: &str,
        details: &str,
    ) -> StoreResult<RequestComplaint> {
        let now = self.clock.now();
        let request = RequestComplaint {
            id: Uuid::new_v4(),
            kind,
            submitted_by: self.current_email()?,
            subject: subject.trim().to_string(),
            details: details.trim().to_string(),
            status: RequestStatus::Open,
            created_at: now,
            updated_at: now,
        };
        self.dispatch(Action::SubmitRequest(request.clone()))?;
        Ok(request)
    }

    pub fn update_request_status(
        &self,
        id: Uuid,
        status: RequestStatus,
    ) -> StoreResult<RequestComplaint> {
        let state = self.dispatch(Action::UpdateRequestStatus { id, status })?;
        state
            .requests
            .into_iter()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("request {}", id)))
    }

    pub fn requests(&self) -> Vec<RequestComplaint> {
        self.lock().requests.clone()
    }

    //=====================================================================================
    // Sync
    //=====================================================================================

    /// Pulls the passcode registry and the session user's assignment from the
    /// remote service and replaces the local copies. On failure nothing changes.
    ///
    /// The remote registry wins outright: a code issued locally whose insert
    /// never reached the remote service is dropped from the registry here.
    pub async fn sync(&self) -> StoreResult<SyncReport> {
        let email = self.user().map(|u| normalize_email(&u.email));

        let all = Filter::all();
        let passcodes = self.remote.select(Collection::Passcodes, &all);
        let assignments = async {
            match &email {
                Some(email) => {
                    let filter = Filter::all().eq("trainee_email", email.clone());
                    self.remote
                        .select(Collection::TrainingAssignments, &filter)
                        .await
                        .map(Some)
                }
                None => Ok(None),
            }
        };
        let (passcode_rows, assignment_rows) = futures::try_join!(passcodes, assignments)?;

        let passcodes: Vec<PasscodeEntry> = parse_rows(Collection::Passcodes, passcode_rows);
        let assignment = assignment_rows.and_then(|rows| {
            parse_rows::<TrainingAssignment>(Collection::TrainingAssignments, rows)
                .into_iter()
                .max_by_key(|a| a.assigned_at)
        });

        let report = SyncReport {
            passcodes: passcodes.len(),
            assignment: assignment.clone(),
        };
        self.dispatch(Action::ApplySync {
            passcodes,
            trainee_email: email,
            assignment,
        })?;
        info!(passcodes = report.passcodes, "Synchronized with remote service");
        self.emit(StoreEvent::Synced {
            passcodes: report.passcodes,
            assignment_found: report.assignment.is_some(),
        });
        Ok(report)
    }
}

/// Decodes remote records, skipping any that do not match the local schema.
fn parse_rows<T: serde::de::DeserializeOwned>(collection: Collection, rows: Vec<Value>) -> Vec<T> {
    rows.into_iter()
        .filter_map(|row| match serde_json::from_value(row) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!(%collection, error = %e, "Skipping malformed remote record");
                None
            }
        })
        .collect()
}
