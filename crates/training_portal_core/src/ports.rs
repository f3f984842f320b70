//! crates/training_portal_core/src/ports.rs
//!
//! Defines the service contracts (traits) the core depends on.
//! These traits form the boundary of the hexagonal architecture: the store
//! talks to a remote record service and to a local durable cache without
//! knowing which transport or storage backs them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Mutex;

use crate::domain::FormKind;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, disk).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Storage quota exceeded: {needed} bytes needed, {limit} allowed")]
    QuotaExceeded { needed: usize, limit: usize },
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Remote Collections
//=========================================================================================

/// The named record collections held by the remote persistence service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Users,
    Passcodes,
    Forms(FormKind),
    RequestsComplaints,
    TrainingAssignments,
    TrainingCompletions,
    SafetyObservations,
}

impl Collection {
    pub fn name(&self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Passcodes => "passcodes",
            Collection::Forms(FormKind::Onboarding) => "onboarding_forms",
            Collection::Forms(FormKind::MedicalFitness) => "medical_fitness_forms",
            Collection::Forms(FormKind::PpeIssuance) => "ppe_issuance_forms",
            Collection::Forms(FormKind::TrainingEvaluation) => "training_evaluation_forms",
            Collection::Forms(FormKind::SiteInduction) => "site_induction_forms",
            Collection::RequestsComplaints => "requests_complaints",
            Collection::TrainingAssignments => "training_assignments",
            Collection::TrainingCompletions => "training_completions",
            Collection::SafetyObservations => "safety_observations",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An equality filter over top-level record fields. An empty filter selects everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    fields: Map<String, Value>,
}

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// The filter as a JSON object, suitable for containment queries.
    pub fn as_object(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn matches(&self, record: &Value) -> bool {
        self.fields
            .iter()
            .all(|(field, expected)| record.get(field) == Some(expected))
    }
}

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Async CRUD over named record collections. Records are JSON objects with an `id` field.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn insert(&self, collection: Collection, record: Value) -> PortResult<Value>;

    async fn update(&self, collection: Collection, id: &str, patch: Value) -> PortResult<()>;

    async fn select(&self, collection: Collection, filter: &Filter) -> PortResult<Vec<Value>>;

    async fn delete(&self, collection: Collection, id: &str) -> PortResult<()>;
}

/// A synchronous, durable key/value slot for the serialized store snapshot.
pub trait LocalCache: Send + Sync {
    fn save(&self, key: &str, snapshot: &str) -> PortResult<()>;

    fn load(&self, key: &str) -> PortResult<Option<String>>;

    fn remove(&self, key: &str) -> PortResult<()>;
}

/// Source of the current time, injectable so expiry logic can be tested.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut guard = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *guard = *guard + by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}
