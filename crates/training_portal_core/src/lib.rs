pub mod domain;
pub mod memory;
pub mod passcode;
pub mod permissions;
pub mod ports;
pub mod rbac;
pub mod reducer;
pub mod store;

pub use domain::{
    AppSnapshot, FormKind, FormSubmission, LandingView, PasscodeEntry, Permission, RequestComplaint,
    RequestKind, RequestStatus, Role, SafetyObservation, Severity, TrainingAssignment,
    TrainingModule, TrainingProgress, UserSession,
};
pub use passcode::{PasscodeError, PasscodeIssuer, PasscodePolicy, PasscodeStatus, RejectReason};
pub use permissions::{CatalogError, PermissionCatalog};
pub use ports::{
    Clock, Collection, Filter, LocalCache, ManualClock, PortError, PortResult, RemoteStore,
    SystemClock,
};
pub use reducer::{Action, StoreError, StoreResult};
pub use store::{AppStore, StoreEvent, StoreOptions, SyncReport};
