//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::events::Notifications;
use std::sync::Arc;
use training_portal_core::{AppStore, PermissionCatalog};

/// The shared application state, created once at startup and passed to all handlers.
///
/// The process hosts a single client session, so there is exactly one store.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<AppStore>,
    pub catalog: Arc<PermissionCatalog>,
    pub notifications: Arc<Notifications>,
}

impl AppState {
    pub fn new(store: Arc<AppStore>, catalog: PermissionCatalog) -> Self {
        Self {
            store,
            catalog: Arc::new(catalog),
            notifications: Arc::new(Notifications::default()),
        }
    }
}
