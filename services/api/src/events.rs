//! services/api/src/events.rs
//!
//! Background consumer for the store's side channel. Cache and remote write
//! failures never fail the request that caused them; this task logs them and
//! keeps a short list the client can poll from `/notifications`.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use training_portal_core::StoreEvent;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Info,
    Warning,
}

/// A user-visible notice about a background outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Notification {
    pub at: DateTime<Utc>,
    pub level: NotificationLevel,
    pub message: String,
}

/// Bounded ring of pending notifications; the oldest entry is dropped when full.
#[derive(Debug)]
pub struct Notifications {
    capacity: usize,
    pending: Mutex<VecDeque<Notification>>,
}

impl Notifications {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            pending: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push(&self, level: NotificationLevel, message: impl Into<String>) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if pending.len() == self.capacity {
            pending.pop_front();
        }
        pending.push_back(Notification {
            at: Utc::now(),
            level,
            message: message.into(),
        });
    }

    /// Returns every pending notification, oldest first, and clears the list.
    pub fn drain(&self) -> Vec<Notification> {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.drain(..).collect()
    }
}

impl Default for Notifications {
    fn default() -> Self {
        Self::new(50)
    }
}

fn notice_for(event: &StoreEvent) -> Option<(NotificationLevel, String)> {
    match event {
        StoreEvent::CacheWriteFailed { reason } => Some((
            NotificationLevel::Warning,
            format!("Could not save data on this device: {}", reason),
        )),
        StoreEvent::RemoteWriteFailed { collection, reason } => Some((
            NotificationLevel::Warning,
            format!("Could not save {} to the server: {}", collection, reason),
        )),
        StoreEvent::Synced { passcodes, .. } => Some((
            NotificationLevel::Info,
            format!("Synchronized {} passcodes from the server", passcodes),
        )),
        StoreEvent::RemoteWriteSucceeded { .. } => None,
    }
}

/// Spawns the task that drains the store's event channel until the store is dropped.
pub fn spawn_event_listener(
    mut events: broadcast::Receiver<StoreEvent>,
    notifications: Arc<Notifications>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    match &event {
                        StoreEvent::RemoteWriteSucceeded { collection } => {
                            debug!(%collection, "Remote write acknowledged");
                        }
                        StoreEvent::Synced { passcodes, assignment_found } => {
                            info!(passcodes, assignment_found, "Store synchronized");
                        }
                        failure => warn!(event = ?failure, "Background store write failed"),
                    }
                    if let Some((level, message)) = notice_for(&event) {
                        notifications.push(level, message);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event listener fell behind; some store events were dropped");
                }
                Err(RecvError::Closed) => {
                    info!("Store event channel closed; listener exiting.");
                    break;
                }
            }
        }
    })
}
