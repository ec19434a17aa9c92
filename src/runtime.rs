//! Runtime for executing operator sessions
//!
//! One task per operator drains that operator's inbound events in order, so
//! a turn always finishes before the next one for the same operator starts.
//! Different operators run concurrently and share nothing but the store.

mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::{RuntimeError, SessionRuntime};
pub use traits::*;

use crate::config::Limits;
use crate::db::{Database, OperatorId};
use crate::menu::Keyboard;
use crate::state_machine::{Event, OperatorContext, SessionContext, SessionState};
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::{broadcast, mpsc, watch, RwLock};

/// Type alias for production runtime with concrete implementations
pub type ProductionRuntime = SessionRuntime<DatabaseStore, BroadcastChannel, SystemClock>;

/// Events delivered to stream subscribers
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    Reply { text: String, keyboard: Keyboard },
    Error { message: String },
}

/// Session as last published by its runtime
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub context: SessionContext,
}

/// Handle to interact with a running session
#[derive(Clone)]
pub struct SessionHandle {
    pub event_tx: mpsc::Sender<Event>,
    pub broadcast_tx: broadcast::Sender<ChannelEvent>,
    pub snapshot_rx: watch::Receiver<SessionSnapshot>,
}

/// Keyed map of operator sessions, created on first use
pub struct SessionManager {
    db: Database,
    limits: Limits,
    sessions: RwLock<HashMap<OperatorId, SessionHandle>>,
}

impl SessionManager {
    pub fn new(db: Database, limits: Limits) -> Self {
        Self {
            db,
            limits,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Get or create the runtime for an operator
    pub async fn get_or_create(&self, operator_id: OperatorId) -> SessionHandle {
        if let Some(handle) = self.sessions.read().await.get(&operator_id) {
            return handle.clone();
        }

        let mut sessions = self.sessions.write().await;
        // Another request may have created it while we waited
        if let Some(handle) = sessions.get(&operator_id) {
            return handle.clone();
        }

        let (event_tx, event_rx) = mpsc::channel(32);
        let (broadcast_tx, _) = broadcast::channel(128);
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::default());

        let runtime: ProductionRuntime = SessionRuntime::new(
            OperatorContext::new(operator_id, self.limits),
            DatabaseStore::new(self.db.clone()),
            BroadcastChannel::new(broadcast_tx.clone()),
            SystemClock,
        )
        .with_snapshots(snapshot_tx);

        tokio::spawn(async move {
            runtime.run(event_rx).await;
            tracing::info!(operator_id, "Session runtime finished");
        });

        let handle = SessionHandle {
            event_tx,
            broadcast_tx,
            snapshot_rx,
        };
        sessions.insert(operator_id, handle.clone());
        handle
    }

    /// Queue an event for an operator's session
    pub async fn send_event(&self, operator_id: OperatorId, event: Event) -> Result<(), String> {
        let handle = self.get_or_create(operator_id).await;
        handle
            .event_tx
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {e}"))
    }

    /// Subscribe to an operator's replies, along with the session as it is now
    pub async fn subscribe(
        &self,
        operator_id: OperatorId,
    ) -> (broadcast::Receiver<ChannelEvent>, SessionSnapshot) {
        let handle = self.get_or_create(operator_id).await;
        let snapshot = handle.snapshot_rx.borrow().clone();
        (handle.broadcast_tx.subscribe(), snapshot)
    }

    /// Current session, or an idle one if the operator has none yet
    pub async fn snapshot(&self, operator_id: OperatorId) -> SessionSnapshot {
        self.sessions
            .read()
            .await
            .get(&operator_id)
            .map(|handle| handle.snapshot_rx.borrow().clone())
            .unwrap_or_default()
    }

    /// Get the database handle
    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }
}
