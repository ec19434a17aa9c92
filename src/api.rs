//! HTTP channel for operators
//!
//! Inbound messages are posted, replies are streamed back over SSE, and the
//! read-only reports are also exposed as plain JSON.

mod handlers;
mod sse;
mod types;

pub use handlers::create_router;

use crate::config::Limits;
use crate::db::Database;
use crate::runtime::SessionManager;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
}

impl AppState {
    pub fn new(db: Database, limits: Limits) -> Self {
        Self {
            sessions: Arc::new(SessionManager::new(db, limits)),
        }
    }
}
