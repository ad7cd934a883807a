//! Shared application state for the health endpoint.

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Instant;

use store::{AnalyticsStore, OperationalStore};

#[derive(Clone)]
pub struct AppState {
    pub operational: Arc<OperationalStore>,
    pub analytics: Arc<AnalyticsStore>,
    pub running_probers: Arc<AtomicUsize>,
    pub server_start_time: Instant,
}
