use std::sync::Arc;

use crate::gateway::broadcaster::Broadcaster;
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub broadcaster: Arc<Broadcaster>,
    /// The single credential the gateway accepts on IDENTIFY.
    pub token: String,
}

impl AppState {
    pub fn new() -> Self {
        Self::with_token("powerunit".to_string())
    }

    pub fn with_token(token: String) -> Self {
        Self {
            store: Arc::new(Store::new()),
            broadcaster: Arc::new(Broadcaster::new()),
            token,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
