use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tokio::sync::broadcast;

use crate::config::AppConfig;
use crate::models::TransitionEvent;
use crate::services::notify::NotificationDispatcher;

pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub config: AppConfig,
    pub notifier: Box<dyn NotificationDispatcher>,
    pub events_tx: broadcast::Sender<TransitionEvent>,
}
