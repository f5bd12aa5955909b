use std::sync::Arc;

use crate::config::AppConfig;
use crate::email::EmailSender;
use crate::shared::utils::DbPool;

pub struct AppState {
    pub conn: DbPool,
    pub config: AppConfig,
    pub mailer: Arc<dyn EmailSender>,
}

impl AppState {
    pub fn new(conn: DbPool, config: AppConfig, mailer: Arc<dyn EmailSender>) -> Self {
        Self {
            conn,
            config,
            mailer,
        }
    }
}
