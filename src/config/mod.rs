use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub server: ServerConfig,
    pub email: EmailConfig,
    pub site_name: String,
    pub site_url: String,
    /// Master switch for outbound email; per-user opt-ins apply on top.
    pub email_notifications_enabled: bool,
    pub attachments_dir: String,
    pub ticket_prefix: String,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct EmailConfig {
    pub smtp_server: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://deskserver:@localhost:5432/deskserver".to_string()),
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("SERVER_PORT")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(8080),
            },
            email: EmailConfig {
                smtp_server: env::var("SMTP_HOST").unwrap_or_else(|_| "localhost".to_string()),
                smtp_port: env::var("SMTP_PORT")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(587),
                username: env::var("SMTP_USER").unwrap_or_default(),
                password: env::var("SMTP_PASS").unwrap_or_default(),
                from: env::var("SMTP_FROM")
                    .unwrap_or_else(|_| "noreply@deskserver.local".to_string()),
            },
            site_name: env::var("SITE_NAME").unwrap_or_else(|_| "QuickDesk".to_string()),
            site_url: env::var("SITE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string()),
            email_notifications_enabled: env::var("ENABLE_EMAIL_NOTIFICATIONS")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
            attachments_dir: env::var("ATTACHMENTS_DIR")
                .unwrap_or_else(|_| "./data/attachments".to_string()),
            ticket_prefix: env::var("TICKET_PREFIX").unwrap_or_else(|_| "TICK".to_string()),
        }
    }
}
