use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub classifier: ClassifierConfig,
    pub email: EmailConfig,
    pub page: PageConfig,
    pub autosend: AutoSendConfig,
    pub directories: DirectoryConfig,
    pub logging: LoggingConfig,
    pub state: StateConfig,
    pub settings_overrides: SettingsOverrides,
}

#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub endpoint: String,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub endpoint: String,
}

#[derive(Debug, Clone)]
pub struct PageConfig {
    pub url: String,
    pub debounce: Duration,
    pub settle_delay: Duration,
    pub feed_drain: Duration,
}

#[derive(Debug, Clone)]
pub struct AutoSendConfig {
    pub poll_interval: Duration,
    pub close_delay: Duration,
    pub give_up_after: Duration,
}

#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    pub logs_dir: String,
    pub data_dir: String,
    pub db_filename: String,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Clone)]
pub struct StateConfig {
    /// Keep per-conversation counters in SQLite instead of process memory.
    pub persist_conversations: bool,
}

/// Values applied over the stored settings record at startup.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub trusted_email: Option<String>,
    pub trusted_phone: Option<String>,
    pub email_service_id: Option<String>,
    pub email_template_id: Option<String>,
    pub emailjs_key: Option<String>,
    pub groq_api_key: Option<String>,
    pub alert_threshold: Option<u32>,
}

impl SettingsOverrides {
    pub fn is_empty(&self) -> bool {
        self.trusted_email.is_none()
            && self.trusted_phone.is_none()
            && self.email_service_id.is_none()
            && self.email_template_id.is_none()
            && self.emailjs_key.is_none()
            && self.groq_api_key.is_none()
            && self.alert_threshold.is_none()
    }
}

impl PageConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            debounce: Duration::from_millis(1_000),
            settle_delay: Duration::from_millis(50),
            feed_drain: Duration::from_millis(2_000),
        }
    }
}

impl Default for AutoSendConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            close_delay: Duration::from_secs(3),
            give_up_after: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for environment variable {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}
