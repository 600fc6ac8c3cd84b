use std::{env, str::FromStr, time::Duration};

use super::env::{
    AppConfig, AutoSendConfig, ClassifierConfig, ConfigError, DirectoryConfig, EmailConfig,
    LoggingConfig, PageConfig, SettingsOverrides, StateConfig,
};

pub const DEFAULT_CLASSIFIER_URL: &str = "http://localhost:5000/analyze";
pub const DEFAULT_EMAIL_API_URL: &str = "https://api.emailjs.com/api/v1.0/email/send";
pub const DEFAULT_PAGE_URL: &str = "https://web.whatsapp.com/";

pub fn load_config() -> Result<AppConfig, ConfigError> {
    AppConfig::from_env()
}

impl AppConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let classifier = ClassifierConfig {
            endpoint: string_or("CLASSIFIER_URL", DEFAULT_CLASSIFIER_URL),
            timeout: parse_opt::<u64>("CLASSIFIER_TIMEOUT_MS")?.map(Duration::from_millis),
        };

        let email = EmailConfig {
            endpoint: string_or("EMAIL_API_URL", DEFAULT_EMAIL_API_URL),
        };

        let page = PageConfig {
            url: string_or("PAGE_URL", DEFAULT_PAGE_URL),
            debounce: millis_or("DEBOUNCE_MS", 1_000)?,
            settle_delay: millis_or("REPLACE_SETTLE_MS", 50)?,
            feed_drain: millis_or("FEED_DRAIN_MS", 2_000)?,
        };

        let autosend = AutoSendConfig {
            poll_interval: millis_or("AUTOSEND_POLL_MS", 1_000)?,
            close_delay: millis_or("AUTOSEND_CLOSE_MS", 3_000)?,
            give_up_after: millis_or("AUTOSEND_TIMEOUT_MS", 30_000)?,
        };

        let directories = DirectoryConfig {
            logs_dir: string_or("LOGS_DIR", "logs"),
            data_dir: string_or("DATA_DIR", "data"),
            db_filename: string_or("DB_FILENAME", "detoxify.db"),
        };

        let logging = LoggingConfig {
            level: string_or("LOG_LEVEL", "info"),
        };

        let state = StateConfig {
            persist_conversations: parse_flag("PERSIST_CONVERSATIONS")?,
        };

        let settings_overrides = SettingsOverrides {
            trusted_email: non_empty("DETOX_TRUSTED_EMAIL"),
            trusted_phone: non_empty("DETOX_TRUSTED_PHONE"),
            email_service_id: non_empty("DETOX_EMAIL_SERVICE_ID"),
            email_template_id: non_empty("DETOX_EMAIL_TEMPLATE_ID"),
            emailjs_key: non_empty("DETOX_EMAILJS_KEY"),
            groq_api_key: non_empty("DETOX_GROQ_API_KEY"),
            alert_threshold: parse_opt::<u32>("DETOX_ALERT_THRESHOLD")?,
        };

        Ok(Self {
            classifier,
            email,
            page,
            autosend,
            directories,
            logging,
            state,
            settings_overrides,
        })
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn string_or(key: &str, default: &str) -> String {
    non_empty(key).unwrap_or_else(|| default.to_string())
}

fn parse_opt<T: FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match non_empty(key) {
        Some(value) => parse_value(key, &value).map(Some),
        None => Ok(None),
    }
}

fn millis_or(key: &'static str, default: u64) -> Result<Duration, ConfigError> {
    Ok(Duration::from_millis(parse_opt::<u64>(key)?.unwrap_or(default)))
}

fn parse_flag(key: &'static str) -> Result<bool, ConfigError> {
    match non_empty(key) {
        Some(value) => parse_bool(key, &value),
        None => Ok(false),
    }
}

fn parse_value<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::Invalid {
        key,
        value: value.to_string(),
    })
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
        }),
    }
}
