use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::config::SettingsOverrides;

pub const TRUSTED_EMAIL: &str = "trustedEmail";
pub const TRUSTED_PHONE: &str = "trustedPhone";
pub const EMAIL_SERVICE_ID: &str = "emailServiceId";
pub const EMAIL_TEMPLATE_ID: &str = "emailTemplateId";
pub const EMAILJS_KEY: &str = "emailjsKey";
pub const GROQ_API_KEY: &str = "groqApiKey";
pub const ALERT_THRESHOLD: &str = "alertThreshold";
pub const BLOCKED_COUNT: &str = "blockedCount";

pub const DEFAULT_ALERT_THRESHOLD: u32 = 3;

static EMAIL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));

/// The single global settings record shared by the page and the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub trusted_email: String,
    pub trusted_phone: String,
    pub email_service_id: String,
    pub email_template_id: String,
    pub emailjs_key: String,
    pub groq_api_key: String,
    pub alert_threshold: u32,
    pub blocked_count: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            trusted_email: String::new(),
            trusted_phone: String::new(),
            email_service_id: String::new(),
            email_template_id: String::new(),
            emailjs_key: String::new(),
            groq_api_key: String::new(),
            alert_threshold: DEFAULT_ALERT_THRESHOLD,
            blocked_count: 0,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("alert threshold must be a positive integer")]
    InvalidThreshold,
}

impl Settings {
    /// Builds the record from stored rows. Missing or unparsable values keep their defaults.
    pub fn from_entries(entries: &HashMap<String, String>) -> Self {
        let mut settings = Self::default();
        let text = |key: &str| entries.get(key).cloned().unwrap_or_default();

        settings.trusted_email = text(TRUSTED_EMAIL);
        settings.trusted_phone = text(TRUSTED_PHONE);
        settings.email_service_id = text(EMAIL_SERVICE_ID);
        settings.email_template_id = text(EMAIL_TEMPLATE_ID);
        settings.emailjs_key = text(EMAILJS_KEY);
        settings.groq_api_key = text(GROQ_API_KEY);

        if let Some(threshold) = entries
            .get(ALERT_THRESHOLD)
            .and_then(|v| v.trim().parse::<u32>().ok())
            .filter(|v| *v > 0)
        {
            settings.alert_threshold = threshold;
        }
        if let Some(count) = entries
            .get(BLOCKED_COUNT)
            .and_then(|v| v.trim().parse::<u64>().ok())
        {
            settings.blocked_count = count;
        }
        settings
    }

    /// User-editable entries. The blocked counter is owned by the relay and written separately.
    pub fn editable_entries(&self) -> Vec<(&'static str, String)> {
        vec![
            (TRUSTED_EMAIL, self.trusted_email.clone()),
            (TRUSTED_PHONE, self.trusted_phone.clone()),
            (EMAIL_SERVICE_ID, self.email_service_id.clone()),
            (EMAIL_TEMPLATE_ID, self.email_template_id.clone()),
            (EMAILJS_KEY, self.emailjs_key.clone()),
            (GROQ_API_KEY, self.groq_api_key.clone()),
            (ALERT_THRESHOLD, self.alert_threshold.to_string()),
        ]
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.alert_threshold == 0 {
            return Err(SettingsError::InvalidThreshold);
        }
        Ok(())
    }

    pub fn apply(&mut self, overrides: &SettingsOverrides) {
        let replace = |slot: &mut String, value: &Option<String>| {
            if let Some(value) = value {
                *slot = value.trim().to_string();
            }
        };
        replace(&mut self.trusted_email, &overrides.trusted_email);
        replace(&mut self.trusted_phone, &overrides.trusted_phone);
        replace(&mut self.email_service_id, &overrides.email_service_id);
        replace(&mut self.email_template_id, &overrides.email_template_id);
        replace(&mut self.emailjs_key, &overrides.emailjs_key);
        replace(&mut self.groq_api_key, &overrides.groq_api_key);
        if let Some(threshold) = overrides.alert_threshold {
            self.alert_threshold = threshold;
        }
    }

    pub fn has_trusted_contact(&self) -> bool {
        !self.trusted_email.trim().is_empty() || !self.trusted_phone.trim().is_empty()
    }

    pub fn api_key(&self) -> Option<String> {
        Some(self.groq_api_key.trim())
            .filter(|key| !key.is_empty())
            .map(str::to_string)
    }
}

pub fn is_valid_email(value: &str) -> bool {
    EMAIL_REGEX.is_match(value)
}
