use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;

use crate::domain::{settings::BLOCKED_COUNT, Settings};

/// Persisted key/value settings record.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn load(&self) -> Result<Settings>;

    /// Writes every user-editable key. The blocked counter is left untouched.
    async fn save(&self, settings: &Settings) -> Result<()>;

    /// Adds exactly one to the global blocked counter and returns the new value.
    async fn increment_blocked(&self) -> Result<u64>;
}

#[derive(Clone)]
pub struct SqliteSettingsStore {
    pool: SqlitePool,
}

impl SqliteSettingsStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl SettingsStore for SqliteSettingsStore {
    async fn load(&self) -> Result<Settings> {
        let rows: Vec<(String, String)> = sqlx::query_as(r#"SELECT key, value FROM settings"#)
            .fetch_all(&self.pool)
            .await?;
        let entries: HashMap<String, String> = rows.into_iter().collect();
        Ok(Settings::from_entries(&entries))
    }

    async fn save(&self, settings: &Settings) -> Result<()> {
        settings.validate()?;

        let mut tx = self.pool.begin().await?;
        for (key, value) in settings.editable_entries() {
            sqlx::query(
                r#"INSERT INTO settings (key, value) VALUES (?1, ?2)
                   ON CONFLICT(key) DO UPDATE SET value = excluded.value"#,
            )
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        tracing::debug!(
            target: "settings",
            has_email = !settings.trusted_email.is_empty(),
            has_phone = !settings.trusted_phone.is_empty(),
            threshold = settings.alert_threshold,
            "settings saved"
        );
        Ok(())
    }

    async fn increment_blocked(&self) -> Result<u64> {
        let value: String = sqlx::query_scalar(
            r#"INSERT INTO settings (key, value) VALUES (?1, '1')
               ON CONFLICT(key) DO UPDATE SET value = CAST(CAST(value AS INTEGER) + 1 AS TEXT)
               RETURNING value"#,
        )
        .bind(BLOCKED_COUNT)
        .fetch_one(&self.pool)
        .await?;

        value
            .trim()
            .parse::<u64>()
            .with_context(|| format!("stored {BLOCKED_COUNT} is not a number: {value:?}"))
    }
}

#[cfg(test)]
pub mod testing {
    use parking_lot::Mutex;

    use super::*;

    /// Settings held in memory; answers without touching a database.
    #[derive(Default)]
    pub struct FixedSettings {
        pub settings: Mutex<Settings>,
    }

    impl FixedSettings {
        pub fn new(settings: Settings) -> Self {
            Self {
                settings: Mutex::new(settings),
            }
        }
    }

    #[async_trait]
    impl SettingsStore for FixedSettings {
        async fn load(&self) -> Result<Settings> {
            Ok(self.settings.lock().clone())
        }

        async fn save(&self, settings: &Settings) -> Result<()> {
            settings.validate()?;
            let mut current = self.settings.lock();
            let blocked = current.blocked_count;
            *current = settings.clone();
            current.blocked_count = blocked;
            Ok(())
        }

        async fn increment_blocked(&self) -> Result<u64> {
            let mut current = self.settings.lock();
            current.blocked_count += 1;
            Ok(current.blocked_count)
        }
    }
}
