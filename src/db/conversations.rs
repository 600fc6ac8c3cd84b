use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sqlx::sqlite::SqlitePool;

use crate::domain::ConversationToxicity;

/// Per-conversation toxicity counters owned by the relay.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Creates the entry on first use, otherwise adds exactly one. Returns the updated entry.
    async fn record_flag(&self, conversation_id: &str, at: DateTime<Utc>)
        -> Result<ConversationToxicity>;
}

/// Counters that live as long as the process.
#[derive(Default)]
pub struct InMemoryConversationStore {
    entries: Mutex<HashMap<String, ConversationToxicity>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn record_flag(
        &self,
        conversation_id: &str,
        at: DateTime<Utc>,
    ) -> Result<ConversationToxicity> {
        let mut entries = self.entries.lock();
        let entry = entries
            .entry(conversation_id.to_string())
            .or_insert(ConversationToxicity {
                count: 0,
                last_seen: at,
            });
        entry.count += 1;
        entry.last_seen = at;
        Ok(*entry)
    }
}

/// Counters kept in the settings database so they survive restarts.
#[derive(Clone)]
pub struct SqliteConversationStore {
    pool: SqlitePool,
}

impl SqliteConversationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    async fn record_flag(
        &self,
        conversation_id: &str,
        at: DateTime<Utc>,
    ) -> Result<ConversationToxicity> {
        let (count, last_seen): (i64, DateTime<Utc>) = sqlx::query_as(
            r#"INSERT INTO conversation_state (conversation_id, count, last_seen)
               VALUES (?1, 1, ?2)
               ON CONFLICT(conversation_id) DO UPDATE
                   SET count = count + 1, last_seen = excluded.last_seen
               RETURNING count, last_seen"#,
        )
        .bind(conversation_id)
        .bind(at)
        .fetch_one(&self.pool)
        .await?;

        Ok(ConversationToxicity {
            count: u32::try_from(count)
                .with_context(|| format!("conversation count out of range: {count}"))?,
            last_seen,
        })
    }
}
