use std::{sync::Arc, time::Duration};

use anyhow::Result;
use reqwest::Client;
use tokio::{
    io::{stdin, AsyncBufRead, BufReader},
    sync::mpsc,
    task::JoinHandle,
    time::timeout,
};

use crate::{
    classifier::ClassifierClient,
    config::{AppConfig, AutoSendConfig},
    db::{
        self, ConversationStore, InMemoryConversationStore, SettingsStore,
        SqliteConversationStore, SqliteSettingsStore,
    },
    feed::ChatFeed,
    infrastructure::{
        directories::ResolvedPaths, notifier::TracingNotifier, shutdown::Shutdown,
    },
    page::{
        is_alert_tab, run_auto_send, spawn_alert_listener, AutoSendOutcome, DomTree,
        MemoryDocument, PageSession, TracingTabOpener,
    },
    relay::{self, Coordinator, EmailReporter, RelayService},
};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

pub struct DetoxifyApp {
    _paths: ResolvedPaths,
    config: Arc<AppConfig>,
    settings: Arc<SqliteSettingsStore>,
    doc: Arc<MemoryDocument>,
    feed: ChatFeed,
    relay_handle: JoinHandle<()>,
    page_handle: JoinHandle<()>,
    alert_handle: JoinHandle<()>,
    shutdown: Shutdown,
}

impl DetoxifyApp {
    pub async fn initialize(
        config: AppConfig,
        paths: ResolvedPaths,
        shutdown: Shutdown,
    ) -> Result<Self> {
        let config = Arc::new(config);
        let pool = db::init_pool(&paths.db_path).await?;
        let settings = Arc::new(SqliteSettingsStore::new(pool.clone()));
        apply_overrides(&config, settings.as_ref()).await?;

        let conversations: Arc<dyn ConversationStore> = if config.state.persist_conversations {
            tracing::info!(target: "relay", "conversation counters persisted to sqlite");
            Arc::new(SqliteConversationStore::new(pool))
        } else {
            Arc::new(InMemoryConversationStore::new())
        };

        let http_client = Client::builder()
            .user_agent(format!("detoxify-guard/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        let (page_tx, page_rx) = mpsc::unbounded_channel();
        let coordinator = Arc::new(Coordinator::new(
            Arc::new(ClassifierClient::new(
                http_client.clone(),
                config.classifier.clone(),
            )),
            settings.clone(),
            conversations,
            Arc::new(TracingNotifier),
            EmailReporter::new(http_client, config.email.clone()),
            page_tx,
        ));

        let (relay, inbox) = relay::channel();
        let relay_handle = RelayService::new(coordinator, inbox).spawn(shutdown.subscribe());

        let doc = Arc::new(MemoryDocument::new(config.page.url.clone()));
        let feed = ChatFeed::new(doc.clone(), config.page.feed_drain);

        let session = PageSession::new(
            doc.clone(),
            relay,
            settings.clone(),
            config.page.clone(),
        );
        let page_handle = session.spawn(shutdown.subscribe());
        let alert_handle =
            spawn_alert_listener(page_rx, Arc::new(TracingTabOpener), shutdown.subscribe());

        Ok(Self {
            _paths: paths,
            config,
            settings,
            doc,
            feed,
            relay_handle,
            page_handle,
            alert_handle,
            shutdown,
        })
    }

    pub async fn run(self) -> Result<()> {
        let DetoxifyApp {
            _paths: _,
            config,
            settings,
            doc,
            mut feed,
            relay_handle,
            page_handle,
            alert_handle,
            shutdown,
        } = self;

        tracing::info!(location = %doc.location(), "detoxify guard started");
        let reader = BufReader::new(stdin());

        if is_alert_tab(&doc.location()) {
            let outcome =
                run_alert_tab(doc.as_ref(), &mut feed, reader, &config.autosend, &shutdown).await;
            tracing::info!(target: "alert", ?outcome, "auto-send finished");
        } else {
            let mut shutdown_listener = shutdown.subscribe();
            if let Err(err) = feed.run(reader, &mut shutdown_listener).await {
                tracing::error!(target: "feed", error = %err, "chat feed failed");
            }
        }

        if shutdown.is_triggered() {
            tracing::info!("shutdown signal received (CTRL+C / SIGTERM)");
        }
        shutdown.trigger();

        join_with_timeout("page", page_handle).await;
        join_with_timeout("alert", alert_handle).await;
        join_with_timeout("relay", relay_handle).await;

        match settings.load().await {
            Ok(current) => tracing::info!(
                target: "settings",
                blocked = current.blocked_count,
                "toxic messages blocked so far"
            ),
            Err(err) => tracing::warn!(target: "settings", error = %err, "could not read counters"),
        }

        if timeout(SHUTDOWN_TIMEOUT, settings.close()).await.is_err() {
            tracing::warn!(
                target: "db",
                "database pool did not close within {:?}",
                SHUTDOWN_TIMEOUT
            );
        }

        tracing::info!("detoxify guard stopped");
        Ok(())
    }
}

/// Feeds the page while auto-send waits for the send control. Ends when auto-send does,
/// even if the feed is still open.
async fn run_alert_tab<R>(
    doc: &MemoryDocument,
    feed: &mut ChatFeed,
    reader: R,
    config: &AutoSendConfig,
    shutdown: &Shutdown,
) -> AutoSendOutcome
where
    R: AsyncBufRead + Unpin,
{
    let mut send_listener = shutdown.subscribe();
    let mut feed_listener = shutdown.subscribe();

    let auto_send = run_auto_send(doc, config, &mut send_listener);
    tokio::pin!(auto_send);
    let feeding = feed.run(reader, &mut feed_listener);
    tokio::pin!(feeding);

    tokio::select! {
        outcome = &mut auto_send => return outcome,
        result = &mut feeding => {
            if let Err(err) = result {
                tracing::error!(target: "feed", error = %err, "chat feed failed");
            }
        }
    }
    auto_send.await
}

async fn apply_overrides(config: &AppConfig, store: &dyn SettingsStore) -> Result<()> {
    if config.settings_overrides.is_empty() {
        return Ok(());
    }
    let mut current = store.load().await?;
    current.apply(&config.settings_overrides);
    store.save(&current).await?;
    tracing::info!(target: "settings", "settings overrides applied from environment");
    Ok(())
}

async fn join_with_timeout(name: &'static str, mut handle: JoinHandle<()>) {
    let wait = tokio::time::sleep(SHUTDOWN_TIMEOUT);
    tokio::pin!(wait);
    tokio::select! {
        res = &mut handle => {
            if let Err(err) = res {
                if err.is_panic() {
                    tracing::error!(target: "app", task = name, "task panicked");
                }
            }
        }
        _ = &mut wait => {
            tracing::warn!(
                target: "app",
                task = name,
                "task did not stop within {:?}; aborting",
                SHUTDOWN_TIMEOUT
            );
            handle.abort();
        }
    }
}
