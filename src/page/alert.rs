use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::{sync::mpsc::UnboundedReceiver, task::JoinHandle};
use url::Url;

use crate::{
    domain::{AlertRequest, PageCommand},
    infrastructure::shutdown::ShutdownListener,
};

const SEND_URL: &str = "https://web.whatsapp.com/send";
pub const AUTOSEND_FLAG: &str = "autodetox";

/// Opens a URL in a new browser tab.
#[async_trait]
pub trait TabOpener: Send + Sync {
    async fn open(&self, url: &str) -> Result<()>;
}

/// Logs the link instead of opening it; used when no browser is attached.
#[derive(Debug, Default, Clone)]
pub struct TracingTabOpener;

#[async_trait]
impl TabOpener for TracingTabOpener {
    async fn open(&self, url: &str) -> Result<()> {
        tracing::info!(target: "alert", url, "alert tab requested");
        Ok(())
    }
}

pub fn alert_message(data: &AlertRequest) -> String {
    let labels = data.labels.join(", ").to_uppercase();
    let labels = if labels.is_empty() {
        "GENERAL TOXICITY".to_string()
    } else {
        labels
    };

    format!(
        "🚨 *DETOXIFY SECURITY ALERT* 🚨\n\n\
         *Harmful Behavior Detected* in your WhatsApp conversations.\n\n\
         📍 *Chat ID:* {conversation}\n\
         ⚠️ *Toxicity Type:* {labels}\n\
         💬 *Flagged Content:* \"{text}\"\n\n\
         ---\n\
         *Automatic Action Taken:*\n\
         This message has been flagged and blurred. An automated report has also been \
         dispatched to the trusted email on file.\n\n\
         _Detoxify: Making web space safer, one message at a time._",
        conversation = data.conversation_id,
        text = data.text,
    )
}

/// Pre-filled send link for the trusted number; `autodetox=1` arms auto-send in the new tab.
pub fn deep_link(data: &AlertRequest) -> Result<Url> {
    let phone: String = data.phone.chars().filter(char::is_ascii_digit).collect();
    let message = alert_message(data);
    let url = Url::parse_with_params(
        SEND_URL,
        &[
            ("phone", phone.as_str()),
            ("text", message.as_str()),
            (AUTOSEND_FLAG, "1"),
        ],
    )?;
    Ok(url)
}

/// Handles relay → page commands until the relay side closes or shutdown is requested.
pub fn spawn_alert_listener(
    mut commands: UnboundedReceiver<PageCommand>,
    opener: Arc<dyn TabOpener>,
    mut shutdown: ShutdownListener,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let command = tokio::select! {
                next = commands.recv() => match next {
                    Some(command) => command,
                    None => break,
                },
                _ = shutdown.notified() => break,
            };

            match command {
                PageCommand::SendWhatsappAlert { data } => {
                    let opened = match deep_link(&data) {
                        Ok(url) => opener.open(url.as_str()).await,
                        Err(err) => Err(err),
                    };
                    if let Err(err) = opened {
                        tracing::error!(target: "alert", error = %err, "failed to open alert tab");
                    }
                }
            }
        }
        tracing::debug!(target: "alert", "alert listener stopped");
    })
}
