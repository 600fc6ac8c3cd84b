use std::sync::Arc;

use anyhow::Result;
use tokio::{sync::mpsc::UnboundedReceiver, task::JoinHandle};

use crate::{domain::RelayRequest, infrastructure::shutdown::ShutdownListener};

use super::{coordinator::Coordinator, handle::Envelope};

/// Drains the page ↔ relay channel.
///
/// Toxic-message events run inline so counters step one at a time in arrival order; analysis
/// and reports are spawned because they wait on the network.
pub struct RelayService {
    coordinator: Arc<Coordinator>,
    inbox: UnboundedReceiver<Envelope>,
}

impl RelayService {
    pub fn new(coordinator: Arc<Coordinator>, inbox: UnboundedReceiver<Envelope>) -> Self {
        Self { coordinator, inbox }
    }

    pub fn spawn(mut self, mut shutdown: ShutdownListener) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(err) = self.run_loop(&mut shutdown).await {
                tracing::error!(target: "relay", error = %err, "relay loop crashed");
            }
        })
    }

    async fn run_loop(&mut self, shutdown: &mut ShutdownListener) -> Result<()> {
        loop {
            if shutdown.is_triggered() {
                break;
            }

            let envelope = tokio::select! {
                next = self.inbox.recv() => match next {
                    Some(envelope) => envelope,
                    None => {
                        tracing::info!(target: "relay", "all page sessions disconnected");
                        break;
                    }
                },
                _ = shutdown.notified() => break,
            };
            self.dispatch(envelope).await;
        }
        tracing::info!(target: "relay", "relay stopped");
        Ok(())
    }

    async fn dispatch(&self, envelope: Envelope) {
        let Envelope { request, reply } = envelope;
        tracing::debug!(target: "relay", kind = request.kind(), "message received");

        match request {
            RelayRequest::AnalyzeText { text, api_key } => {
                let coordinator = self.coordinator.clone();
                tokio::spawn(async move {
                    let verdict = coordinator.analyze_text(&text, api_key.as_deref()).await;
                    if let Some(reply) = reply {
                        if reply.send(verdict).is_err() {
                            tracing::debug!(target: "relay", "analysis caller went away");
                        }
                    }
                });
            }
            RelayRequest::ToxicMessageDetected { data } => {
                if let Err(err) = self.coordinator.toxic_message_detected(&data).await {
                    tracing::error!(
                        target: "relay",
                        conversation = %data.conversation_id,
                        error = %err,
                        "failed to record toxic message"
                    );
                }
            }
            RelayRequest::ReportMessage { data } => {
                let coordinator = self.coordinator.clone();
                tokio::spawn(async move {
                    coordinator.report_message(&data).await;
                });
            }
        }
    }
}
