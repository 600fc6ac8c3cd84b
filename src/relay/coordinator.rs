use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tokio::sync::mpsc::UnboundedSender;

use crate::{
    classifier::ToxicityClassifier,
    db::{ConversationStore, SettingsStore},
    domain::{
        preview, settings::DEFAULT_ALERT_THRESHOLD, AlertRequest, PageCommand, ReportRequest,
        Settings, ToxicMessage, Verdict,
    },
    infrastructure::notifier::{Notification, Notifier},
};

use super::{email::EmailReporter, DispatchOutcome};

/// Background side of the pipeline: classification, counters, notifications and reports.
pub struct Coordinator {
    classifier: Arc<dyn ToxicityClassifier>,
    settings: Arc<dyn SettingsStore>,
    conversations: Arc<dyn ConversationStore>,
    notifier: Arc<dyn Notifier>,
    email: EmailReporter,
    page: UnboundedSender<PageCommand>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToxicOutcome {
    pub blocked_total: Option<u64>,
    pub conversation_count: u32,
    pub notified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportOutcome {
    pub email: DispatchOutcome,
    pub alert: DispatchOutcome,
}

impl Coordinator {
    pub fn new(
        classifier: Arc<dyn ToxicityClassifier>,
        settings: Arc<dyn SettingsStore>,
        conversations: Arc<dyn ConversationStore>,
        notifier: Arc<dyn Notifier>,
        email: EmailReporter,
        page: UnboundedSender<PageCommand>,
    ) -> Self {
        Self {
            classifier,
            settings,
            conversations,
            notifier,
            email,
            page,
        }
    }

    /// `ANALYZE_TEXT`. Never fails: classifier errors become a non-toxic verdict.
    pub async fn analyze_text(&self, text: &str, api_key: Option<&str>) -> Verdict {
        tracing::debug!(target: "relay", text = %preview(text), "analysis requested");
        match self.classifier.analyze(text, api_key).await {
            Ok(verdict) => verdict,
            Err(err) => {
                tracing::error!(target: "relay", error = %err, "analysis failed");
                Verdict::failed(err.to_string())
            }
        }
    }

    /// `TOXIC_MESSAGE_DETECTED`. Notifies exactly when the conversation count reaches the
    /// threshold; later flags in the same conversation stay silent.
    pub async fn toxic_message_detected(&self, data: &ToxicMessage) -> Result<ToxicOutcome> {
        let threshold = match self.settings.load().await {
            Ok(settings) => settings.alert_threshold,
            Err(err) => {
                tracing::warn!(
                    target: "relay",
                    error = %err,
                    "settings unavailable; using default alert threshold"
                );
                DEFAULT_ALERT_THRESHOLD
            }
        };

        let blocked_total = match self.settings.increment_blocked().await {
            Ok(total) => Some(total),
            Err(err) => {
                tracing::error!(target: "relay", error = %err, "failed to persist blocked count");
                None
            }
        };

        let state = self
            .conversations
            .record_flag(&data.conversation_id, Utc::now())
            .await?;

        tracing::info!(
            target: "relay",
            conversation = %data.conversation_id,
            count = state.count,
            threshold,
            outgoing = data.is_outgoing,
            labels = ?data.labels,
            "toxic message recorded"
        );

        let notified = state.count == threshold;
        if notified {
            self.notifier
                .notify(Notification::threshold_reached(threshold))
                .await;
        }

        Ok(ToxicOutcome {
            blocked_total,
            conversation_count: state.count,
            notified,
        })
    }

    /// `REPORT_MESSAGE`. Email and messaging alert are attempted independently.
    pub async fn report_message(&self, data: &ReportRequest) -> ReportOutcome {
        let settings = match self.settings.load().await {
            Ok(settings) => settings,
            Err(err) => {
                tracing::error!(target: "relay", error = %err, "cannot report without settings");
                let reason = format!("settings unavailable: {err}");
                return ReportOutcome {
                    email: DispatchOutcome::Failed(reason.clone()),
                    alert: DispatchOutcome::Failed(reason),
                };
            }
        };

        let (email, alert) = futures::join!(self.email.send(data, &settings), async {
            self.request_alert(data, &settings)
        });

        tracing::info!(
            target: "relay",
            conversation = %data.conversation_id,
            email = ?email,
            alert = ?alert,
            "report handled"
        );
        ReportOutcome { email, alert }
    }

    fn request_alert(&self, data: &ReportRequest, settings: &Settings) -> DispatchOutcome {
        let phone = settings.trusted_phone.trim();
        if phone.is_empty() {
            tracing::warn!(target: "relay", "no trusted messaging number configured");
            return DispatchOutcome::Skipped("no trusted phone configured".to_string());
        }

        let command = PageCommand::SendWhatsappAlert {
            data: AlertRequest {
                phone: phone.to_string(),
                text: data.text.clone(),
                labels: data.labels.clone(),
                conversation_id: data.conversation_id.clone(),
            },
        };
        match self.page.send(command) {
            Ok(()) => DispatchOutcome::Sent,
            Err(_) => {
                tracing::warn!(target: "relay", "page context gone; alert not opened");
                DispatchOutcome::Failed("page context closed".to_string())
            }
        }
    }
}

#[cfg(test)]
pub mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::classifier::ClassifierError;

    use super::*;

    /// Classifier answering from a fixed verdict and counting calls.
    pub struct ScriptedClassifier {
        verdict: Verdict,
        calls: AtomicUsize,
    }

    impl ScriptedClassifier {
        pub fn new(verdict: Verdict) -> Self {
            Self {
                verdict,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ToxicityClassifier for ScriptedClassifier {
        async fn analyze(
            &self,
            _text: &str,
            _api_key: Option<&str>,
        ) -> Result<Verdict, ClassifierError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.verdict.clone())
        }
    }
}
