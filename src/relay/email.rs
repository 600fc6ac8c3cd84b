use reqwest::Client;
use serde::Serialize;

use crate::{
    config::EmailConfig,
    domain::{settings::is_valid_email, ReportRequest, Settings},
};

use super::DispatchOutcome;

const REPORT_TITLE: &str = "🚨 DETOXIFY: TOXICITY REPORT GENERATED";
const SENDER_NAME: &str = "Detoxify Guard System";

/// Sends manual reports to the trusted email through an EmailJS-style endpoint.
#[derive(Clone)]
pub struct EmailReporter {
    http: Client,
    config: EmailConfig,
}

impl EmailReporter {
    pub fn new(http: Client, config: EmailConfig) -> Self {
        Self { http, config }
    }

    pub async fn send(&self, report: &ReportRequest, settings: &Settings) -> DispatchOutcome {
        if !is_valid_email(settings.trusted_email.trim()) {
            tracing::warn!(
                target: "relay",
                "invalid or missing trusted email address; skipping email report"
            );
            return DispatchOutcome::Skipped("invalid or missing trusted email".to_string());
        }

        let payload = build_payload(report, settings);
        tracing::info!(
            target: "relay",
            conversation = %report.conversation_id,
            labels = %payload.template_params.toxicity_labels,
            "sending email report"
        );

        let response = match self.http.post(&self.config.endpoint).json(&payload).send().await {
            Ok(response) => response,
            Err(err) => {
                tracing::error!(target: "relay", error = %err, "failed to send email report");
                return DispatchOutcome::Failed(err.to_string());
            }
        };

        let status = response.status();
        if status.is_success() {
            tracing::info!(target: "relay", "email report sent");
            return DispatchOutcome::Sent;
        }

        let body = response.text().await.unwrap_or_default();
        tracing::error!(
            target: "relay",
            status = status.as_u16(),
            body = %body,
            "email service rejected the report"
        );
        DispatchOutcome::Failed(format!("{status}: {body}"))
    }
}

#[derive(Debug, Serialize)]
pub struct EmailPayload {
    pub service_id: String,
    pub template_id: String,
    pub user_id: String,
    pub template_params: TemplateParams,
}

#[derive(Debug, Serialize)]
pub struct TemplateParams {
    #[serde(rename = "trustedEmail")]
    pub trusted_email: String,
    pub message: String,
    pub title: String,
    pub name: String,
    pub toxicity_labels: String,
}

pub fn build_payload(report: &ReportRequest, settings: &Settings) -> EmailPayload {
    let labels = report.labels.join(", ");
    let conversation = if report.conversation_id.is_empty() {
        "Private Chat"
    } else {
        report.conversation_id.as_str()
    };
    let flags = if labels.is_empty() {
        "General Warning"
    } else {
        labels.as_str()
    };

    let message = format!(
        "A toxic message was detected and flagged on WhatsApp Web.\n\n\
         DETAILS:\n\
         - Conversation: {conversation}\n\
         - Toxicity Flags: {flags}\n\
         - Message Content: \"{text}\"\n\n\
         Please check in with the user if this behavior persists.",
        text = report.text
    );

    EmailPayload {
        service_id: settings.email_service_id.clone(),
        template_id: settings.email_template_id.clone(),
        user_id: settings.emailjs_key.clone(),
        template_params: TemplateParams {
            trusted_email: settings.trusted_email.trim().to_string(),
            message,
            title: REPORT_TITLE.to_string(),
            name: SENDER_NAME.to_string(),
            toxicity_labels: labels,
        },
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    use super::*;

    fn report() -> ReportRequest {
        ReportRequest {
            text: "you are worthless".into(),
            conversation_id: "15550109999".into(),
            labels: vec!["insult".into(), "threat".into()],
        }
    }

    fn settings(email: &str) -> Settings {
        Settings {
            trusted_email: email.into(),
            email_service_id: "service_1".into(),
            email_template_id: "template_1".into(),
            emailjs_key: "public_1".into(),
            ..Settings::default()
        }
    }

    #[test]
    fn payload_embeds_conversation_labels_and_text() {
        let payload = build_payload(&report(), &settings("guardian@example.org"));
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["service_id"], "service_1");
        assert_eq!(value["user_id"], "public_1");
        assert_eq!(value["template_params"]["trustedEmail"], "guardian@example.org");
        assert_eq!(value["template_params"]["toxicity_labels"], "insult, threat");
        let message = value["template_params"]["message"].as_str().unwrap();
        assert!(message.contains("- Conversation: 15550109999"));
        assert!(message.contains("\"you are worthless\""));
    }

    #[test]
    fn empty_fields_use_placeholders() {
        let mut bare = report();
        bare.conversation_id.clear();
        bare.labels.clear();
        let payload = build_payload(&bare, &settings("guardian@example.org"));
        assert!(payload.template_params.message.contains("Private Chat"));
        assert!(payload.template_params.message.contains("General Warning"));
    }

    #[tokio::test]
    async fn invalid_email_never_reaches_the_network() {
        let server = MockServer::start().await;
        Mock::given(matchers::any())
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let reporter = EmailReporter::new(
            Client::new(),
            EmailConfig {
                endpoint: format!("{}/api/v1.0/email/send", server.uri()),
            },
        );
        let outcome = reporter.send(&report(), &settings("not-an-email")).await;
        assert!(matches!(outcome, DispatchOutcome::Skipped(_)));
    }

    #[tokio::test]
    async fn rejected_report_is_a_failure() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/api/v1.0/email/send"))
            .and(matchers::body_partial_json(json!({"template_id": "template_1"})))
            .respond_with(ResponseTemplate::new(400).set_body_string("The user ID is invalid"))
            .expect(1)
            .mount(&server)
            .await;

        let reporter = EmailReporter::new(
            Client::new(),
            EmailConfig {
                endpoint: format!("{}/api/v1.0/email/send", server.uri()),
            },
        );
        let outcome = reporter.send(&report(), &settings("guardian@example.org")).await;
        assert_eq!(
            outcome,
            DispatchOutcome::Failed("400 Bad Request: The user ID is invalid".to_string())
        );
    }
}
