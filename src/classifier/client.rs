use async_trait::async_trait;
use reqwest::Client;

use crate::{
    config::ClassifierConfig,
    domain::{preview, Verdict},
};

use super::inference::{
    build_request, parse_verdict, server_error_message, ClassifierError, SERVER_UNREACHABLE,
};

/// Anything that can turn message text into a verdict.
#[async_trait]
pub trait ToxicityClassifier: Send + Sync {
    async fn analyze(&self, text: &str, api_key: Option<&str>) -> Result<Verdict, ClassifierError>;
}

#[derive(Clone)]
pub struct ClassifierClient {
    http: Client,
    config: ClassifierConfig,
}

impl ClassifierClient {
    pub fn new(http: Client, config: ClassifierConfig) -> Self {
        Self { http, config }
    }
}

#[async_trait]
impl ToxicityClassifier for ClassifierClient {
    /// Server failures resolve to a non-toxic verdict carrying the reason. Only an
    /// unreadable success body is returned as an error.
    async fn analyze(&self, text: &str, api_key: Option<&str>) -> Result<Verdict, ClassifierError> {
        if text.trim().is_empty() {
            return Ok(Verdict::safe());
        }

        tracing::debug!(target: "classifier", text = %preview(text), "requesting analysis");

        let mut request = self
            .http
            .post(&self.config.endpoint)
            .json(&build_request(text, api_key));
        if let Some(timeout) = self.config.timeout {
            request = request.timeout(timeout);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) if err.is_connect() || err.is_timeout() => {
                tracing::error!(
                    target: "classifier",
                    error = %err,
                    endpoint = %self.config.endpoint,
                    "classification server unreachable"
                );
                return Ok(Verdict::failed(SERVER_UNREACHABLE));
            }
            Err(err) => {
                tracing::error!(target: "classifier", error = %err, "classification request failed");
                return Ok(Verdict::failed(err.to_string()));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let message = server_error_message(response).await;
            tracing::error!(
                target: "classifier",
                status = status.as_u16(),
                error = %message,
                "classification server returned an error"
            );
            return Ok(Verdict::failed(message));
        }

        let verdict = parse_verdict(response).await?;
        tracing::debug!(
            target: "classifier",
            is_toxic = verdict.is_toxic,
            matches = ?verdict.matches,
            "analysis received"
        );
        Ok(verdict)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    use super::*;

    fn client_for(endpoint: String) -> ClassifierClient {
        ClassifierClient::new(
            Client::new(),
            ClassifierConfig {
                endpoint,
                timeout: Some(Duration::from_secs(5)),
            },
        )
    }

    #[tokio::test]
    async fn blank_text_skips_the_network() {
        let server = MockServer::start().await;
        Mock::given(matchers::any())
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = client_for(format!("{}/analyze", server.uri()));
        for text in ["", "   ", "\n\t "] {
            let verdict = client.analyze(text, Some("key")).await.unwrap();
            assert_eq!(verdict, Verdict::safe());
        }
    }

    #[tokio::test]
    async fn toxic_verdict_is_decoded() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/analyze"))
            .and(matchers::body_json(json!({"text": "you are worthless", "groqKey": "gsk"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "isToxic": true,
                "matches": ["insult", "threat"],
                "suggestions": {"kind": "k", "funny": "f", "professional": "p"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(format!("{}/analyze", server.uri()));
        let verdict = client.analyze("you are worthless", Some("gsk")).await.unwrap();
        assert!(verdict.is_toxic);
        assert_eq!(verdict.matches, vec!["insult", "threat"]);
        assert_eq!(verdict.suggestions.unwrap().funny, "f");
    }

    #[tokio::test]
    async fn loose_model_output_still_flags_the_message() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::body_json(json!({"text": "idiot"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "isToxic": true,
                "matches": ["insult"],
                "suggestions": {"kind": "please be nice"}
            })))
            .mount(&server)
            .await;
        Mock::given(matchers::method("POST"))
            .and(matchers::body_json(json!({"text": "moron"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "isToxic": true,
                "matches": null
            })))
            .mount(&server)
            .await;

        let client = client_for(format!("{}/analyze", server.uri()));

        let partial = client.analyze("idiot", None).await.unwrap();
        assert!(partial.is_toxic);
        let suggestions = partial.suggestions_or_default();
        assert_eq!(suggestions.kind, "please be nice");
        assert_eq!(
            suggestions.funny,
            crate::domain::Suggestions::fallback().funny
        );

        let bare = client.analyze("moron", None).await.unwrap();
        assert!(bare.is_toxic);
        assert!(bare.matches.is_empty());
    }

    #[tokio::test]
    async fn server_error_message_is_surfaced_fail_open() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(
                ResponseTemplate::new(500).set_body_json(json!({"error": "model overloaded"})),
            )
            .mount(&server)
            .await;

        let client = client_for(format!("{}/analyze", server.uri()));
        let verdict = client.analyze("hello", None).await.unwrap();
        assert!(!verdict.is_toxic);
        assert_eq!(verdict.error.as_deref(), Some("model overloaded"));
    }

    #[tokio::test]
    async fn unreachable_server_is_distinguishable() {
        // Nothing listens on the discard port.
        let client = client_for("http://127.0.0.1:9/analyze".to_string());
        let verdict = client.analyze("hello", None).await.unwrap();
        assert!(!verdict.is_toxic);
        assert_eq!(verdict.error.as_deref(), Some(SERVER_UNREACHABLE));
    }

    #[tokio::test]
    async fn malformed_endpoint_is_not_reported_as_a_stopped_server() {
        let client = client_for("http://[::1/analyze".to_string());
        let verdict = client.analyze("hello", None).await.unwrap();
        assert!(!verdict.is_toxic);
        let error = verdict.error.expect("failure reason");
        assert_ne!(error, SERVER_UNREACHABLE);
        assert!(!error.is_empty());
    }

    #[tokio::test]
    async fn unreadable_success_body_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy</html>"))
            .mount(&server)
            .await;

        let client = client_for(format!("{}/analyze", server.uri()));
        let err = client.analyze("hello", None).await.unwrap_err();
        assert!(matches!(err, ClassifierError::Decode(_)));
    }
}
