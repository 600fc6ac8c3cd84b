use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::Verdict;

/// Error text for "could not classify" as opposed to "classified as safe".
pub const SERVER_UNREACHABLE: &str =
    "Detoxify server is not running. Please start the classification server.";
const SERVER_REQUEST_FAILED: &str = "Server request failed";

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("classifier returned an unreadable response: {0}")]
    Decode(#[source] reqwest::Error),
}

pub fn build_request(text: &str, api_key: Option<&str>) -> AnalyzeRequest {
    AnalyzeRequest {
        text: text.to_string(),
        groq_key: api_key
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(str::to_string),
    }
}

pub async fn parse_verdict(response: Response) -> Result<Verdict, ClassifierError> {
    response.json::<Verdict>().await.map_err(ClassifierError::Decode)
}

/// Extracts the server's `error` message from a non-success response.
pub async fn server_error_message(response: Response) -> String {
    let status = response.status();
    match response.json::<ErrorBody>().await {
        Ok(ErrorBody { error: Some(message) }) if !message.trim().is_empty() => message,
        _ => fallback_error(status),
    }
}

fn fallback_error(status: StatusCode) -> String {
    format!("{SERVER_REQUEST_FAILED} ({status})")
}

#[derive(Debug, Serialize)]
pub struct AnalyzeRequest {
    pub text: String,
    #[serde(rename = "groqKey", skip_serializing_if = "Option::is_none")]
    pub groq_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn request_body_matches_server_contract() {
        let request = build_request("you are worthless", Some("gsk_123"));
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"text": "you are worthless", "groqKey": "gsk_123"})
        );
    }

    #[test]
    fn blank_api_key_is_omitted() {
        let request = build_request("hello", Some("   "));
        assert_eq!(serde_json::to_value(&request).unwrap(), json!({"text": "hello"}));
    }

    #[test]
    fn fallback_error_mentions_status() {
        assert_eq!(
            fallback_error(StatusCode::BAD_GATEWAY),
            "Server request failed (502 Bad Gateway)"
        );
    }
}
