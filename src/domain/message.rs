use serde::{Deserialize, Serialize};

/// Messages the page context sends to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelayRequest {
    AnalyzeText {
        text: String,
        #[serde(rename = "groqKey", default, skip_serializing_if = "Option::is_none")]
        api_key: Option<String>,
    },
    ToxicMessageDetected {
        data: ToxicMessage,
    },
    ReportMessage {
        data: ReportRequest,
    },
}

impl RelayRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            RelayRequest::AnalyzeText { .. } => "ANALYZE_TEXT",
            RelayRequest::ToxicMessageDetected { .. } => "TOXIC_MESSAGE_DETECTED",
            RelayRequest::ReportMessage { .. } => "REPORT_MESSAGE",
        }
    }
}

/// Messages the relay sends back to the page context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PageCommand {
    SendWhatsappAlert { data: AlertRequest },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToxicMessage {
    pub conversation_id: String,
    pub text: String,
    pub labels: Vec<String>,
    pub is_outgoing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    pub text: String,
    pub conversation_id: String,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRequest {
    pub phone: String,
    pub text: String,
    pub labels: Vec<String>,
    pub conversation_id: String,
}

/// Short prefix of a message for log lines.
pub fn preview(text: &str) -> String {
    const PREVIEW_CHARS: usize = 20;
    let mut out: String = text.chars().take(PREVIEW_CHARS).collect();
    if text.chars().nth(PREVIEW_CHARS).is_some() {
        out.push_str("...");
    }
    out
}
