use tokio::sync::{mpsc, oneshot};

use crate::domain::{preview, RelayRequest, ReportRequest, ToxicMessage, Verdict};

/// One request on its way to the relay, with a reply slot for requests that expect one.
#[derive(Debug)]
pub struct Envelope {
    pub request: RelayRequest,
    pub reply: Option<oneshot::Sender<Verdict>>,
}

/// Page-side end of the page ↔ relay channel.
///
/// A closed channel means the relay is gone (the extension context was invalidated). Calls
/// then resolve to a non-toxic default instead of failing.
#[derive(Clone)]
pub struct RelayHandle {
    sender: mpsc::UnboundedSender<Envelope>,
}

pub fn channel() -> (RelayHandle, mpsc::UnboundedReceiver<Envelope>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (RelayHandle { sender }, receiver)
}

impl RelayHandle {
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }

    pub async fn analyze(&self, text: &str, api_key: Option<String>) -> Verdict {
        if !self.is_connected() {
            tracing::warn!(target: "page", "relay context invalidated; reload the page");
            return Verdict::safe();
        }

        let (reply, response) = oneshot::channel();
        let envelope = Envelope {
            request: RelayRequest::AnalyzeText {
                text: text.to_string(),
                api_key,
            },
            reply: Some(reply),
        };
        if self.sender.send(envelope).is_err() {
            tracing::warn!(target: "page", "analysis request could not be delivered");
            return Verdict::safe();
        }

        match response.await {
            Ok(verdict) => verdict,
            Err(_) => {
                tracing::warn!(
                    target: "page",
                    text = %preview(text),
                    "relay dropped the analysis request"
                );
                Verdict::safe()
            }
        }
    }

    pub fn toxic_message_detected(&self, data: ToxicMessage) -> bool {
        self.post(RelayRequest::ToxicMessageDetected { data })
    }

    pub fn report(&self, data: ReportRequest) -> bool {
        self.post(RelayRequest::ReportMessage { data })
    }

    fn post(&self, request: RelayRequest) -> bool {
        let kind = request.kind();
        let delivered = self
            .sender
            .send(Envelope {
                request,
                reply: None,
            })
            .is_ok();
        if !delivered {
            tracing::warn!(target: "page", kind, "relay context invalidated; message dropped");
        }
        delivered
    }
}
