use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, bail, Context, Result};
use chrono::Local;
use serde::Deserialize;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt},
    time::sleep,
};
use url::Url;

use crate::{
    domain::SuggestionKind,
    infrastructure::shutdown::ShutdownListener,
    page::{dom::NodeId, selector::Selector, DomTree, MemoryDocument},
};

/// One line of the chat feed read from stdin.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum FeedEvent {
    Incoming {
        text: String,
        #[serde(default)]
        sender: Option<String>,
    },
    Outgoing {
        text: String,
    },
    Draft {
        text: String,
    },
    Navigate {
        url: String,
    },
    Report {
        message: usize,
    },
    Hide {
        message: usize,
    },
    Unhide {
        message: usize,
    },
    Suggestion {
        style: SuggestionKind,
    },
    /// The compose view finished loading, pre-filled from the deep link unless `text` is given.
    Compose {
        #[serde(default)]
        text: Option<String>,
    },
    Wait {
        ms: u64,
    },
}

/// Skeleton of a chat page: a message panel and the footer compose box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatLayout {
    pub panel: NodeId,
    pub field: NodeId,
    compose: NodeId,
}

impl ChatLayout {
    pub fn build(doc: &MemoryDocument) -> Self {
        let app = doc.element("div", &[("id", "app")]);
        let main = doc.element("div", &[("id", "main")]);
        let panel = doc.element("div", &[("class", "conversation-panel")]);
        let footer = doc.element("footer", &[]);
        let wrapper = doc.element("div", &[("class", "compose")]);
        let row = doc.element("div", &[]);
        let field = doc.element("div", &[("contenteditable", "true"), ("role", "textbox")]);

        doc.append_child(row, field);
        doc.append_child(wrapper, row);
        doc.append_child(footer, wrapper);
        doc.append_child(main, panel);
        doc.append_child(main, footer);
        doc.append_child(app, main);
        doc.append_child(doc.root(), app);

        Self {
            panel,
            field,
            compose: row,
        }
    }

    /// Returns the compose row's send button, rendering it on first use.
    pub fn send_button(&self, doc: &MemoryDocument) -> NodeId {
        let icon = Selector::tag("span").and(Selector::attribute_eq("data-icon", "send"));
        if let Some(button) = doc
            .query_first(self.compose, &icon)
            .and_then(|span| doc.closest(span, &Selector::tag("button")))
        {
            return button;
        }

        let button = doc.element("button", &[("aria-label", "Send")]);
        let span = doc.element("span", &[("data-icon", "send")]);
        doc.append_child(button, span);
        doc.append_child(self.compose, button);
        button
    }

    /// Appends a received message and returns its text element.
    pub fn incoming(&self, doc: &MemoryDocument, sender: &str, text: &str) -> NodeId {
        self.push_message(doc, "message-in", sender, text)
    }

    pub fn outgoing(&self, doc: &MemoryDocument, text: &str) -> NodeId {
        self.push_message(doc, "message-out", "You", text)
    }

    fn push_message(&self, doc: &MemoryDocument, class: &str, sender: &str, text: &str) -> NodeId {
        let stamp = Local::now().format("%H:%M, %-m/%-d/%Y");
        let row = doc.element("div", &[("class", class)]);
        let meta = format!("[{stamp}] {sender}: ");
        let message = doc.element("div", &[("data-pre-plain-text", meta.as_str())]);
        let body = doc.element("span", &[("class", "selectable-text")]);
        doc.set_text(body, text);
        doc.append_child(message, body);
        doc.append_child(row, message);
        doc.append_child(self.panel, row);
        message
    }
}

fn prefilled_text(location: &str) -> Option<String> {
    let url = Url::parse(location).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == "text")
        .map(|(_, text)| text.into_owned())
}

/// Drives a [`MemoryDocument`] from feed events, standing in for the live chat page.
pub struct ChatFeed {
    doc: Arc<MemoryDocument>,
    layout: ChatLayout,
    messages: Vec<NodeId>,
    drain: Duration,
}

impl ChatFeed {
    pub fn new(doc: Arc<MemoryDocument>, drain: Duration) -> Self {
        let layout = ChatLayout::build(&doc);
        Self {
            doc,
            layout,
            messages: Vec::new(),
            drain,
        }
    }

    pub fn messages(&self) -> &[NodeId] {
        &self.messages
    }

    pub async fn apply(&mut self, event: FeedEvent) -> Result<()> {
        match event {
            FeedEvent::Incoming { text, sender } => {
                let sender = sender.as_deref().unwrap_or("Contact");
                let message = self.layout.incoming(&self.doc, sender, &text);
                self.messages.push(message);
            }
            FeedEvent::Outgoing { text } => {
                let message = self.layout.outgoing(&self.doc, &text);
                self.messages.push(message);
            }
            FeedEvent::Draft { text } => self.doc.type_text(self.layout.field, &text),
            FeedEvent::Navigate { url } => self.doc.set_location(url),
            FeedEvent::Report { message } => self.click_control(message, "report-btn")?,
            FeedEvent::Hide { message } => self.click_control(message, "hide-btn")?,
            FeedEvent::Unhide { message } => self.click_control(message, "unhide-btn")?,
            FeedEvent::Suggestion { style } => {
                let id = format!("detoxify-replace-btn-{style}");
                let button = self
                    .doc
                    .element_by_id(&id)
                    .ok_or_else(|| anyhow!("no outbound warning is showing"))?;
                self.doc.click(button);
            }
            FeedEvent::Compose { text } => {
                let text = text.or_else(|| prefilled_text(&self.doc.location()));
                if let Some(text) = text.filter(|text| !text.is_empty()) {
                    self.doc.set_text(self.layout.field, &text);
                }
                self.layout.send_button(&self.doc);
            }
            FeedEvent::Wait { ms } => sleep(Duration::from_millis(ms)).await,
        }
        Ok(())
    }

    fn click_control(&self, index: usize, class: &str) -> Result<()> {
        let Some(&message) = self.messages.get(index) else {
            bail!("message {index} does not exist");
        };
        let selector = Selector::tag("button").and(Selector::class(class));
        let button = self
            .doc
            .query_first(message, &selector)
            .ok_or_else(|| anyhow!("message {index} has no {class} control"))?;
        self.doc.click(button);
        Ok(())
    }

    /// Reads JSON lines until EOF or shutdown. Bad lines are logged and skipped.
    ///
    /// After EOF the feed waits for the drain period so in-flight analysis can finish.
    pub async fn run<R>(&mut self, reader: R, shutdown: &mut ShutdownListener) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        loop {
            let line = tokio::select! {
                line = lines.next_line() => line.context("failed to read chat feed")?,
                _ = shutdown.notified() => return Ok(()),
            };
            let Some(line) = line else {
                break;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let event = match serde_json::from_str::<FeedEvent>(line) {
                Ok(event) => event,
                Err(err) => {
                    tracing::warn!(target: "feed", error = %err, line, "skipping malformed feed line");
                    continue;
                }
            };
            tracing::debug!(target: "feed", ?event, "feed event");
            if let Err(err) = self.apply(event).await {
                tracing::warn!(target: "feed", error = %err, "feed event could not be applied");
            }
        }

        tracing::info!(
            target: "feed",
            messages = self.messages.len(),
            "chat feed ended; draining"
        );
        tokio::select! {
            _ = sleep(self.drain) => {}
            _ = shutdown.notified() => {}
        }
        Ok(())
    }
}
