use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;
use tokio::{task::JoinHandle, time::sleep};

use crate::{
    config::PageConfig,
    db::SettingsStore,
    domain::{preview, ReportRequest, ToxicMessage},
    infrastructure::shutdown::ShutdownListener,
    relay::RelayHandle,
    tasks::debounce::Debouncer,
};

use super::{
    conversation::conversation_id,
    dom::{DomTree, NodeId, TreeEvent},
    injector::{
        flag_message, is_disabled, is_hidden, mark_report_sent, original_text,
        remove_outbound_warning, set_hidden, show_outbound_warning, FlaggedMessage, FLAGGED_ATTR,
    },
    replace::{default_strategies, replace_text, ReplacementStrategy},
    selector::Selector,
};

pub const ANALYZED_ATTR: &str = "data-detoxified";
pub const LISTENER_ATTR: &str = "data-detoxified-listener";
const MESSAGE_ATTR: &str = "data-pre-plain-text";
const OUTGOING_CLASS: &str = "message-out";

pub fn message_selector() -> Selector {
    Selector::attribute(MESSAGE_ATTR)
}

pub fn input_selector() -> Selector {
    Selector::tag("div")
        .and(Selector::attribute_eq("contenteditable", "true"))
        .within(Selector::tag("footer"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageState {
    Unseen,
    Analyzed,
    Flagged { hidden: bool },
}

pub fn message_state(tree: &dyn DomTree, message: NodeId) -> MessageState {
    if tree.attribute(message, FLAGGED_ATTR).is_some() {
        MessageState::Flagged {
            hidden: is_hidden(tree, message),
        }
    } else if tree.attribute(message, ANALYZED_ATTR).is_some() {
        MessageState::Analyzed
    } else {
        MessageState::Unseen
    }
}

/// What a click on an injected button does.
#[derive(Debug, Clone)]
enum Control {
    Report {
        flagged: FlaggedMessage,
        labels: Vec<String>,
    },
    Hide(FlaggedMessage),
    Unhide(FlaggedMessage),
    Rewrite {
        field: NodeId,
        text: String,
    },
}

/// Content-script side of the pipeline for one page.
pub struct PageSession {
    tree: Arc<dyn DomTree>,
    relay: RelayHandle,
    settings: Arc<dyn SettingsStore>,
    config: PageConfig,
    strategies: Vec<Box<dyn ReplacementStrategy>>,
    controls: Mutex<HashMap<NodeId, Control>>,
    drafts: Mutex<HashMap<NodeId, Arc<Debouncer>>>,
}

impl PageSession {
    pub fn new(
        tree: Arc<dyn DomTree>,
        relay: RelayHandle,
        settings: Arc<dyn SettingsStore>,
        config: PageConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            tree,
            relay,
            settings,
            config,
            strategies: default_strategies(),
            controls: Mutex::new(HashMap::new()),
            drafts: Mutex::new(HashMap::new()),
        })
    }

    pub fn tree(&self) -> &dyn DomTree {
        self.tree.as_ref()
    }

    /// Subscribes to the document, scans what is already there and then follows insertions,
    /// input and clicks until shutdown.
    pub fn spawn(self: Arc<Self>, mut shutdown: ShutdownListener) -> JoinHandle<()> {
        let mut events = self.tree.subscribe();
        self.process_new_node(self.tree.root());
        tracing::info!(target: "page", location = %self.tree.location(), "observer started");

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    next = events.recv() => match next {
                        Some(event) => event,
                        None => break,
                    },
                    _ = shutdown.notified() => break,
                };
                self.handle_event(event).await;
            }
            for (_, debouncer) in self.drafts.lock().drain() {
                debouncer.cancel();
            }
            tracing::info!(target: "page", "observer stopped");
        })
    }

    async fn handle_event(self: &Arc<Self>, event: TreeEvent) {
        match event {
            TreeEvent::Inserted(node) => {
                self.process_new_node(node);
            }
            TreeEvent::Input(node) => self.schedule_draft_check(node),
            TreeEvent::Click(node) => self.handle_click(node).await,
        }
    }

    /// Starts analysis of every unseen message under `node` and instruments new input fields.
    ///
    /// Messages are marked before analysis starts, so an element is never analyzed twice.
    pub fn process_new_node(self: &Arc<Self>, node: NodeId) -> Vec<JoinHandle<()>> {
        let tree = self.tree();
        let mut started = Vec::new();

        for message in tree.query_descendants(node, &message_selector()) {
            if tree.attribute(message, ANALYZED_ATTR).is_some() {
                continue;
            }
            let text = original_text(tree, message);
            if text.is_empty() {
                continue;
            }
            tree.set_attribute(message, ANALYZED_ATTR, "true");
            tracing::debug!(target: "page", text = %preview(&text), "new message to analyze");

            let session = self.clone();
            started.push(tokio::spawn(async move {
                session.analyze_message(message, text).await;
            }));
        }

        for field in tree.query_descendants(node, &input_selector()) {
            if tree.attribute(field, LISTENER_ATTR).is_some() {
                continue;
            }
            tree.set_attribute(field, LISTENER_ATTR, "true");
            self.drafts
                .lock()
                .insert(field, Arc::new(Debouncer::new(self.config.debounce)));
            tracing::debug!(target: "page", field, "draft listener attached");
        }

        started
    }

    async fn api_key(&self) -> Option<String> {
        match self.settings.load().await {
            Ok(settings) => settings.api_key(),
            Err(err) => {
                tracing::warn!(target: "page", error = %err, "could not read classification key");
                None
            }
        }
    }

    async fn analyze_message(&self, message: NodeId, text: String) {
        let api_key = self.api_key().await;
        let verdict = self.relay.analyze(&text, api_key).await;
        if let Some(error) = &verdict.error {
            tracing::warn!(target: "page", error = %error, "message left unflagged");
        }
        if !verdict.is_toxic {
            return;
        }

        let tree = self.tree();
        let is_outgoing = tree
            .closest(message, &Selector::class(OUTGOING_CLASS))
            .is_some();
        let flagged = flag_message(tree, message, &verdict.matches);
        {
            let mut controls = self.controls.lock();
            controls.insert(
                flagged.report,
                Control::Report {
                    flagged,
                    labels: verdict.matches.clone(),
                },
            );
            controls.insert(flagged.hide, Control::Hide(flagged));
            controls.insert(flagged.unhide, Control::Unhide(flagged));
        }
        tracing::info!(
            target: "page",
            labels = ?verdict.matches,
            outgoing = is_outgoing,
            "message flagged"
        );

        self.relay.toxic_message_detected(ToxicMessage {
            conversation_id: conversation_id(&tree.location()),
            text,
            labels: verdict.matches,
            is_outgoing,
        });
    }

    fn schedule_draft_check(self: &Arc<Self>, field: NodeId) {
        let Some(debouncer) = self.drafts.lock().get(&field).cloned() else {
            return;
        };
        let session = self.clone();
        debouncer.call(move || async move { session.check_draft(field).await });
    }

    async fn check_draft(&self, field: NodeId) {
        let tree = self.tree();
        let text = tree.text_content(field);
        let api_key = self.api_key().await;
        let verdict = self.relay.analyze(&text, api_key).await;

        self.controls
            .lock()
            .retain(|_, control| !matches!(control, Control::Rewrite { .. }));

        if !verdict.is_toxic {
            remove_outbound_warning(tree);
            return;
        }

        let suggestions = verdict.suggestions_or_default();
        let warning = show_outbound_warning(tree, field, &suggestions);
        let mut controls = self.controls.lock();
        for (button, kind) in warning.buttons {
            controls.insert(
                button,
                Control::Rewrite {
                    field,
                    text: suggestions.get(kind).to_string(),
                },
            );
        }
        tracing::info!(target: "page", draft = %preview(&text), "outbound warning shown");
    }

    fn control_for(&self, node: NodeId) -> Option<Control> {
        let controls = self.controls.lock();
        let mut current = Some(node);
        while let Some(candidate) = current {
            if let Some(control) = controls.get(&candidate) {
                return Some(control.clone());
            }
            current = self.tree.parent(candidate);
        }
        None
    }

    async fn handle_click(self: &Arc<Self>, node: NodeId) {
        let Some(control) = self.control_for(node) else {
            return;
        };
        let tree = self.tree();

        match control {
            Control::Report { flagged, labels } => self.report(&flagged, labels).await,
            Control::Hide(flagged) => set_hidden(tree, &flagged, true),
            Control::Unhide(flagged) => set_hidden(tree, &flagged, false),
            Control::Rewrite { field, text } => {
                let session = self.clone();
                tokio::spawn(async move { session.apply_rewrite(field, text).await });
            }
        }
    }

    /// Sends the report once. Handled inline on the event loop, so a second click always sees
    /// the disabled button.
    async fn report(&self, flagged: &FlaggedMessage, labels: Vec<String>) {
        let tree = self.tree();
        if is_disabled(tree, flagged.report) {
            return;
        }
        if !self.relay.is_connected() {
            tracing::warn!(target: "page", "relay context invalidated; reload the page to report");
            return;
        }

        let settings = match self.settings.load().await {
            Ok(settings) => settings,
            Err(err) => {
                tracing::error!(target: "page", error = %err, "could not read trusted contacts");
                return;
            }
        };
        if !settings.has_trusted_contact() {
            tracing::warn!(target: "page", "set up a trusted contact before reporting");
            return;
        }

        let request = ReportRequest {
            text: original_text(tree, flagged.message),
            conversation_id: conversation_id(&tree.location()),
            labels,
        };
        if self.relay.report(request) {
            mark_report_sent(tree, flagged.report);
            tracing::info!(target: "page", "report sent to trusted contacts");
        }
    }

    async fn apply_rewrite(&self, field: NodeId, text: String) {
        let tree = self.tree();
        let field = tree
            .query_first(tree.root(), &input_selector())
            .unwrap_or(field);

        tree.focus(field);
        sleep(self.config.settle_delay).await;

        match replace_text(tree, field, &text, &self.strategies, self.config.settle_delay).await {
            Some(strategy) => {
                tracing::info!(target: "page", strategy, "draft replaced with suggestion");
            }
            None => tracing::error!(target: "page", "draft replacement failed"),
        }

        remove_outbound_warning(tree);
        self.controls
            .lock()
            .retain(|_, control| !matches!(control, Control::Rewrite { .. }));
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;
    use crate::{
        db::settings::testing::FixedSettings,
        domain::{RelayRequest, Settings, SuggestionKind, Verdict},
        feed::ChatLayout,
        infrastructure::shutdown::Shutdown,
        page::{injector::OUTBOUND_WARNING_ID, MemoryDocument},
        relay::{channel, Envelope},
    };

    type Requests = Arc<Mutex<Vec<RelayRequest>>>;

    fn classify(text: &str) -> Verdict {
        let lowered = text.to_lowercase();
        if lowered.contains("worthless") {
            Verdict::toxic(vec!["insult".into(), "threat".into()])
        } else if lowered.contains("idiot") {
            Verdict::toxic(vec!["insult".into()])
        } else {
            Verdict::safe()
        }
    }

    fn answer(mut inbox: UnboundedReceiver<Envelope>, requests: Requests) {
        tokio::spawn(async move {
            while let Some(Envelope { request, reply }) = inbox.recv().await {
                if let (RelayRequest::AnalyzeText { text, .. }, Some(reply)) = (&request, reply) {
                    let _ = reply.send(classify(text));
                }
                requests.lock().push(request);
            }
        });
    }

    struct Harness {
        doc: Arc<MemoryDocument>,
        layout: ChatLayout,
        session: Arc<PageSession>,
        requests: Requests,
        shutdown: Shutdown,
        task: JoinHandle<()>,
    }

    impl Harness {
        fn start(settings: Settings) -> Self {
            let doc = Arc::new(MemoryDocument::new("https://web.whatsapp.com/send?phone=15550109999"));
            let layout = ChatLayout::build(&doc);
            let (relay, inbox) = channel();
            let requests = Requests::default();
            answer(inbox, requests.clone());

            let session = PageSession::new(
                doc.clone(),
                relay,
                Arc::new(FixedSettings::new(settings)),
                PageConfig::new("https://web.whatsapp.com/"),
            );
            let shutdown = Shutdown::new();
            let task = session.clone().spawn(shutdown.subscribe());
            Self {
                doc,
                layout,
                session,
                requests,
                shutdown,
                task,
            }
        }

        fn analyze_count(&self) -> usize {
            self.requests
                .lock()
                .iter()
                .filter(|r| matches!(r, RelayRequest::AnalyzeText { .. }))
                .count()
        }

        fn reports(&self) -> Vec<ReportRequest> {
            self.requests
                .lock()
                .iter()
                .filter_map(|r| match r {
                    RelayRequest::ReportMessage { data } => Some(data.clone()),
                    _ => None,
                })
                .collect()
        }

        async fn stop(self) {
            self.shutdown.trigger();
            self.task.await.unwrap();
        }
    }

    async fn settle() {
        sleep(Duration::from_millis(5)).await;
    }

    fn buttons(doc: &MemoryDocument, message: NodeId, class: &str) -> Vec<NodeId> {
        doc.query_descendants(message, &Selector::tag("button").and(Selector::class(class)))
    }

    #[tokio::test(start_paused = true)]
    async fn element_is_analyzed_only_once() {
        let h = Harness::start(Settings::default());
        let message = h.layout.incoming(&h.doc, "Sam", "hello there");
        settle().await;

        h.session.process_new_node(message);
        h.doc.append_child(h.layout.panel, message);
        settle().await;

        assert_eq!(h.analyze_count(), 1);
        assert_eq!(message_state(h.doc.as_ref(), message), MessageState::Analyzed);
        h.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn toxic_message_renders_controls_and_notifies_relay() {
        let h = Harness::start(Settings::default());
        let message = h.layout.incoming(&h.doc, "Sam", "you are worthless");
        settle().await;

        assert_eq!(
            message_state(h.doc.as_ref(), message),
            MessageState::Flagged { hidden: false }
        );
        let badge = h
            .doc
            .query_first(message, &Selector::class("detoxify-badge"))
            .unwrap();
        let badge = h.doc.text_content(badge);
        assert!(badge.contains("insult") && badge.contains("threat"));
        assert_eq!(buttons(&h.doc, message, "report-btn").len(), 1);
        assert_eq!(buttons(&h.doc, message, "hide-btn").len(), 1);
        let unhide = buttons(&h.doc, message, "unhide-btn");
        assert_eq!(unhide.len(), 1);
        assert_eq!(h.doc.style(unhide[0], "display").as_deref(), Some("none"));

        let detected: Vec<ToxicMessage> = h
            .requests
            .lock()
            .iter()
            .filter_map(|r| match r {
                RelayRequest::ToxicMessageDetected { data } => Some(data.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(detected.len(), 1);
        assert_eq!(detected[0].conversation_id, "15550109999");
        assert_eq!(detected[0].text, "you are worthless");
        assert!(!detected[0].is_outgoing);
        h.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn outgoing_messages_are_tagged() {
        let h = Harness::start(Settings::default());
        h.layout.outgoing(&h.doc, "you idiot");
        settle().await;

        let outgoing = h.requests.lock().iter().any(|r| {
            matches!(r, RelayRequest::ToxicMessageDetected { data } if data.is_outgoing)
        });
        assert!(outgoing);
        h.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn report_is_sent_once() {
        let h = Harness::start(Settings {
            trusted_email: "guardian@example.org".into(),
            ..Settings::default()
        });
        let message = h.layout.incoming(&h.doc, "Sam", "you are worthless");
        settle().await;

        let report = buttons(&h.doc, message, "report-btn")[0];
        h.doc.click(report);
        h.doc.click(report);
        settle().await;

        let reports = h.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].text, "you are worthless");
        assert_eq!(reports[0].labels, vec!["insult", "threat"]);
        assert!(is_disabled(h.doc.as_ref(), report));
        h.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn report_without_trusted_contact_is_a_no_op() {
        let h = Harness::start(Settings::default());
        let message = h.layout.incoming(&h.doc, "Sam", "you are worthless");
        settle().await;

        let report = buttons(&h.doc, message, "report-btn")[0];
        h.doc.click(report);
        settle().await;

        assert!(h.reports().is_empty());
        assert!(!is_disabled(h.doc.as_ref(), report));
        h.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn hide_and_unhide_keep_text() {
        let h = Harness::start(Settings::default());
        let message = h.layout.incoming(&h.doc, "Sam", "you are worthless");
        settle().await;
        let before = h.doc.text_content(message);

        h.doc.click(buttons(&h.doc, message, "hide-btn")[0]);
        settle().await;
        assert_eq!(
            message_state(h.doc.as_ref(), message),
            MessageState::Flagged { hidden: true }
        );

        h.doc.click(buttons(&h.doc, message, "unhide-btn")[0]);
        settle().await;
        assert_eq!(
            message_state(h.doc.as_ref(), message),
            MessageState::Flagged { hidden: false }
        );
        assert_eq!(h.doc.text_content(message), before);
        h.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn draft_checks_are_debounced_and_rewrites_apply() {
        let h = Harness::start(Settings::default());
        let field = h.layout.field;

        h.doc.type_text(field, "you");
        sleep(Duration::from_millis(400)).await;
        h.doc.type_text(field, "you idiot");
        sleep(Duration::from_millis(900)).await;
        assert_eq!(h.analyze_count(), 0);

        sleep(Duration::from_millis(200)).await;
        assert_eq!(h.analyze_count(), 1);
        let warning = h.doc.element_by_id(OUTBOUND_WARNING_ID).unwrap();
        assert!(h.doc.contains(warning));

        let kind = h
            .doc
            .element_by_id(&format!("detoxify-replace-btn-{}", SuggestionKind::Kind))
            .unwrap();
        assert_eq!(h.doc.focused(), None);
        h.doc.click(kind);
        sleep(Duration::from_millis(200)).await;

        let fallback = crate::domain::Suggestions::fallback();
        assert_eq!(h.doc.focused(), Some(field));
        assert_eq!(h.doc.text_content(field), fallback.kind);
        assert!(h.doc.element_by_id(OUTBOUND_WARNING_ID).is_none());
        h.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn invalidated_relay_leaves_messages_unflagged() {
        let doc = Arc::new(MemoryDocument::new("https://web.whatsapp.com/"));
        let layout = ChatLayout::build(&doc);
        let (relay, inbox) = channel();
        drop(inbox);

        let session = PageSession::new(
            doc.clone(),
            relay,
            Arc::new(FixedSettings::default()),
            PageConfig::new("https://web.whatsapp.com/"),
        );
        let message = layout.incoming(&doc, "Sam", "you are worthless");
        for handle in session.process_new_node(message) {
            handle.await.unwrap();
        }
        assert_eq!(message_state(doc.as_ref(), message), MessageState::Analyzed);
    }
}
