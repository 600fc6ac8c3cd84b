use std::collections::BTreeMap;

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::{
    dom::{DomTree, NodeId, SyntheticEvent, TreeEvent},
    selector::{ElementView, Selector},
};

const ROOT: NodeId = 0;

/// How an editable field reacts to synthetic editing events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditorBehavior {
    pub accepts_paste: bool,
    pub accepts_insert_text: bool,
}

impl Default for EditorBehavior {
    fn default() -> Self {
        Self {
            accepts_paste: true,
            accepts_insert_text: true,
        }
    }
}

#[derive(Debug)]
enum NodeKind {
    Element(String),
    Text(String),
}

#[derive(Debug)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    attributes: BTreeMap<String, String>,
    style: BTreeMap<String, String>,
    behavior: EditorBehavior,
}

impl Node {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
            attributes: BTreeMap::new(),
            style: BTreeMap::new(),
            behavior: EditorBehavior::default(),
        }
    }
}

struct Inner {
    nodes: Vec<Node>,
    location: String,
    focused: Option<NodeId>,
    closed: bool,
    subscribers: Vec<UnboundedSender<TreeEvent>>,
    /// Text nodes orphaned by content replacement, reused before the arena grows.
    spare_text: Vec<NodeId>,
    #[cfg(test)]
    dispatched: Vec<(NodeId, SyntheticEvent)>,
}

impl ElementView for Inner {
    fn tag_name(&self, node: NodeId) -> Option<&str> {
        match &self.nodes.get(node)?.kind {
            NodeKind::Element(tag) => Some(tag.as_str()),
            NodeKind::Text(_) => None,
        }
    }

    fn attribute_value(&self, node: NodeId, name: &str) -> Option<&str> {
        self.nodes.get(node)?.attributes.get(name).map(String::as_str)
    }

    fn parent_node(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node)?.parent
    }
}

impl Inner {
    fn push(&mut self, kind: NodeKind) -> NodeId {
        self.nodes.push(Node::new(kind));
        self.nodes.len() - 1
    }

    fn is_attached(&self, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ROOT {
                return true;
            }
            current = self.nodes.get(id).and_then(|n| n.parent);
        }
        false
    }

    fn is_self_or_ancestor(&self, candidate: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == candidate {
                return true;
            }
            current = self.nodes.get(id).and_then(|n| n.parent);
        }
        false
    }

    fn detach(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes.get(node).and_then(|n| n.parent) {
            self.nodes[parent].children.retain(|c| *c != node);
            self.nodes[node].parent = None;
        }
    }

    fn insert(&mut self, parent: NodeId, child: NodeId, at_start: bool) {
        if parent >= self.nodes.len() || child >= self.nodes.len() || child == ROOT {
            return;
        }
        if self.is_self_or_ancestor(child, parent) {
            return;
        }
        self.detach(child);
        let children = &mut self.nodes[parent].children;
        if at_start {
            children.insert(0, child);
        } else {
            children.push(child);
        }
        self.nodes[child].parent = Some(parent);
        if self.is_attached(child) {
            self.emit(TreeEvent::Inserted(child));
        }
    }

    fn replace_content(&mut self, node: NodeId, text: &str) {
        let children = std::mem::take(&mut self.nodes[node].children);
        for child in children {
            self.nodes[child].parent = None;
            if matches!(self.nodes[child].kind, NodeKind::Text(_)) {
                self.spare_text.push(child);
            }
        }
        if !text.is_empty() {
            let text_node = self.text_node(text);
            self.nodes[text_node].parent = Some(node);
            self.nodes[node].children.push(text_node);
        }
    }

    fn text_node(&mut self, text: &str) -> NodeId {
        let kind = NodeKind::Text(text.to_string());
        match self.spare_text.pop() {
            Some(id) => {
                self.nodes[id] = Node::new(kind);
                id
            }
            None => self.push(kind),
        }
    }

    fn collect(&self, node: NodeId, selector: &Selector, out: &mut Vec<NodeId>) {
        if selector.matches(self, node) {
            out.push(node);
        }
        for child in &self.nodes[node].children {
            self.collect(*child, selector, out);
        }
    }

    fn write_text(&self, node: NodeId, excluded: Option<&Selector>, out: &mut String) {
        if let Some(excluded) = excluded {
            if excluded.matches(self, node) {
                return;
            }
        }
        match &self.nodes[node].kind {
            NodeKind::Text(text) => out.push_str(text),
            NodeKind::Element(_) => {
                for child in &self.nodes[node].children {
                    self.write_text(*child, excluded, out);
                }
            }
        }
    }

    fn is_editable(&self, node: NodeId) -> bool {
        self.attribute_value(node, "contenteditable") == Some("true")
    }

    fn emit(&mut self, event: TreeEvent) {
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    fn valid(&self, node: NodeId) -> bool {
        node < self.nodes.len()
    }
}

/// In-process document used by the chat feed and by tests.
pub struct MemoryDocument {
    inner: Mutex<Inner>,
}

impl MemoryDocument {
    pub fn new(location: impl Into<String>) -> Self {
        let mut inner = Inner {
            nodes: Vec::new(),
            location: location.into(),
            focused: None,
            closed: false,
            subscribers: Vec::new(),
            spare_text: Vec::new(),
            #[cfg(test)]
            dispatched: Vec::new(),
        };
        inner.push(NodeKind::Element("body".to_string()));
        Self {
            inner: Mutex::new(inner),
        }
    }

    /// Creates a detached element with the given attributes.
    pub fn element(&self, tag: &str, attributes: &[(&str, &str)]) -> NodeId {
        let node = self.create_element(tag);
        for (name, value) in attributes {
            self.set_attribute(node, name, value);
        }
        node
    }

    pub fn set_location(&self, location: impl Into<String>) {
        self.inner.lock().location = location.into();
    }

    pub fn set_editor_behavior(&self, node: NodeId, behavior: EditorBehavior) {
        let mut inner = self.inner.lock();
        if inner.valid(node) {
            inner.nodes[node].behavior = behavior;
        }
    }

    /// Replaces the field content the way typing would and fires an input event.
    pub fn type_text(&self, node: NodeId, text: &str) {
        let mut inner = self.inner.lock();
        if !inner.valid(node) {
            return;
        }
        inner.replace_content(node, text);
        inner.emit(TreeEvent::Input(node));
    }

    #[cfg(test)]
    pub fn dispatched_events(&self) -> Vec<(NodeId, SyntheticEvent)> {
        self.inner.lock().dispatched.clone()
    }

    #[cfg(test)]
    pub fn focused(&self) -> Option<NodeId> {
        self.inner.lock().focused
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

impl DomTree for MemoryDocument {
    fn subscribe(&self) -> UnboundedReceiver<TreeEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.inner.lock().subscribers.push(sender);
        receiver
    }

    fn root(&self) -> NodeId {
        ROOT
    }

    fn location(&self) -> String {
        self.inner.lock().location.clone()
    }

    fn contains(&self, node: NodeId) -> bool {
        self.inner.lock().is_attached(node)
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.inner.lock().parent_node(node)
    }

    fn query_descendants(&self, scope: NodeId, selector: &Selector) -> Vec<NodeId> {
        let inner = self.inner.lock();
        let mut out = Vec::new();
        if inner.valid(scope) {
            inner.collect(scope, selector, &mut out);
        }
        out
    }

    fn closest(&self, node: NodeId, selector: &Selector) -> Option<NodeId> {
        let inner = self.inner.lock();
        let mut current = inner.valid(node).then_some(node);
        while let Some(candidate) = current {
            if selector.matches(&*inner, candidate) {
                return Some(candidate);
            }
            current = inner.parent_node(candidate);
        }
        None
    }

    fn element_by_id(&self, id: &str) -> Option<NodeId> {
        let inner = self.inner.lock();
        let mut out = Vec::new();
        inner.collect(ROOT, &Selector::id(id), &mut out);
        out.into_iter().next()
    }

    fn text_content(&self, node: NodeId) -> String {
        let inner = self.inner.lock();
        let mut out = String::new();
        if inner.valid(node) {
            inner.write_text(node, None, &mut out);
        }
        out
    }

    fn text_excluding(&self, node: NodeId, excluded: &Selector) -> String {
        let inner = self.inner.lock();
        let mut out = String::new();
        if inner.valid(node) {
            inner.write_text(node, Some(excluded), &mut out);
        }
        out
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.inner
            .lock()
            .attribute_value(node, name)
            .map(str::to_string)
    }

    fn set_attribute(&self, node: NodeId, name: &str, value: &str) {
        let mut inner = self.inner.lock();
        if inner.valid(node) {
            inner.nodes[node]
                .attributes
                .insert(name.to_string(), value.to_string());
        }
    }

    fn style(&self, node: NodeId, property: &str) -> Option<String> {
        self.inner
            .lock()
            .nodes
            .get(node)
            .and_then(|n| n.style.get(property).cloned())
    }

    fn set_style(&self, node: NodeId, property: &str, value: &str) {
        let mut inner = self.inner.lock();
        if inner.valid(node) {
            inner.nodes[node]
                .style
                .insert(property.to_string(), value.to_string());
        }
    }

    fn create_element(&self, tag: &str) -> NodeId {
        self.inner
            .lock()
            .push(NodeKind::Element(tag.to_ascii_lowercase()))
    }

    fn set_text(&self, node: NodeId, text: &str) {
        let mut inner = self.inner.lock();
        if inner.valid(node) {
            inner.replace_content(node, text);
        }
    }

    fn append_child(&self, parent: NodeId, child: NodeId) {
        self.inner.lock().insert(parent, child, false);
    }

    fn prepend_child(&self, parent: NodeId, child: NodeId) {
        self.inner.lock().insert(parent, child, true);
    }

    fn remove(&self, node: NodeId) {
        let mut inner = self.inner.lock();
        if inner.valid(node) {
            inner.detach(node);
        }
    }

    fn focus(&self, node: NodeId) {
        let mut inner = self.inner.lock();
        if inner.valid(node) {
            inner.focused = Some(node);
        }
    }

    fn dispatch(&self, node: NodeId, event: SyntheticEvent) -> bool {
        let mut inner = self.inner.lock();
        if !inner.valid(node) {
            return false;
        }
        #[cfg(test)]
        inner.dispatched.push((node, event.clone()));

        let behavior = inner.nodes[node].behavior;
        match event {
            SyntheticEvent::Paste(text) if inner.is_editable(node) && behavior.accepts_paste => {
                inner.replace_content(node, &text);
                true
            }
            SyntheticEvent::InsertText(text)
                if inner.is_editable(node) && behavior.accepts_insert_text =>
            {
                inner.replace_content(node, &text);
                true
            }
            SyntheticEvent::Input => {
                inner.emit(TreeEvent::Input(node));
                true
            }
            SyntheticEvent::Change | SyntheticEvent::KeyUp => true,
            SyntheticEvent::Paste(_) | SyntheticEvent::InsertText(_) => false,
        }
    }

    fn click(&self, node: NodeId) {
        let mut inner = self.inner.lock();
        if inner.is_attached(node) {
            inner.emit(TreeEvent::Click(node));
        }
    }

    fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        inner.subscribers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insertions_are_reported_only_for_attached_roots() {
        let doc = MemoryDocument::new("https://web.whatsapp.com/");
        let mut events = doc.subscribe();

        let row = doc.element("div", &[("class", "message-in")]);
        let text = doc.element("span", &[("data-pre-plain-text", "[10:00] Ana: ")]);
        doc.append_child(row, text);
        assert!(events.try_recv().is_err());

        doc.append_child(doc.root(), row);
        assert_eq!(events.try_recv().unwrap(), TreeEvent::Inserted(row));
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn query_includes_scope_and_keeps_document_order() {
        let doc = MemoryDocument::new("about:blank");
        let outer = doc.element("div", &[("data-pre-plain-text", "a")]);
        let inner = doc.element("div", &[("data-pre-plain-text", "b")]);
        doc.append_child(doc.root(), outer);
        doc.append_child(outer, inner);

        let found = doc.query_descendants(outer, &Selector::attribute("data-pre-plain-text"));
        assert_eq!(found, vec![outer, inner]);
        assert_eq!(
            doc.closest(inner, &Selector::attribute("data-pre-plain-text")),
            Some(inner)
        );
    }

    #[test]
    fn retyping_a_field_reuses_its_text_node() {
        let doc = MemoryDocument::new("about:blank");
        let field = doc.element("div", &[("contenteditable", "true")]);
        doc.append_child(doc.root(), field);
        doc.type_text(field, "h");
        let baseline = doc.inner.lock().nodes.len();

        for round in 0..500 {
            doc.type_text(field, &format!("draft {round}"));
            doc.set_text(field, "");
            doc.dispatch(field, SyntheticEvent::InsertText("again".into()));
        }

        assert_eq!(doc.inner.lock().nodes.len(), baseline);
        assert_eq!(doc.text_content(field), "again");
    }

    #[test]
    fn moving_a_node_under_its_own_descendant_is_ignored() {
        let doc = MemoryDocument::new("about:blank");
        let outer = doc.element("div", &[]);
        let inner = doc.element("div", &[]);
        let leaf = doc.element("span", &[]);
        doc.append_child(doc.root(), outer);
        doc.append_child(outer, inner);
        doc.append_child(inner, leaf);

        doc.append_child(leaf, outer);
        doc.prepend_child(outer, outer);

        assert_eq!(doc.parent(outer), Some(doc.root()));
        assert_eq!(doc.parent(leaf), Some(inner));
        assert!(doc.contains(leaf));
        assert_eq!(
            doc.query_descendants(doc.root(), &Selector::tag("div")),
            vec![outer, inner]
        );
    }

    #[test]
    fn removed_nodes_are_no_longer_contained() {
        let doc = MemoryDocument::new("about:blank");
        let panel = doc.element("div", &[("id", "detoxify-input-warning")]);
        doc.append_child(doc.root(), panel);
        assert_eq!(doc.element_by_id("detoxify-input-warning"), Some(panel));

        doc.remove(panel);
        assert!(!doc.contains(panel));
        assert_eq!(doc.element_by_id("detoxify-input-warning"), None);
    }

    #[test]
    fn text_excluding_skips_marked_subtrees() {
        let doc = MemoryDocument::new("about:blank");
        let message = doc.element("div", &[]);
        let ui = doc.element("div", &[("data-ui", "true")]);
        let body = doc.element("span", &[]);
        doc.set_text(ui, "Warning ");
        doc.set_text(body, "hello there");
        doc.append_child(message, body);
        doc.prepend_child(message, ui);

        assert_eq!(doc.text_content(message), "Warning hello there");
        assert_eq!(
            doc.text_excluding(message, &Selector::attribute("data-ui")),
            "hello there"
        );
    }

    #[test]
    fn paste_respects_editor_behavior() {
        let doc = MemoryDocument::new("about:blank");
        let field = doc.element("div", &[("contenteditable", "true")]);
        doc.append_child(doc.root(), field);

        assert!(doc.dispatch(field, SyntheticEvent::Paste("one".into())));
        assert_eq!(doc.text_content(field), "one");

        doc.set_editor_behavior(
            field,
            EditorBehavior {
                accepts_paste: false,
                accepts_insert_text: true,
            },
        );
        assert!(!doc.dispatch(field, SyntheticEvent::Paste("two".into())));
        assert_eq!(doc.text_content(field), "one");
        assert_eq!(doc.dispatched_events().len(), 2);
    }
}
