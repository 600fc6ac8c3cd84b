use tokio::sync::mpsc::UnboundedReceiver;

use super::selector::Selector;

pub type NodeId = usize;

/// Changes a subscriber is told about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeEvent {
    /// A node was attached to the document. Its descendants are not reported separately.
    Inserted(NodeId),
    /// The user (or a synthetic event) changed an editable field.
    Input(NodeId),
    Click(NodeId),
}

/// Events the pipeline dispatches into the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntheticEvent {
    /// Clipboard paste over the whole field content.
    Paste(String),
    /// Editor "insert text" command over the whole field content.
    InsertText(String),
    Input,
    Change,
    KeyUp,
}

/// Capability interface over a live, externally owned document.
///
/// The moderation pipeline only ever talks to the page through this trait, so it runs the same
/// against a browser binding or [`super::MemoryDocument`].
pub trait DomTree: Send + Sync {
    fn subscribe(&self) -> UnboundedReceiver<TreeEvent>;

    fn root(&self) -> NodeId;

    fn location(&self) -> String;

    /// Whether the node is currently attached to the document.
    fn contains(&self, node: NodeId) -> bool;

    fn parent(&self, node: NodeId) -> Option<NodeId>;

    /// `scope` itself and its descendants matching `selector`, in document order.
    fn query_descendants(&self, scope: NodeId, selector: &Selector) -> Vec<NodeId>;

    /// Nearest inclusive ancestor matching `selector`.
    fn closest(&self, node: NodeId, selector: &Selector) -> Option<NodeId>;

    fn element_by_id(&self, id: &str) -> Option<NodeId>;

    fn text_content(&self, node: NodeId) -> String;

    /// Text content with every subtree matching `excluded` skipped.
    fn text_excluding(&self, node: NodeId, excluded: &Selector) -> String;

    fn attribute(&self, node: NodeId, name: &str) -> Option<String>;

    fn set_attribute(&self, node: NodeId, name: &str, value: &str);

    fn style(&self, node: NodeId, property: &str) -> Option<String>;

    fn set_style(&self, node: NodeId, property: &str, value: &str);

    /// Creates a detached element.
    fn create_element(&self, tag: &str) -> NodeId;

    /// Replaces all children of `node` with a single text node (none for empty text).
    fn set_text(&self, node: NodeId, text: &str);

    fn append_child(&self, parent: NodeId, child: NodeId);

    fn prepend_child(&self, parent: NodeId, child: NodeId);

    /// Detaches the node (and its subtree) from the document.
    fn remove(&self, node: NodeId);

    fn focus(&self, node: NodeId);

    /// Returns whether the page applied the event's default action.
    fn dispatch(&self, node: NodeId, event: SyntheticEvent) -> bool;

    fn click(&self, node: NodeId);

    fn close(&self);

    fn query_first(&self, scope: NodeId, selector: &Selector) -> Option<NodeId> {
        self.query_descendants(scope, selector).into_iter().next()
    }
}
