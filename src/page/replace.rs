use std::time::Duration;

use tokio::time::sleep;

use super::dom::{DomTree, NodeId, SyntheticEvent};

/// One way of putting text into an editable field.
pub trait ReplacementStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn attempt(&self, tree: &dyn DomTree, field: NodeId, text: &str);
}

/// Clipboard paste; rich-text editors that ignore direct mutation still handle it.
pub struct SyntheticPaste;

pub struct InsertText;

/// Last resort. Always visible, but host frameworks may not notice it.
pub struct DirectOverwrite;

impl ReplacementStrategy for SyntheticPaste {
    fn name(&self) -> &'static str {
        "paste"
    }

    fn attempt(&self, tree: &dyn DomTree, field: NodeId, text: &str) {
        tree.dispatch(field, SyntheticEvent::Paste(text.to_string()));
    }
}

impl ReplacementStrategy for InsertText {
    fn name(&self) -> &'static str {
        "insert-text"
    }

    fn attempt(&self, tree: &dyn DomTree, field: NodeId, text: &str) {
        tree.dispatch(field, SyntheticEvent::InsertText(text.to_string()));
    }
}

impl ReplacementStrategy for DirectOverwrite {
    fn name(&self) -> &'static str {
        "overwrite"
    }

    fn attempt(&self, tree: &dyn DomTree, field: NodeId, text: &str) {
        tree.set_text(field, text);
    }
}

pub fn default_strategies() -> Vec<Box<dyn ReplacementStrategy>> {
    vec![
        Box::new(SyntheticPaste),
        Box::new(InsertText),
        Box::new(DirectOverwrite),
    ]
}

/// Tries each strategy in order until the field reads back as `text`.
///
/// Every attempt is checked after `settle`. On success the host page is told about the change
/// through `input`, `change` and `keyup` events and the winning strategy's name is returned.
pub async fn replace_text(
    tree: &dyn DomTree,
    field: NodeId,
    text: &str,
    strategies: &[Box<dyn ReplacementStrategy>],
    settle: Duration,
) -> Option<&'static str> {
    for strategy in strategies {
        strategy.attempt(tree, field, text);
        sleep(settle).await;

        if tree.text_content(field) == text {
            for event in [
                SyntheticEvent::Input,
                SyntheticEvent::Change,
                SyntheticEvent::KeyUp,
            ] {
                tree.dispatch(field, event);
            }
            return Some(strategy.name());
        }
        tracing::debug!(
            target: "page",
            strategy = strategy.name(),
            "replacement did not take effect, falling back"
        );
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{memory::EditorBehavior, MemoryDocument};

    const SETTLE: Duration = Duration::from_millis(50);

    fn field_doc(behavior: EditorBehavior) -> (MemoryDocument, NodeId) {
        let doc = MemoryDocument::new("https://web.whatsapp.com/");
        let field = doc.element("div", &[("contenteditable", "true")]);
        doc.append_child(doc.root(), field);
        doc.set_text(field, "you idiot");
        doc.set_editor_behavior(field, behavior);
        (doc, field)
    }

    fn notifications(doc: &MemoryDocument) -> Vec<SyntheticEvent> {
        doc.dispatched_events()
            .into_iter()
            .map(|(_, event)| event)
            .filter(|event| {
                matches!(
                    event,
                    SyntheticEvent::Input | SyntheticEvent::Change | SyntheticEvent::KeyUp
                )
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn paste_is_tried_first() {
        let (doc, field) = field_doc(EditorBehavior::default());
        let used = replace_text(&doc, field, "Please stop.", &default_strategies(), SETTLE).await;
        assert_eq!(used, Some("paste"));
        assert_eq!(doc.text_content(field), "Please stop.");
        assert_eq!(
            notifications(&doc),
            vec![
                SyntheticEvent::Input,
                SyntheticEvent::Change,
                SyntheticEvent::KeyUp
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn ignored_paste_falls_back_to_insert_text() {
        let (doc, field) = field_doc(EditorBehavior {
            accepts_paste: false,
            accepts_insert_text: true,
        });
        let used = replace_text(&doc, field, "Please stop.", &default_strategies(), SETTLE).await;
        assert_eq!(used, Some("insert-text"));
        assert_eq!(doc.text_content(field), "Please stop.");
    }

    #[tokio::test(start_paused = true)]
    async fn locked_editor_is_overwritten() {
        let (doc, field) = field_doc(EditorBehavior {
            accepts_paste: false,
            accepts_insert_text: false,
        });
        let used = replace_text(&doc, field, "Please stop.", &default_strategies(), SETTLE).await;
        assert_eq!(used, Some("overwrite"));
        assert_eq!(doc.text_content(field), "Please stop.");
        assert_eq!(notifications(&doc).len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_strategies_report_failure() {
        let (doc, field) = field_doc(EditorBehavior {
            accepts_paste: false,
            accepts_insert_text: false,
        });
        let strategies: Vec<Box<dyn ReplacementStrategy>> = vec![Box::new(SyntheticPaste)];
        let used = replace_text(&doc, field, "Please stop.", &strategies, SETTLE).await;
        assert_eq!(used, None);
        assert_eq!(doc.text_content(field), "you idiot");
        assert!(notifications(&doc).is_empty());
    }
}
