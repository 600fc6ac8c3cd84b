use crate::domain::{SuggestionKind, Suggestions};

use super::{
    dom::{DomTree, NodeId},
    selector::Selector,
};

/// Marks every node this module creates, so it can be told apart from page content.
pub const UI_MARKER: &str = "data-detoxify-ui";
pub const FLAGGED_ATTR: &str = "data-detoxify-flagged";
pub const OUTBOUND_WARNING_ID: &str = "detoxify-input-warning";

const HIDDEN_FILTER: &str = "blur(10px)";

/// Nodes injected around one flagged message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlaggedMessage {
    pub message: NodeId,
    pub badge: NodeId,
    pub alert: NodeId,
    pub report: NodeId,
    pub hide: NodeId,
    pub unhide: NodeId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundWarning {
    pub panel: NodeId,
    pub buttons: Vec<(NodeId, SuggestionKind)>,
}

pub fn ui_selector() -> Selector {
    Selector::attribute(UI_MARKER)
}

fn ui_element(tree: &dyn DomTree, tag: &str, class: &str) -> NodeId {
    let node = tree.create_element(tag);
    tree.set_attribute(node, UI_MARKER, "true");
    if !class.is_empty() {
        tree.set_attribute(node, "class", class);
    }
    node
}

fn ui_text(tree: &dyn DomTree, tag: &str, class: &str, text: &str) -> NodeId {
    let node = ui_element(tree, tag, class);
    tree.set_text(node, text);
    node
}

pub fn badge_text(labels: &[String]) -> String {
    if labels.is_empty() {
        "⚠️ Flagged: General Warning".to_string()
    } else {
        format!("⚠️ Flagged: {}", labels.join(", "))
    }
}

/// Appends the badge and prepends the alert panel with Report / Hide / Unhide controls.
pub fn flag_message(tree: &dyn DomTree, message: NodeId, labels: &[String]) -> FlaggedMessage {
    let badge = ui_text(tree, "span", "detoxify-badge", &badge_text(labels));

    let alert = ui_element(tree, "div", "detoxify-alert");
    let heading = ui_text(tree, "strong", "", "Detoxify Warning:");
    let body = ui_text(tree, "span", "", " This message may be harmful.");
    let actions = ui_element(tree, "div", "detoxify-actions");
    let report = ui_text(tree, "button", "detoxify-kind-btn report-btn", "Report to Trusted");
    let hide = ui_text(tree, "button", "detoxify-kind-btn hide-btn", "Hide Message");
    let unhide = ui_text(tree, "button", "detoxify-kind-btn unhide-btn", "Unhide Message");
    tree.set_style(unhide, "display", "none");

    for button in [report, hide, unhide] {
        tree.append_child(actions, button);
    }
    tree.append_child(alert, heading);
    tree.append_child(alert, body);
    tree.append_child(alert, actions);

    tree.set_attribute(message, FLAGGED_ATTR, "true");
    tree.append_child(message, badge);
    tree.prepend_child(message, alert);

    FlaggedMessage {
        message,
        badge,
        alert,
        report,
        hide,
        unhide,
    }
}

/// Obscures or reveals the message. Only presentation changes; the text stays in place.
pub fn set_hidden(tree: &dyn DomTree, flagged: &FlaggedMessage, hidden: bool) {
    if hidden {
        tree.set_style(flagged.message, "filter", HIDDEN_FILTER);
        tree.set_style(flagged.message, "opacity", "0.3");
        tree.set_style(flagged.hide, "display", "none");
        tree.set_style(flagged.unhide, "display", "inline-block");
    } else {
        tree.set_style(flagged.message, "filter", "none");
        tree.set_style(flagged.message, "opacity", "1");
        tree.set_style(flagged.hide, "display", "inline-block");
        tree.set_style(flagged.unhide, "display", "none");
    }
}

pub fn is_hidden(tree: &dyn DomTree, message: NodeId) -> bool {
    tree.style(message, "filter").as_deref() == Some(HIDDEN_FILTER)
}

pub fn is_disabled(tree: &dyn DomTree, node: NodeId) -> bool {
    tree.attribute(node, "disabled").is_some()
}

pub fn mark_report_sent(tree: &dyn DomTree, button: NodeId) {
    tree.set_text(button, "Report Sent ✓");
    tree.set_attribute(button, "disabled", "true");
    tree.set_style(button, "opacity", "0.7");
}

/// Message text without anything this module injected.
pub fn original_text(tree: &dyn DomTree, message: NodeId) -> String {
    tree.text_excluding(message, &ui_selector()).trim().to_string()
}

/// Renders the single outbound-warning panel, replacing its content if it already exists.
pub fn show_outbound_warning(
    tree: &dyn DomTree,
    field: NodeId,
    suggestions: &Suggestions,
) -> OutboundWarning {
    let panel = match tree.element_by_id(OUTBOUND_WARNING_ID) {
        Some(existing) => {
            tree.set_text(existing, "");
            existing
        }
        None => {
            let panel = ui_element(tree, "div", "detoxify-alert");
            tree.set_attribute(panel, "id", OUTBOUND_WARNING_ID);
            let host = tree
                .parent(field)
                .and_then(|parent| tree.parent(parent))
                .or_else(|| tree.parent(field))
                .unwrap_or_else(|| tree.root());
            tree.prepend_child(host, panel);
            panel
        }
    };

    let heading = ui_text(tree, "strong", "", "Be Kind!");
    let body = ui_text(tree, "span", "", " Your message might be seen as harmful.");
    tree.append_child(panel, heading);
    tree.append_child(panel, body);

    let options = ui_element(tree, "div", "detoxify-suggestions");
    for kind in SuggestionKind::ALL {
        let row = ui_element(tree, "div", "");
        let label = ui_text(tree, "span", "detox-style-label", &format!("{}:", kind.label()));
        let quote = ui_text(tree, "em", "", &format!("\"{}\"", suggestions.get(kind)));
        tree.append_child(row, label);
        tree.append_child(row, quote);
        tree.append_child(options, row);
    }
    tree.append_child(panel, options);

    let actions = ui_element(tree, "div", "detoxify-actions");
    let mut buttons = Vec::with_capacity(SuggestionKind::ALL.len());
    for kind in SuggestionKind::ALL {
        let caption = match kind {
            SuggestionKind::Kind => "Use Kind",
            SuggestionKind::Funny => "Use Funny",
            SuggestionKind::Professional => "Use Professional",
        };
        let button = ui_text(tree, "button", "detoxify-kind-btn detoxify-style-btn", caption);
        tree.set_attribute(button, "id", &format!("detoxify-replace-btn-{kind}"));
        tree.append_child(actions, button);
        buttons.push((button, kind));
    }
    tree.append_child(panel, actions);

    OutboundWarning { panel, buttons }
}

pub fn remove_outbound_warning(tree: &dyn DomTree) -> bool {
    match tree.element_by_id(OUTBOUND_WARNING_ID) {
        Some(panel) => {
            tree.remove(panel);
            true
        }
        None => false,
    }
}
