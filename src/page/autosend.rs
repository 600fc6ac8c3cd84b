use tokio::time::{sleep, Instant};
use url::Url;

use crate::{config::AutoSendConfig, infrastructure::shutdown::ShutdownListener};

use super::{
    alert::AUTOSEND_FLAG,
    dom::{DomTree, NodeId},
    selector::Selector,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoSendOutcome {
    Sent,
    TimedOut,
    Cancelled,
}

/// Whether this page was opened from an alert deep link.
pub fn is_alert_tab(location: &str) -> bool {
    Url::parse(location)
        .map(|url| {
            url.query_pairs()
                .any(|(key, value)| key == AUTOSEND_FLAG && value == "1")
        })
        .unwrap_or(false)
}

fn send_control(tree: &dyn DomTree) -> Option<NodeId> {
    let icon = Selector::tag("span")
        .and(Selector::attribute_eq("data-icon", "send"))
        .within(Selector::tag("button"));
    if let Some(span) = tree.query_first(tree.root(), &icon) {
        return tree.closest(span, &Selector::tag("button"));
    }

    let labelled = Selector::tag("button").and(Selector::attribute_eq("aria-label", "Send"));
    tree.query_first(tree.root(), &labelled)
}

/// Polls for the send control, clicks it once and closes the page after the close delay.
pub async fn run_auto_send(
    tree: &dyn DomTree,
    config: &AutoSendConfig,
    shutdown: &mut ShutdownListener,
) -> AutoSendOutcome {
    tracing::info!(target: "alert", "auto-send armed; waiting for send control");
    let deadline = Instant::now() + config.give_up_after;

    loop {
        tokio::select! {
            _ = sleep(config.poll_interval) => {}
            _ = shutdown.notified() => return AutoSendOutcome::Cancelled,
        }
        if Instant::now() > deadline {
            tracing::warn!(target: "alert", "send control never appeared; giving up");
            return AutoSendOutcome::TimedOut;
        }

        if let Some(button) = send_control(tree) {
            tracing::info!(target: "alert", "send control found; sending alert");
            tree.click(button);
            tokio::select! {
                _ = sleep(config.close_delay) => {}
                _ = shutdown.notified() => return AutoSendOutcome::Cancelled,
            }
            tree.close();
            return AutoSendOutcome::Sent;
        }
    }
}
