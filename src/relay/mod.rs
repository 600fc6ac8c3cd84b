pub mod coordinator;
pub mod email;
pub mod handle;
pub mod service;

pub use coordinator::Coordinator;
pub use email::EmailReporter;
pub use handle::{channel, Envelope, RelayHandle};
pub use service::RelayService;

/// Result of one outbound side effect of a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent,
    Skipped(String),
    Failed(String),
}
