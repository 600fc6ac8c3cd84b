pub mod alert;
pub mod autosend;
pub mod conversation;
pub mod dom;
pub mod injector;
pub mod memory;
pub mod observer;
pub mod replace;
pub mod selector;

pub use alert::{spawn_alert_listener, TracingTabOpener};
pub use autosend::{is_alert_tab, run_auto_send, AutoSendOutcome};
pub use dom::DomTree;
pub use memory::MemoryDocument;
pub use observer::PageSession;
