pub mod message;
pub mod settings;
pub mod verdict;

pub use message::{preview, AlertRequest, PageCommand, RelayRequest, ReportRequest, ToxicMessage};
pub use settings::{Settings, SettingsError};
pub use verdict::{ConversationToxicity, SuggestionKind, Suggestions, Verdict};
