pub mod env;
mod loader;

pub use env::{
    AppConfig, AutoSendConfig, ClassifierConfig, DirectoryConfig, EmailConfig, PageConfig,
    SettingsOverrides,
};
pub use loader::load_config;
