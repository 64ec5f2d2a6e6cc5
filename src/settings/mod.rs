pub mod settings_errors;
pub mod settings_model;
pub mod settings_service;

pub use settings_errors::SettingsError;
pub use settings_model::{FlexRetrySettings, Settings};
pub use settings_service::load_settings;
