mod parsing;
mod settings;
mod types;

pub(crate) use types::{
    AiSettings, ConfigError, Environment, GradingSettings, NotificationSettings, ProviderSettings,
    Settings,
};
