mod settings;

use std::path::Path;

use config::{Config, ConfigError, Environment, File};

use settings::PartialSettings;

pub use settings::{
    BrokerSettings, LogSettings, PushSettings, ServerSettings, Settings, StorageBackend,
    StorageSettings,
};

/// Prefix of environment overrides, e.g. `PULLSUB__SERVER__PORT=9000`.
pub const ENV_PREFIX: &str = "PULLSUB";

/// Loads the configuration from the default file and environment variables
/// Merges the configuration with default values
/// Returns a `Settings` struct containing every section
pub fn load_config() -> Result<Settings, ConfigError> {
    build(None)
}

/// Like [`load_config`], with `path` layered between the default file and
/// the environment.
pub fn load_config_from(path: impl AsRef<Path>) -> Result<Settings, ConfigError> {
    build(Some(path.as_ref()))
}

fn build(path: Option<&Path>) -> Result<Settings, ConfigError> {
    // A missing .env file is the common case.
    let _ = dotenvy::dotenv();

    let mut builder =
        Config::builder().add_source(File::with_name("config/default").required(false));

    if let Some(path) = path {
        builder = builder.add_source(File::from(path).required(true));
    }

    let config = builder
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    // Merge with defaults
    Ok(partial.merge(Settings::default()))
}

#[cfg(test)]
mod tests;
