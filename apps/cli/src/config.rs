use config::{Config, Environment, File, FileFormat};
use serde::de::DeserializeOwned;
use std::borrow::Cow;
use std::path::Path;
use tracing::{debug, info};

#[stowage_derive::stowage_error]
pub enum ConfigError {
    #[error("Config error{}: {source}", format_context(.context))]
    Config { source: config::ConfigError, context: Option<Cow<'static, str>> },
}

/// Layers a TOML file under `STOWAGE__`-prefixed environment overrides.
///
/// A missing file is not an error: every setting has a default, so the
/// environment alone (or nothing at all) is a valid source.
/// `STOWAGE__ENCRYPTION__KEY` maps to `encryption.key`.
pub fn load_config<T>(path: &Path) -> Result<T, ConfigError>
where
    T: DeserializeOwned,
{
    let exists = path.is_file();
    if exists {
        info!("Loading config from {}", path.display());
    } else {
        debug!("No config file at {}, using defaults and environment", path.display());
    }

    Config::builder()
        .add_source(File::from(path).format(FileFormat::Toml).required(exists))
        .add_source(
            Environment::with_prefix("STOWAGE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build config")?
        .try_deserialize::<T>()
        .context("Failed to deserialize config")
}
