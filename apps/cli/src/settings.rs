//! Layered configuration: an optional `deconstanter.toml` overlaid with
//! `DECONST__*` environment variables.

use crate::error::{AppError, AppErrorExt};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

pub const DEFAULT_CONFIG_FILE: &str = "deconstanter";
pub const ENV_PREFIX: &str = "DECONST";
pub const DEFAULT_OUTPUT_DIR: &str = "deconstanted_assemblies";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory used when the output argument names no directory.
    pub default_output_dir: PathBuf,
    pub log: LogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self { default_output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR), log: LogSettings::default() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `error`, `warn`, `info`, `debug`, `trace` or `off`.
    pub level: Option<String>,
    /// Enables rolling file logs in this directory.
    pub directory: Option<PathBuf>,
    /// File logs as JSON lines.
    pub json: bool,
}

/// Loads [`Settings`].
///
/// Without `path` the loader looks for `deconstanter.toml` in the working
/// directory and silently falls back to defaults when it is absent. An
/// explicit `path` must exist.
///
/// # Errors
/// [`AppError::Config`] when the file is missing (explicit path only),
/// malformed, or does not match [`Settings`].
pub fn load_settings(path: Option<&Path>) -> Result<Settings, AppError> {
    let file = path.map_or_else(
        || File::with_name(DEFAULT_CONFIG_FILE).required(false),
        |path| File::from(path).required(true),
    );

    let settings = Config::builder()
        .add_source(file)
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()
        .context("Failed to build configuration")?
        .try_deserialize::<Settings>()
        .context("Failed to deserialize configuration")?;

    let source = path.map_or_else(|| DEFAULT_CONFIG_FILE.to_owned(), |p| p.display().to_string());
    info!(%source, "Configuration loaded");
    Ok(settings)
}
