use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::BatchError;
use crate::parser::extract::tax_id::AUTHORITY_TAX_ID;
use crate::parser::ExtractOptions;

/// Optional settings file in the working directory (any format the `config`
/// crate recognises, e.g. `proa_extract.toml`).
const CONFIG_FILE: &str = "proa_extract";
const ENV_PREFIX: &str = "PROA";
const DEFAULT_STATUS_URL: &str = "http://localhost:8080/processos/{proa}/status";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub documents_dir: PathBuf,
    pub db_path: PathBuf,
    pub force_refresh: bool,
    /// Status endpoint; `{proa}` is replaced by the digits of the process
    /// number.
    pub status_url: String,
    pub status_timeout_secs: u64,
    pub status_delay_ms: u64,
    pub drive_folder_id: Option<String>,
    pub drive_token: Option<String>,
    pub excluded_tax_ids: Vec<String>,
    pub section_window: usize,
    /// Save the table every this many accepted records.
    pub checkpoint_every: Option<usize>,
}

/// Command-line values that take precedence over every other source.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub documents_dir: Option<PathBuf>,
    pub db_path: Option<PathBuf>,
    pub force_refresh: Option<bool>,
}

impl Settings {
    /// Defaults, then the optional settings file, then `PROA_*` environment
    /// variables, then `overrides`.
    pub fn load(overrides: &Overrides) -> Result<Self> {
        let path = |p: &Option<PathBuf>| p.as_ref().map(|p| p.display().to_string());
        let settings = Config::builder()
            .set_default("documents_dir", "documentos")?
            .set_default("db_path", "data/proa.sqlite")?
            .set_default("force_refresh", false)?
            .set_default("status_url", DEFAULT_STATUS_URL)?
            .set_default("status_timeout_secs", 20_i64)?
            .set_default("status_delay_ms", 1500_i64)?
            .set_default("excluded_tax_ids", vec![AUTHORITY_TAX_ID])?
            .set_default("section_window", 1200_i64)?
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("excluded_tax_ids"),
            )
            .set_override_option("documents_dir", path(&overrides.documents_dir))?
            .set_override_option("db_path", path(&overrides.db_path))?
            .set_override_option("force_refresh", overrides.force_refresh)?
            .build()
            .context("Failed to read configuration")?;
        Ok(settings.try_deserialize()?)
    }

    pub fn extract_options(&self) -> ExtractOptions {
        ExtractOptions {
            section_window: self.section_window,
            excluded_tax_ids: self.excluded_tax_ids.clone(),
        }
    }

    pub fn status_timeout(&self) -> Duration {
        Duration::from_secs(self.status_timeout_secs)
    }

    pub fn status_delay(&self) -> Duration {
        Duration::from_millis(self.status_delay_ms)
    }

    /// Drive folder and token, when links should come from Drive. A folder
    /// without a token is a configuration error.
    pub fn drive(&self) -> Result<Option<(&str, &str)>, BatchError> {
        match (&self.drive_folder_id, &self.drive_token) {
            (None, _) => Ok(None),
            (Some(folder), Some(token)) if !token.trim().is_empty() => {
                Ok(Some((folder.as_str(), token.as_str())))
            }
            (Some(folder), _) => Err(BatchError::MissingCredential(folder.clone())),
        }
    }
}
