//! Application configuration for MedContact.
//!
//! User config lives at `~/.medcontact/medcontact.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MedContactError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "medcontact.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".medcontact";

// ---------------------------------------------------------------------------
// Enumerated settings
// ---------------------------------------------------------------------------

/// Column layout of the input/output table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableSchemaKind {
    /// Portuguese column names (`Nome`, `Telefone A1`, ...).
    Legacy,
    /// English hash-keyed columns with opt-in, status, and lot markers.
    #[default]
    Extended,
}

/// Which round table the engine runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileKind {
    /// Six general profile rounds.
    Standard,
    /// Six profile rounds, then phone, e-mail, and e-mail plausibility rounds.
    #[default]
    Extended,
}

impl ProfileKind {
    /// Attempt ceiling used when the config does not set one.
    pub fn default_max_attempts(self) -> u32 {
        match self {
            Self::Standard => 3,
            Self::Extended => 5,
        }
    }
}

/// What happens when a mandatory round returns nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MandatoryPolicy {
    /// Log a warning and keep going.
    #[default]
    Advisory,
    /// Fail the record, keeping whatever was merged so far.
    Enforce,
}

impl FromStr for TableSchemaKind {
    type Err = MedContactError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "legacy" => Ok(Self::Legacy),
            "extended" => Ok(Self::Extended),
            other => Err(MedContactError::config(format!("unknown table schema '{other}'"))),
        }
    }
}

impl FromStr for ProfileKind {
    type Err = MedContactError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "extended" => Ok(Self::Extended),
            other => Err(MedContactError::config(format!(
                "unknown enrichment profile '{other}'"
            ))),
        }
    }
}

impl FromStr for MandatoryPolicy {
    type Err = MedContactError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "advisory" => Ok(Self::Advisory),
            "enforce" => Ok(Self::Enforce),
            other => Err(MedContactError::config(format!(
                "unknown mandatory policy '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Config structs (matching medcontact.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Search provider settings.
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Where API keys are read from.
    #[serde(default)]
    pub credentials: CredentialsConfig,

    /// Round schedule and retry settings.
    #[serde(default)]
    pub enrichment: EnrichmentSettings,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Directory for enriched tables and transcripts.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Column layout of input and output tables.
    #[serde(default)]
    pub schema: TableSchemaKind,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            schema: TableSchemaKind::default(),
        }
    }
}

fn default_output_dir() -> String {
    ".".into()
}

/// `[provider]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API root, e.g. `https://generativelanguage.googleapis.com`.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model identifier.
    #[serde(default = "default_model")]
    pub model: String,

    /// Use the server-sent-events endpoint and concatenate chunks.
    #[serde(default)]
    pub stream: bool,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            stream: false,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com".into()
}
fn default_model() -> String {
    "gemini-2.5-flash".into()
}
fn default_timeout_secs() -> u64 {
    120
}

/// `[credentials]` section. Holds paths only, never the keys themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// Secret files, one key per line. Every file must exist.
    #[serde(default = "default_key_files")]
    pub files: Vec<String>,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            files: default_key_files(),
        }
    }
}

fn default_key_files() -> Vec<String> {
    vec!["apis/gemini.key".into()]
}

/// `[enrichment]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentSettings {
    /// Round table to run.
    #[serde(default)]
    pub profile: ProfileKind,

    /// Attempts per round; defaults to the profile's ceiling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,

    /// Sleep between attempts of the same round.
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: u64,

    /// Pre-request delay grows by this much per round.
    #[serde(default = "default_delay_step_secs")]
    pub delay_step_secs: u64,

    /// Upper bound of the linear delay.
    #[serde(default = "default_delay_ceiling_secs")]
    pub delay_ceiling_secs: u64,

    /// Delay before rounds flagged as extended (final/high-priority rounds).
    #[serde(default = "default_extended_delay_secs")]
    pub extended_delay_secs: u64,

    /// Handling of mandatory rounds that return nothing.
    #[serde(default)]
    pub mandatory: MandatoryPolicy,

    /// Records per chunk; defaults to an even split across credentials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<usize>,
}

impl Default for EnrichmentSettings {
    fn default() -> Self {
        Self {
            profile: ProfileKind::default(),
            max_attempts: None,
            backoff_secs: default_backoff_secs(),
            delay_step_secs: default_delay_step_secs(),
            delay_ceiling_secs: default_delay_ceiling_secs(),
            extended_delay_secs: default_extended_delay_secs(),
            mandatory: MandatoryPolicy::default(),
            chunk_size: None,
        }
    }
}

fn default_backoff_secs() -> u64 {
    30
}
fn default_delay_step_secs() -> u64 {
    7
}
fn default_delay_ceiling_secs() -> u64 {
    35
}
fn default_extended_delay_secs() -> u64 {
    45
}

// ---------------------------------------------------------------------------
// Engine config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime enrichment configuration: merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Round table to run.
    pub profile: ProfileKind,
    /// Attempts per round (at least 1).
    pub max_attempts: u32,
    /// Fixed sleep between attempts.
    pub backoff: Duration,
    /// Linear delay increment per round.
    pub delay_step: Duration,
    /// Linear delay ceiling.
    pub delay_ceiling: Duration,
    /// Delay for rounds flagged as extended.
    pub extended_delay: Duration,
    /// Mandatory round handling.
    pub mandatory: MandatoryPolicy,
    /// Records per chunk override.
    pub chunk_size: Option<usize>,
}

impl EngineConfig {
    /// Same schedule with every sleep removed. Used by tests and dry runs.
    pub fn without_delays(mut self) -> Self {
        self.backoff = Duration::ZERO;
        self.delay_step = Duration::ZERO;
        self.delay_ceiling = Duration::ZERO;
        self.extended_delay = Duration::ZERO;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for EngineConfig {
    fn from(config: &AppConfig) -> Self {
        let e = &config.enrichment;
        Self {
            profile: e.profile,
            max_attempts: e
                .max_attempts
                .unwrap_or_else(|| e.profile.default_max_attempts())
                .max(1),
            backoff: Duration::from_secs(e.backoff_secs),
            delay_step: Duration::from_secs(e.delay_step_secs),
            delay_ceiling: Duration::from_secs(e.delay_ceiling_secs),
            extended_delay: Duration::from_secs(e.extended_delay_secs),
            mandatory: e.mandatory,
            chunk_size: e.chunk_size.filter(|n| *n > 0),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.medcontact/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| MedContactError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.medcontact/medcontact.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| MedContactError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        MedContactError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| MedContactError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| MedContactError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| MedContactError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that at least one credential file is configured.
pub fn validate_credentials_config(config: &AppConfig) -> Result<()> {
    if config.credentials.files.iter().all(|f| f.trim().is_empty()) {
        return Err(MedContactError::config(
            "no credential files configured. Add paths under [credentials] files \
             or pass --key-file",
        ));
    }
    Ok(())
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}
