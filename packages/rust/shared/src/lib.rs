//! Shared types, error model, and configuration for MedContact.
//!
//! This crate is the foundation depended on by all other MedContact crates.
//! It provides:
//! - [`MedContactError`], the unified error type
//! - Domain types ([`Field`], [`Record`], [`Credential`], [`EmailLikelihood`])
//! - Configuration ([`AppConfig`], [`EngineConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CredentialsConfig, DefaultsConfig, EngineConfig, EnrichmentSettings,
    MandatoryPolicy, ProfileKind, ProviderConfig, TableSchemaKind, config_dir, config_file_path,
    expand_home, init_config, load_config, load_config_from, validate_credentials_config,
};
pub use error::{MedContactError, Result};
pub use types::{Credential, EmailLikelihood, Field, FieldClass, FieldProvenance, Record};
