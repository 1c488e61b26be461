//! Configuration loading, validation, env substitution, and the Telegram
//! offset checkpoint.
//!
//! The relay reads a single JSON file (`config.json` by default). Every string
//! value may use `${ENV_VAR}` placeholders. The only key the process ever
//! writes back is `offset`, through [`OffsetStore`].

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod offset;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{load_config, parse_config},
    offset::OffsetStore,
    schema::{RelayConfig, ServeMedia},
    validate::{Diagnostic, Severity, ValidatedConfig, validate},
};
