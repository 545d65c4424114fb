//! # exmig common library
//!
//! Shared code for the exhibition migration tooling:
//! - Error and result types
//! - Bootstrap configuration (TOML, environment, command line)
//! - Locale table and the per-locale `LocalizedValue` map
//! - Depth-indented logging and subscriber setup

pub mod config;
pub mod error;
pub mod locale;
pub mod localized;
pub mod logging;

pub use error::{Error, Result};
pub use locale::LocaleMap;
pub use localized::{Blank, LocalizedValue};
pub use logging::Depth;
