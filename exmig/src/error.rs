//! Error taxonomy for the migration
//!
//! Two tiers:
//! - [`MigrationError`] is fatal. A failed entry write leaves a half-built
//!   reference graph that cannot be resumed automatically, so it propagates
//!   to `main`, which logs the cause and exits non-zero.
//! - [`Skip`] is recoverable. The affected field, fragment or locale is
//!   dropped, a warning is logged (and lands in the error log file), and the
//!   page carries on.

use exmig_common::Depth;
use thiserror::Error;

use crate::align::Mismatch;
use crate::target::TargetError;

/// Fatal migration failure
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Creating, updating or publishing an entry or page failed
    #[error("Remote write failed while {action}: {source}")]
    RemoteWrite {
        action: String,
        #[source]
        source: TargetError,
    },

    /// Remote read failed where the run cannot continue without it
    #[error("Remote read failed: {0}")]
    RemoteRead(#[source] TargetError),

    /// The source database could not be queried
    #[error(transparent)]
    Source(#[from] exmig_common::Error),

    /// A requested page does not exist in the source store
    #[error("Page not found: {urlname} ({language})")]
    PageNotFound { urlname: String, language: String },
}

impl MigrationError {
    pub fn remote_write(action: impl Into<String>, source: TargetError) -> Self {
        Self::RemoteWrite {
            action: action.into(),
            source,
        }
    }
}

/// Result type for migration steps
pub type Result<T> = std::result::Result<T, MigrationError>;

/// Recoverable problem: skip the affected piece and continue
#[derive(Debug, Error)]
pub enum Skip {
    /// Element lacks an essence its handler needs
    #[error("essence \"{essence}\" missing from element \"{element}\"")]
    MissingEssence { element: String, essence: String },

    /// Essence exists but carries the wrong payload kind
    #[error("essence \"{essence}\" in element \"{element}\" is not {expected}")]
    WrongEssenceKind {
        element: String,
        essence: String,
        expected: &'static str,
    },

    /// Source image has no asset on the platform
    #[error("missing asset for source image {source_id}")]
    MissingAsset { source_id: String },

    /// Asset upload failed
    #[error("asset upload failed for source image {source_id}: {reason}")]
    UploadFailed { source_id: String, reason: String },

    /// Translation tree is not structurally congruent
    #[error("translation {language} does not align: {mismatch}")]
    Misaligned { language: String, mismatch: Mismatch },

    /// Translated page or locale mapping is missing
    #[error("translation {language} unavailable: {reason}")]
    TranslationUnavailable { language: String, reason: String },

    /// Element name outside the handled vocabulary
    #[error("unhandled element \"{0}\"")]
    UnhandledElement(String),

    /// Essence type tag outside the known set
    #[error("unknown essence type \"{0}\"")]
    UnknownEssenceType(String),

    /// Remote read failed; treated as nothing to do here
    #[error("remote read failed: {0}")]
    RemoteRead(String),

    /// Best-effort remote write failed (unpublish/delete during cleanup)
    #[error("{action} failed: {reason}")]
    BestEffort { action: String, reason: String },

    /// Page tree revisits a page already being transformed
    #[error("page \"{0}\" already visited; skipping to break a cycle")]
    Cycle(String),
}

/// Log a recoverable problem at WARN with the current indentation
pub fn report(depth: Depth, skip: &Skip) {
    tracing::warn!(depth = depth.level(), "{}- WARNING: {}", depth, skip);
}
