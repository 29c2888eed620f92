//! Error taxonomy of the crate.
//!
//! All failures are surfaced synchronously by the offending call and
//! propagated to the caller; there are no internal retries and no silent
//! fallback between transpose methods.
use thiserror::Error;

/// Errors raised by decomposition, transposition and plan operations.
#[derive(Debug, Error)]
pub enum PencilError {
    /// Invalid configuration: bad permutations, mismatched process grids,
    /// non-distinct decomposed axes, incompatible pencils.
    #[error("configuration error: {0}")]
    Config(String),
    /// Buffer or array size does not match the owning pencil.
    #[error("shape mismatch: {0}")]
    Shape(String),
    /// A transform was applied to an element type it does not accept.
    #[error("element type error: {0}")]
    Type(String),
    /// Out-of-range access through a global-index view.
    #[error("index out of local range: {0}")]
    Index(String),
    /// Failure surfaced by the message-passing layer.
    #[error("communication error: {0}")]
    Comm(String),
    /// Scratch-buffer allocation failure.
    #[error("allocation failure: {0}")]
    Oom(String),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, PencilError>;
