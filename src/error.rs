//! The small error taxonomy surfaced by the core.
//!
//! Most caller-contract violations (an out-of-range write window, an
//! `append` precondition broken) are `debug_assert!`s on the hot path --
//! undefined behaviour in release builds, not recoverable errors. [`Error`]
//! covers only the one check cheap enough to make at construction time
//! without touching the per-key comparison loop or threading a `Result`
//! through every node decode in the `Step` chain.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("tree order must be at least 3, got {m}")]
    InvalidOrder { m: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
