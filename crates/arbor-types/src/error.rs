use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("resource id is empty")]
    EmptyId,

    #[error("resource id contains whitespace: {0:?}")]
    WhitespaceInId(String),
}
