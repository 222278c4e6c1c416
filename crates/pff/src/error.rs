//! Errors returned by [PffFile](crate::file::PffFile) and [Item](crate::item::Item).

use std::io;
use thiserror::Error;

use crate::{
    codepage::CodepageError, item::ItemType, ltp::LtpError, messaging::MessagingError,
    ndb::is_invalid_data,
};

/// Broad classes of [PffError].
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ErrorCategory {
    /// The handle is in the wrong state for the call.
    State,
    /// Unsupported access mode or codepage.
    Configuration,
    /// An index outside the valid range.
    Range,
    /// The item is not of the requested kind.
    Type,
    /// The source is not a readable PFF file.
    Format,
    /// Damaged structures found after a successful open.
    Corruption,
    /// The byte source failed.
    Io,
}

#[derive(Error, Debug)]
pub enum PffError {
    #[error("File is not open")]
    NotOpen,
    #[error("File is already open")]
    AlreadyOpen,
    #[error("Unsupported access mode: {0:?}")]
    UnsupportedAccessMode(String),
    #[error("Codepage error: {0}")]
    Codepage(#[from] CodepageError),
    #[error("Orphan item index {index} out of range, {count} orphans")]
    OrphanIndexOutOfRange { index: usize, count: usize },
    #[error("Sub-item index {index} out of range, {count} sub-items")]
    SubItemIndexOutOfRange { index: usize, count: usize },
    #[error("Recovered item index {index} out of range, {count} recovered items")]
    RecoveredIndexOutOfRange { index: usize, count: usize },
    #[error("Expected a {expected:?} item, found {actual:?}")]
    UnexpectedItemType { expected: ItemType, actual: ItemType },
    #[error("Invalid file format: {0}")]
    Format(#[source] io::Error),
    #[error("Corrupt data: {0}")]
    Corruption(#[source] io::Error),
    #[error("IO error: {0}")]
    Io(#[source] io::Error),
}

impl PffError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotOpen | Self::AlreadyOpen => ErrorCategory::State,
            Self::UnsupportedAccessMode(_) => ErrorCategory::Configuration,
            Self::Codepage(CodepageError::Malformed(_)) => ErrorCategory::Corruption,
            Self::Codepage(_) => ErrorCategory::Configuration,
            Self::OrphanIndexOutOfRange { .. }
            | Self::SubItemIndexOutOfRange { .. }
            | Self::RecoveredIndexOutOfRange { .. } => ErrorCategory::Range,
            Self::UnexpectedItemType { .. } => ErrorCategory::Type,
            Self::Format(_) => ErrorCategory::Format,
            Self::Corruption(_) => ErrorCategory::Corruption,
            Self::Io(_) => ErrorCategory::Io,
        }
    }

    /// Classify a failure while opening: anything the readers reject is a format error.
    pub(crate) fn from_open(err: io::Error) -> Self {
        if is_invalid_data(&err) {
            Self::Format(err)
        } else {
            Self::Io(err)
        }
    }
}

impl From<io::Error> for PffError {
    fn from(err: io::Error) -> Self {
        if let Some(err) = codepage_error(&err) {
            return Self::Codepage(err);
        }
        if is_invalid_data(&err) {
            Self::Corruption(err)
        } else {
            Self::Io(err)
        }
    }
}

pub type PffResult<T> = Result<T, PffError>;

/// Codepage failures surface wrapped in the layer that decoded the string.
fn codepage_error(err: &io::Error) -> Option<CodepageError> {
    let inner = err.get_ref()?;
    if let Some(err) = inner.downcast_ref::<CodepageError>() {
        return Some(err.clone());
    }
    let ltp = match inner.downcast_ref::<MessagingError>() {
        Some(MessagingError::ListsTablesPropertiesError(err)) => Some(err),
        _ => inner.downcast_ref::<LtpError>(),
    };
    match ltp {
        Some(LtpError::Codepage(err)) => Some(err.clone()),
        _ => None,
    }
}
