use std::fmt;

use crate::postgres::BackendMessage;

/// Type-erased error yielded by a copy data stream.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Statement submitted to [`copy_in`][super::copy_in] did not start a copy-in operation.
///
/// The backend completed the statement without entering copy-in mode,
/// so nothing was aborted.
pub struct InvalidStatement {
    sql: String,
    found: u8,
}

impl InvalidStatement {
    pub(crate) fn new(sql: &str, found: u8) -> Self {
        Self { sql: sql.into(), found }
    }

    /// The offending statement.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Name of the backend message received in place of `CopyInResponse`.
    pub fn found(&self) -> &'static str {
        BackendMessage::message_name(self.found)
    }
}

impl std::error::Error for InvalidStatement { }

impl fmt::Display for InvalidStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "copy from stdin statement expected, found `{}` for sql='{}'",
            self.found(),
            self.sql,
        )
    }
}

impl fmt::Debug for InvalidStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

/// Copy data stream yielded an error, the copy was aborted.
pub struct CopyDataError {
    source: BoxError,
}

impl CopyDataError {
    pub(crate) fn new(source: BoxError) -> Self {
        Self { source }
    }

    /// Returns the error yielded by the data stream.
    pub fn into_inner(self) -> BoxError {
        self.source
    }
}

impl std::error::Error for CopyDataError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.source)
    }
}

impl fmt::Display for CopyDataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "copy data stream failed: {}", self.source)
    }
}

impl fmt::Debug for CopyDataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}
