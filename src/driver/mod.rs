//! Database driver seam.
//!
//! Layout:
//! - `connection_string.rs`: host and ODBC connection string formatting
//! - `session.rs`: scoped connection + cursor with ordered release
//! - `odbc.rs`: `odbc-api` backed driver (feature `odbc`)

pub mod connection_string;
pub mod session;

#[cfg(feature = "odbc")]
pub mod odbc;

use async_trait::async_trait;
use std::fmt;

pub use connection_string::{DEFAULT_DRIVER, connection_string, server_host};
pub use session::{ReleaseOutcome, Session};

#[cfg(feature = "odbc")]
pub use odbc::{OdbcConnection, OdbcCursor, OdbcDriver};

/// Opens connections from a driver connection string.
#[async_trait]
pub trait Driver: Send + Sync {
    type Connection: DriverConnection;

    async fn connect(&self, connection_string: &str) -> Result<Self::Connection, DriverError>;
}

/// A live database connection.
pub trait DriverConnection: Send {
    type Cursor: DriverCursor;

    fn cursor(&self) -> Result<Self::Cursor, DriverError>;

    fn close(self) -> Result<(), DriverError>;
}

/// Statement handle opened from a connection.
pub trait DriverCursor: Send {
    fn commit(&mut self) -> Result<(), DriverError>;

    fn close(self) -> Result<(), DriverError>;
}

/// Failure reported by a driver, with the ODBC SQLSTATE when one is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverError {
    pub message: String,
    pub sqlstate: Option<String>,
}

impl DriverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            sqlstate: None,
        }
    }

    pub fn with_sqlstate(mut self, sqlstate: impl Into<String>) -> Self {
        self.sqlstate = Some(sqlstate.into());
        self
    }

    /// Class 08 (connection exception) and the two timeout states.
    pub fn is_transient(&self) -> bool {
        match self.sqlstate.as_deref() {
            Some(state) => state.starts_with("08") || state == "HYT00" || state == "HYT01",
            None => false,
        }
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sqlstate {
            Some(state) => write!(f, "[{state}] {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for DriverError {}
