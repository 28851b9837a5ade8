pub mod azure_oauth;
pub mod client;
pub mod config;
pub mod driver;
pub mod error;
pub mod management;

pub use azure_oauth::AzureCredential;
pub use client::AzureSqlClient;
pub use driver::{Driver, DriverConnection, DriverCursor, DriverError, ReleaseOutcome, Session};
pub use error::AzureSqlError;
pub use management::{Database, Server, SqlManagementClient};
