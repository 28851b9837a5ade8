//! Azure Resource Manager access for SQL servers and databases.

pub mod client;
pub mod models;

pub use client::SqlManagementClient;
pub use models::{Database, DatabaseProperties, Server, ServerProperties, Sku};
