#![allow(dead_code)]

use async_trait::async_trait;
use azure_sql_client::config::{CloudConfig, DatabaseConfig, IdentityConfig};
use azure_sql_client::{AzureCredential, Driver, DriverConnection, DriverCursor, DriverError};
use chrono::{TimeDelta, Utc};
use mockito::{Matcher, Mock, ServerGuard};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub const TENANT: &str = "contoso-tenant";
pub const SUBSCRIPTION: &str = "00000000-1111-2222-3333-444444444444";
pub const ACCESS_TOKEN: &str = "test-access-token";

/// Shared, ordered log of driver calls.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }
}

/// In-memory driver whose connect attempts fail from a script before succeeding.
#[derive(Default)]
pub struct ScriptedDriver {
    pub journal: Journal,
    connect_failures: Mutex<VecDeque<DriverError>>,
    connection_strings: Mutex<Vec<String>>,
    fail_commit: bool,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_connects(failures: impl IntoIterator<Item = DriverError>) -> Self {
        Self {
            connect_failures: Mutex::new(failures.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn failing_commit() -> Self {
        Self {
            fail_commit: true,
            ..Self::default()
        }
    }

    pub fn connection_strings(&self) -> Vec<String> {
        self.connection_strings.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.connection_strings.lock().unwrap().len()
    }
}

#[async_trait]
impl Driver for ScriptedDriver {
    type Connection = RecordingConnection;

    async fn connect(&self, connection_string: &str) -> Result<RecordingConnection, DriverError> {
        self.connection_strings
            .lock()
            .unwrap()
            .push(connection_string.to_string());
        self.journal.record("connect");
        if let Some(err) = self.connect_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(RecordingConnection {
            journal: self.journal.clone(),
            fail_commit: self.fail_commit,
        })
    }
}

#[derive(Debug)]
pub struct RecordingConnection {
    journal: Journal,
    fail_commit: bool,
}

impl DriverConnection for RecordingConnection {
    type Cursor = RecordingCursor;

    fn cursor(&self) -> Result<RecordingCursor, DriverError> {
        self.journal.record("cursor");
        Ok(RecordingCursor {
            journal: self.journal.clone(),
            fail_commit: self.fail_commit,
        })
    }

    fn close(self) -> Result<(), DriverError> {
        self.journal.record("connection.close");
        Ok(())
    }
}

#[derive(Debug)]
pub struct RecordingCursor {
    journal: Journal,
    fail_commit: bool,
}

impl DriverCursor for RecordingCursor {
    fn commit(&mut self) -> Result<(), DriverError> {
        self.journal.record("commit");
        if self.fail_commit {
            return Err(DriverError::new("Communication link failure").with_sqlstate("08S01"));
        }
        Ok(())
    }

    fn close(self) -> Result<(), DriverError> {
        self.journal.record("cursor.close");
        Ok(())
    }
}

pub fn identity() -> IdentityConfig {
    IdentityConfig {
        client_id: "app-client-id".into(),
        client_secret: "app-secret".into(),
        subscription_id: SUBSCRIPTION.into(),
        tenant_id: TENANT.into(),
    }
}

pub fn database() -> DatabaseConfig {
    DatabaseConfig {
        username: "sqladmin".into(),
        password: "Pa55w0rd!".into(),
        driver: None,
    }
}

/// Point both the authority and the resource manager at the mock server.
pub fn cloud(server: &ServerGuard) -> CloudConfig {
    CloudConfig {
        authority_host: server.url(),
        resource_manager: server.url(),
        ..CloudConfig::default()
    }
}

pub fn valid_credential() -> AzureCredential {
    AzureCredential::from_token(
        TENANT,
        "app-client-id",
        ACCESS_TOKEN,
        Utc::now() + TimeDelta::hours(1),
    )
}

pub fn token_path() -> String {
    format!("/{TENANT}/oauth2/v2.0/token")
}

pub async fn mock_token(server: &mut ServerGuard) -> Mock {
    let scope = format!("{}/.default", server.url());
    server
        .mock("POST", token_path().as_str())
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("grant_type".into(), "client_credentials".into()),
            Matcher::UrlEncoded("client_id".into(), "app-client-id".into()),
            Matcher::UrlEncoded("client_secret".into(), "app-secret".into()),
            Matcher::UrlEncoded("scope".into(), scope),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(format!(
            r#"{{"token_type":"Bearer","expires_in":3599,"ext_expires_in":3599,"access_token":"{ACCESS_TOKEN}"}}"#
        ))
        .create_async()
        .await
}

pub fn server_path(resource_group: &str, server: &str) -> String {
    format!(
        "/subscriptions/{SUBSCRIPTION}/resourceGroups/{resource_group}/providers/Microsoft.Sql/servers/{server}"
    )
}

pub fn database_path(resource_group: &str, server: &str, database: &str) -> String {
    format!("{}/databases/{database}", server_path(resource_group, server))
}

pub fn api_version() -> Matcher {
    Matcher::UrlEncoded("api-version".into(), "2021-11-01".into())
}

pub fn server_body(resource_group: &str, server: &str) -> String {
    format!(
        r#"{{
            "id": "{path}",
            "name": "{server}",
            "type": "Microsoft.Sql/servers",
            "location": "westeurope",
            "kind": "v12.0",
            "properties": {{
                "administratorLogin": "sqladmin",
                "version": "12.0",
                "state": "Ready",
                "fullyQualifiedDomainName": "{server}.database.windows.net"
            }}
        }}"#,
        path = server_path(resource_group, server)
    )
}

pub fn database_body(resource_group: &str, server: &str, database: &str) -> String {
    format!(
        r#"{{
            "id": "{path}",
            "name": "{database}",
            "type": "Microsoft.Sql/servers/databases",
            "location": "westeurope",
            "sku": {{"name": "S0", "tier": "Standard", "capacity": 10}},
            "properties": {{
                "collation": "SQL_Latin1_General_CP1_CI_AS",
                "status": "Online",
                "maxSizeBytes": 268435456000
            }}
        }}"#,
        path = database_path(resource_group, server, database)
    )
}
