use crate::azure_oauth::AzureCredential;
use crate::config::{CloudConfig, Config, DatabaseConfig, IdentityConfig};
use crate::driver::{
    Driver, DriverConnection, ReleaseOutcome, Session, connection_string, server_host,
};
use crate::error::AzureSqlError;
use crate::management::{Database, Server, SqlManagementClient};

use backon::{ConstantBuilder, Retryable};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(2);
const USER_AGENT: &str = concat!("azure-sql-client/", env!("CARGO_PKG_VERSION"));

/// One fixed pause, one extra attempt.
fn connect_retry_policy() -> ConstantBuilder {
    ConstantBuilder::default()
        .with_delay(CONNECT_RETRY_DELAY)
        .with_max_times(1)
}

fn build_http_client() -> Result<reqwest::Client, AzureSqlError> {
    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        // Token endpoints must not be followed through redirects.
        .redirect(reqwest::redirect::Policy::none())
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(30))
        .build()?;
    Ok(client)
}

/// Azure SQL access for one service principal.
///
/// Holds the credential and management client built at construction, the
/// optional server / resource group / database selectors, and at most one
/// open database session. The session is released by [`close`](Self::close)
/// or, failing that, when the client is dropped.
pub struct AzureSqlClient<D: Driver> {
    identity: IdentityConfig,
    database: DatabaseConfig,
    credential: AzureCredential,
    management: SqlManagementClient,
    driver: D,
    server_name: Option<String>,
    resource_group_name: Option<String>,
    database_name: Option<String>,
    session: Option<Session<D::Connection>>,
    connected: bool,
    authenticated: bool,
}

impl<D: Driver> AzureSqlClient<D> {
    /// Authenticate against the public Azure cloud.
    pub async fn new(
        identity: IdentityConfig,
        database: DatabaseConfig,
        driver: D,
    ) -> Result<Self, AzureSqlError> {
        Self::with_cloud(identity, database, &CloudConfig::default(), driver).await
    }

    /// Build from layered configuration, applying any pre-set selectors.
    pub async fn from_config(config: &Config, driver: D) -> Result<Self, AzureSqlError> {
        let mut client = Self::with_cloud(
            config.identity.clone(),
            config.database.clone(),
            &config.cloud,
            driver,
        )
        .await?;
        client.server_name = config.target.server_name.clone();
        client.resource_group_name = config.target.resource_group_name.clone();
        client.database_name = config.target.database_name.clone();
        Ok(client)
    }

    /// Acquire the credential, then build the management client on top of it.
    ///
    /// An identity provider rejection is returned as-is and the management
    /// client is never built.
    pub async fn with_cloud(
        identity: IdentityConfig,
        database: DatabaseConfig,
        cloud: &CloudConfig,
        driver: D,
    ) -> Result<Self, AzureSqlError> {
        let http_client = build_http_client()?;
        let credential = AzureCredential::acquire(&identity, cloud, &http_client).await?;
        debug!(expires_at = %credential.expires_at(), "Credential created");
        Self::assemble(identity, database, credential, cloud, driver, http_client)
    }

    /// Use a credential obtained elsewhere; no token request is made.
    pub fn with_credential(
        identity: IdentityConfig,
        database: DatabaseConfig,
        credential: AzureCredential,
        cloud: &CloudConfig,
        driver: D,
    ) -> Result<Self, AzureSqlError> {
        let http_client = build_http_client()?;
        Self::assemble(identity, database, credential, cloud, driver, http_client)
    }

    fn assemble(
        identity: IdentityConfig,
        database: DatabaseConfig,
        credential: AzureCredential,
        cloud: &CloudConfig,
        driver: D,
        http_client: reqwest::Client,
    ) -> Result<Self, AzureSqlError> {
        let connected = true;
        let management = SqlManagementClient::new(
            credential.clone(),
            identity.subscription_id.clone(),
            cloud,
            http_client,
        )?;
        let authenticated = true;
        info!(
            subscription_id = %identity.subscription_id,
            "SQL management client ready"
        );

        Ok(Self {
            identity,
            database,
            credential,
            management,
            driver,
            server_name: None,
            resource_group_name: None,
            database_name: None,
            session: None,
            connected,
            authenticated,
        })
    }

    /// True once the credential has been created.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// True once the management client has been built.
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn credential(&self) -> &AzureCredential {
        &self.credential
    }

    pub fn sql_management_client(&self) -> &SqlManagementClient {
        &self.management
    }

    pub fn client_id(&self) -> &str {
        &self.identity.client_id
    }

    pub fn subscription_id(&self) -> &str {
        &self.identity.subscription_id
    }

    pub fn tenant_id(&self) -> &str {
        &self.identity.tenant_id
    }

    pub fn server_name(&self) -> Option<&str> {
        self.server_name.as_deref()
    }

    pub fn set_server_name(&mut self, value: impl Into<String>) {
        self.server_name = Some(value.into());
    }

    pub fn resource_group_name(&self) -> Option<&str> {
        self.resource_group_name.as_deref()
    }

    pub fn set_resource_group_name(&mut self, value: impl Into<String>) {
        self.resource_group_name = Some(value.into());
    }

    pub fn database_name(&self) -> Option<&str> {
        self.database_name.as_deref()
    }

    pub fn set_database_name(&mut self, value: impl Into<String>) {
        self.database_name = Some(value.into());
    }

    /// Fetch a server. Selectors set on the client take precedence over arguments.
    pub async fn lookup_server(
        &self,
        resource_group: Option<&str>,
        server_name: Option<&str>,
    ) -> Result<Server, AzureSqlError> {
        let resource_group = resolve(
            self.resource_group_name(),
            resource_group,
            "resource group name",
        )?;
        let server_name = resolve(self.server_name(), server_name, "server name")?;
        self.management
            .get_server(&resource_group, &server_name)
            .await
    }

    /// Fetch a database. Selectors set on the client take precedence over arguments.
    pub async fn lookup_database(
        &self,
        resource_group: Option<&str>,
        server_name: Option<&str>,
        database_name: Option<&str>,
    ) -> Result<Database, AzureSqlError> {
        let resource_group = resolve(
            self.resource_group_name(),
            resource_group,
            "resource group name",
        )?;
        let server_name = resolve(self.server_name(), server_name, "server name")?;
        let database_name = resolve(self.database_name(), database_name, "database name")?;
        self.management
            .get_database(&resource_group, &server_name, &database_name)
            .await
    }

    /// All databases on a server, with the same selector precedence.
    pub async fn list_databases(
        &self,
        resource_group: Option<&str>,
        server_name: Option<&str>,
    ) -> Result<Vec<Database>, AzureSqlError> {
        let resource_group = resolve(
            self.resource_group_name(),
            resource_group,
            "resource group name",
        )?;
        let server_name = resolve(self.server_name(), server_name, "server name")?;
        self.management
            .list_databases(&resource_group, &server_name)
            .await
    }

    /// Open a session on `{server}.database.windows.net,1433` and a cursor on it.
    ///
    /// A transient connect failure is retried once after two seconds; any
    /// other failure, or a second transient one, is returned. A previously
    /// open session is released first.
    pub async fn connect(
        &mut self,
        server: &str,
        database: &str,
        driver: Option<&str>,
    ) -> Result<&D::Connection, AzureSqlError> {
        let driver_name = driver.or(self.database.driver.as_deref());
        let conn_str = connection_string(
            driver_name,
            server,
            database,
            &self.database.username,
            &self.database.password,
        );

        info!(
            host = %server_host(server),
            database,
            "Connecting to Azure SQL database"
        );

        let backend = &self.driver;
        let conn_str = conn_str.as_str();
        let connection = (move || async move {
            backend.connect(conn_str).await.map_err(AzureSqlError::from)
        })
        .retry(connect_retry_policy())
        .when(|e: &AzureSqlError| e.is_transient())
        .notify(|err: &AzureSqlError, dur: Duration| {
            warn!("Database connect failed with {}, retrying in {:?}", err, dur);
        })
        .await?;

        if let Some(mut previous) = self.session.take()
            && let Err(e) = previous.release()
        {
            warn!(error = %e, "releasing previous session failed");
        }

        let session = Session::open(connection)?;
        info!(database, "Database session open");
        self.session = Some(session);

        self.connection().ok_or(AzureSqlError::NotConnected)
    }

    /// Commit, close the cursor, close the connection.
    ///
    /// Calling this again after a release returns
    /// [`ReleaseOutcome::AlreadyReleased`] without touching the driver.
    pub fn close(&mut self) -> Result<ReleaseOutcome, AzureSqlError> {
        let session = self.session.as_mut().ok_or(AzureSqlError::NotConnected)?;
        Ok(session.release()?)
    }

    /// True while a session is open and not yet released.
    pub fn has_session(&self) -> bool {
        self.session.as_ref().is_some_and(|s| !s.is_released())
    }

    pub fn connection(&self) -> Option<&D::Connection> {
        self.session.as_ref().and_then(Session::connection)
    }

    pub fn cursor(&self) -> Option<&<D::Connection as DriverConnection>::Cursor> {
        self.session.as_ref().and_then(Session::cursor)
    }

    pub fn cursor_mut(&mut self) -> Option<&mut <D::Connection as DriverConnection>::Cursor> {
        self.session.as_mut().and_then(Session::cursor_mut)
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }
}

impl<D: Driver> fmt::Display for AzureSqlClient<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<AzureSqlClient (connected={}, authorized={})>",
            self.connected, self.authenticated
        )
    }
}

/// A non-empty selector wins over the argument.
fn resolve(
    selector: Option<&str>,
    argument: Option<&str>,
    what: &'static str,
) -> Result<String, AzureSqlError> {
    selector
        .filter(|s| !s.is_empty())
        .or(argument)
        .map(str::to_owned)
        .ok_or(AzureSqlError::MissingSelector(what))
}

#[cfg(test)]
mod tests {
    use super::*;
    use backon::BackoffBuilder;

    #[test]
    fn selector_beats_argument() {
        assert_eq!(resolve(Some("set"), Some("arg"), "server name").unwrap(), "set");
        assert_eq!(resolve(None, Some("arg"), "server name").unwrap(), "arg");
        assert_eq!(resolve(Some(""), Some("arg"), "server name").unwrap(), "arg");
    }

    #[test]
    fn missing_everywhere_is_an_error() {
        let err = resolve(None, None, "database name").unwrap_err();
        assert!(matches!(err, AzureSqlError::MissingSelector("database name")));
        assert_eq!(err.to_string(), "No database name given and none set on the client");
    }

    #[test]
    fn retry_policy_is_one_fixed_pause() {
        let delays: Vec<Duration> = connect_retry_policy().build().collect();
        assert_eq!(delays, vec![Duration::from_secs(2)]);
    }
}
