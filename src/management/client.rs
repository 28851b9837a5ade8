use super::models::{Database, Page, Server};
use crate::azure_oauth::AzureCredential;
use crate::config::CloudConfig;
use crate::error::AzureSqlError;

use reqwest::header::ACCEPT;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};
use url::Url;

/// Read-only client for the ARM `Microsoft.Sql` provider.
#[derive(Debug, Clone)]
pub struct SqlManagementClient {
    credential: AzureCredential,
    subscription_id: String,
    endpoint: Url,
    api_version: String,
    http_client: reqwest::Client,
}

impl SqlManagementClient {
    pub fn new(
        credential: AzureCredential,
        subscription_id: impl Into<String>,
        cloud: &CloudConfig,
        http_client: reqwest::Client,
    ) -> Result<Self, AzureSqlError> {
        let endpoint = Url::parse(&cloud.resource_manager)?;
        if endpoint.cannot_be_a_base() {
            return Err(AzureSqlError::UrlParse(
                url::ParseError::RelativeUrlWithCannotBeABaseBase,
            ));
        }
        Ok(Self {
            credential,
            subscription_id: subscription_id.into(),
            endpoint,
            api_version: cloud.api_version.clone(),
            http_client,
        })
    }

    pub fn credential(&self) -> &AzureCredential {
        &self.credential
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    pub async fn get_server(
        &self,
        resource_group: &str,
        server_name: &str,
    ) -> Result<Server, AzureSqlError> {
        let url = self.resource_url(&[resource_group], &[server_name]);
        let server: Server = self.get_json(url).await?;
        info!(resource_group, server = %server.name, "Fetched SQL server");
        Ok(server)
    }

    pub async fn get_database(
        &self,
        resource_group: &str,
        server_name: &str,
        database_name: &str,
    ) -> Result<Database, AzureSqlError> {
        let url = self.resource_url(
            &[resource_group],
            &[server_name, "databases", database_name],
        );
        let database: Database = self.get_json(url).await?;
        info!(
            resource_group,
            server = server_name,
            database = %database.name,
            "Fetched SQL database"
        );
        Ok(database)
    }

    /// Every database on the server, following `nextLink` pages.
    pub async fn list_databases(
        &self,
        resource_group: &str,
        server_name: &str,
    ) -> Result<Vec<Database>, AzureSqlError> {
        let mut url = self.resource_url(&[resource_group], &[server_name, "databases"]);
        let mut databases = Vec::new();
        loop {
            let page: Page<Database> = self.get_json(url.clone()).await?;
            databases.extend(page.value);
            match page.next_link {
                Some(next) if next != url.as_str() => url = Url::parse(&next)?,
                Some(_) => {
                    warn!(url = %url, "nextLink points at the current page; stopping");
                    break;
                }
                None => break,
            }
        }
        info!(
            resource_group,
            server = server_name,
            count = databases.len(),
            "Listed SQL databases"
        );
        Ok(databases)
    }

    /// `{endpoint}/subscriptions/{sub}/resourceGroups/{rg}/providers/Microsoft.Sql/servers/{..}`
    fn resource_url(&self, resource_group: &[&str], server_path: &[&str]) -> Url {
        let mut url = self.endpoint.clone();
        // Checked in `new`.
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["subscriptions", self.subscription_id.as_str(), "resourceGroups"])
                .extend(resource_group)
                .extend(["providers", "Microsoft.Sql", "servers"])
                .extend(server_path);
        }
        url.query_pairs_mut()
            .append_pair("api-version", &self.api_version);
        url
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, AzureSqlError> {
        let token = self.credential.bearer_token()?;
        debug!(url = %url, "Management API GET");
        let resp = self
            .http_client
            .get(url.clone())
            .bearer_auth(token)
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = match resp.text().await {
                Ok(body) => body,
                Err(e) => {
                    warn!(%status, error = %e, "failed to read management error body");
                    String::new()
                }
            };
            warn!(%status, url = %url, "Management API request failed");
            return Err(AzureSqlError::from_arm_response(status, &body));
        }
        Ok(resp.json::<T>().await?)
    }
}
