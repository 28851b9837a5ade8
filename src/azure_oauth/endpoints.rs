use crate::config::{CloudConfig, IdentityConfig};
use crate::error::AzureSqlError;

use oauth2::{
    AuthType, ClientId, ClientSecret, EndpointNotSet, EndpointSet, Scope, TokenUrl,
    basic::{BasicClient, BasicTokenResponse},
};
use tracing::info;

/// Stateless Azure AD token endpoint.
pub(super) struct AzureOauthEndpoints;

impl AzureOauthEndpoints {
    /// Client-credentials grant for the resource manager scope.
    pub(super) async fn request_token(
        identity: &IdentityConfig,
        cloud: &CloudConfig,
        http_client: &reqwest::Client,
    ) -> Result<BasicTokenResponse, AzureSqlError> {
        let client = build_oauth2_client(identity, cloud)?;
        let token = client
            .exchange_client_credentials()
            .add_scope(Scope::new(management_scope(cloud)))
            .request_async(http_client)
            .await?;
        info!(
            tenant_id = %identity.tenant_id,
            client_id = %identity.client_id,
            "Access token acquired"
        );
        Ok(token)
    }
}

fn build_oauth2_client(
    identity: &IdentityConfig,
    cloud: &CloudConfig,
) -> Result<AzureOauth2Client, AzureSqlError> {
    let client = BasicClient::new(ClientId::new(identity.client_id.clone()))
        .set_client_secret(ClientSecret::new(identity.client_secret.clone()))
        .set_auth_type(AuthType::RequestBody)
        .set_token_uri(TokenUrl::new(token_url(cloud, &identity.tenant_id))?);
    Ok(client)
}

/// `{authority}/{tenant}/oauth2/v2.0/token`
pub(super) fn token_url(cloud: &CloudConfig, tenant_id: &str) -> String {
    format!(
        "{}/{}/oauth2/v2.0/token",
        cloud.authority_host.trim_end_matches('/'),
        tenant_id
    )
}

pub(super) fn management_scope(cloud: &CloudConfig) -> String {
    format!("{}/.default", cloud.resource_manager.trim_end_matches('/'))
}

pub(super) type AzureOauth2Client =
    BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;
