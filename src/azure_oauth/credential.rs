use super::endpoints::AzureOauthEndpoints;
use crate::config::{CloudConfig, IdentityConfig};
use crate::error::AzureSqlError;

use chrono::{DateTime, TimeDelta, Utc};
use oauth2::{AccessToken, TokenResponse};

/// Service principal access token for the resource manager.
///
/// Acquired once; there is no refresh. Once expired, management calls fail
/// with [`AzureSqlError::CredentialExpired`].
#[derive(Debug, Clone)]
pub struct AzureCredential {
    tenant_id: String,
    client_id: String,
    access_token: AccessToken,
    expires_at: DateTime<Utc>,
}

impl AzureCredential {
    /// Exchange the service principal secret for an access token.
    pub async fn acquire(
        identity: &IdentityConfig,
        cloud: &CloudConfig,
        http_client: &reqwest::Client,
    ) -> Result<Self, AzureSqlError> {
        let token = AzureOauthEndpoints::request_token(identity, cloud, http_client).await?;
        let lifetime = token
            .expires_in()
            .and_then(|d| TimeDelta::from_std(d).ok())
            .unwrap_or_else(|| TimeDelta::hours(1));

        Ok(Self {
            tenant_id: identity.tenant_id.clone(),
            client_id: identity.client_id.clone(),
            access_token: token.access_token().clone(),
            expires_at: Utc::now() + lifetime,
        })
    }

    /// Wrap a token obtained elsewhere.
    pub fn from_token(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        access_token: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            access_token: AccessToken::new(access_token.into()),
            expires_at,
        }
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Token to send as `Authorization: Bearer`, if still valid.
    pub fn bearer_token(&self) -> Result<&str, AzureSqlError> {
        if self.is_expired() {
            return Err(AzureSqlError::CredentialExpired {
                expired_at: self.expires_at,
            });
        }
        Ok(self.access_token.secret().as_str())
    }
}
