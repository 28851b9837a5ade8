use chrono::{DateTime, Utc};
use oauth2::basic::BasicErrorResponseType;
use oauth2::reqwest::Error as ReqwestClientError;
use oauth2::{HttpClientError, RequestTokenError, StandardErrorResponse};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error as ThisError;

use crate::driver::DriverError;

#[derive(Debug, ThisError)]
pub enum AzureSqlError {
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("OAuth2 token request error: {0}")]
    Oauth2Token(String),

    #[error("OAuth2 server error: {error}")]
    Oauth2Server {
        error: String,
        description: Option<String>,
    },

    #[error("Access token expired at {expired_at}; build a new client")]
    CredentialExpired { expired_at: DateTime<Utc> },

    #[error("No {0} given and none set on the client")]
    MissingSelector(&'static str),

    #[error("Management API error ({status}): {code}: {message}")]
    Management {
        status: StatusCode,
        code: String,
        message: String,
    },

    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("No open database session")]
    NotConnected,
}

impl AzureSqlError {
    /// Connection-level failures worth one more attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, AzureSqlError::Driver(e) if e.is_transient())
    }

    pub fn is_not_found(&self) -> bool {
        self.management_status() == Some(StatusCode::NOT_FOUND)
    }

    pub fn is_forbidden(&self) -> bool {
        self.management_status() == Some(StatusCode::FORBIDDEN)
    }

    pub fn management_status(&self) -> Option<StatusCode> {
        match self {
            AzureSqlError::Management { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Builds a `Management` error from a failed ARM response body.
    pub(crate) fn from_arm_response(status: StatusCode, body: &str) -> Self {
        match serde_json::from_str::<ArmError>(body) {
            Ok(arm) => AzureSqlError::Management {
                status,
                code: arm.error.code,
                message: arm.error.message,
            },
            Err(_) => AzureSqlError::Management {
                status,
                code: String::new(),
                message: body.trim().to_string(),
            },
        }
    }
}

impl From<figment::Error> for AzureSqlError {
    fn from(e: figment::Error) -> Self {
        AzureSqlError::Config(Box::new(e))
    }
}

impl
    From<
        RequestTokenError<
            HttpClientError<ReqwestClientError>,
            StandardErrorResponse<BasicErrorResponseType>,
        >,
    > for AzureSqlError
{
    fn from(
        e: RequestTokenError<
            HttpClientError<ReqwestClientError>,
            StandardErrorResponse<BasicErrorResponseType>,
        >,
    ) -> Self {
        match e {
            RequestTokenError::ServerResponse(err) => AzureSqlError::Oauth2Server {
                error: err.error().to_string(),
                description: err.error_description().cloned(),
            },
            RequestTokenError::Request(req_e) => {
                AzureSqlError::Oauth2Token(format!("request failed: {}", req_e))
            }
            RequestTokenError::Parse(parse_err, _body) => {
                AzureSqlError::Json(parse_err.into_inner())
            }
            RequestTokenError::Other(s) => AzureSqlError::Oauth2Token(s),
        }
    }
}

/// ARM error envelope.
#[derive(Deserialize, Debug)]
pub struct ArmError {
    pub error: ArmErrorBody,
}

#[derive(Deserialize, Debug)]
pub struct ArmErrorBody {
    pub code: String,
    pub message: String,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}
