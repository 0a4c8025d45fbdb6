//! Google API credentials.
//!
//! Service accounts authenticate with a self-signed RS256 JWT assertion that
//! is exchanged for a short-lived OAuth access token. Tokens are cached and
//! refreshed shortly before they expire.

use std::fmt;
use std::path::Path;

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use urlencoding::encode;

use super::google::api_error;
use super::SheetsError;
use crate::util::unix_timestamp_now;

const SPREADSHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

/// The fields of a Google service account key file used for token exchange
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key", &"[REDACTED]")
            .field("private_key_id", &self.private_key_id)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// How requests to the Sheets API are authorized
pub enum Credentials {
    /// Service account key; access tokens are minted and cached on demand
    ServiceAccount(ServiceAccountAuth),
    /// Pre-issued bearer token (local development)
    StaticToken(String),
}

impl fmt::Debug for Credentials {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServiceAccount(auth) => formatter
                .debug_tuple("ServiceAccount")
                .field(&auth.key)
                .finish(),
            Self::StaticToken(_) => formatter
                .debug_tuple("StaticToken")
                .field(&"[REDACTED]")
                .finish(),
        }
    }
}

impl Credentials {
    /// Load a service account key file (the JSON downloaded from the cloud console).
    pub fn from_service_account_file(path: impl AsRef<Path>) -> Result<Self, SheetsError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|error| {
            SheetsError::Credentials(format!(
                "cannot read service account file {}: {error}",
                path.display()
            ))
        })?;
        Self::from_service_account_json(&raw)
    }

    /// Parse a service account key from its JSON text.
    pub fn from_service_account_json(raw: &str) -> Result<Self, SheetsError> {
        let key: ServiceAccountKey = serde_json::from_str(raw).map_err(|error| {
            SheetsError::Credentials(format!("invalid service account JSON: {error}"))
        })?;
        Ok(Self::ServiceAccount(ServiceAccountAuth::new(key)?))
    }

    /// Use a fixed bearer token.
    pub fn static_token(token: impl Into<String>) -> Result<Self, SheetsError> {
        let token = token.into().trim().to_string();
        if token.is_empty() {
            return Err(SheetsError::Credentials(
                "access token must not be empty".to_string(),
            ));
        }
        Ok(Self::StaticToken(token))
    }

    /// A bearer token valid for at least the refresh margin.
    pub async fn access_token(&self, http: &reqwest::Client) -> Result<String, SheetsError> {
        match self {
            Self::ServiceAccount(auth) => auth.access_token(http).await,
            Self::StaticToken(token) => Ok(token.clone()),
        }
    }
}

/// Service account token source with an in-process cache
pub struct ServiceAccountAuth {
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
    cached: Mutex<Option<CachedToken>>,
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    expires_at: i64,
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl ServiceAccountAuth {
    pub fn new(key: ServiceAccountKey) -> Result<Self, SheetsError> {
        if key.client_email.trim().is_empty() {
            return Err(SheetsError::Credentials(
                "service account client_email must not be empty".to_string(),
            ));
        }
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|error| SheetsError::Credentials(format!("invalid private key: {error}")))?;
        Ok(Self {
            key,
            encoding_key,
            cached: Mutex::new(None),
        })
    }

    async fn access_token(&self, http: &reqwest::Client) -> Result<String, SheetsError> {
        let mut cached = self.cached.lock().await;
        let now = unix_timestamp_now();
        if let Some(token) = cached.as_ref() {
            if token.expires_at - TOKEN_REFRESH_MARGIN_SECS > now {
                return Ok(token.token.clone());
            }
        }

        let fresh = self.exchange(http, now).await?;
        tracing::debug!(
            client_email = %self.key.client_email,
            expires_at = fresh.expires_at,
            "Minted Sheets access token"
        );
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }

    fn assertion(&self, now: i64) -> Result<String, SheetsError> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid.clone_from(&self.key.private_key_id);
        let claims = AssertionClaims {
            iss: &self.key.client_email,
            scope: SPREADSHEETS_SCOPE,
            aud: &self.key.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        jsonwebtoken::encode(&header, &claims, &self.encoding_key)
            .map_err(|error| SheetsError::Credentials(format!("cannot sign assertion: {error}")))
    }

    async fn exchange(&self, http: &reqwest::Client, now: i64) -> Result<CachedToken, SheetsError> {
        let assertion = self.assertion(now)?;
        let body = format!(
            "grant_type={}&assertion={}",
            encode(JWT_BEARER_GRANT),
            encode(&assertion)
        );

        let response = http
            .post(&self.key.token_uri)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .header("Accept", "application/json")
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status, &body, "token exchange"));
        }

        let payload = response
            .json::<TokenResponse>()
            .await
            .map_err(|error| SheetsError::InvalidResponse(format!("token response: {error}")))?;

        Ok(CachedToken {
            token: payload.access_token,
            expires_at: now.saturating_add(payload.expires_in.unwrap_or(ASSERTION_LIFETIME_SECS)),
        })
    }
}
