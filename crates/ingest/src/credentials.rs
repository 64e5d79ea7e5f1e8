//! Service-account authentication for the Google Sheets API.
//!
//! The credential file is the JSON key downloaded from the cloud console.
//! We sign a short-lived RS256 assertion with its private key and trade it
//! for a bearer token at `token_uri` (the OAuth2 JWT-bearer grant).

use std::path::Path;

use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SourceError};

pub const SPREADSHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

impl ServiceAccountKey {
    pub async fn from_file(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path).await.map_err(|e| {
            SourceError::Auth(format!("cannot read credentials {:?}: {}", path, e))
        })?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| SourceError::Auth(format!("invalid service account key: {}", e)))
    }

    fn signed_assertion(&self, scope: &str) -> Result<String> {
        let now = Utc::now();
        let claims = AssertionClaims {
            iss: &self.client_email,
            scope,
            aud: &self.token_uri,
            iat: now.timestamp(),
            exp: (now + Duration::hours(1)).timestamp(),
        };

        let key = EncodingKey::from_rsa_pem(self.private_key.as_bytes())
            .map_err(|e| SourceError::Auth(format!("invalid private key: {}", e)))?;

        encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| SourceError::Auth(format!("failed to sign assertion: {}", e)))
    }

    /// Exchange a signed assertion for an access token with the given scope.
    pub async fn fetch_access_token(&self, client: &reqwest::Client, scope: &str) -> Result<String> {
        let assertion = self.signed_assertion(scope)?;

        let response = client
            .post(&self.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        // The token endpoint answers 400 invalid_grant for revoked or unknown keys
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Auth(format!("token exchange failed {}: {}", status, body)));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Auth(format!("malformed token response: {}", e)))?;

        debug!(client_email = %self.client_email, "Obtained spreadsheet access token");
        Ok(token.access_token)
    }
}
