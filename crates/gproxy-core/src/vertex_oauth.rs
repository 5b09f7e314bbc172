//! Out-of-band OAuth2 token minting for vertex engines (spec.md §4.F: "for
//! engines requiring OAuth2 ... the translator is permitted to make
//! out-of-band calls to mint tokens; these must be cached with expiry").
//!
//! Grounded on the teacher's service-account JWT-bearer flow
//! (`gproxy-provider-impl/src/providers/vertex/oauth.rs`), simplified to a
//! single cache keyed by service-account email instead of a
//! credential-pool-wide cache.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccount {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: String,
    #[serde(default)]
    pub token_uri: Option<String>,
}

#[derive(Debug, Serialize)]
struct JwtClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    exp: i64,
    iat: i64,
}

#[derive(Debug, Deserialize)]
struct OAuthTokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, thiserror::Error)]
pub enum VertexOAuthError {
    #[error("invalid service account private key: {0}")]
    Key(#[from] jsonwebtoken::errors::Error),
    #[error("token exchange request failed: {0}")]
    Request(String),
    #[error("token exchange returned {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[derive(Default)]
pub struct VertexTokenCache {
    entries: Mutex<HashMap<String, (String, i64)>>,
}

impl VertexTokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a cached token with at least 60s of remaining life, minting
    /// a fresh one via the JWT-bearer grant otherwise.
    pub async fn access_token(
        &self,
        client: &wreq::Client,
        sa: &ServiceAccount,
    ) -> Result<String, VertexOAuthError> {
        let now = now_secs();
        if let Some((token, exp)) = self.cached(&sa.client_email)
            && now + 60 < exp
        {
            return Ok(token);
        }

        let token_uri = sa.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI);
        let exp = now + 3600;
        let claims = JwtClaims {
            iss: &sa.client_email,
            scope: DEFAULT_SCOPE,
            aud: token_uri,
            exp,
            iat: now,
        };
        let mut header = Header::new(Algorithm::RS256);
        if !sa.private_key_id.trim().is_empty() {
            header.kid = Some(sa.private_key_id.clone());
        }
        let key = EncodingKey::from_rsa_pem(sa.private_key.as_bytes())?;
        let jwt = jsonwebtoken::encode(&header, &claims, &key)?;

        let body = format!(
            "grant_type=urn:ietf:params:oauth:grant-type:jwt-bearer&assertion={}",
            urlencoding::encode(&jwt)
        );
        let resp = client
            .post(token_uri)
            .header("content-type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|err| VertexOAuthError::Request(err.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(VertexOAuthError::Rejected {
                status: status.as_u16(),
                body: text,
            });
        }
        let parsed: OAuthTokenResponse = resp
            .json()
            .await
            .map_err(|err| VertexOAuthError::Request(err.to_string()))?;
        let expires_at = now + parsed.expires_in.unwrap_or(3600);

        self.entries
            .lock()
            .expect("vertex token cache mutex poisoned")
            .insert(sa.client_email.clone(), (parsed.access_token.clone(), expires_at));

        Ok(parsed.access_token)
    }

    fn cached(&self, email: &str) -> Option<(String, i64)> {
        self.entries
            .lock()
            .expect("vertex token cache mutex poisoned")
            .get(email)
            .cloned()
    }
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_starts_empty() {
        let cache = VertexTokenCache::new();
        assert!(cache.cached("a@b.iam.gserviceaccount.com").is_none());
    }
}
