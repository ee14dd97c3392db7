//! HMRC OAuth 2.0 authorisation-code flow.
//!
//! Tracks users between the redirect to HMRC and the callback, and calls
//! the token endpoint for code exchange and refresh.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Deserialize;
use tracing::debug;

use crate::config::MtdConfig;
use crate::error::{MtdError, MtdResult};
use crate::models::OAuthTokenRecord;

/// Scopes needed to read obligations and file updates.
pub const SCOPES: &str = "read:self-assessment write:self-assessment";

/// How long a user has to grant access on HMRC's site.
const CONNECT_WINDOW: Duration = Duration::from_secs(600);

// =============================================================================
// Connect requests
// =============================================================================

/// A user who has been sent to HMRC and not yet come back.
struct ConnectAttempt {
    user_id: String,
    started: Instant,
}

impl ConnectAttempt {
    fn is_live(&self) -> bool {
        self.started.elapsed() <= CONNECT_WINDOW
    }
}

/// Connect attempts in flight, keyed by the `state` nonce sent to HMRC.
///
/// A nonce is single use: the callback consumes it whether or not it then
/// matches the calling user.
#[derive(Default)]
pub struct ConnectAttempts {
    by_nonce: DashMap<String, ConnectAttempt>,
}

impl ConnectAttempts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new attempt for `user_id` and return its nonce.
    pub fn start(&self, user_id: &str) -> String {
        self.by_nonce.retain(|_, attempt| attempt.is_live());
        let nonce = connect_nonce();
        self.by_nonce.insert(
            nonce.clone(),
            ConnectAttempt {
                user_id: user_id.to_string(),
                started: Instant::now(),
            },
        );
        nonce
    }

    /// Consume `nonce` on the callback for `user_id`.
    pub fn finish(&self, nonce: &str, user_id: &str) -> MtdResult<()> {
        let attempt = self
            .by_nonce
            .remove(nonce)
            .map(|(_, attempt)| attempt)
            .filter(ConnectAttempt::is_live)
            .ok_or_else(|| {
                MtdError::Validation("Unknown or expired HMRC connect request".into())
            })?;
        if attempt.user_id != user_id {
            return Err(MtdError::Validation(
                "HMRC connect request was started by another user".into(),
            ));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.by_nonce.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_nonce.is_empty()
    }

    #[cfg(test)]
    fn backdate(&self, nonce: &str, by: Duration) {
        if let Some(mut attempt) = self.by_nonce.get_mut(nonce)
            && let Some(earlier) = attempt.started.checked_sub(by)
        {
            attempt.started = earlier;
        }
    }
}

fn connect_nonce() -> String {
    use base64::Engine;
    use rand::RngCore;

    let mut bytes = [0u8; 24];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

// =============================================================================
// Token endpoint
// =============================================================================

/// Response from HMRC's token endpoint.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub expires_in: i64,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
}

fn default_token_type() -> String {
    "bearer".into()
}

impl TokenResponse {
    /// Build the stored record. HMRC rotates refresh tokens, but if a
    /// response omits one the previous token stays in use.
    pub fn into_record(
        self,
        now: DateTime<Utc>,
        previous_refresh_token: Option<&str>,
    ) -> MtdResult<OAuthTokenRecord> {
        let refresh_token = self
            .refresh_token
            .or_else(|| previous_refresh_token.map(str::to_string))
            .ok_or_else(|| {
                MtdError::Authentication("HMRC did not return a refresh token".into())
            })?;
        Ok(OAuthTokenRecord {
            access_token: self.access_token,
            refresh_token,
            expires_at: now + chrono::Duration::seconds(self.expires_in),
            token_type: self.token_type,
            scope: self.scope.unwrap_or_else(|| SCOPES.into()),
        })
    }
}

/// Talks to HMRC's `/oauth/*` endpoints.
#[derive(Clone)]
pub struct OAuthClient {
    http: reqwest::Client,
    base_url: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl OAuthClient {
    pub fn new(http: reqwest::Client, config: &MtdConfig) -> Self {
        Self {
            http,
            base_url: config.api_base_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
        }
    }

    /// URL the user is redirected to for granting access.
    pub fn authorize_url(&self, state: &str) -> MtdResult<String> {
        let mut url = url::Url::parse(&format!("{}/oauth/authorize", self.base_url))
            .map_err(|e| MtdError::Internal(format!("Invalid HMRC base URL: {e}")))?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("scope", SCOPES)
            .append_pair("state", state)
            .append_pair("redirect_uri", &self.redirect_uri);
        Ok(url.into())
    }

    pub async fn exchange_code(&self, code: &str) -> MtdResult<TokenResponse> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];
        self.token_request(&params, "Token exchange").await
    }

    pub async fn refresh(&self, refresh_token: &str) -> MtdResult<TokenResponse> {
        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
        ];
        self.token_request(&params, "Token refresh").await
    }

    async fn token_request(
        &self,
        params: &[(&str, &str)],
        what: &str,
    ) -> MtdResult<TokenResponse> {
        let url = format!("{}/oauth/token", self.base_url);
        debug!(url = %url, "{what}");

        let resp = self
            .http
            .post(&url)
            .form(params)
            .send()
            .await
            .map_err(|e| MtdError::Authentication(format!("{what} failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(MtdError::Authentication(format!(
                "{what} HTTP {status}: {body}"
            )));
        }

        resp.json::<TokenResponse>()
            .await
            .map_err(|e| MtdError::Authentication(format!("{what} parse error: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;

    #[test]
    fn connect_nonces_are_unique() {
        let attempts = ConnectAttempts::new();
        let a = attempts.start("u1");
        let b = attempts.start("u1");
        assert_ne!(a, b);
        assert!(a.len() >= 20);
        assert_eq!(attempts.len(), 2);
    }

    #[test]
    fn finishing_consumes_the_nonce() {
        let attempts = ConnectAttempts::new();
        let nonce = attempts.start("u1");

        let err = attempts.finish(&nonce, "u2").unwrap_err();
        assert!(matches!(err, MtdError::Validation(ref m) if m.contains("another user")));
        // Consumed by the failed attempt.
        assert!(attempts.finish(&nonce, "u1").is_err());

        let nonce = attempts.start("u1");
        attempts.finish(&nonce, "u1").unwrap();
        assert!(attempts.is_empty());
    }

    #[test]
    fn lapsed_attempts_are_refused_and_swept() {
        let attempts = ConnectAttempts::new();
        let lapsed = attempts.start("u1");
        attempts.backdate(&lapsed, Duration::from_secs(700));
        assert!(attempts.finish(&lapsed, "u1").is_err());

        let lapsed = attempts.start("u1");
        attempts.backdate(&lapsed, Duration::from_secs(700));
        let kept = attempts.start("u2");
        assert_eq!(attempts.len(), 1);
        attempts.finish(&kept, "u2").unwrap();
    }

    #[test]
    fn authorize_url_carries_scopes_and_state() {
        let cfg = MtdConfig::for_base_url(Environment::Sandbox, "https://test-api.service.hmrc.gov.uk");
        let client = OAuthClient::new(reqwest::Client::new(), &cfg);
        let url = url::Url::parse(&client.authorize_url("abc").unwrap()).unwrap();
        assert_eq!(url.path(), "/oauth/authorize");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("scope".into(), SCOPES.into())));
        assert!(pairs.contains(&("state".into(), "abc".into())));
        assert!(pairs.contains(&("client_id".into(), "test-client-id".into())));
    }

    #[test]
    fn missing_refresh_token_keeps_previous() {
        let now = Utc::now();
        let resp = TokenResponse {
            access_token: "new-access".into(),
            token_type: "bearer".into(),
            expires_in: 14400,
            refresh_token: None,
            scope: None,
        };
        let record = resp.into_record(now, Some("old-refresh")).unwrap();
        assert_eq!(record.refresh_token, "old-refresh");
        assert_eq!(record.expires_at, now + chrono::Duration::seconds(14400));
        assert_eq!(record.scope, SCOPES);
    }
}
