//! Token store & refresher.
//!
//! Hands out access tokens that are valid for the next call. Tokens close
//! to expiry are refreshed first; concurrent callers for the same user share
//! one refresh.

pub mod oauth;

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::error::{MtdError, MtdResult};
use crate::keyed_lock::KeyedLocks;
use crate::models::AccessToken;
use crate::store::TokenRepository;

pub use oauth::{ConnectAttempts, OAuthClient, SCOPES, TokenResponse};

pub struct TokenManager {
    repo: Arc<dyn TokenRepository>,
    oauth: OAuthClient,
    threshold: chrono::Duration,
    refresh_locks: KeyedLocks<String>,
    connecting: ConnectAttempts,
}

impl TokenManager {
    pub fn new(
        repo: Arc<dyn TokenRepository>,
        oauth: OAuthClient,
        threshold: chrono::Duration,
    ) -> Self {
        Self {
            repo,
            oauth,
            threshold,
            refresh_locks: KeyedLocks::new(),
            connecting: ConnectAttempts::new(),
        }
    }

    /// A token that will not expire within the refresh threshold.
    ///
    /// A failed refresh leaves the stored record untouched and reports
    /// `Authentication`; the user has to reconnect.
    pub async fn get_valid_token(&self, user_id: &str) -> MtdResult<AccessToken> {
        let record = self.load(user_id).await?;
        if !record.needs_refresh(Utc::now(), self.threshold) {
            return Ok(record.access_token());
        }

        let _guard = self.refresh_locks.acquire(user_id.to_string()).await;

        // Whoever held the lock before us may already have refreshed.
        let record = self.load(user_id).await?;
        if !record.needs_refresh(Utc::now(), self.threshold) {
            return Ok(record.access_token());
        }

        let response = match self.oauth.refresh(&record.refresh_token).await {
            Ok(r) => r,
            Err(e) => {
                warn!(user_id, error = %e, "HMRC token refresh refused");
                return Err(MtdError::Authentication(
                    "Your HMRC connection has expired. Please reconnect.".into(),
                ));
            }
        };
        let refreshed = response.into_record(Utc::now(), Some(&record.refresh_token))?;
        self.repo.save_token(user_id, &refreshed).await?;
        info!(user_id, expires_at = %refreshed.expires_at, "HMRC token refreshed");

        Ok(refreshed.access_token())
    }

    async fn load(&self, user_id: &str) -> MtdResult<crate::models::OAuthTokenRecord> {
        self.repo.load_token(user_id).await?.ok_or_else(|| {
            MtdError::Authentication("No HMRC connection. Please connect your account.".into())
        })
    }

    /// Start the connect flow; returns the URL to redirect the user to.
    pub fn begin_authorization(&self, user_id: &str) -> MtdResult<String> {
        let nonce = self.connecting.start(user_id);
        self.oauth.authorize_url(&nonce)
    }

    /// Finish the connect flow. Replaces any existing record for the user.
    pub async fn complete_authorization(
        &self,
        user_id: &str,
        state: &str,
        code: &str,
    ) -> MtdResult<()> {
        self.connecting.finish(state, user_id)?;

        let record = self
            .oauth
            .exchange_code(code)
            .await?
            .into_record(Utc::now(), None)?;
        self.repo.save_token(user_id, &record).await?;
        info!(user_id, "HMRC account connected");
        Ok(())
    }

    /// Forget the user's tokens. Returns whether a connection existed.
    pub async fn disconnect(&self, user_id: &str) -> MtdResult<bool> {
        let removed = self.repo.delete_token(user_id).await?;
        if removed {
            info!(user_id, "HMRC account disconnected");
        }
        Ok(removed)
    }

    pub async fn is_connected(&self, user_id: &str) -> MtdResult<bool> {
        Ok(self.repo.load_token(user_id).await?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Environment, MtdConfig};
    use crate::models::OAuthTokenRecord;
    use crate::store::MemoryStore;
    use httpmock::prelude::*;

    fn manager(server: &MockServer, store: Arc<MemoryStore>) -> TokenManager {
        let cfg = MtdConfig::for_base_url(Environment::Sandbox, server.base_url());
        TokenManager::new(
            store,
            OAuthClient::new(reqwest::Client::new(), &cfg),
            cfg.token_refresh_threshold,
        )
    }

    fn record(access: &str, expires_in_secs: i64) -> OAuthTokenRecord {
        OAuthTokenRecord {
            access_token: access.into(),
            refresh_token: "refresh-1".into(),
            expires_at: Utc::now() + chrono::Duration::seconds(expires_in_secs),
            token_type: "bearer".into(),
            scope: SCOPES.into(),
        }
    }

    #[tokio::test]
    async fn missing_record_is_an_authentication_error() {
        let server = MockServer::start_async().await;
        let tm = manager(&server, Arc::new(MemoryStore::new()));
        let err = tm.get_valid_token("nobody").await.unwrap_err();
        assert!(matches!(err, MtdError::Authentication(_)));
    }

    #[tokio::test]
    async fn fresh_token_skips_refresh() {
        let server = MockServer::start_async().await;
        let refresh = server
            .mock_async(|when, then| {
                when.method(POST).path("/oauth/token");
                then.status(200);
            })
            .await;
        let store = Arc::new(MemoryStore::new());
        store.save_token("u1", &record("live", 3600)).await.unwrap();

        let token = manager(&server, store).get_valid_token("u1").await.unwrap();
        assert_eq!(token.as_str(), "live");
        refresh.assert_calls_async(0).await;
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_and_persisted() {
        let server = MockServer::start_async().await;
        let refresh = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/oauth/token")
                    .body_includes("grant_type=refresh_token")
                    .body_includes("refresh_token=refresh-1");
                then.status(200).json_body(serde_json::json!({
                    "access_token": "rotated",
                    "refresh_token": "refresh-2",
                    "expires_in": 14400,
                    "token_type": "bearer",
                    "scope": SCOPES
                }));
            })
            .await;
        let store = Arc::new(MemoryStore::new());
        store.save_token("u1", &record("stale", -60)).await.unwrap();

        let token = manager(&server, store.clone())
            .get_valid_token("u1")
            .await
            .unwrap();
        assert_eq!(token.as_str(), "rotated");
        refresh.assert_async().await;

        let saved = store.load_token("u1").await.unwrap().unwrap();
        assert_eq!(saved.access_token, "rotated");
        assert_eq!(saved.refresh_token, "refresh-2");
    }

    #[tokio::test]
    async fn refused_refresh_leaves_record_untouched() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/oauth/token");
                then.status(400)
                    .json_body(serde_json::json!({"error": "invalid_grant"}));
            })
            .await;
        let store = Arc::new(MemoryStore::new());
        let original = record("stale", -60);
        store.save_token("u1", &original).await.unwrap();

        let err = manager(&server, store.clone())
            .get_valid_token("u1")
            .await
            .unwrap_err();
        assert!(matches!(err, MtdError::Authentication(_)));
        assert_eq!(store.load_token("u1").await.unwrap().unwrap(), original);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_refresh() {
        let server = MockServer::start_async().await;
        let refresh = server
            .mock_async(|when, then| {
                when.method(POST).path("/oauth/token");
                then.status(200)
                    .delay(std::time::Duration::from_millis(100))
                    .json_body(serde_json::json!({
                        "access_token": "rotated",
                        "refresh_token": "refresh-2",
                        "expires_in": 14400
                    }));
            })
            .await;
        let store = Arc::new(MemoryStore::new());
        store.save_token("u1", &record("stale", -60)).await.unwrap();
        let tm = Arc::new(manager(&server, store.clone()));

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let tm = tm.clone();
                tokio::spawn(async move { tm.get_valid_token("u1").await })
            })
            .collect();
        for h in handles {
            assert_eq!(h.await.unwrap().unwrap().as_str(), "rotated");
        }

        refresh.assert_calls_async(1).await;
        // One initial write plus one refresh.
        assert_eq!(store.token_writes(), 2);
        assert!(tm.refresh_locks.is_empty());
    }

    #[tokio::test]
    async fn authorization_round_trip_checks_state_owner() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/oauth/token")
                    .body_includes("grant_type=authorization_code")
                    .body_includes("code=auth-code");
                then.status(200).json_body(serde_json::json!({
                    "access_token": "first",
                    "refresh_token": "r1",
                    "expires_in": 14400
                }));
            })
            .await;
        let store = Arc::new(MemoryStore::new());
        let tm = manager(&server, store.clone());

        let url = url::Url::parse(&tm.begin_authorization("u1").unwrap()).unwrap();
        let state = url
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap();

        let err = tm
            .complete_authorization("intruder", &state, "auth-code")
            .await
            .unwrap_err();
        assert!(matches!(err, MtdError::Validation(_)));

        // The state was consumed by the failed attempt.
        let state = url::Url::parse(&tm.begin_authorization("u1").unwrap())
            .unwrap()
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        tm.complete_authorization("u1", &state, "auth-code")
            .await
            .unwrap();
        assert!(tm.is_connected("u1").await.unwrap());
        assert!(tm.disconnect("u1").await.unwrap());
        assert!(!tm.is_connected("u1").await.unwrap());
    }
}
