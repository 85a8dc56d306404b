use anyhow::{Context, Result, bail};
use log::{debug, warn};
use serde_json::Value;
use std::future::Future;
use tokio::sync::Mutex;

use super::store::TokenStore;
use super::token::{Credentials, TokenPayload};

/// Outcome of feeding a server auth payload into the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The payload matched a recognized shape and the credentials were
    /// persisted.
    Saved,
    /// The payload matched no recognized shape; state is unchanged.
    Unrecognized,
}

struct SessionState {
    credentials: Option<Credentials>,
    /// Bumped on every successful refresh. Callers snapshot it alongside the
    /// header so a 401 observed against an already-rotated token can be told
    /// apart from a fresh expiry.
    generation: u64,
}

/// Authenticated session: owns the credential pair and the single-flight
/// token refresh. One instance is shared by every request-issuing call site;
/// there is no process-global header state.
pub struct Session {
    store: Box<dyn TokenStore>,
    inner: Mutex<SessionState>,
}

impl Session {
    /// Creates a session over a credential store, loading any persisted pair.
    pub fn new(store: impl TokenStore + 'static) -> Result<Self> {
        let credentials = store.load().context("Failed to load persisted credentials")?;
        Ok(Self {
            store: Box::new(store),
            inner: Mutex::new(SessionState {
                credentials,
                generation: 0,
            }),
        })
    }

    /// Current authorization header value, or None when unauthenticated.
    pub async fn auth_header(&self) -> Option<String> {
        let state = self.inner.lock().await;
        state.credentials.as_ref().map(Credentials::auth_header)
    }

    /// Header snapshot plus the refresh generation it was observed under.
    pub async fn auth_state(&self) -> (Option<String>, u64) {
        let state = self.inner.lock().await;
        (
            state.credentials.as_ref().map(Credentials::auth_header),
            state.generation,
        )
    }

    /// Current credential pair, if any.
    pub async fn credentials(&self) -> Option<Credentials> {
        self.inner.lock().await.credentials.clone()
    }

    /// Normalizes a server auth payload and persists the resulting pair.
    /// A payload that carries no refresh token keeps the previously
    /// persisted one. Unrecognized payloads leave state unchanged.
    #[tracing::instrument(skip(self, payload))]
    pub async fn save_tokens(&self, payload: &Value) -> Result<SaveOutcome> {
        let Some(parsed) = TokenPayload::parse(payload) else {
            debug!("Ignoring unrecognized token payload");
            return Ok(SaveOutcome::Unrecognized);
        };

        let mut state = self.inner.lock().await;
        let Some(merged) = merge_payload(&parsed, state.credentials.as_ref()) else {
            // Refresh-only payload with no stored access token to pair it with.
            debug!("Ignoring token payload without an access token");
            return Ok(SaveOutcome::Unrecognized);
        };
        self.store
            .save(&merged)
            .context("Failed to persist credentials")?;
        state.credentials = Some(merged);
        Ok(SaveOutcome::Saved)
    }

    /// Signs out: drops both tokens in memory and in the store. Idempotent.
    #[tracing::instrument(skip(self))]
    pub async fn clear(&self) -> Result<()> {
        let mut state = self.inner.lock().await;
        state.credentials = None;
        self.store
            .clear()
            .context("Failed to clear persisted credentials")
    }

    /// Single-flight access token refresh.
    ///
    /// `seen_generation` is the generation under which the caller observed
    /// its 401. The session lock is held across the refresh call, so
    /// concurrent callers serialize behind it: the first one issues the
    /// refresh, the rest find either an advanced generation (refresh
    /// succeeded; return the rotated header without another call) or wiped
    /// credentials (refresh failed; fail fast without another call).
    ///
    /// Returns the authorization header to replay the original request with.
    pub async fn refresh_with<F, Fut>(&self, seen_generation: u64, do_refresh: F) -> Result<String>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        let mut state = self.inner.lock().await;

        if state.generation != seen_generation {
            return state
                .credentials
                .as_ref()
                .map(Credentials::auth_header)
                .context("Signed out while waiting for a token refresh");
        }

        let Some(refresh_token) = state
            .credentials
            .as_ref()
            .and_then(|c| c.refresh.clone())
        else {
            // Expired access token and nothing to exchange: sign out.
            state.credentials = None;
            if let Err(e) = self.store.clear() {
                warn!("Failed to clear persisted credentials: {}", e);
            }
            bail!("No refresh token available");
        };

        debug!("Access token expired, refreshing");
        match do_refresh(refresh_token).await {
            Ok(payload) => {
                // A refresh must yield a new access token; a payload without
                // one (unrecognized or refresh-only) cannot rescue the
                // original request.
                let parsed = TokenPayload::parse(&payload);
                let Some(access) = parsed.as_ref().and_then(TokenPayload::access) else {
                    warn!("Token refresh returned no usable access token, signing out");
                    state.credentials = None;
                    if let Err(e) = self.store.clear() {
                        warn!("Failed to clear persisted credentials: {}", e);
                    }
                    bail!("Token refresh returned no usable access token");
                };
                let refresh = parsed
                    .as_ref()
                    .and_then(|p| p.refresh())
                    .map(str::to_string)
                    .or_else(|| state.credentials.as_ref().and_then(|c| c.refresh.clone()));
                let merged = Credentials::new(access, refresh);
                let header = merged.auth_header();
                if let Err(e) = self.store.save(&merged) {
                    // The rotated pair cannot be persisted, so the stored pair
                    // is stale. Sign out rather than let a waiter find the old
                    // refresh token and issue a second refresh call.
                    warn!("Failed to persist refreshed credentials ({}), signing out", e);
                    state.credentials = None;
                    if let Err(clear_err) = self.store.clear() {
                        warn!("Failed to clear persisted credentials: {}", clear_err);
                    }
                    return Err(e.context("Failed to persist refreshed credentials"));
                }
                state.credentials = Some(merged);
                state.generation += 1;
                debug!("Access token refreshed");
                Ok(header)
            }
            Err(e) => {
                warn!("Token refresh failed ({}), signing out", e);
                state.credentials = None;
                if let Err(store_err) = self.store.clear() {
                    warn!("Failed to clear persisted credentials: {}", store_err);
                }
                Err(e.context("Token refresh failed"))
            }
        }
    }
}

/// Applies a recognized payload over the current pair. Each token is only
/// replaced when the payload carries it. Returns None when neither the
/// payload nor the current pair has an access token.
fn merge_payload(payload: &TokenPayload, current: Option<&Credentials>) -> Option<Credentials> {
    let access = payload
        .access()
        .map(str::to_string)
        .or_else(|| current.map(|c| c.access.clone()))?;
    let refresh = payload
        .refresh()
        .map(str::to_string)
        .or_else(|| current.and_then(|c| c.refresh.clone()));
    Some(Credentials::new(access, refresh))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::store::{MemoryTokenStore, MockTokenStore};
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn session() -> Session {
        Session::new(MemoryTokenStore::new()).unwrap()
    }

    #[tokio::test]
    async fn test_unauthenticated_session_has_no_header() {
        assert_eq!(session().auth_header().await, None);
    }

    #[tokio::test]
    async fn test_save_pair_sets_bearer_header_for_jwt() {
        let session = session();
        let outcome = session
            .save_tokens(&json!({"access": "a.b.c", "refresh": "r"}))
            .await
            .unwrap();
        assert_eq!(outcome, SaveOutcome::Saved);
        assert_eq!(session.auth_header().await, Some("Bearer a.b.c".to_string()));
    }

    #[tokio::test]
    async fn test_save_opaque_key_sets_token_header() {
        let session = session();
        session.save_tokens(&json!({"key": "abc123"})).await.unwrap();
        assert_eq!(session.auth_header().await, Some("Token abc123".to_string()));
    }

    #[tokio::test]
    async fn test_save_bare_string() {
        let session = session();
        session.save_tokens(&json!("tok")).await.unwrap();
        let creds = session.credentials().await.unwrap();
        assert_eq!(creds.access, "tok");
        assert_eq!(creds.refresh, None);
    }

    #[tokio::test]
    async fn test_unrecognized_payload_leaves_state_unchanged() {
        let session = session();
        session
            .save_tokens(&json!({"access": "a.b.c", "refresh": "r"}))
            .await
            .unwrap();

        let outcome = session.save_tokens(&json!({})).await.unwrap();
        assert_eq!(outcome, SaveOutcome::Unrecognized);
        assert_eq!(
            session.credentials().await,
            Some(Credentials::new("a.b.c", Some("r".to_string())))
        );
    }

    #[tokio::test]
    async fn test_save_without_refresh_keeps_prior_refresh_token() {
        let session = session();
        session
            .save_tokens(&json!({"access": "a.b.c", "refresh": "r"}))
            .await
            .unwrap();
        session.save_tokens(&json!({"access": "a2.b2.c2"})).await.unwrap();

        assert_eq!(
            session.credentials().await,
            Some(Credentials::new("a2.b2.c2", Some("r".to_string())))
        );
    }

    #[tokio::test]
    async fn test_save_refresh_only_rotates_refresh_token() {
        let session = session();
        session
            .save_tokens(&json!({"access": "a.b.c", "refresh": "r"}))
            .await
            .unwrap();

        let outcome = session.save_tokens(&json!({"refresh": "r2"})).await.unwrap();
        assert_eq!(outcome, SaveOutcome::Saved);
        assert_eq!(
            session.credentials().await,
            Some(Credentials::new("a.b.c", Some("r2".to_string())))
        );
    }

    #[tokio::test]
    async fn test_save_refresh_only_without_access_is_unrecognized() {
        let session = session();
        let outcome = session.save_tokens(&json!({"refresh": "r"})).await.unwrap();
        assert_eq!(outcome, SaveOutcome::Unrecognized);
        assert_eq!(session.credentials().await, None);
    }

    #[tokio::test]
    async fn test_clear_then_no_header() {
        let session = session();
        session.save_tokens(&json!({"access": "a.b.c"})).await.unwrap();
        session.clear().await.unwrap();
        assert_eq!(session.auth_header().await, None);
        // Idempotent
        session.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_session_loads_persisted_credentials() {
        let store = MemoryTokenStore::new();
        store
            .save(&Credentials::new("a.b.c", Some("r".to_string())))
            .unwrap();
        let session = Session::new(store).unwrap();
        assert_eq!(session.auth_header().await, Some("Bearer a.b.c".to_string()));
    }

    #[tokio::test]
    async fn test_refresh_success_rotates_header_and_generation() {
        let session = session();
        session
            .save_tokens(&json!({"access": "a.b.c", "refresh": "r"}))
            .await
            .unwrap();
        let (_, generation) = session.auth_state().await;

        let header = session
            .refresh_with(generation, |refresh| async move {
                assert_eq!(refresh, "r");
                Ok(json!({"access": "a2.b2.c2"}))
            })
            .await
            .unwrap();

        assert_eq!(header, "Bearer a2.b2.c2");
        let (current, new_generation) = session.auth_state().await;
        assert_eq!(current, Some("Bearer a2.b2.c2".to_string()));
        assert_eq!(new_generation, generation + 1);
        // Refresh token survives a refresh response that omits it
        assert_eq!(
            session.credentials().await.unwrap().refresh,
            Some("r".to_string())
        );
    }

    #[tokio::test]
    async fn test_refresh_failure_wipes_credentials() {
        let session = session();
        session
            .save_tokens(&json!({"access": "a.b.c", "refresh": "r"}))
            .await
            .unwrap();
        let (_, generation) = session.auth_state().await;

        let result = session
            .refresh_with(generation, |_| async {
                Err::<Value, _>(anyhow::anyhow!("refresh endpoint down"))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(session.credentials().await, None);
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token_fails_fast_and_wipes() {
        let session = session();
        session.save_tokens(&json!({"access": "a.b.c"})).await.unwrap();
        let (_, generation) = session.auth_state().await;

        let called = Arc::new(AtomicUsize::new(0));
        let called_clone = called.clone();
        let result = session
            .refresh_with(generation, |_| async move {
                called_clone.fetch_add(1, Ordering::SeqCst);
                Ok(json!({"access": "never"}))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(called.load(Ordering::SeqCst), 0);
        assert_eq!(session.credentials().await, None);
    }

    #[tokio::test]
    async fn test_refresh_with_stale_generation_skips_the_call() {
        let session = session();
        session
            .save_tokens(&json!({"access": "a.b.c", "refresh": "r"}))
            .await
            .unwrap();
        let (_, generation) = session.auth_state().await;

        session
            .refresh_with(generation, |_| async { Ok(json!({"access": "a2.b2.c2"})) })
            .await
            .unwrap();

        // Second caller observed the old generation; it must not refresh again.
        let called = Arc::new(AtomicUsize::new(0));
        let called_clone = called.clone();
        let header = session
            .refresh_with(generation, |_| async move {
                called_clone.fetch_add(1, Ordering::SeqCst);
                Ok(json!({"access": "a3.b3.c3"}))
            })
            .await
            .unwrap();

        assert_eq!(called.load(Ordering::SeqCst), 0);
        assert_eq!(header, "Bearer a2.b2.c2");
    }

    #[tokio::test]
    async fn test_unrecognized_refresh_payload_is_a_failure() {
        let session = session();
        session
            .save_tokens(&json!({"access": "a.b.c", "refresh": "r"}))
            .await
            .unwrap();
        let (_, generation) = session.auth_state().await;

        let result = session
            .refresh_with(generation, |_| async { Ok(json!({"detail": "nope"})) })
            .await;

        assert!(result.is_err());
        assert_eq!(session.credentials().await, None);
    }

    #[tokio::test]
    async fn test_refresh_only_refresh_payload_is_a_failure() {
        let session = session();
        session
            .save_tokens(&json!({"access": "a.b.c", "refresh": "r"}))
            .await
            .unwrap();
        let (_, generation) = session.auth_state().await;

        let result = session
            .refresh_with(generation, |_| async { Ok(json!({"refresh": "r2"})) })
            .await;

        assert!(result.is_err());
        assert_eq!(session.credentials().await, None);
    }

    #[tokio::test]
    async fn test_store_save_failure_surfaces() {
        let mut store = MockTokenStore::new();
        store.expect_load().returning(|| Ok(None));
        store
            .expect_save()
            .returning(|_| Err(anyhow::anyhow!("disk full")));

        let session = Session::new(store).unwrap();
        let result = session.save_tokens(&json!({"access": "a.b.c"})).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_refresh_save_failure_wipes_and_blocks_second_refresh() {
        let mut store = MockTokenStore::new();
        store
            .expect_load()
            .returning(|| Ok(Some(Credentials::new("a.b.c", Some("r".to_string())))));
        store
            .expect_save()
            .returning(|_| Err(anyhow::anyhow!("disk full")));
        store.expect_clear().returning(|| Ok(()));

        let session = Session::new(store).unwrap();
        let (_, generation) = session.auth_state().await;

        let result = session
            .refresh_with(generation, |_| async { Ok(json!({"access": "a2.b2.c2"})) })
            .await;
        assert!(result.is_err());
        assert_eq!(session.credentials().await, None);

        // A waiter that observed the same generation must not issue a second
        // refresh call against the old refresh token.
        let called = Arc::new(AtomicUsize::new(0));
        let called_clone = called.clone();
        let result = session
            .refresh_with(generation, |_| async move {
                called_clone.fetch_add(1, Ordering::SeqCst);
                Ok(json!({"access": "a3.b3.c3"}))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(called.load(Ordering::SeqCst), 0);
    }
}
