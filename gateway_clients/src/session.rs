use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use market_payment_engine::traits::RailError;
use tokio::sync::Mutex;

/// A bearer token with its absolute expiry, as issued by a provider's auth endpoint.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Fresh means at least 30 seconds of validity left, so a token is never used right at its expiry edge.
    pub fn is_fresh(&self) -> bool {
        self.expires_at > Utc::now() + Duration::seconds(30)
    }
}

/// Knows how to obtain a fresh access token. Implemented by the clients themselves against their provider's auth
/// endpoint; tests substitute a counter.
#[allow(async_fn_in_trait)]
pub trait TokenSource {
    async fn fetch_token(&self) -> Result<AccessToken, RailError>;
}

/// Caches an access token and refreshes it in single flight.
///
/// The mutex is held across the refresh call, so when many requests hit an expired token concurrently, one of them
/// performs the refresh and the rest wait for it and reuse the result.
#[derive(Clone, Default)]
pub struct TokenSession {
    cached: Arc<Mutex<Option<AccessToken>>>,
}

impl TokenSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn bearer<S: TokenSource>(&self, source: &S) -> Result<String, RailError> {
        let mut guard = self.cached.lock().await;
        if let Some(token) = guard.as_ref() {
            if token.is_fresh() {
                return Ok(token.token.clone());
            }
        }
        let fresh = source.fetch_token().await?;
        let token = fresh.token.clone();
        *guard = Some(fresh);
        Ok(token)
    }

    /// Drops the cached token so the next call refreshes. Used when the provider rejects a token before its
    /// advertised expiry.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    struct CountingSource {
        fetches: AtomicUsize,
    }

    impl TokenSource for &CountingSource {
        async fn fetch_token(&self) -> Result<AccessToken, RailError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            // Slow refresh, to force the other callers to overlap with it.
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            Ok(AccessToken { token: "tok-1".to_string(), expires_at: Utc::now() + Duration::hours(1) })
        }
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_refresh() {
        let source = CountingSource::default();
        let session = TokenSession::new();
        let src = &source;
        let (a, b, c) = tokio::join!(session.bearer(&src), session.bearer(&src), session.bearer(&src));
        assert_eq!(a.unwrap(), "tok-1");
        assert_eq!(b.unwrap(), "tok-1");
        assert_eq!(c.unwrap(), "tok-1");
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidation_forces_a_refresh() {
        let source = CountingSource::default();
        let session = TokenSession::new();
        session.bearer(&&source).await.unwrap();
        session.invalidate().await;
        session.bearer(&&source).await.unwrap();
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
    }
}
