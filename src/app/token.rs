use super::error::{BoxError, Error};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// How long before expiration a cached token is treated as stale.
pub const DEFAULT_REFRESH_EARLIER: Duration = Duration::from_secs(10);

/// A bearer credential and the instant it stops being accepted.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    pub value: String,
    pub expiration: DateTime<Utc>,
}

impl Token {
    pub fn new(value: impl Into<String>, expiration: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            expiration,
        }
    }

    /// Time left until expiration, zero once expired.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expiration - now).to_std().unwrap_or(Duration::ZERO)
    }

    /// Tail of the token, enough to tell two tokens apart in logs.
    pub fn suffix(&self) -> &str {
        let len = self.value.len();
        if len > 20 {
            self.value.get(len - 19..).unwrap_or("")
        } else {
            &self.value
        }
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("value", &format_args!("...{}", self.suffix()))
            .field("expiration", &self.expiration)
            .finish()
    }
}

/// Produces a fresh token for a cluster.
#[async_trait]
pub trait TokenGenerator: Send + Sync {
    async fn generate(&self, cluster_id: &str) -> Result<Token, BoxError>;
}

#[async_trait]
impl<G: TokenGenerator + ?Sized> TokenGenerator for Arc<G> {
    async fn generate(&self, cluster_id: &str) -> Result<Token, BoxError> {
        (**self).generate(cluster_id).await
    }
}

/// Hands out a token that is valid for the next request.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn get(&self) -> Result<Token, Error>;
}

/// Caches the last generated token and decides when it must be regenerated.
///
/// By default every call to [`TokenSource::get`] generates a new token. With
/// [`TokenCache::reuse_token`] enabled the cached token is handed out until
/// `now + refresh_earlier` reaches its expiration.
///
/// The lock is held while the generator runs, so concurrent callers queue up
/// behind a refresh and then see its result instead of starting their own.
pub struct TokenCache<G> {
    generator: G,
    cluster_id: String,
    reuse_token: bool,
    refresh_earlier: Duration,
    debug_log: bool,
    last: Mutex<Option<Token>>,
}

impl<G: TokenGenerator> TokenCache<G> {
    pub fn new(generator: G, cluster_id: impl Into<String>) -> Self {
        Self {
            generator,
            cluster_id: cluster_id.into(),
            reuse_token: false,
            refresh_earlier: DEFAULT_REFRESH_EARLIER,
            debug_log: false,
            last: Mutex::new(None),
        }
    }

    pub fn reuse_token(mut self, reuse_token: bool) -> Self {
        self.reuse_token = reuse_token;
        self
    }

    pub fn refresh_earlier(mut self, refresh_earlier: Duration) -> Self {
        self.refresh_earlier = refresh_earlier;
        self
    }

    pub fn debug_log(mut self, debug_log: bool) -> Self {
        self.debug_log = debug_log;
        self
    }

    /// The currently cached token, if any.
    pub async fn last(&self) -> Option<Token> {
        self.last.lock().await.clone()
    }

    fn needs_refresh(&self, last: Option<&Token>, now: DateTime<Utc>) -> bool {
        if !self.reuse_token {
            return true;
        }
        match last {
            Some(token) => token.remaining(now) <= self.refresh_earlier,
            None => true,
        }
    }

    fn debug_token(&self, last: Option<&Token>, now: DateTime<Utc>, label: &str) {
        if !self.debug_log {
            return;
        }
        let needs_refresh = self.needs_refresh(last, now);
        let (expiration, remain, suffix) = match last {
            Some(token) => (Some(token.expiration), token.remaining(now), token.suffix()),
            None => (None, Duration::ZERO, ""),
        };
        debug!(
            reuse = self.reuse_token,
            ?expiration,
            ?remain,
            refresh_earlier = ?self.refresh_earlier,
            needs_refresh,
            token = suffix,
            "token cache: {label}"
        );
    }
}

#[async_trait]
impl<G: TokenGenerator> TokenSource for TokenCache<G> {
    async fn get(&self) -> Result<Token, Error> {
        let mut last = self.last.lock().await;
        let now = Utc::now();

        self.debug_token(last.as_ref(), now, "old token");

        if !self.needs_refresh(last.as_ref(), now) {
            if let Some(token) = last.as_ref() {
                return Ok(token.clone());
            }
        }

        let token = self
            .generator
            .generate(&self.cluster_id)
            .await
            .map_err(|source| Error::TokenGenerationFailed { source })?;

        *last = Some(token.clone());
        self.debug_token(last.as_ref(), now, "new token");

        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Generator that replays scripted results, then falls back to
    /// `tok<n>` tokens valid for a minute.
    #[derive(Default)]
    struct ScriptedGenerator {
        calls: AtomicUsize,
        script: std::sync::Mutex<VecDeque<Result<Token, String>>>,
        delay: Duration,
        seen_cluster: std::sync::Mutex<Option<String>>,
    }

    impl ScriptedGenerator {
        fn new(script: Vec<Result<Token, String>>) -> Arc<Self> {
            Arc::new(Self {
                script: std::sync::Mutex::new(script.into()),
                ..Default::default()
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenGenerator for ScriptedGenerator {
        async fn generate(&self, cluster_id: &str) -> Result<Token, BoxError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            *self.seen_cluster.lock().unwrap() = Some(cluster_id.to_string());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Ok(token)) => Ok(token),
                Some(Err(message)) => Err(message.into()),
                None => Ok(token(&format!("tok{n}"), 60)),
            }
        }
    }

    fn token(value: &str, expires_in_secs: i64) -> Token {
        Token::new(value, Utc::now() + TimeDelta::seconds(expires_in_secs))
    }

    #[tokio::test]
    async fn always_mode_regenerates_on_every_call() -> anyhow::Result<()> {
        let generator = ScriptedGenerator::new(vec![Ok(token("tok1", 60)), Ok(token("tok2", 60))]);
        let cache = TokenCache::new(generator.clone(), "test-cluster");

        assert_eq!(cache.get().await?.value, "tok1");
        assert_eq!(cache.get().await?.value, "tok2");
        for _ in 0..3 {
            cache.get().await?;
        }
        assert_eq!(generator.calls(), 5);
        assert_eq!(
            generator.seen_cluster.lock().unwrap().as_deref(),
            Some("test-cluster")
        );
        Ok(())
    }

    #[tokio::test]
    async fn reuse_mode_regenerates_token_inside_refresh_window() -> anyhow::Result<()> {
        let generator = ScriptedGenerator::new(vec![Ok(token("tokA", 5))]);
        let cache = TokenCache::new(generator.clone(), "test-cluster")
            .reuse_token(true)
            .refresh_earlier(Duration::from_secs(10));

        assert_eq!(cache.get().await?.value, "tokA");
        let second = cache.get().await?;
        assert_ne!(second.value, "tokA");
        assert_eq!(generator.calls(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn reuse_mode_returns_cached_token_while_fresh() -> anyhow::Result<()> {
        let generator = ScriptedGenerator::new(vec![Ok(token("tokB", 60))]);
        let cache = TokenCache::new(generator.clone(), "test-cluster").reuse_token(true);

        let first = cache.get().await?;
        let second = cache.get().await?;
        assert_eq!(first, second);
        assert_eq!(second.value, "tokB");
        assert_eq!(generator.calls(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn reuse_mode_regenerates_expired_token() -> anyhow::Result<()> {
        let generator = ScriptedGenerator::new(vec![Ok(token("old", -30))]);
        let cache = TokenCache::new(generator.clone(), "test-cluster")
            .reuse_token(true)
            .refresh_earlier(Duration::ZERO);

        cache.get().await?;
        assert_eq!(cache.get().await?.value, "tok2");
        Ok(())
    }

    #[tokio::test]
    async fn failed_generation_keeps_previous_token() -> anyhow::Result<()> {
        let generator = ScriptedGenerator::new(vec![
            Ok(token("good", 5)),
            Err("sts unavailable".to_string()),
        ]);
        let cache = TokenCache::new(generator.clone(), "test-cluster").reuse_token(true);

        let good = cache.get().await?;
        let err = cache.get().await.unwrap_err();
        assert!(matches!(err, Error::TokenGenerationFailed { .. }));
        assert!(err.to_string().contains("sts unavailable"));
        assert_eq!(cache.last().await, Some(good));

        assert_eq!(cache.get().await?.value, "tok3");
        Ok(())
    }

    #[tokio::test]
    async fn failure_with_nothing_cached_is_returned() {
        let generator = ScriptedGenerator::new(vec![Err("no credentials".to_string())]);
        let cache = TokenCache::new(generator.clone(), "test-cluster");

        assert!(matches!(
            cache.get().await,
            Err(Error::TokenGenerationFailed { .. })
        ));
        assert_eq!(cache.last().await, None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_share_one_refresh() -> anyhow::Result<()> {
        let generator = Arc::new(ScriptedGenerator {
            script: std::sync::Mutex::new(vec![Ok(token("expired", -1))].into()),
            delay: Duration::from_millis(50),
            ..Default::default()
        });
        let cache = Arc::new(TokenCache::new(generator.clone(), "test-cluster").reuse_token(true));
        cache.get().await?;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get().await })
            })
            .collect();

        for handle in handles {
            let token = handle.await??;
            assert_eq!(token.value, "tok2");
        }
        assert_eq!(generator.calls(), 2);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_each_generate_without_reuse() -> anyhow::Result<()> {
        let generator = Arc::new(ScriptedGenerator {
            delay: Duration::from_millis(10),
            ..Default::default()
        });
        let cache = Arc::new(TokenCache::new(generator.clone(), "test-cluster"));

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get().await })
            })
            .collect();

        let mut values = Vec::new();
        for handle in handles {
            values.push(handle.await??.value);
        }
        values.sort();
        values.dedup();
        assert_eq!(values.len(), 6);
        assert_eq!(generator.calls(), 6);
        Ok(())
    }

    #[test]
    fn token_debug_hides_credential() {
        let token = token(
            "k8s-aws-v1.aHR0cHM6Ly9zdHMuZXUtd2VzdC0yLmFtYXpvbmF3cy5jb20v",
            60,
        );
        let printed = format!("{token:?}");
        assert!(!printed.contains("k8s-aws-v1."));
        assert!(printed.contains(token.suffix()));
        assert_eq!(token.suffix().len(), 19);
    }

    #[test]
    fn remaining_is_clamped_at_zero() {
        let now = Utc::now();
        let expired = Token::new("t", now - TimeDelta::seconds(5));
        assert_eq!(expired.remaining(now), Duration::ZERO);
        let fresh = Token::new("t", now + TimeDelta::seconds(30));
        assert_eq!(fresh.remaining(now), Duration::from_secs(30));
    }
}
