//! Cached access to game configuration.
//!
//! The game never halts on a config fetch failure: the last successfully
//! loaded configuration is served, or the hard-coded defaults if nothing
//! was ever loaded.

use std::sync::{Arc, Mutex, RwLock};

use tracing::{debug, warn};
use trivia_core::backoff::BackoffPolicy;
use trivia_core::config::GameConfig;
use trivia_core::error::OrchestratorError;
use trivia_core::repository::ConfigRepository;
use trivia_core::rng::DeterministicRng;

/// Where a served configuration came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    /// Loaded just now.
    Fresh,
    /// The last successful load.
    Cached,
    /// Hard-coded defaults.
    Defaults,
}

/// Configuration cache in front of the storage collaborator.
pub struct ConfigProvider {
    repo: Arc<dyn ConfigRepository>,
    cache: RwLock<Option<GameConfig>>,
    backoff: BackoffPolicy,
    rng: Mutex<Box<dyn DeterministicRng>>,
}

impl std::fmt::Debug for ConfigProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigProvider")
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

impl ConfigProvider {
    /// Creates a provider with an empty cache.
    #[must_use]
    pub fn new(
        repo: Arc<dyn ConfigRepository>,
        backoff: BackoffPolicy,
        rng: Box<dyn DeterministicRng>,
    ) -> Self {
        Self {
            repo,
            cache: RwLock::new(None),
            backoff,
            rng: Mutex::new(rng),
        }
    }

    /// The cached configuration, or defaults if nothing is cached.
    #[must_use]
    pub fn current(&self) -> GameConfig {
        self.cached().unwrap_or_default()
    }

    fn cached(&self) -> Option<GameConfig> {
        self.cache.read().ok().and_then(|c| c.clone())
    }

    fn store(&self, config: &GameConfig) {
        if let Ok(mut cache) = self.cache.write() {
            *cache = Some(config.clone());
        }
    }

    /// Makes one load attempt and falls back on failure.
    pub async fn load(&self) -> (GameConfig, ConfigSource) {
        match self.repo.load_game_config().await {
            Ok(config) => {
                self.store(&config);
                debug!("game config loaded");
                (config, ConfigSource::Fresh)
            }
            Err(e) => self.fallback(&e),
        }
    }

    /// Loads with retries per the backoff policy, then falls back.
    pub async fn load_with_retry(&self) -> (GameConfig, ConfigSource) {
        let mut attempt = 0;
        loop {
            match self.repo.load_game_config().await {
                Ok(config) => {
                    self.store(&config);
                    return (config, ConfigSource::Fresh);
                }
                Err(e) if self.backoff.should_retry(attempt + 1) => {
                    let delay = self.next_delay(attempt);
                    warn!(attempt, ?delay, error = %e, "config load failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return self.fallback(&e),
            }
        }
    }

    fn next_delay(&self, attempt: u32) -> std::time::Duration {
        match self.rng.lock() {
            Ok(mut rng) => self.backoff.delay_for(attempt, rng.as_mut()),
            Err(_) => self.backoff.base,
        }
    }

    fn fallback(&self, error: &OrchestratorError) -> (GameConfig, ConfigSource) {
        if let Some(config) = self.cached() {
            warn!(%error, "config unavailable, serving cached config");
            (config, ConfigSource::Cached)
        } else {
            warn!(%error, "config unavailable and nothing cached, serving defaults");
            (GameConfig::default(), ConfigSource::Defaults)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use trivia_test_support::{InMemoryStorage, MockRng};

    use super::*;

    fn provider(store: Arc<InMemoryStorage>) -> ConfigProvider {
        ConfigProvider::new(
            store,
            BackoffPolicy {
                base: Duration::from_millis(100),
                multiplier: 2.0,
                cap: Duration::from_secs(1),
                jitter: 0.0,
                max_attempts: 3,
            },
            Box::new(MockRng),
        )
    }

    #[tokio::test]
    async fn test_load_failure_without_cache_serves_defaults() {
        // Arrange
        let store = Arc::new(InMemoryStorage::new());
        store.set_config_failure(true);
        let provider = provider(store);

        // Act
        let (config, source) = provider.load().await;

        // Assert
        assert_eq!(source, ConfigSource::Defaults);
        assert_eq!(config, GameConfig::default());
    }

    #[tokio::test]
    async fn test_load_failure_after_success_serves_cached_config() {
        // Arrange
        let store = Arc::new(InMemoryStorage::new());
        store.set_config(GameConfig {
            max_players_per_room: 4,
            ..GameConfig::default()
        });
        let provider = provider(store.clone());
        provider.load().await;
        store.set_config_failure(true);

        // Act
        let (config, source) = provider.load().await;

        // Assert
        assert_eq!(source, ConfigSource::Cached);
        assert_eq!(config.max_players_per_room, 4);
        assert_eq!(provider.current().max_players_per_room, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_with_retry_backs_off_then_falls_back() {
        let store = Arc::new(InMemoryStorage::new());
        store.set_config_failure(true);
        let provider = provider(store);
        let started = tokio::time::Instant::now();

        let (_, source) = provider.load_with_retry().await;

        assert_eq!(source, ConfigSource::Defaults);
        assert_eq!(started.elapsed(), Duration::from_millis(300));
    }
}
