//! On-demand current position.

use async_trait::async_trait;
use std::{fmt::Debug, sync::Arc, time::Duration};
use tokio::{sync::Mutex, time::Instant};

use crate::{config::GeolocationConfig, error::PositionError, model::Position};

/// Anything that can report where the user is.
#[async_trait]
pub trait PositionSource: Send + Sync + Debug {
    async fn current_position(&self) -> Result<Position, PositionError>;
}

/// Reports coordinates from configuration or the command line.
#[derive(Debug, Clone)]
pub struct StaticPosition(pub Option<Position>);

#[async_trait]
impl PositionSource for StaticPosition {
    async fn current_position(&self) -> Result<Position, PositionError> {
        self.0.ok_or(PositionError::Unavailable)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionOptions {
    /// How old a cached fix may be. `None` accepts any cached fix.
    pub maximum_age: Option<Duration>,
    pub timeout: Duration,
}

impl Default for PositionOptions {
    fn default() -> Self {
        Self {
            maximum_age: None,
            timeout: Duration::from_millis(5_000),
        }
    }
}

impl From<&GeolocationConfig> for PositionOptions {
    fn from(cfg: &GeolocationConfig) -> Self {
        Self {
            timeout: Duration::from_millis(cfg.timeout_ms),
            ..Self::default()
        }
    }
}

/// Wraps a [`PositionSource`] with caching and a timeout.
#[derive(Debug, Clone)]
pub struct Geolocator {
    source: Arc<dyn PositionSource>,
    options: PositionOptions,
    last_fix: Arc<Mutex<Option<(Position, Instant)>>>,
}

impl Geolocator {
    pub fn new(source: Arc<dyn PositionSource>, options: PositionOptions) -> Self {
        Self {
            source,
            options,
            last_fix: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn current_position(&self) -> Result<Position, PositionError> {
        let mut last_fix = self.last_fix.lock().await;

        if let Some((position, taken_at)) = *last_fix {
            let fresh = self
                .options
                .maximum_age
                .is_none_or(|max_age| taken_at.elapsed() <= max_age);
            if fresh {
                tracing::debug!("using cached position");
                return Ok(position);
            }
        }

        tracing::info!("fetching current position");
        let timeout_ms = self.options.timeout.as_millis() as u64;
        let position = tokio::time::timeout(self.options.timeout, self.source.current_position())
            .await
            .map_err(|_| PositionError::Timeout(timeout_ms))??;

        *last_fix = Some((position, Instant::now()));
        Ok(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct CountingSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PositionSource for CountingSource {
        async fn current_position(&self) -> Result<Position, PositionError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) as f64;
            Ok(Position { latitude: n, longitude: n })
        }
    }

    #[derive(Debug)]
    struct StuckSource;

    #[async_trait]
    impl PositionSource for StuckSource {
        async fn current_position(&self) -> Result<Position, PositionError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn static_position_without_coordinates_is_unavailable() {
        let err = StaticPosition(None).current_position().await.unwrap_err();
        assert_eq!(err, PositionError::Unavailable);
    }

    #[tokio::test]
    async fn infinite_maximum_age_reuses_first_fix() {
        let source = Arc::new(CountingSource::default());
        let geo = Geolocator::new(source.clone(), PositionOptions::default());

        let first = geo.current_position().await.unwrap();
        let second = geo.current_position().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_fix_is_refreshed() {
        let source = Arc::new(CountingSource::default());
        let options = PositionOptions {
            maximum_age: Some(Duration::from_secs(60)),
            ..PositionOptions::default()
        };
        let geo = Geolocator::new(source.clone(), options);

        geo.current_position().await.unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;
        let refreshed = geo.current_position().await.unwrap();

        assert_eq!(refreshed.latitude, 1.0);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_source_times_out() {
        let geo = Geolocator::new(Arc::new(StuckSource), PositionOptions::default());
        let err = geo.current_position().await.unwrap_err();
        assert_eq!(err, PositionError::Timeout(5_000));
    }
}
