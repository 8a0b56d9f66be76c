use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use url::Url;

use crate::app::{Result, TributaryError};
use crate::fetcher::robots::RobotsTxt;
use crate::fetcher::{Fetcher, Page};

/// Wraps a fetcher with robots.txt checks and a minimum delay between
/// requests to the same host.
pub struct PoliteFetcher {
    inner: Arc<dyn Fetcher>,
    user_agent: String,
    limiter: Option<DefaultKeyedRateLimiter<String>>,
    respect_robots: bool,
    /// Keyed by origin
    robots: Mutex<HashMap<String, Arc<RobotsTxt>>>,
}

impl PoliteFetcher {
    pub fn new(inner: Arc<dyn Fetcher>, user_agent: &str) -> Self {
        Self {
            inner,
            user_agent: user_agent.to_string(),
            limiter: None,
            respect_robots: true,
            robots: Mutex::new(HashMap::new()),
        }
    }

    /// One request per `delay` for each host. Zero disables pacing.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.limiter = Quota::with_period(delay).map(RateLimiter::keyed);
        self
    }

    pub fn respect_robots(mut self, respect: bool) -> Self {
        self.respect_robots = respect;
        self
    }

    async fn pace(&self, url: &Url) {
        if let Some(limiter) = &self.limiter {
            let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
            limiter.until_key_ready(&host).await;
        }
    }

    fn cached_robots(&self, origin: &str) -> Option<Arc<RobotsTxt>> {
        self.robots.lock().ok()?.get(origin).cloned()
    }

    async fn robots_for(&self, url: &Url) -> Arc<RobotsTxt> {
        let origin = url.origin().ascii_serialization();
        if let Some(robots) = self.cached_robots(&origin) {
            return robots;
        }

        let robots = Arc::new(self.load_robots(url).await);
        if let Ok(mut cache) = self.robots.lock() {
            cache.insert(origin, robots.clone());
        }
        robots
    }

    /// A robots.txt that is missing or cannot be fetched allows everything.
    async fn load_robots(&self, url: &Url) -> RobotsTxt {
        let Ok(robots_url) = url.join("/robots.txt") else {
            return RobotsTxt::default();
        };

        self.pace(&robots_url).await;
        match self.inner.fetch(&robots_url).await {
            Ok(page) => RobotsTxt::parse(&page.body),
            Err(e) if matches!(e.status(), Some(404 | 410)) => {
                tracing::debug!(url = %robots_url, "no robots.txt");
                RobotsTxt::default()
            }
            Err(e) => {
                tracing::warn!(url = %robots_url, error = %e, "robots.txt unreachable, assuming allowed");
                RobotsTxt::default()
            }
        }
    }
}

#[async_trait]
impl Fetcher for PoliteFetcher {
    async fn fetch(&self, url: &Url) -> Result<Page> {
        if self.respect_robots {
            let robots = self.robots_for(url).await;
            if !robots.is_url_allowed(&self.user_agent, url) {
                tracing::info!(url = %url, "disallowed by robots.txt");
                return Err(TributaryError::RobotsDisallowed(url.to_string()));
            }
        }

        self.pace(url).await;
        self.inner.fetch(url).await
    }
}
