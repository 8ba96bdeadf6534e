use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::service::RegistryStore;
use crate::config::{Config, ConfigError};

/// 过期实例清理任务
///
/// Dropping the sweeper stops the loop; `shutdown` additionally waits for it.
#[derive(Debug)]
pub struct ExpirySweeper {
    task_tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl ExpirySweeper {
    /// Spawns the sweep loop on the current tokio runtime.
    pub fn spawn(
        store: Arc<RegistryStore>,
        ttl: Duration,
        interval: Duration,
    ) -> Result<Self, ConfigError> {
        // tokio::time::interval 不接受零周期
        if interval.is_zero() {
            return Err(ConfigError::Invalid(
                "sweep interval must be greater than zero".to_string(),
            ));
        }
        if ttl.is_zero() {
            return Err(ConfigError::Invalid(
                "registrant ttl must be greater than zero".to_string(),
            ));
        }

        let task_tracker = TaskTracker::new();
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();

        task_tracker.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        tracing::debug!("Executing registrant expiration check...");
                        Self::sweep(&store, ttl);
                    }
                }
            }
            tracing::debug!("Expiry sweeper stopped");
        });

        Ok(Self {
            task_tracker,
            shutdown,
        })
    }

    /// 按配置启动；未配置 TTL 时返回 `Ok(None)`
    pub fn from_config(
        store: Arc<RegistryStore>,
        config: &Config,
    ) -> Result<Option<Self>, ConfigError> {
        config.validate()?;
        let Some(ttl) = config.expiry.registrant_ttl() else {
            return Ok(None);
        };
        Self::spawn(store, ttl, config.expiry.sweep_interval()).map(Some)
    }

    pub async fn shutdown(self) {
        self.shutdown.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;
    }

    fn sweep(store: &RegistryStore, ttl: Duration) {
        match store.expire_stale(ttl) {
            Ok(expired) if expired.is_empty() => {}
            Ok(expired) => {
                tracing::info!(
                    expired_count = expired.len(),
                    remaining = store.len(),
                    "Cleanup check completed, removed expired registrants"
                );
            }
            Err(e) => {
                tracing::error!(error = %e, "Registrant expiration check failed");
            }
        }
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
