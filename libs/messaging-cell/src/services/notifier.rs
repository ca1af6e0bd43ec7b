use async_trait::async_trait;
use deadpool_redis::{Config, Connection, Pool, Runtime};
use redis::AsyncCommands;
use tracing::{debug, info};

use shared_config::AppConfig;

use crate::{MessagingError, NotificationMessage};

/// Outbound channel for patient and doctor notifications.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send(&self, message: &NotificationMessage) -> Result<(), MessagingError>;
}

/// Pushes notifications as JSON onto a Redis list consumed by the
/// notification service.
pub struct RedisNotificationChannel {
    pool: Pool,
    queue_key: String,
}

impl RedisNotificationChannel {
    pub fn new(redis_url: &str, queue_key: impl Into<String>) -> Result<Self, MessagingError> {
        let cfg = Config::from_url(redis_url);
        let pool = cfg.create_pool(Some(Runtime::Tokio1)).map_err(|e| {
            MessagingError::PoolError(format!("Failed to create Redis pool: {}", e))
        })?;

        Ok(Self {
            pool,
            queue_key: queue_key.into(),
        })
    }

    /// Build the channel from configuration and verify the broker answers.
    pub async fn connect(config: &AppConfig) -> Result<Self, MessagingError> {
        let redis_url = config.redis_url.clone()
            .unwrap_or_else(|| "redis://localhost:6379".to_string());

        let channel = Self::new(&redis_url, config.notification_queue.clone())?;

        let mut conn = channel.get_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!("Redis notification channel ready on queue {}", channel.queue_key);

        Ok(channel)
    }

    async fn get_connection(&self) -> Result<Connection, MessagingError> {
        self.pool.get().await.map_err(|e| {
            MessagingError::PoolError(format!("Failed to get Redis connection: {}", e))
        })
    }
}

#[async_trait]
impl NotificationChannel for RedisNotificationChannel {
    async fn send(&self, message: &NotificationMessage) -> Result<(), MessagingError> {
        let payload = serde_json::to_string(message)?;

        let mut conn = self.get_connection().await?;
        let _: () = conn.lpush(&self.queue_key, payload).await?;

        debug!("Notification for {} pushed to {}", message.email, self.queue_key);
        Ok(())
    }
}

/// Logs notifications instead of delivering them. Used when no broker is
/// configured.
#[derive(Debug, Clone, Default)]
pub struct ConsoleNotificationChannel;

#[async_trait]
impl NotificationChannel for ConsoleNotificationChannel {
    async fn send(&self, message: &NotificationMessage) -> Result<(), MessagingError> {
        info!(
            to = %message.email,
            subject = %message.subject,
            "Notification (console): {}", message.message
        );
        Ok(())
    }
}
