use async_trait::async_trait;
use redis::{aio::MultiplexedConnection, AsyncCommands};

#[derive(Debug, thiserror::Error)]
pub enum OtpError {
    #[error("otp store error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Checks a one-time code previously delivered to a phone number.
#[async_trait]
pub trait OtpVerifier: Send + Sync {
    /// `Ok(false)` means the code is wrong, expired or already used.
    async fn verify(&self, phone: &str, code: &str) -> Result<bool, OtpError>;
}

/// Reads codes written by the SMS sender under `<prefix>:otp:<phone>`.
/// A matching code is consumed.
pub struct RedisOtpVerifier {
    conn: MultiplexedConnection,
    key_prefix: String,
}

impl RedisOtpVerifier {
    pub fn new(conn: MultiplexedConnection, key_prefix: String) -> Self {
        Self { conn, key_prefix }
    }

    fn key(&self, phone: &str) -> String {
        format!("{}:otp:{}", self.key_prefix, phone)
    }
}

#[async_trait]
impl OtpVerifier for RedisOtpVerifier {
    async fn verify(&self, phone: &str, code: &str) -> Result<bool, OtpError> {
        let mut conn = self.conn.clone();
        let key = self.key(phone);

        let stored: Option<String> = conn.get(&key).await?;
        if stored.as_deref() != Some(code) {
            return Ok(false);
        }

        // Only the caller that removes the key wins; a replayed code loses.
        let removed: i64 = conn.del(&key).await?;
        Ok(removed == 1)
    }
}
