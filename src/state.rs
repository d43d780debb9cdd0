use sea_orm::{DatabaseConnection, DbErr};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    repo::{
        accounts::{AccountsRepo, SeaOrmAccountsRepo},
        credentials::{CredentialsRepo, SeaOrmCredentialsRepo},
        unit_of_work::UnitOfWork,
    },
    service::{
        accounts::{AccountsService, AccountsServiceImpl},
        activity::{self, ActivityTracker, LastActiveWriter},
        auth::{AuthService, AuthServiceImpl},
        cache::{CacheError, MarkerCache, MemoryCache, RedisCache},
        config::{ConfigError, ConfigService},
        oauth::{MockWechatClient, OAuthExchange, WechatClient},
        otp::{OtpVerifier, RedisOtpVerifier},
        password::PasswordHasher,
        token::TokenIssuer,
    },
};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("database error: {0}")]
    Database(#[from] DbErr),
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
    #[error("server error: {0}")]
    Serve(std::io::Error),
}

pub trait DatabaseClient: Send + Sync {
    fn conn(&self) -> &DatabaseConnection;
}

pub struct SeaOrmDatabaseClient {
    conn: DatabaseConnection,
}

impl SeaOrmDatabaseClient {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, DbErr> {
        let conn = crate::db::connect(url, max_connections).await?;
        crate::schema::apply(&conn).await?;
        Ok(Self { conn })
    }
}

impl DatabaseClient for SeaOrmDatabaseClient {
    fn conn(&self) -> &DatabaseConnection {
        &self.conn
    }
}

/// Long-lived tasks owned by the process rather than by any request.
pub struct Background {
    shutdown: CancellationToken,
    last_active_writer: JoinHandle<()>,
}

impl Background {
    /// Stops the last-active writer after it drains queued writes.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(err) = self.last_active_writer.await {
            error!(error = %err, "last-active writer panicked");
        }
    }
}

pub struct AppState {
    accounts: Arc<dyn AccountsService>,
    auth: Arc<dyn AuthService>,
    tokens: Arc<TokenIssuer>,
    activity: Arc<ActivityTracker>,
}

impl AppState {
    pub async fn new(config: Arc<dyn ConfigService>) -> Result<(Arc<Self>, Background), StartupError> {
        let values = config.values();
        let db = Arc::new(
            SeaOrmDatabaseClient::connect(&values.database_url, values.database_max_connections)
                .await?,
        );
        Self::build(config, db).await
    }

    /// Wires services over an already migrated database.
    pub async fn build(
        config: Arc<dyn ConfigService>,
        db: Arc<dyn DatabaseClient>,
    ) -> Result<(Arc<Self>, Background), StartupError> {
        let values = config.values().clone();

        let accounts_repo: Arc<dyn AccountsRepo> = Arc::new(SeaOrmAccountsRepo::new(db.clone()));
        let credentials_repo: Arc<dyn CredentialsRepo> =
            Arc::new(SeaOrmCredentialsRepo::new(db.clone()));
        let uow = Arc::new(UnitOfWork::new(
            db,
            accounts_repo.clone(),
            credentials_repo.clone(),
        ));

        let (cache, otp): (Arc<dyn MarkerCache>, Option<Arc<dyn OtpVerifier>>) =
            match &values.redis_url {
                Some(url) => {
                    let redis = RedisCache::connect(url).await?;
                    let otp: Arc<dyn OtpVerifier> = Arc::new(RedisOtpVerifier::new(
                        redis.connection(),
                        values.cache_key_prefix.clone(),
                    ));
                    let cache: Arc<dyn MarkerCache> = Arc::new(redis);
                    (cache, Some(otp))
                }
                None => {
                    warn!("REDIS_URL is not set; last-active debounce is process-local and phone login is disabled");
                    let cache: Arc<dyn MarkerCache> = Arc::new(MemoryCache::new());
                    (cache, None)
                }
            };

        let wechat: Option<Arc<dyn OAuthExchange>> = if values.wechat_mock_enabled {
            warn!("AUTH_WECHAT_MOCK_ENABLED is set; WeChat codes are not verified");
            Some(Arc::new(MockWechatClient))
        } else {
            match (&values.wechat_app_id, &values.wechat_app_secret) {
                (Some(app_id), Some(app_secret)) => Some(Arc::new(WechatClient::new(
                    app_id.clone(),
                    app_secret.clone(),
                    values.wechat_api_base.clone(),
                ))),
                _ => {
                    info!("WeChat credentials are not configured; WeChat login is disabled");
                    None
                }
            }
        };

        let tokens = Arc::new(TokenIssuer::new(
            &values.jwt_secret,
            values.jwt_issuer.clone(),
            values.jwt_expires_in_hours,
        ));

        let auth = Arc::new(AuthServiceImpl::new(
            uow,
            accounts_repo.clone(),
            credentials_repo,
            Arc::new(PasswordHasher::default()),
            tokens.clone(),
            wechat,
            otp,
        ));
        let accounts = Arc::new(AccountsServiceImpl::new(accounts_repo.clone()));

        let (writes_tx, writes_rx) = activity::write_queue(values.last_active_queue_capacity);
        let shutdown = CancellationToken::new();
        let last_active_writer =
            LastActiveWriter::new(accounts_repo, writes_rx, shutdown.clone()).spawn();
        let activity = Arc::new(ActivityTracker::new(
            cache,
            writes_tx,
            values.last_active_window,
            values.cache_key_prefix.clone(),
        ));

        let state = Arc::new(Self {
            accounts,
            auth,
            tokens,
            activity,
        });
        let background = Background {
            shutdown,
            last_active_writer,
        };
        Ok((state, background))
    }

    pub fn accounts(&self) -> &dyn AccountsService {
        self.accounts.as_ref()
    }

    pub fn auth(&self) -> &dyn AuthService {
        self.auth.as_ref()
    }

    pub fn tokens(&self) -> &TokenIssuer {
        self.tokens.as_ref()
    }

    pub fn activity(&self) -> &ActivityTracker {
        self.activity.as_ref()
    }
}
