use std::sync::Arc;

use crate::config::Config;
use crate::middlewares::auth::JwtService;
use crate::repository::{MongoStore, Store};
use mongodb::Client as MongoClient;
use redis::aio::ConnectionManager;

use self::attempt_service::AttemptService;
use self::gateway::{PaymentGateway, RazorpayGateway};
use self::leaderboard_service::LeaderboardService;
use self::order_service::OrderService;
use self::payment_service::PaymentService;
use self::quiz_service::QuizService;

pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub gateway: Arc<dyn PaymentGateway>,
    /// Payment route rate limiting; absent when no Redis is configured
    pub redis: Option<ConnectionManager>,
    pub jwt: JwtService,
}

impl AppState {
    pub async fn new(config: Config, mongo_client: MongoClient) -> anyhow::Result<Self> {
        let store = MongoStore::new(mongo_client.database(&config.mongo_database));
        store.ensure_indexes().await?;

        let gateway = RazorpayGateway::new(&config.gateway)?;

        let redis = match config.redis_uri.as_deref() {
            Some(uri) => Some(connect_redis(uri).await?),
            None => {
                tracing::warn!("REDIS_URI not set, payment rate limiting disabled");
                None
            }
        };

        Ok(Self::from_parts(
            config,
            Arc::new(store),
            Arc::new(gateway),
            redis,
        ))
    }

    pub fn from_parts(
        config: Config,
        store: Arc<dyn Store>,
        gateway: Arc<dyn PaymentGateway>,
        redis: Option<ConnectionManager>,
    ) -> Self {
        let jwt = JwtService::new(&config.jwt_secret);
        Self {
            config,
            store,
            gateway,
            redis,
            jwt,
        }
    }

    pub fn order_service(&self) -> OrderService {
        OrderService::new(
            self.store.clone(),
            self.gateway.clone(),
            self.config.gateway.clone(),
        )
    }

    pub fn payment_service(&self) -> PaymentService {
        PaymentService::new(self.store.clone(), self.config.gateway.key_secret.clone())
    }

    pub fn attempt_service(&self) -> AttemptService {
        AttemptService::new(self.store.clone())
    }

    pub fn leaderboard_service(&self) -> LeaderboardService {
        LeaderboardService::new(
            self.store.clone(),
            self.config.quiz.results_utc_offset_minutes,
            self.config.quiz.leaderboard_limit,
        )
    }

    pub fn quiz_service(&self) -> QuizService {
        QuizService::new(
            self.store.clone(),
            self.config.quiz.results_utc_offset_minutes,
        )
    }
}

async fn connect_redis(uri: &str) -> anyhow::Result<ConnectionManager> {
    tracing::info!("Attempting to connect to Redis...");

    let client = redis::Client::open(uri)?;
    let redis = tokio::time::timeout(
        std::time::Duration::from_secs(30),
        ConnectionManager::new(client),
    )
    .await
    .map_err(|_| anyhow::anyhow!("Redis connection timeout after 30s"))??;

    // Test connection
    let mut conn = redis.clone();
    tokio::time::timeout(
        std::time::Duration::from_secs(5),
        redis::cmd("PING").query_async::<String>(&mut conn),
    )
    .await
    .map_err(|_| anyhow::anyhow!("Redis PING timeout after 5s"))??;

    tracing::info!("Redis connection established successfully");
    Ok(redis)
}

pub mod attempt_service;
pub mod gateway;
pub mod leaderboard_service;
pub mod order_service;
pub mod payment_service;
pub mod quiz_service;
pub mod signature;
