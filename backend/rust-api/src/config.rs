use serde::Deserialize;
use std::env;

/// Offset of Indian Standard Time (+05:30) in minutes. Results are published in this civil time.
pub const IST_OFFSET_MINUTES: i32 = 330;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub mongo_uri: String,
    pub mongo_database: String,
    /// Redis backs the payment route rate limiter; the limiter is skipped when unset.
    pub redis_uri: Option<String>,
    pub jwt_secret: String,
    /// `user:password` for Basic auth on `/metrics`
    pub metrics_auth: String,
    pub gateway: GatewaySettings,
    pub quiz: QuizSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewaySettings {
    pub key_id: String,
    pub key_secret: String,
    pub api_base: String,
    pub currency: String,
    pub timeout_seconds: u64,
    pub pending_order_ttl_seconds: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuizSettings {
    pub results_utc_offset_minutes: i32,
    pub leaderboard_limit: i64,
    pub allow_guests: bool,
}

impl Default for QuizSettings {
    fn default() -> Self {
        Self {
            results_utc_offset_minutes: IST_OFFSET_MINUTES,
            leaderboard_limit: 10,
            allow_guests: true,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Root .env first (two levels up), then the local one
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if skip_root_env {
            dotenvy::dotenv().ok();
        } else if dotenvy::from_path("../../.env").is_err() {
            dotenvy::dotenv().ok();
        }

        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());
        let is_prod = app_env == "prod";

        // config/*.toml + APP__ env overrides
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", app_env)).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let mongo_uri = settings
            .get_string("database.mongo_uri")
            .or_else(|_| env::var("MONGO_URI"))
            .unwrap_or_else(|_| "mongodb://localhost:27017".to_string());

        let mongo_database = settings
            .get_string("database.mongo_database")
            .or_else(|_| env::var("MONGO_DATABASE"))
            .unwrap_or_else(|_| "dailyquiz".to_string());

        let redis_uri = settings
            .get_string("redis.uri")
            .or_else(|_| env::var("REDIS_URI"))
            .ok()
            .filter(|uri| !uri.trim().is_empty());

        let jwt_secret = required_secret(
            &settings,
            "auth.jwt_secret",
            "JWT_SECRET",
            is_prod,
            "dev-secret-only-for-local-testing",
        )?;

        let metrics_auth = required_secret(
            &settings,
            "metrics.auth",
            "METRICS_AUTH",
            is_prod,
            "admin:changeme",
        )?;

        let gateway = GatewaySettings {
            key_id: required_secret(
                &settings,
                "gateway.key_id",
                "RAZORPAY_KEY_ID",
                is_prod,
                "rzp_test_local",
            )?,
            key_secret: required_secret(
                &settings,
                "gateway.key_secret",
                "RAZORPAY_KEY_SECRET",
                is_prod,
                "rzp-test-secret-local",
            )?,
            api_base: settings
                .get_string("gateway.api_base")
                .or_else(|_| env::var("RAZORPAY_API_BASE"))
                .unwrap_or_else(|_| "https://api.razorpay.com".to_string()),
            currency: settings
                .get_string("gateway.currency")
                .unwrap_or_else(|_| "INR".to_string()),
            timeout_seconds: settings
                .get_int("gateway.timeout_seconds")
                .ok()
                .and_then(|v| u64::try_from(v).ok())
                .filter(|v| *v > 0)
                .unwrap_or(10),
            pending_order_ttl_seconds: settings
                .get_int("gateway.pending_order_ttl_seconds")
                .ok()
                .filter(|v| *v > 0)
                .unwrap_or(900),
        };

        let defaults = QuizSettings::default();
        let quiz = QuizSettings {
            results_utc_offset_minutes: settings
                .get_int("quiz.results_utc_offset_minutes")
                .ok()
                .and_then(|v| i32::try_from(v).ok())
                .unwrap_or(defaults.results_utc_offset_minutes),
            leaderboard_limit: settings
                .get_int("quiz.leaderboard_limit")
                .ok()
                .filter(|v| (1..=100).contains(v))
                .unwrap_or(defaults.leaderboard_limit),
            allow_guests: settings
                .get_bool("quiz.allow_guests")
                .unwrap_or(defaults.allow_guests),
        };

        Ok(Config {
            mongo_uri,
            mongo_database,
            redis_uri,
            jwt_secret,
            metrics_auth,
            gateway,
            quiz,
        })
    }
}

fn required_secret(
    settings: &config::Config,
    key: &str,
    env_name: &str,
    is_prod: bool,
    dev_default: &str,
) -> Result<String, config::ConfigError> {
    match settings.get_string(key).or_else(|_| env::var(env_name)) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ if is_prod => Err(config::ConfigError::Message(format!(
            "{} must be set in production",
            env_name
        ))),
        _ => {
            tracing::warn!("Using default {} (dev mode only!)", env_name);
            Ok(dev_default.to_string())
        }
    }
}
