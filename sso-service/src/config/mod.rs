use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct SsoConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub registry: RegistryConfig,
    pub tickets: TicketConfig,
    pub slo: SloConfig,
    pub users: UserConfig,
    pub security: SecurityConfig,
    pub swagger: SwaggerConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// Directory of JSON service definitions; unset means in-memory only
    pub directory: Option<String>,
    pub watch: bool,
    pub watch_poll_seconds: u64,
    pub reload_interval_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TicketConfig {
    pub tgt_max_lifetime_seconds: i64,
    pub tgt_idle_timeout_seconds: i64,
    pub st_time_to_live_seconds: i64,
    pub pgt_max_lifetime_seconds: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SloConfig {
    pub back_channel_timeout_seconds: u64,
    /// Abandoned front-channel walks are forgotten after this long
    pub front_channel_session_ttl_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserConfig {
    /// `user:password,user:password` pairs for the static authenticator
    pub credentials: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SwaggerConfig {
    pub enabled: SwaggerMode,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum SwaggerMode {
    Public,
    Disabled,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub login_attempts: u32,
    pub login_window_seconds: u64,
    pub global_ip_limit: u32,
    pub global_ip_window_seconds: u64,
}

impl SsoConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = SsoConfig {
            common: common_config,
            environment,
            service_name: get_env("SERVICE_NAME", Some("sso-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok(),
            registry: RegistryConfig {
                directory: env::var("REGISTRY_DIRECTORY").ok(),
                watch: get_env("REGISTRY_WATCH", Some("true"), is_prod)?
                    .parse()
                    .unwrap_or(true),
                watch_poll_seconds: get_env("REGISTRY_WATCH_POLL_SECONDS", Some("2"), is_prod)?
                    .parse()
                    .unwrap_or(2),
                reload_interval_seconds: get_env(
                    "REGISTRY_RELOAD_INTERVAL_SECONDS",
                    Some("30"),
                    is_prod,
                )?
                .parse()
                .unwrap_or(30),
            },
            tickets: TicketConfig {
                tgt_max_lifetime_seconds: get_env(
                    "TICKET_TGT_MAX_LIFETIME_SECONDS",
                    Some("28800"),
                    is_prod,
                )?
                .parse()
                .unwrap_or(28800),
                tgt_idle_timeout_seconds: get_env(
                    "TICKET_TGT_IDLE_TIMEOUT_SECONDS",
                    Some("7200"),
                    is_prod,
                )?
                .parse()
                .unwrap_or(7200),
                st_time_to_live_seconds: get_env(
                    "TICKET_ST_TIME_TO_LIVE_SECONDS",
                    Some("10"),
                    is_prod,
                )?
                .parse()
                .unwrap_or(10),
                pgt_max_lifetime_seconds: get_env(
                    "TICKET_PGT_MAX_LIFETIME_SECONDS",
                    Some("28800"),
                    is_prod,
                )?
                .parse()
                .unwrap_or(28800),
            },
            slo: SloConfig {
                back_channel_timeout_seconds: get_env(
                    "SLO_BACK_CHANNEL_TIMEOUT_SECONDS",
                    Some("5"),
                    is_prod,
                )?
                .parse()
                .unwrap_or(5),
                front_channel_session_ttl_seconds: get_env(
                    "SLO_FRONT_CHANNEL_SESSION_TTL_SECONDS",
                    Some("300"),
                    is_prod,
                )?
                .parse()
                .unwrap_or(300),
            },
            users: UserConfig {
                credentials: get_env("SSO_USERS", Some("casuser:Mellon"), is_prod)?,
            },
            security: SecurityConfig {
                allowed_origins: get_env("ALLOWED_ORIGINS", Some("http://localhost:3000"), is_prod)?
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .collect(),
            },
            swagger: SwaggerConfig {
                enabled: get_env("ENABLE_SWAGGER", Some("public"), is_prod)?
                    .parse()
                    .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?,
            },
            rate_limit: RateLimitConfig {
                login_attempts: get_env("RATE_LIMIT_LOGIN_ATTEMPTS", Some("5"), is_prod)?
                    .parse()
                    .unwrap_or(5),
                login_window_seconds: get_env(
                    "RATE_LIMIT_LOGIN_WINDOW_SECONDS",
                    Some("900"),
                    is_prod,
                )?
                .parse()
                .unwrap_or(900),
                global_ip_limit: get_env("RATE_LIMIT_GLOBAL_IP_LIMIT", Some("100"), is_prod)?
                    .parse()
                    .unwrap_or(100),
                global_ip_window_seconds: get_env(
                    "RATE_LIMIT_GLOBAL_IP_WINDOW_SECONDS",
                    Some("60"),
                    is_prod,
                )?
                .parse()
                .unwrap_or(60),
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.tickets.st_time_to_live_seconds <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "TICKET_ST_TIME_TO_LIVE_SECONDS must be positive"
            )));
        }

        if self.tickets.tgt_max_lifetime_seconds <= 0
            || self.tickets.tgt_idle_timeout_seconds <= 0
            || self.tickets.pgt_max_lifetime_seconds <= 0
        {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "ticket lifetimes must be positive"
            )));
        }

        if self.environment == Environment::Prod {
            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Wildcard CORS origin not allowed in production"
                )));
            }

            if self.swagger.enabled == SwaggerMode::Public {
                tracing::error!(
                    "Swagger is publicly accessible in production - consider disabling it"
                );
            }
        }

        Ok(())
    }

    pub fn ticket_policy(&self) -> crate::models::TicketPolicy {
        crate::models::TicketPolicy {
            tgt_max_lifetime: chrono::Duration::seconds(self.tickets.tgt_max_lifetime_seconds),
            tgt_idle_timeout: chrono::Duration::seconds(self.tickets.tgt_idle_timeout_seconds),
            st_time_to_live: chrono::Duration::seconds(self.tickets.st_time_to_live_seconds),
            pgt_max_lifetime: chrono::Duration::seconds(self.tickets.pgt_max_lifetime_seconds),
        }
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

impl std::str::FromStr for SwaggerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "public" => Ok(SwaggerMode::Public),
            "disabled" => Ok(SwaggerMode::Disabled),
            _ => Err(format!("Invalid swagger mode: {}", s)),
        }
    }
}
