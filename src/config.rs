use std::{env, fmt::Display, fs::read_to_string, num::NonZeroU16, str::FromStr};

use tracing::{debug, info, warn};
use url::Url;

use crate::error::AppError;

const SECRETS_DIR: &str = "/run/secrets";
const SECRET_KEYS: [&str; 2] = ["POSTGRES_PASSWORD", "MINIO_ROOT_PASSWORD"];

#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub port: NonZeroU16,
    pub env: String,
    pub cors_allowed_origins: Vec<String>,
    pub postgres: PostgresConfig,
    pub minio: MinioConfig,
}

#[derive(Clone, Debug)]
pub struct PostgresConfig {
    pub user: String,
    pub password: String,
    pub db: String,
    pub host: String,
    pub port: NonZeroU16,
    pub url: Option<String>,
    pub max_connections: u32,
}

#[derive(Clone, Debug)]
pub struct MinioConfig {
    pub root_user: String,
    pub root_password: String,
    pub bucket_raw: String,
    pub bucket_processed: String,
    pub port: NonZeroU16,
    pub endpoint: Option<String>,
    pub region: String,
}

/// An S3 endpoint split the way the socket check and the signer need it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MinioEndpoint {
    pub url: String,
    pub secure: bool,
    pub host: String,
    pub port: u16,
}

impl Config {
    /// Reads the process environment. Passwords that are not set as
    /// variables are read from Docker secrets.
    pub fn load() -> Result<Self, AppError> {
        Self::from_lookup(|key| with_secret(key, var(key), read_secret))
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let postgres = PostgresConfig {
            user: try_load(&lookup, "POSTGRES_USER", "postgres")?,
            password: try_load(&lookup, "POSTGRES_PASSWORD", "postgres")?,
            db: try_load(&lookup, "POSTGRES_DB", "uhidb")?,
            host: try_load(&lookup, "POSTGRES_HOST", "localhost")?,
            port: try_load(&lookup, "POSTGRES_PORT", "5432")?,
            url: non_blank(lookup("DATABASE_URL")),
            max_connections: try_load(&lookup, "DATABASE_MAX_CONNECTIONS", "10")?,
        };

        let minio = MinioConfig {
            root_user: try_load(&lookup, "MINIO_ROOT_USER", "minioadmin")?,
            root_password: try_load(&lookup, "MINIO_ROOT_PASSWORD", "minioadmin123")?,
            bucket_raw: try_load(&lookup, "MINIO_BUCKET_RAW", "uhi-raw")?,
            bucket_processed: try_load(&lookup, "MINIO_BUCKET_PROCESSED", "uhi-processed")?,
            port: try_load(&lookup, "MINIO_PORT", "9000")?,
            endpoint: non_blank(lookup("MINIO_ENDPOINT")),
            region: try_load(&lookup, "MINIO_REGION", "us-east-1")?,
        };

        let origins: String = try_load(&lookup, "CORS_ALLOWED_ORIGINS", "*")?;

        Ok(Self {
            host: try_load(&lookup, "BACKEND_HOST", "0.0.0.0")?,
            port: try_load(&lookup, "BACKEND_PORT", "8000")?,
            env: try_load(&lookup, "ENV", "dev")?,
            cors_allowed_origins: origins
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(str::to_string)
                .collect(),
            postgres,
            minio,
        })
    }

    pub fn database_url(&self) -> Result<String, AppError> {
        let url = match &self.postgres.url {
            Some(url) => url.clone(),
            None => format!(
                "postgres://{}:{}@{}:{}/{}",
                self.postgres.user,
                self.postgres.password,
                self.postgres.host,
                self.postgres.port,
                self.postgres.db
            ),
        };

        validate_database_url(&url)?;

        Ok(url)
    }

    pub fn minio_endpoint(&self) -> Result<MinioEndpoint, AppError> {
        let url = match &self.minio.endpoint {
            Some(endpoint) => endpoint.clone(),
            None if self.env.eq_ignore_ascii_case("docker") => {
                format!("http://minio:{}", self.minio.port)
            }
            None => format!("http://127.0.0.1:{}", self.minio.port),
        };

        MinioEndpoint::parse(&url)
    }
}

impl MinioEndpoint {
    pub fn parse(url: &str) -> Result<Self, AppError> {
        let url = url.trim().trim_end_matches('/');
        let secure = url.starts_with("https://");
        let host_port = url
            .strip_prefix("https://")
            .or_else(|| url.strip_prefix("http://"))
            .unwrap_or(url);

        let (host, port) = match host_port.split_once(':') {
            Some((host, port)) => {
                let port = port.parse().map_err(|e| {
                    AppError::Config(format!("Invalid MINIO_ENDPOINT port '{port}': {e}"))
                })?;
                (host, port)
            }
            None if secure => (host_port, 443),
            None => (host_port, 80),
        };

        if host.is_empty() {
            return Err(AppError::Config(format!(
                "MINIO_ENDPOINT '{url}' has no host"
            )));
        }

        let scheme = if secure { "https" } else { "http" };

        Ok(Self {
            url: format!("{scheme}://{host}:{port}"),
            secure,
            host: host.to_string(),
            port,
        })
    }
}

fn validate_database_url(url: &str) -> Result<(), AppError> {
    let misconfigured =
        || AppError::Config("DATABASE_URL is misconfigured. Check your environment variables.".into());

    let parsed = Url::parse(url).map_err(|_| misconfigured())?;

    let complete = matches!(parsed.scheme(), "postgres" | "postgresql")
        && !parsed.username().is_empty()
        && parsed.password().is_some()
        && parsed.host_str().is_some_and(|host| !host.is_empty())
        && parsed.port().is_some()
        && parsed.path().len() > 1;

    if !complete {
        return Err(misconfigured());
    }

    Ok(())
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn with_secret<S>(key: &str, value: Option<String>, secret: S) -> Option<String>
where
    S: FnOnce(&str) -> Option<String>,
{
    value.or_else(|| SECRET_KEYS.contains(&key).then(|| secret(key)).flatten())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn try_load<T, F>(lookup: &F, key: &str, default: &str) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .unwrap_or_else(|| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .trim()
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
            AppError::Config(format!("Invalid {key} value: {e}"))
        })
}

fn read_secret(secret_name: &str) -> Option<String> {
    let path = format!("{SECRETS_DIR}/{secret_name}");

    read_to_string(&path)
        .map(|s| s.trim().to_string())
        .map_err(|e| {
            debug!("No secret {secret_name} at {path}: {e}");
        })
        .ok()
}
