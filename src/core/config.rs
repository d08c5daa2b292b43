//! Process configuration read from the environment (and `.env` via dotenvy).
//!
//! Each section reads its own variables. Malformed values are reported as
//! [`ConfigError`]; missing ones fall back to development defaults unless
//! strict mode is on.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, fs};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

const DEFAULT_CORS_ORIGINS: &[&str] =
    &["http://localhost:5173", "http://localhost:3000", "http://localhost:8080"];

const DEFAULT_LECTURE_EXTENSIONS: &[&str] = &["pdf", "docx", "pptx", "txt", "zip"];

#[derive(Debug, Clone)]
pub(crate) struct Settings {
    server: ServerSettings,
    runtime: RuntimeSettings,
    api: ApiSettings,
    security: SecuritySettings,
    cors: CorsSettings,
    database: DatabaseSettings,
    storage: StorageSettings,
    s3: S3Settings,
    admin: AdminSettings,
    telemetry: TelemetrySettings,
}

#[derive(Debug, Clone)]
pub(crate) struct ServerSettings {
    host: String,
    port: u16,
}

#[derive(Debug, Clone)]
pub(crate) struct ApiSettings {
    pub(crate) project_name: String,
    pub(crate) version: String,
    pub(crate) api_v1_str: String,
}

#[derive(Debug, Clone)]
pub(crate) struct SecuritySettings {
    pub(crate) secret_key: String,
    pub(crate) access_token_expire_minutes: u64,
    pub(crate) algorithm: String,
}

#[derive(Debug, Clone)]
pub(crate) struct CorsSettings {
    pub(crate) origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct DatabaseSettings {
    pub(crate) postgres_server: String,
    pub(crate) postgres_port: u16,
    pub(crate) postgres_user: String,
    pub(crate) postgres_password: String,
    pub(crate) postgres_db: String,
    pub(crate) database_url: Option<String>,
    pub(crate) max_connections: u32,
}

/// Limits applied to lecture uploads and downloads.
#[derive(Debug, Clone)]
pub(crate) struct StorageSettings {
    pub(crate) max_upload_size_mb: u64,
    pub(crate) allowed_lecture_extensions: Vec<String>,
    pub(crate) presigned_url_expire_minutes: u64,
}

#[derive(Debug, Clone)]
pub(crate) struct S3Settings {
    pub(crate) endpoint: String,
    pub(crate) access_key: String,
    pub(crate) secret_key: String,
    pub(crate) bucket: String,
    pub(crate) region: String,
}

/// Account ensured at startup when a password is configured.
#[derive(Debug, Clone)]
pub(crate) struct AdminSettings {
    pub(crate) first_superuser_email: String,
    pub(crate) first_superuser_password: String,
    pub(crate) first_superuser_name: String,
}

#[derive(Debug, Clone)]
pub(crate) struct TelemetrySettings {
    pub(crate) log_level: String,
    pub(crate) json: bool,
    pub(crate) prometheus_enabled: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct RuntimeSettings {
    pub(crate) environment: Environment,
    pub(crate) strict_config: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Environment {
    Development,
    Production,
    Staging,
    Test,
}

impl Environment {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
            Environment::Staging => "staging",
            Environment::Test => "test",
        }
    }

    fn parse(value: Option<&str>) -> Self {
        match value.map(str::to_ascii_lowercase).as_deref() {
            Some("production" | "prod") => Environment::Production,
            Some("staging") => Environment::Staging,
            Some("test" | "testing") => Environment::Test,
            _ => Environment::Development,
        }
    }
}

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("invalid server host: {0:?}")]
    InvalidHost(String),
    #[error("invalid server port: {0}")]
    InvalidPort(String),
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
    #[error("invalid cors origins: {0}")]
    InvalidCors(String),
    #[error("missing required secret for {0}")]
    MissingSecret(&'static str),
}

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let runtime = RuntimeSettings::from_env();

        let settings = Self {
            server: ServerSettings::from_env()?,
            api: ApiSettings::from_env(),
            security: SecuritySettings::from_env()?,
            cors: CorsSettings { origins: parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))? },
            database: DatabaseSettings::from_env()?,
            storage: StorageSettings::from_env()?,
            s3: S3Settings::from_env(),
            admin: AdminSettings::from_env(),
            telemetry: TelemetrySettings::from_env(),
            runtime,
        };

        if settings.runtime.strict_config {
            settings.require_secrets()?;
        }

        Ok(settings)
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn security(&self) -> &SecuritySettings {
        &self.security
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn storage(&self) -> &StorageSettings {
        &self.storage
    }

    pub(crate) fn s3(&self) -> &S3Settings {
        &self.s3
    }

    pub(crate) fn admin(&self) -> &AdminSettings {
        &self.admin
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    /// Strict deployments refuse to start on development fallbacks.
    fn require_secrets(&self) -> Result<(), ConfigError> {
        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }
        if !self.s3.has_credentials() {
            return Err(ConfigError::MissingSecret("S3_ACCESS_KEY/S3_SECRET_KEY"));
        }
        if self.admin.first_superuser_password.is_empty() {
            return Err(ConfigError::MissingSecret("FIRST_SUPERUSER_PASSWORD"));
        }
        Ok(())
    }
}

impl RuntimeSettings {
    fn from_env() -> Self {
        let environment = Environment::parse(
            env_optional("COURSEHUB_ENV").or_else(|| env_optional("ENVIRONMENT")).as_deref(),
        );
        let strict_config = env_flag("COURSEHUB_STRICT_CONFIG") || environment == Environment::Production;
        Self { environment, strict_config }
    }
}

impl ServerSettings {
    fn from_env() -> Result<Self, ConfigError> {
        let host = env_or_default("COURSEHUB_HOST", "0.0.0.0");
        if host.chars().any(char::is_whitespace) {
            return Err(ConfigError::InvalidHost(host));
        }

        let raw_port = env_or_default("COURSEHUB_PORT", "8000");
        let port = match raw_port.parse::<u16>() {
            Ok(port) if port > 0 => port,
            _ => return Err(ConfigError::InvalidPort(raw_port)),
        };

        Ok(Self { host, port })
    }
}

impl ApiSettings {
    fn from_env() -> Self {
        Self {
            project_name: env_or_default("PROJECT_NAME", "CourseHub API"),
            version: env_or_default("VERSION", env!("CARGO_PKG_VERSION")),
            api_v1_str: env_or_default("API_V1_STR", "/api/v1"),
        }
    }
}

impl SecuritySettings {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            secret_key: env_optional("SECRET_KEY").unwrap_or_else(load_or_create_secret_key),
            access_token_expire_minutes: env_parsed("ACCESS_TOKEN_EXPIRE_MINUTES", 7 * 24 * 60)?,
            algorithm: env_or_default("ALGORITHM", "HS256"),
        })
    }
}

impl DatabaseSettings {
    fn from_env() -> Result<Self, ConfigError> {
        let max_connections = env_parsed("DATABASE_MAX_CONNECTIONS", 30u32)?;
        if max_connections == 0 {
            return Err(invalid("DATABASE_MAX_CONNECTIONS", "0"));
        }

        Ok(Self {
            postgres_server: env_or_default("POSTGRES_SERVER", "localhost"),
            postgres_port: env_parsed("POSTGRES_PORT", 5432u16)?,
            postgres_user: env_or_default("POSTGRES_USER", "coursehub"),
            postgres_password: env_or_default("POSTGRES_PASSWORD", ""),
            postgres_db: env_or_default("POSTGRES_DB", "coursehub_db"),
            database_url: env_optional("DATABASE_URL"),
            max_connections,
        })
    }

    pub(crate) fn database_url(&self) -> String {
        if let Some(url) = &self.database_url {
            return url.clone();
        }
        format!(
            "postgresql://{}:{}@{}:{}/{}",
            self.postgres_user,
            self.postgres_password,
            self.postgres_server,
            self.postgres_port,
            self.postgres_db
        )
    }
}

impl StorageSettings {
    fn from_env() -> Result<Self, ConfigError> {
        let max_upload_size_mb = env_parsed("MAX_UPLOAD_SIZE_MB", 50u64)?;
        if max_upload_size_mb == 0 {
            return Err(invalid("MAX_UPLOAD_SIZE_MB", "0"));
        }

        let allowed_lecture_extensions =
            parse_extensions(env_optional("ALLOWED_LECTURE_EXTENSIONS").as_deref())?;

        Ok(Self {
            max_upload_size_mb,
            allowed_lecture_extensions,
            presigned_url_expire_minutes: env_parsed("PRESIGNED_URL_EXPIRE_MINUTES", 5u64)?,
        })
    }

    pub(crate) fn max_upload_bytes(&self) -> u64 {
        self.max_upload_size_mb * 1024 * 1024
    }
}

impl S3Settings {
    fn from_env() -> Self {
        Self {
            endpoint: env_or_default("S3_ENDPOINT", "http://localhost:9000"),
            access_key: env_or_default("S3_ACCESS_KEY", ""),
            secret_key: env_or_default("S3_SECRET_KEY", ""),
            bucket: env_or_default("S3_BUCKET", "coursehub-lectures"),
            region: env_or_default("S3_REGION", "us-east-1"),
        }
    }

    /// Without both keys the server runs with lecture files disabled.
    pub(crate) fn has_credentials(&self) -> bool {
        !self.access_key.is_empty() && !self.secret_key.is_empty()
    }
}

impl AdminSettings {
    fn from_env() -> Self {
        Self {
            first_superuser_email: env_or_default("FIRST_SUPERUSER_EMAIL", "admin@coursehub.local"),
            first_superuser_password: env_or_default("FIRST_SUPERUSER_PASSWORD", ""),
            first_superuser_name: env_or_default("FIRST_SUPERUSER_NAME", "Administrator"),
        }
    }
}

impl TelemetrySettings {
    fn from_env() -> Self {
        Self {
            log_level: env_or_default("COURSEHUB_LOG_LEVEL", "info"),
            json: env_flag("COURSEHUB_LOG_JSON"),
            prometheus_enabled: env_flag("PROMETHEUS_ENABLED"),
        }
    }
}

fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

fn env_or_default(key: &str, default: &str) -> String {
    env_optional(key).unwrap_or_else(|| default.to_string())
}

fn env_flag(key: &str) -> bool {
    env_optional(key).is_some_and(|value| parse_bool(&value))
}

fn env_parsed<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env_optional(key) {
        Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue { field: key, value: raw }),
        None => Ok(default),
    }
}

fn invalid(field: &'static str, value: &str) -> ConfigError {
    ConfigError::InvalidValue { field, value: value.to_string() }
}

fn parse_bool(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

/// Accepts a JSON array or a comma separated list; blank input keeps the defaults.
fn parse_cors_origins(value: Option<String>) -> Result<Vec<String>, ConfigError> {
    let defaults = || DEFAULT_CORS_ORIGINS.iter().map(|origin| origin.to_string()).collect();
    let Some(raw) = value else {
        return Ok(defaults());
    };

    let origins: Vec<String> = if raw.starts_with('[') {
        serde_json::from_str(&raw).map_err(|_| ConfigError::InvalidCors(raw.clone()))?
    } else {
        raw.split(',').map(str::trim).filter(|item| !item.is_empty()).map(str::to_string).collect()
    };

    Ok(if origins.is_empty() { defaults() } else { origins })
}

/// Lowercases and strips leading dots; every entry must be plain alphanumerics.
fn parse_extensions(value: Option<&str>) -> Result<Vec<String>, ConfigError> {
    let Some(raw) = value else {
        return Ok(DEFAULT_LECTURE_EXTENSIONS.iter().map(|ext| ext.to_string()).collect());
    };

    let mut extensions = Vec::new();
    for item in raw.split(',') {
        let ext = item.trim().trim_start_matches('.').to_ascii_lowercase();
        if ext.is_empty() {
            continue;
        }
        if !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ConfigError::InvalidValue { field: "ALLOWED_LECTURE_EXTENSIONS", value: ext });
        }
        if !extensions.contains(&ext) {
            extensions.push(ext);
        }
    }

    if extensions.is_empty() {
        return Err(invalid("ALLOWED_LECTURE_EXTENSIONS", raw));
    }
    Ok(extensions)
}

/// Development fallback for `SECRET_KEY`: a random key persisted next to the
/// manifest so tokens survive restarts.
fn load_or_create_secret_key() -> String {
    let path = secret_file_path();
    if let Some(existing) = read_secret(&path) {
        return existing;
    }

    let mut bytes = [0u8; 64];
    OsRng.fill_bytes(&mut bytes);
    let new_key = URL_SAFE_NO_PAD.encode(bytes);

    match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
        Ok(mut file) => {
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Err(err) = file.set_permissions(fs::Permissions::from_mode(0o600)) {
                    tracing::warn!(error = %err, path = %path.display(), "Failed to restrict secret key file");
                }
            }
            if let Err(err) = std::io::Write::write_all(&mut file, new_key.as_bytes()) {
                tracing::warn!(error = %err, path = %path.display(), "Failed to write secret key file");
            }
            new_key
        }
        // Another process won the race; use its key.
        Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
            read_secret(&path).unwrap_or(new_key)
        }
        Err(err) => {
            tracing::warn!(error = %err, path = %path.display(), "Failed to create secret key file");
            new_key
        }
    }
}

fn read_secret(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

fn secret_file_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(".secret_key")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[test]
    fn cors_origins_accept_json_and_csv() {
        let json = parse_cors_origins(Some("[\"http://a\",\"http://b\"]".to_string())).unwrap();
        let csv = parse_cors_origins(Some("http://a, http://b".to_string())).unwrap();
        assert_eq!(json, vec!["http://a".to_string(), "http://b".to_string()]);
        assert_eq!(json, csv);
        assert!(matches!(
            parse_cors_origins(Some("[\"http://a\"".to_string())),
            Err(ConfigError::InvalidCors(_))
        ));
        assert_eq!(parse_cors_origins(Some(",".to_string())).unwrap().len(), DEFAULT_CORS_ORIGINS.len());
    }

    #[test]
    fn lecture_extensions_are_normalized() {
        let parsed = parse_extensions(Some(".PDF, docx,,pdf")).unwrap();
        assert_eq!(parsed, vec!["pdf".to_string(), "docx".to_string()]);
        assert_eq!(parse_extensions(None).unwrap().len(), DEFAULT_LECTURE_EXTENSIONS.len());
    }

    #[test]
    fn lecture_extensions_reject_garbage() {
        assert!(parse_extensions(Some("pdf, tar.gz")).is_err());
        assert!(parse_extensions(Some(" , ")).is_err());
    }

    #[test]
    fn environment_variants() {
        assert_eq!(Environment::parse(Some("prod")), Environment::Production);
        assert_eq!(Environment::parse(Some("Staging")), Environment::Staging);
        assert_eq!(Environment::parse(Some("testing")), Environment::Test);
        assert_eq!(Environment::parse(None), Environment::Development);
    }

    #[test]
    fn bool_variants() {
        assert!(parse_bool("1"));
        assert!(parse_bool("ON"));
        assert!(!parse_bool("off"));
        assert!(!parse_bool("0"));
    }

    #[tokio::test]
    async fn upload_limit_comes_from_megabytes() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        std::env::set_var("MAX_UPLOAD_SIZE_MB", "3");

        let settings = Settings::load().expect("settings");
        assert_eq!(settings.storage().max_upload_bytes(), 3 * 1024 * 1024);

        std::env::set_var("MAX_UPLOAD_SIZE_MB", "0");
        assert!(matches!(Settings::load(), Err(ConfigError::InvalidValue { .. })));
    }

    #[tokio::test]
    async fn strict_mode_requires_storage_credentials() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        std::env::set_var("COURSEHUB_STRICT_CONFIG", "1");
        std::env::set_var("FIRST_SUPERUSER_PASSWORD", "bootstrap-pass");

        let err = Settings::load().unwrap_err();
        assert!(matches!(err, ConfigError::MissingSecret("S3_ACCESS_KEY/S3_SECRET_KEY")));

        test_support::set_test_storage_env();
        assert!(Settings::load().is_ok());
        std::env::set_var("COURSEHUB_STRICT_CONFIG", "0");
    }

    #[tokio::test]
    async fn port_must_be_a_nonzero_number() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        std::env::set_var("COURSEHUB_PORT", "0");
        assert!(matches!(Settings::load(), Err(ConfigError::InvalidPort(_))));

        std::env::set_var("COURSEHUB_PORT", "http");
        assert!(matches!(Settings::load(), Err(ConfigError::InvalidPort(_))));

        std::env::set_var("COURSEHUB_PORT", "8080");
        let settings = Settings::load().expect("settings");
        assert!(settings.server_addr().ends_with(":8080"));
        std::env::remove_var("COURSEHUB_PORT");
    }
}
