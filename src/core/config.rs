use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub security: SecurityConfig,
    pub storage: StorageConfig,
    pub processing: ProcessingConfig,
    pub swagger: SwaggerConfig,
}

#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
    pub max_request_body_size: usize,
    /// Base URL used when building download links (e.g. "https://files.example.org")
    pub public_base_url: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
}

/// Bearer tokens are issued by the host platform and signed with a shared HS256 secret
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    pub jwt_leeway: Duration,
}

/// Key material for encrypted references and download tokens
#[derive(Clone)]
pub struct SecurityConfig {
    /// Master key for encrypted download references (64 hex chars or base64)
    pub cipher_key: String,
    /// Previous master key, kept so references issued before a rotation still open
    pub cipher_key_previous: Option<String>,
    /// Secret used to sign download tokens
    pub download_token_secret: String,
    /// Download token lifetime; a token verifies for the current and previous half-lifetime tick
    pub download_token_lifetime: Duration,
}

impl std::fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("cipher_key", &"[REDACTED]")
            .field(
                "cipher_key_previous",
                &self.cipher_key_previous.as_ref().map(|_| "[REDACTED]"),
            )
            .field("download_token_secret", &"[REDACTED]")
            .field("download_token_lifetime", &self.download_token_lifetime)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Directory where the form builder drops freshly uploaded files
    pub incoming_dir: PathBuf,
    /// Private directory used until an administrator saves a different one
    pub default_upload_dir: PathBuf,
}

/// Limits for chunked encryption. These are the defaults before the resource probe runs.
#[derive(Debug, Clone)]
pub struct ProcessingConfig {
    /// Fraction of the detected memory limit above which chunk processing pauses
    pub memory_fraction: f64,
    /// Soft time budget for a single chunk-processing request
    pub batch_time_budget: Duration,
    /// Records removed per cleanup batch
    pub cleanup_batch_size: i64,
    /// Delay before a cleanup run with remaining work is repeated
    pub cleanup_reschedule_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct SwaggerConfig {
    pub username: Option<String>,
    pub password: Option<String>,
    pub title: String,
    pub version: String,
    pub description: String,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        // Load .env file if exists, ignore if not found (optional for production)
        if let Err(e) = dotenvy::dotenv() {
            if !e.to_string().contains("not found") {
                eprintln!("Warning: Error loading .env file: {}", e);
            }
        }

        Ok(Config {
            app: AppConfig::from_env()?,
            database: DatabaseConfig::from_env()?,
            auth: AuthConfig::from_env()?,
            security: SecurityConfig::from_env()?,
            storage: StorageConfig::from_env()?,
            processing: ProcessingConfig::from_env()?,
            swagger: SwaggerConfig::from_env()?,
        })
    }
}

impl AppConfig {
    const DEFAULT_MAX_REQUEST_BODY_SIZE: usize = 64 * 1024 * 1024; // 64MB

    pub fn from_env() -> Result<Self, String> {
        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|e| format!("Invalid PORT: {}", e))?;

        // Parse CORS allowed origins from comma-separated string
        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let max_request_body_size = env::var("MAX_REQUEST_BODY_SIZE")
            .unwrap_or_else(|_| Self::DEFAULT_MAX_REQUEST_BODY_SIZE.to_string())
            .parse::<usize>()
            .map_err(|_| "MAX_REQUEST_BODY_SIZE must be a valid number".to_string())?;

        let public_base_url = env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| format!("http://{}:{}", host, port))
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            host,
            port,
            cors_allowed_origins,
            max_request_body_size,
            public_base_url,
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl DatabaseConfig {
    const DEFAULT_MAX_CONNECTIONS: u32 = 10;
    const DEFAULT_MIN_CONNECTIONS: u32 = 1;
    const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 5;
    const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600; // 10 minutes
    const DEFAULT_MAX_LIFETIME_SECS: u64 = 1800; // 30 minutes

    pub fn from_env() -> Result<Self, String> {
        let url = env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set".to_string())?;

        let max_connections = env::var("DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| Self::DEFAULT_MAX_CONNECTIONS.to_string())
            .parse::<u32>()
            .map_err(|_| "DB_MAX_CONNECTIONS must be a valid number".to_string())?;

        let min_connections = env::var("DB_MIN_CONNECTIONS")
            .unwrap_or_else(|_| Self::DEFAULT_MIN_CONNECTIONS.to_string())
            .parse::<u32>()
            .map_err(|_| "DB_MIN_CONNECTIONS must be a valid number".to_string())?;

        let acquire_timeout_secs = env::var("DB_ACQUIRE_TIMEOUT_SECS")
            .unwrap_or_else(|_| Self::DEFAULT_ACQUIRE_TIMEOUT_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| "DB_ACQUIRE_TIMEOUT_SECS must be a valid number".to_string())?;

        let idle_timeout_secs = env::var("DB_IDLE_TIMEOUT_SECS")
            .unwrap_or_else(|_| Self::DEFAULT_IDLE_TIMEOUT_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| "DB_IDLE_TIMEOUT_SECS must be a valid number".to_string())?;

        let max_lifetime_secs = env::var("DB_MAX_LIFETIME_SECS")
            .unwrap_or_else(|_| Self::DEFAULT_MAX_LIFETIME_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| "DB_MAX_LIFETIME_SECS must be a valid number".to_string())?;

        Ok(Self {
            url,
            max_connections,
            min_connections,
            acquire_timeout_secs,
            idle_timeout_secs,
            max_lifetime_secs,
        })
    }
}

impl AuthConfig {
    const DEFAULT_JWT_LEEWAY_SECS: u64 = 60; // 1 minute

    pub fn from_env() -> Result<Self, String> {
        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| "JWT_SECRET environment variable is required".to_string())?;

        if jwt_secret.len() < 32 {
            return Err("JWT_SECRET must be at least 32 characters".to_string());
        }

        let issuer = env::var("JWT_ISSUER").ok().filter(|s| !s.is_empty());
        let audience = env::var("JWT_AUDIENCE").ok().filter(|s| !s.is_empty());

        let jwt_leeway_secs = env::var("JWT_LEEWAY")
            .unwrap_or_else(|_| Self::DEFAULT_JWT_LEEWAY_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| "JWT_LEEWAY must be a valid number".to_string())?;

        Ok(Self {
            jwt_secret,
            issuer,
            audience,
            jwt_leeway: Duration::from_secs(jwt_leeway_secs),
        })
    }
}

impl SecurityConfig {
    const DEFAULT_DOWNLOAD_TOKEN_LIFETIME_SECS: u64 = 24 * 60 * 60; // 1 day

    pub fn from_env() -> Result<Self, String> {
        let cipher_key = env::var("CIPHER_KEY")
            .map_err(|_| "CIPHER_KEY environment variable is required".to_string())?;

        let cipher_key_previous = env::var("CIPHER_KEY_PREVIOUS")
            .ok()
            .filter(|s| !s.is_empty());

        let download_token_secret = env::var("DOWNLOAD_TOKEN_SECRET")
            .map_err(|_| "DOWNLOAD_TOKEN_SECRET environment variable is required".to_string())?;

        let lifetime_secs = env::var("DOWNLOAD_TOKEN_LIFETIME_SECS")
            .unwrap_or_else(|_| Self::DEFAULT_DOWNLOAD_TOKEN_LIFETIME_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| "DOWNLOAD_TOKEN_LIFETIME_SECS must be a valid number".to_string())?;

        if lifetime_secs < 2 {
            return Err("DOWNLOAD_TOKEN_LIFETIME_SECS must be at least 2".to_string());
        }

        Ok(Self {
            cipher_key,
            cipher_key_previous,
            download_token_secret,
            download_token_lifetime: Duration::from_secs(lifetime_secs),
        })
    }
}

impl StorageConfig {
    pub fn from_env() -> Result<Self, String> {
        let incoming_dir = env::var("INCOMING_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/incoming"));

        let default_upload_dir = env::var("DEFAULT_UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/secure-uploads"));

        Ok(Self {
            incoming_dir,
            default_upload_dir,
        })
    }
}

impl ProcessingConfig {
    const DEFAULT_MEMORY_FRACTION: f64 = 0.8;
    const DEFAULT_BATCH_TIME_BUDGET_SECS: u64 = 25;
    const DEFAULT_CLEANUP_BATCH_SIZE: i64 = 50;
    const DEFAULT_CLEANUP_RESCHEDULE_SECS: u64 = 60;

    pub fn from_env() -> Result<Self, String> {
        let memory_fraction = env::var("MEMORY_FRACTION")
            .unwrap_or_else(|_| Self::DEFAULT_MEMORY_FRACTION.to_string())
            .parse::<f64>()
            .map_err(|_| "MEMORY_FRACTION must be a valid number".to_string())?;

        if !(0.0..=1.0).contains(&memory_fraction) || memory_fraction == 0.0 {
            return Err("MEMORY_FRACTION must be in (0, 1]".to_string());
        }

        let batch_time_budget_secs = env::var("BATCH_TIME_BUDGET_SECS")
            .unwrap_or_else(|_| Self::DEFAULT_BATCH_TIME_BUDGET_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| "BATCH_TIME_BUDGET_SECS must be a valid number".to_string())?;

        let cleanup_batch_size = env::var("CLEANUP_BATCH_SIZE")
            .unwrap_or_else(|_| Self::DEFAULT_CLEANUP_BATCH_SIZE.to_string())
            .parse::<i64>()
            .map_err(|_| "CLEANUP_BATCH_SIZE must be a valid number".to_string())?;

        let cleanup_reschedule_secs = env::var("CLEANUP_RESCHEDULE_SECS")
            .unwrap_or_else(|_| Self::DEFAULT_CLEANUP_RESCHEDULE_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| "CLEANUP_RESCHEDULE_SECS must be a valid number".to_string())?;

        Ok(Self {
            memory_fraction,
            batch_time_budget: Duration::from_secs(batch_time_budget_secs),
            cleanup_batch_size: cleanup_batch_size.max(1),
            cleanup_reschedule_delay: Duration::from_secs(cleanup_reschedule_secs),
        })
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            memory_fraction: Self::DEFAULT_MEMORY_FRACTION,
            batch_time_budget: Duration::from_secs(Self::DEFAULT_BATCH_TIME_BUDGET_SECS),
            cleanup_batch_size: Self::DEFAULT_CLEANUP_BATCH_SIZE,
            cleanup_reschedule_delay: Duration::from_secs(Self::DEFAULT_CLEANUP_RESCHEDULE_SECS),
        }
    }
}

impl SwaggerConfig {
    pub fn from_env() -> Result<Self, String> {
        // Only use credentials if they are non-empty
        let username = env::var("SWAGGER_USERNAME").ok().filter(|s| !s.is_empty());
        let password = env::var("SWAGGER_PASSWORD").ok().filter(|s| !s.is_empty());
        let title =
            env::var("SWAGGER_TITLE").unwrap_or_else(|_| "Secure Form Uploads API".to_string());
        let version = env::var("SWAGGER_VERSION").unwrap_or_else(|_| "0.1.0".to_string());
        let description = env::var("SWAGGER_DESCRIPTION").unwrap_or_else(|_| {
            "Encrypted storage and gated download of form uploads".to_string()
        });

        Ok(Self {
            username,
            password,
            title,
            version,
            description,
        })
    }

    /// Returns credentials in "username:password" format if auth is enabled
    pub fn credentials(&self) -> Option<String> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => Some(format!("{}:{}", user, pass)),
            _ => None,
        }
    }
}
