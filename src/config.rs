use std::env;

use crate::store::Catalog;

const LOCAL_JWT_SECRET: &str = "super-secure-test-secret-value-local";
const LOCAL_TARGET_API: &str = "http://localhost:8080";

/// AppConfig
///
/// Holds the application's entire configuration state, loaded once at startup and
/// shared read-only through the application state.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Runtime environment marker. Controls the local identity bypass and log format.
    pub env: Env,
    // Socket address the HTTP server binds to.
    pub bind_address: String,
    // Prefix of every API route, e.g. the gateway stage "/prod". Empty for none.
    pub api_base_path: String,
    pub store_backend: StoreBackend,
    // Overrides the DynamoDB endpoint (DynamoDB Local).
    pub dynamodb_endpoint: Option<String>,
    pub aws_region: String,
    pub chat_table: String,
    pub expenses_table: String,
    pub group_members_table: String,
    pub users_table: String,
    // Base URL of the assistant service.
    pub target_api_hostname: String,
    // HMAC secret used to validate bearer tokens.
    pub jwt_secret: String,
    // Bucket receiving expense receipt images.
    pub s3_bucket: String,
    // Overrides the S3 endpoint (MinIO, LocalStack).
    pub s3_endpoint: Option<String>,
}

/// Env
///
/// The runtime context: developer conveniences in `Local`, hardened defaults in
/// `Production`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Env {
    Local,
    Production,
}

/// StoreBackend
///
/// Which store adapter `main` builds.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StoreBackend {
    DynamoDb,
    Memory,
}

impl Default for AppConfig {
    /// default
    ///
    /// Local, in-memory configuration with stock table names. Used by test setup so
    /// no environment variables are needed.
    fn default() -> Self {
        Self {
            env: Env::Local,
            bind_address: "0.0.0.0:3000".to_string(),
            api_base_path: String::new(),
            store_backend: StoreBackend::Memory,
            dynamodb_endpoint: None,
            aws_region: "us-east-1".to_string(),
            chat_table: "chat".to_string(),
            expenses_table: "splitter-expenses".to_string(),
            group_members_table: "splitter-group-members".to_string(),
            users_table: "vassistant-users".to_string(),
            target_api_hostname: LOCAL_TARGET_API.to_string(),
            jwt_secret: LOCAL_JWT_SECRET.to_string(),
            s3_bucket: "splitter-receipts".to_string(),
            s3_endpoint: None,
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads the configuration from environment variables, falling back to the
    /// [`Default`] values for anything optional.
    ///
    /// # Panics
    /// Panics in production if `JWT_SECRET` or `TARGET_API_HOSTNAME` is not set,
    /// so the service never starts with an unusable identity check or assistant.
    pub fn load() -> Self {
        let defaults = Self::default();

        let env = match env::var("APP_ENV").as_deref() {
            Ok("production") => Env::Production,
            _ => Env::Local,
        };

        let required = |name: &str, local_fallback: &str| match env {
            Env::Production => env::var(name)
                .unwrap_or_else(|_| panic!("FATAL: {name} must be set in production.")),
            Env::Local => env::var(name).unwrap_or_else(|_| local_fallback.to_string()),
        };
        let jwt_secret = required("JWT_SECRET", LOCAL_JWT_SECRET);
        let target_api_hostname = required("TARGET_API_HOSTNAME", LOCAL_TARGET_API);

        let store_backend = match env::var("STORE_BACKEND").as_deref() {
            Ok("dynamodb") => StoreBackend::DynamoDb,
            Ok("memory") => StoreBackend::Memory,
            _ if env == Env::Production => StoreBackend::DynamoDb,
            _ => StoreBackend::Memory,
        };

        let or = |name: &str, fallback: String| env::var(name).unwrap_or(fallback);

        Self {
            env,
            bind_address: or("BIND_ADDRESS", defaults.bind_address),
            api_base_path: normalize_base_path(&or("API_BASE_PATH", defaults.api_base_path)),
            store_backend,
            dynamodb_endpoint: env::var("DYNAMODB_ENDPOINT").ok(),
            aws_region: or("AWS_REGION", defaults.aws_region),
            chat_table: or("CHAT_TABLE", defaults.chat_table),
            expenses_table: or("EXPENSES_TABLE", defaults.expenses_table),
            group_members_table: or("GROUP_MEMBERS_TABLE", defaults.group_members_table),
            users_table: or("USERS_TABLE", defaults.users_table),
            target_api_hostname: target_api_hostname.trim_end_matches('/').to_string(),
            jwt_secret,
            s3_bucket: or("S3_BUCKET_NAME", defaults.s3_bucket),
            s3_endpoint: env::var("S3_ENDPOINT").ok(),
        }
    }

    /// The table names bound to their schemas.
    pub fn catalog(&self) -> Catalog {
        Catalog::new(
            &self.chat_table,
            &self.expenses_table,
            &self.group_members_table,
            &self.users_table,
        )
    }
}

/// `"prod/"` -> `"/prod"`, `"/"` -> `""`.
fn normalize_base_path(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}
