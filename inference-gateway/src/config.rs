//! Configuration for the inference gateway.

use audit_common::DEFAULT_PREVIEW_CHARS;
use config::{Config as ConfigLoader, ConfigError, Environment, File};
use serde::Deserialize;

/// Default wait for the backend to report healthy, in seconds.
pub const DEFAULT_READY_TIMEOUT_SECS: u64 = 600;

/// Main configuration structure for the gateway.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

/// Where the gateway itself listens.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Backend inference server: how to launch it and how to reach it.
///
/// Most fields map one-to-one onto a launch flag of the backend server.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Host the gateway uses to reach the backend.
    #[serde(default = "default_backend_host")]
    pub host: String,
    #[serde(default = "default_backend_port")]
    pub port: u16,
    /// Address the backend binds to (`--host`).
    #[serde(default = "default_host")]
    pub bind_host: String,
    /// Program to execute (the server itself or an interpreter/wrapper).
    #[serde(default = "default_server_binary")]
    pub server_binary: String,
    /// Arguments inserted BEFORE the model flags.
    /// Example: `["-m", "vllm.entrypoints.openai.api_server"]`
    #[serde(default = "default_server_args")]
    pub server_args: Vec<String>,
    #[serde(default = "default_model_path")]
    pub model_path: String,
    #[serde(default = "default_served_model_name")]
    pub served_model_name: String,
    #[serde(default = "default_max_model_len")]
    pub max_model_len: u32,
    #[serde(default = "default_gpu_memory_utilization")]
    pub gpu_memory_utilization: f32,
    #[serde(default = "default_max_num_seqs")]
    pub max_num_seqs: u32,
    /// Must be >= `max_model_len`.
    #[serde(default = "default_max_num_batched_tokens")]
    pub max_num_batched_tokens: u32,
    #[serde(default = "default_block_size")]
    pub block_size: u32,
    /// Extra arguments appended AFTER the standard flags.
    #[serde(default)]
    pub extra_args: Vec<String>,
    /// How long to wait for the backend to report healthy (default: 600).
    #[serde(default = "default_ready_timeout")]
    pub ready_timeout_secs: u64,
    /// Grace period between SIGTERM and SIGKILL on shutdown (default: 30).
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
    /// Idle connections kept warm per backend host.
    #[serde(default = "default_pool_idle_per_host")]
    pub pool_idle_per_host: usize,
    /// Upper bound on concurrent exchanges with the backend.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            host: default_backend_host(),
            port: default_backend_port(),
            bind_host: default_host(),
            server_binary: default_server_binary(),
            server_args: default_server_args(),
            model_path: default_model_path(),
            served_model_name: default_served_model_name(),
            max_model_len: default_max_model_len(),
            gpu_memory_utilization: default_gpu_memory_utilization(),
            max_num_seqs: default_max_num_seqs(),
            max_num_batched_tokens: default_max_num_batched_tokens(),
            block_size: default_block_size(),
            extra_args: vec![],
            ready_timeout_secs: default_ready_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            pool_idle_per_host: default_pool_idle_per_host(),
            max_connections: default_max_connections(),
        }
    }
}

impl BackendConfig {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn health_url(&self) -> String {
        format!("{}/health", self.base_url())
    }
}

/// Audit document persistence.
#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    /// Bucket receiving audit documents. Auditing is disabled when unset.
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default = "default_audit_prefix")]
    pub prefix: String,
    /// Falls back to `AWS_REGION` / `AWS_DEFAULT_REGION` when unset.
    #[serde(default)]
    pub region: Option<String>,
    /// Maximum characters kept in body previews.
    #[serde(default = "default_body_preview")]
    pub body_preview: usize,
    /// Spawn audit writes in the background instead of awaiting them
    /// before responding. Documents still in flight are lost on a crash.
    #[serde(default)]
    pub detach_writes: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            bucket: None,
            prefix: default_audit_prefix(),
            region: None,
            body_preview: default_body_preview(),
            detach_writes: false,
        }
    }
}

// Default values
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8000
}
fn default_backend_host() -> String {
    "127.0.0.1".to_string()
}
fn default_backend_port() -> u16 {
    8001
}
fn default_server_binary() -> String {
    "python3".to_string()
}
fn default_server_args() -> Vec<String> {
    vec![
        "-m".to_string(),
        "vllm.entrypoints.openai.api_server".to_string(),
    ]
}
fn default_model_path() -> String {
    "/app/models/Llama-3.1-8B-Instruct/".to_string()
}
fn default_served_model_name() -> String {
    "llama-3.1-8b-instruct".to_string()
}
fn default_max_model_len() -> u32 {
    32768
}
fn default_gpu_memory_utilization() -> f32 {
    0.92
}
fn default_max_num_seqs() -> u32 {
    64
}
fn default_max_num_batched_tokens() -> u32 {
    40960
}
fn default_block_size() -> u32 {
    16
}
fn default_ready_timeout() -> u64 {
    DEFAULT_READY_TIMEOUT_SECS
}
fn default_shutdown_timeout() -> u64 {
    30
}
fn default_pool_idle_per_host() -> usize {
    20
}
fn default_max_connections() -> usize {
    100
}
fn default_audit_prefix() -> String {
    "logs".to_string()
}
fn default_body_preview() -> usize {
    DEFAULT_PREVIEW_CHARS
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Configuration sources (in order of precedence):
    /// 1. Environment variables (GATEWAY__SECTION__KEY format)
    /// 2. gateway.toml file (if present)
    /// 3. Built-in defaults
    ///
    /// List values (`server_args`, `extra_args`) are space-separated in the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let config = ConfigLoader::builder()
            .add_source(File::with_name("gateway").required(false))
            .add_source(
                Environment::with_prefix("GATEWAY")
                    .separator("__")
                    .list_separator(" ")
                    .with_list_parse_key("backend.server_args")
                    .with_list_parse_key("backend.extra_args")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
