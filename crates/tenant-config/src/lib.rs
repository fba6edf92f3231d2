// tenant-config/src/lib.rs

use regex::Regex;
use std::collections::HashSet;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

pub mod types;

pub use types::*;

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("File not found: {0}")]
	FileNotFound(String),

	#[error("Unsupported config format: {0}")]
	UnsupportedFormat(String),

	#[error("Parse error: {0}")]
	ParseError(String),

	#[error("Validation error: {0}")]
	ValidationError(String),

	#[error("Environment variable not found: {0}")]
	EnvVarNotFound(String),

	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),
}

/// Configuration loader with environment variable substitution
pub struct ConfigLoader {
	file_path: Option<String>,
	env_prefix: String,
}

impl Default for ConfigLoader {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigLoader {
	pub fn new() -> Self {
		Self {
			file_path: None,
			env_prefix: "TENANT_".to_string(),
		}
	}

	pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
		self.file_path = Some(path.as_ref().to_string_lossy().to_string());
		self
	}

	pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.env_prefix = prefix.into();
		self
	}

	/// Loads the configured file, applies environment overrides and validates
	/// the result.
	pub async fn load(&self) -> Result<ServiceConfig, ConfigError> {
		let mut config = if let Some(file_path) = &self.file_path {
			self.load_from_file(file_path).await?
		} else {
			return Err(ConfigError::FileNotFound(
				"No configuration file specified".to_string(),
			));
		};

		self.apply_env_overrides(&mut config)?;
		validate_config(&config)?;

		Ok(config)
	}

	async fn load_from_file(&self, file_path: &str) -> Result<ServiceConfig, ConfigError> {
		info!("Loading configuration from {}", file_path);
		let path = Path::new(file_path);
		if !path.exists() {
			return Err(ConfigError::FileNotFound(file_path.to_string()));
		}

		let content = tokio::fs::read_to_string(path).await?;
		let substituted = substitute_env_vars(&content)?;

		match path.extension().and_then(|s| s.to_str()) {
			Some("toml") => from_toml(&substituted),
			Some("json") => from_json(&substituted),
			Some("yaml") | Some("yml") => from_yaml(&substituted),
			_ => Err(ConfigError::UnsupportedFormat(file_path.to_string())),
		}
	}

	fn env_var(&self, name: &str) -> Option<String> {
		env::var(format!("{}{}", self.env_prefix, name)).ok()
	}

	fn apply_env_overrides(&self, config: &mut ServiceConfig) -> Result<(), ConfigError> {
		if let Some(log_level) = self.env_var("LOG_LEVEL") {
			debug!("Overriding log level from environment");
			config.service.log_level = log_level;
		}

		if let Some(http_port) = self.env_var("HTTP_PORT") {
			config.service.http_port = http_port
				.parse()
				.map_err(|e| ConfigError::ValidationError(format!("Invalid HTTP port: {}", e)))?;
		}

		if let Some(max) = self.env_var("MAX_CONCURRENT_OPERATIONS") {
			config.orchestrator.max_concurrent_operations = max.parse().map_err(|e| {
				ConfigError::ValidationError(format!("Invalid max concurrent operations: {}", e))
			})?;
		}

		if let Some(namespace) = self.env_var("NAMESPACE") {
			debug!("Overriding namespace from environment");
			config.service.namespace = namespace;
		}

		Ok(())
	}
}

/// Load from TOML string
pub fn from_toml(contents: &str) -> Result<ServiceConfig, ConfigError> {
	toml::from_str(contents).map_err(|e| ConfigError::ParseError(format!("TOML: {}", e)))
}

/// Load from JSON string
pub fn from_json(contents: &str) -> Result<ServiceConfig, ConfigError> {
	serde_json::from_str(contents).map_err(|e| ConfigError::ParseError(format!("JSON: {}", e)))
}

/// Load from YAML string
pub fn from_yaml(contents: &str) -> Result<ServiceConfig, ConfigError> {
	serde_yaml::from_str(contents).map_err(|e| ConfigError::ParseError(format!("YAML: {}", e)))
}

/// Replaces every `${VAR_NAME}` with the value of that environment variable.
pub fn substitute_env_vars(content: &str) -> Result<String, ConfigError> {
	let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| ConfigError::ParseError(e.to_string()))?;
	let mut result = content.to_string();

	for cap in re.captures_iter(content) {
		let full_match = &cap[0];
		let var_name = &cap[1];

		let env_value =
			env::var(var_name).map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;

		result = result.replace(full_match, &env_value);
	}

	Ok(result)
}

pub fn validate_config(config: &ServiceConfig) -> Result<(), ConfigError> {
	if config.service.name.trim().is_empty() {
		return Err(ConfigError::ValidationError(
			"Service name must not be empty".to_string(),
		));
	}

	if config.orchestrator.max_concurrent_operations == 0 {
		return Err(ConfigError::ValidationError(
			"max_concurrent_operations must be at least 1".to_string(),
		));
	}

	if config.orchestrator.shutdown_timeout_secs == 0 {
		return Err(ConfigError::ValidationError(
			"shutdown_timeout_secs must be greater than 0".to_string(),
		));
	}

	let mut seen = HashSet::new();
	for tenant in &config.tenants {
		if tenant.token.trim().is_empty() {
			return Err(ConfigError::ValidationError(
				"Tenant token must not be empty".to_string(),
			));
		}
		if !seen.insert(tenant.token.as_str()) {
			return Err(ConfigError::ValidationError(format!(
				"Tenant '{}' is configured more than once",
				tenant.token
			)));
		}
	}

	Ok(())
}
