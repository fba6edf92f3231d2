use anyhow::{Context, Result};
use clap::Parser;
use tenant_config::{ConfigLoader, ServiceConfig};
use tenant_service::cli::{Args, Command};
use tenant_service::TenantService;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
	let args = Args::parse();

	let config = load_config(&args).await?;

	// Initialize tracing
	let log_level = args
		.log_level
		.clone()
		.unwrap_or_else(|| config.service.log_level.clone());
	setup_tracing(&log_level)?;

	match args.command {
		Some(Command::Start) | None => start_service(config).await,
		Some(Command::Validate) => validate_config(&args, &config),
	}
}

async fn load_config(args: &Args) -> Result<ServiceConfig> {
	ConfigLoader::new()
		.with_file(&args.config)
		.load()
		.await
		.with_context(|| format!("Failed to load configuration from {:?}", args.config))
}

async fn start_service(config: ServiceConfig) -> Result<()> {
	info!("Starting tenant engine service '{}'", config.service.name);
	info!("Namespace: {}", config.service.namespace);
	info!("HTTP port: {}", config.service.http_port);
	info!(
		"Max concurrent operations: {}",
		config.orchestrator.max_concurrent_operations
	);

	let service = TenantService::start(config)
		.await
		.context("Failed to start tenant engine service")?;

	service.run(setup_shutdown_signal()).await
}

fn validate_config(args: &Args, config: &ServiceConfig) -> Result<()> {
	info!("Configuration {:?} is valid", args.config);
	info!("Service name: {}", config.service.name);
	for tenant in &config.tenants {
		let components: Vec<&str> = tenant
			.engine
			.components
			.iter()
			.map(|c| c.name.as_str())
			.collect();
		info!("  Tenant {}: [{}]", tenant.token, components.join(", "));
	}
	Ok(())
}

fn setup_tracing(log_level: &str) -> Result<()> {
	let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

	tracing_subscriber::registry()
		.with(env_filter)
		.with(tracing_subscriber::fmt::layer())
		.try_init()
		.context("Failed to install tracing subscriber")?;

	Ok(())
}

async fn setup_shutdown_signal() {
	let ctrl_c = async {
		if let Err(e) = signal::ctrl_c().await {
			tracing::error!("Failed to listen for Ctrl+C: {}", e);
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match signal::unix::signal(signal::unix::SignalKind::terminate()) {
			Ok(mut stream) => {
				stream.recv().await;
			}
			Err(e) => {
				tracing::error!("Failed to install SIGTERM handler: {}", e);
				std::future::pending::<()>().await;
			}
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}
}
