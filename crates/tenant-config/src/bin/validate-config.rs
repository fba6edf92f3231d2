//! Configuration validation utility
//!
//! Usage: cargo run --bin validate-config config/tenant-engine.toml

use std::env;
use std::process;

use tenant_config::ConfigLoader;

#[tokio::main]
async fn main() {
	let args: Vec<String> = env::args().collect();

	if args.len() != 2 {
		eprintln!("Usage: {} <config-file>", args[0]);
		process::exit(1);
	}

	let config_path = &args[1];

	println!("Validating configuration file: {}", config_path);

	match ConfigLoader::new().with_file(config_path).load().await {
		Ok(config) => {
			println!("✅ Configuration is valid!");
			println!("Service name: {}", config.service.name);
			println!("Namespace: {}", config.service.namespace);
			println!(
				"Max concurrent operations: {}",
				config.orchestrator.max_concurrent_operations
			);
			println!("Seeded tenants: {}", config.tenants.len());
			for tenant in &config.tenants {
				println!(
					"  {} ({} components)",
					tenant.token,
					tenant.engine.components.len()
				);
			}
		}
		Err(e) => {
			eprintln!("❌ Configuration validation failed:");
			eprintln!("{}", e);
			process::exit(1);
		}
	}
}
