//! Command-line interface definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "tenant-engine")]
#[command(about = "Tenant engine lifecycle service", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Args {
	/// Path to configuration file
	#[arg(
		short,
		long,
		env = "TENANT_CONFIG_FILE",
		default_value = "config/tenant-engine.toml"
	)]
	pub config: PathBuf,

	/// Log level override (trace, debug, info, warn, error)
	#[arg(short, long, env = "TENANT_LOG_LEVEL")]
	pub log_level: Option<String>,

	#[command(subcommand)]
	pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
	/// Start the tenant engine service
	Start,
	/// Validate the configuration file
	Validate,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults_to_start_with_bundled_config() {
		let args = Args::try_parse_from(["tenant-engine"]).unwrap();
		assert!(args.command.is_none());
		assert_eq!(args.config, PathBuf::from("config/tenant-engine.toml"));
	}

	#[test]
	fn test_validate_with_explicit_config() {
		let args =
			Args::try_parse_from(["tenant-engine", "-c", "other.yaml", "-l", "debug", "validate"])
				.unwrap();
		assert!(matches!(args.command, Some(Command::Validate)));
		assert_eq!(args.config, PathBuf::from("other.yaml"));
		assert_eq!(args.log_level.as_deref(), Some("debug"));
	}
}
