//! Main entry point for the checkout service.
//!
//! Hosts the checkout coordinator in a long-running process: loads the
//! configuration, wires the configured ledger and provider implementations
//! into the engine and serves the presentation-facing HTTP API.

use checkout_config::Config;
use checkout_core::{CheckoutBuilder, CheckoutEngine, CheckoutFactories};
use clap::Parser;
use std::path::PathBuf;

mod apis;
mod server;

use checkout_ledger::implementations::http::create_ledger as create_http_ledger;
use checkout_ledger::implementations::memory::create_ledger as create_memory_ledger;
use checkout_provider::implementations::hosted::create_provider as create_hosted_provider;
use checkout_provider::implementations::simulated::create_provider as create_simulated_provider;

/// Command-line arguments for the checkout service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started checkout service");

	let config = Config::from_file(&args.config).await?;
	tracing::info!(
		config = %args.config.display(),
		ledger = %config.ledger.primary,
		provider = %config.provider.primary,
		"Loaded configuration"
	);

	let engine = build_engine(config.clone())?;
	let handle = engine.handle();
	let mut engine_task = tokio::spawn(engine.run());

	match config.api.clone().filter(|api| api.enabled) {
		Some(api_config) => {
			let api_task = server::start_server(api_config, handle.clone());
			tokio::select! {
				result = &mut engine_task => {
					tracing::info!("Checkout engine finished");
					result??;
					return Ok(());
				}
				result = api_task => {
					tracing::info!("API server finished");
					result?;
				}
				_ = tokio::signal::ctrl_c() => {
					tracing::info!("Received shutdown signal");
				}
			}
		},
		None => {
			tracing::info!("API disabled, running coordinator only");
			tokio::select! {
				result = &mut engine_task => {
					result??;
					return Ok(());
				}
				_ = tokio::signal::ctrl_c() => {
					tracing::info!("Received shutdown signal");
				}
			}
		},
	}

	handle.shutdown().await.ok();
	engine_task.await??;

	tracing::info!("Stopped checkout service");
	Ok(())
}

/// Creates a factory HashMap with the interface's factory signature.
macro_rules! create_factory_map {
    ($interface:path, $error:path, $( $name:literal => $factory:expr ),* $(,)?) => {{
        let mut factories = std::collections::HashMap::new();
        $(
            factories.insert(
                $name.to_string(),
                $factory as fn(&toml::Value) -> Result<Box<dyn $interface>, $error>
            );
        )*
        factories
    }};
}

/// Builds the checkout engine with every available implementation:
/// - Ledgers: the remote HTTP order ledger and an in-process one
/// - Providers: relayed hosted sessions and a simulated gateway
fn build_engine(config: Config) -> Result<CheckoutEngine, Box<dyn std::error::Error>> {
	let builder = CheckoutBuilder::new(config);

	let ledger_factories = create_factory_map!(
		checkout_ledger::LedgerInterface,
		checkout_ledger::LedgerError,
		"http" => create_http_ledger,
		"memory" => create_memory_ledger,
	);

	let provider_factories = create_factory_map!(
		checkout_provider::ProviderInterface,
		checkout_provider::ProviderError,
		"hosted" => create_hosted_provider,
		"simulated" => create_simulated_provider,
	);

	let factories = CheckoutFactories {
		ledger_factories,
		provider_factories,
	};

	Ok(builder.build(factories)?)
}
