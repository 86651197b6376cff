use clap::Parser;
use log::{error, info};
use restream::configuration::{Cli, CliCommand, Config};
use restream::controller::{run_import, Controller};

#[tokio::main]
async fn main() {
    // RUST_LOG overrides the default level
    // https://docs.rs/env_logger/latest/env_logger/
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_target(false)
        .init();

    println!(
        "
==============================================================================
             restream: on-demand HLS relay v{}
==============================================================================
",
        env!("CARGO_PKG_VERSION")
    );

    let cli = Cli::parse();

    info!("Importing configuration");
    let config = match Config::from_cli(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("Unable to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    info!("Configuration imported successfully");

    match cli.command.clone().unwrap_or(CliCommand::Serve) {
        CliCommand::Serve => serve(config).await,
        CliCommand::Import { playlist } => match run_import(&config, &playlist).await {
            Ok(summary) => info!(
                "Imported {}: {} parsed, {} skipped, {} inserted, {} duplicates",
                playlist.display(),
                summary.parsed,
                summary.skipped,
                summary.inserted,
                summary.duplicates
            ),
            Err(e) => {
                error!("Import failed: {}", e);
                std::process::exit(1);
            }
        },
    }
}

async fn serve(config: Config) {
    let controller = match Controller::new(config).await {
        Ok(controller) => controller,
        Err(e) => {
            error!("Unable to create a controller instance: {}, exiting...", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = controller.run().await {
        error!("Error occured in the controller process: {}, exiting...", e);
        std::process::exit(1);
    }
}
