use clap::{Arg, Command};
use gearbridge::filter::FilterEngine;
use gearbridge::gearman::{BackgroundClient, Worker};
use gearbridge::pipeline::Pipeline;
use gearbridge::Config;
use log::LevelFilter;
use std::process;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let matches = Command::new("gearbridge")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Filtering relay between two Gearman job servers")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("/etc/gearbridge.yaml"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Generate a default configuration file")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("test-config")
                .long("test-config")
                .help("Test configuration validity")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if let Some(generate_path) = matches.get_one::<String>("generate-config") {
        generate_default_config(generate_path);
        return;
    }

    let config_path = matches.get_one::<String>("config").unwrap();
    let config = match Config::from_file(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            process::exit(1);
        }
    };

    if matches.get_flag("test-config") {
        test_config(&config);
        return;
    }

    if let Err(e) = run(config).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn generate_default_config(path: &str) {
    match Config::default().to_file(path) {
        Ok(()) => println!("Default configuration written to {path}"),
        Err(e) => {
            eprintln!("Error writing configuration: {e}");
            process::exit(1);
        }
    }
}

fn test_config(config: &Config) {
    println!("Testing configuration...");
    println!(
        "Source:      queue '{}' on {} ({})",
        config.src.queue,
        config.src.server,
        if config.src.cipher_key().is_some() {
            "encrypted"
        } else {
            "plaintext"
        }
    );
    println!(
        "Destination: queue '{}' on {} ({})",
        config.dst.queue,
        config.dst.server,
        if config.dst.cipher_key().is_some() {
            "encrypted"
        } else {
            "plaintext"
        }
    );
    match FilterEngine::new(&config.filters) {
        Ok(engine) => {
            println!("Filter rules: {}", engine.rule_count());
            println!("Configuration is valid.");
        }
        Err(e) => {
            println!("Configuration validation failed:");
            println!("Error: {e}");
            process::exit(1);
        }
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let config = Arc::new(config);
    let pipeline = Pipeline::new(config.clone())?;
    let sink = Arc::new(BackgroundClient::new(&config.dst.server));
    let worker = Worker::new(&config, pipeline, sink);

    log::info!(
        "bridging queue '{}' on {} to queue '{}' on {}",
        config.src.queue,
        config.src.server,
        config.dst.queue,
        config.dst.server
    );

    tokio::select! {
        result = worker.run() => result,
        _ = tokio::signal::ctrl_c() => {
            log::info!("shutting down");
            Ok(())
        }
    }
}
