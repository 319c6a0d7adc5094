use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

mod cli;

use cli::Cli;
use cli::commands::Commands;
use framesock::ipc::server::{ReplyHandler, ServerConfig};
use framesock::{send_sync, Config, DaemonRegistry, FramedServer, HeaderFormat, SocketClient, SyncJsonSocket};

fn setup_logging(level: Option<&str>) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("framesock")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("framesock.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    // RUST_LOG wins over the configured level
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level.unwrap_or("info")))
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")
}

fn parse_message(message: Option<&str>) -> Result<Option<Value>> {
    message
        .map(|text| serde_json::from_str(text).context(format!("Message is not valid JSON: {}", text)))
        .transpose()
}

fn run_application(cli: &Cli, config: &Config, registry: &DaemonRegistry) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Daemons => handle_daemons_command(registry),
        Commands::Send { daemon, message } => handle_send_command(daemon, message.as_deref(), registry),
        Commands::Request { socket, message, raw } => {
            handle_request_command(socket, message.as_deref(), *raw, config)
        }
        Commands::Serve {
            socket,
            reply,
            header_format,
        } => handle_serve_command(socket, reply, *header_format, config),
    }
}

fn handle_daemons_command(registry: &DaemonRegistry) -> Result<()> {
    if registry.is_empty() {
        println!("{}", "No daemons registered".yellow());
        return Ok(());
    }

    for daemon in registry.iter() {
        println!(
            "{} {} {} header={} size={}",
            daemon.name.green().bold(),
            daemon.protocol.to_string().dimmed(),
            daemon.path.display(),
            daemon.header_format,
            daemon.size
        );
    }
    Ok(())
}

fn handle_send_command(daemon: &str, message: Option<&str>, registry: &DaemonRegistry) -> Result<()> {
    info!("Sending to daemon: {}", daemon);
    let message = parse_message(message)?;

    let data = runtime()?
        .block_on(send_sync(registry, daemon, message.as_ref()))
        .context(format!("Request to {} failed", daemon))?;

    println!("{}", serde_json::to_string_pretty(&data)?);
    Ok(())
}

fn handle_request_command(socket: &Path, message: Option<&str>, raw: bool, config: &Config) -> Result<()> {
    info!("Requesting from socket: {}", socket.display());
    let message = parse_message(message)?.unwrap_or(Value::Null);

    let client = SocketClient::connect(socket)?.with_max_frame_len(config.max_frame_len);

    if raw {
        let mut client = client;
        client.send(serde_json::to_vec(&message)?)?;
        let payload = client.receive().context("Failed to receive response")?;
        client.close();
        println!("{}", hex::encode(&payload));
        return Ok(());
    }

    let mut socket = SyncJsonSocket::new(client);
    socket.send(&message)?;
    let data = socket.receive().context("Request failed")?;
    socket.close();

    println!("{}", serde_json::to_string_pretty(&data)?);
    Ok(())
}

fn handle_serve_command(socket: &Path, reply: &str, header_format: HeaderFormat, config: &Config) -> Result<()> {
    let reply: Value = serde_json::from_str(reply).context("Reply is not valid JSON")?;
    let server_config = ServerConfig::new(socket)
        .with_header_format(header_format)
        .with_max_frame_len(config.max_frame_len);

    runtime()?.block_on(async move {
        let server = FramedServer::bind(server_config).context("Failed to bind socket")?;
        let shutdown = server.shutdown_handle();
        println!(
            "{} {} (header {})",
            "Serving on".green(),
            server.socket_path().display(),
            header_format
        );

        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, stopping server");
                shutdown.shutdown().await;
            }
        });

        server.run(Arc::new(ReplyHandler::new(reply))).await?;
        println!("{}", "Stopped".cyan());
        Ok::<(), eyre::Report>(())
    })
}

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    setup_logging(config.log_level.as_deref()).context("Failed to setup logging")?;
    info!("Starting with config from: {:?}", cli.config);

    let registry = DaemonRegistry::from_config(&config).context("Invalid daemon configuration")?;

    // Run the main application logic
    run_application(&cli, &config, &registry).context("Application failed")?;

    Ok(())
}
