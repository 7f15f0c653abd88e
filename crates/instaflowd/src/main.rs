use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use instaflow_cloud::CredentialMaterializer;
use instaflow_config::Settings;
use instaflow_core::run_loop;
use instaflowd::server::{self, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "instaflowd")]
#[command(about = "Keeps trying to create a cloud instance until capacity is available", long_about = None)]
struct Cli {
    /// YAML config file (default: ~/.config/instaflow/config.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server and the background retry loop
    Serve {
        /// Listen port (default: PORT or 8080)
        #[arg(short, long)]
        port: Option<u16>,
        /// Listen address
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        /// Only attempt when triggered over HTTP
        #[arg(long)]
        no_loop: bool,
    },
    /// Make a single provisioning attempt and print the status
    Attempt,
    /// Validate settings and credentials without contacting the provider
    Check,
    /// Show version
    Version,
}

fn load_settings(path: Option<&PathBuf>) -> Result<Settings> {
    let settings = match path {
        Some(path) => {
            let mut settings = Settings::from_file(path)?;
            settings.apply_env();
            settings
        }
        None => Settings::load()?,
    };
    if let Some(source) = &settings.source {
        info!("Using config file: {}", source.display());
    }
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let command = cli.command.unwrap_or(Commands::Serve {
        port: None,
        host: "0.0.0.0".to_string(),
        no_loop: false,
    });

    match command {
        Commands::Version => {
            println!("instaflowd {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Check => check(&load_settings(cli.config.as_ref())?),
        Commands::Attempt => attempt(load_settings(cli.config.as_ref())?).await,
        Commands::Serve {
            port,
            host,
            no_loop,
        } => serve(load_settings(cli.config.as_ref())?, host, port, !no_loop).await,
    }
}

async fn serve(settings: Settings, host: String, port: Option<u16>, background: bool) -> Result<()> {
    let port = match port {
        Some(port) => port,
        None => settings.port()?,
    };
    let spec = settings.resource_spec()?;
    let orchestrator = Arc::new(instaflowd::oracle_orchestrator(&settings)?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let loop_handle = background.then(|| {
        tokio::spawn(run_loop(
            orchestrator.clone(),
            spec.clone(),
            shutdown_rx.clone(),
        ))
    });
    if !background {
        info!("Background loop disabled, attempts run only via /trigger");
    }

    let app = server::router(AppState::new(orchestrator.clone(), spec));
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);

    let mut server_shutdown = shutdown_rx;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = server_shutdown.wait_for(|stop| *stop).await;
            info!("Shutting down HTTP server");
        })
        .await
        .context("HTTP server failed")?;

    if let Some(handle) = loop_handle {
        match handle.await {
            Ok(snapshot) => info!("Final status: {} ({})", snapshot.state, snapshot.message),
            Err(e) => warn!("Background loop ended abnormally: {}", e),
        }
    }
    Ok(())
}

async fn attempt(settings: Settings) -> Result<()> {
    let spec = settings.resource_spec()?;
    let orchestrator = instaflowd::oracle_orchestrator(&settings)?;
    let snapshot = orchestrator.attempt(&spec).await;

    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    if !snapshot.is_succeeded() {
        std::process::exit(1);
    }
    Ok(())
}

fn check(settings: &Settings) -> Result<()> {
    let mut problems = 0;

    match settings.resource_spec() {
        Ok(spec) => match spec.validate() {
            Ok(()) => println!(
                "{} instance: {} ({}) in {}",
                "✓".green().bold(),
                spec.display_name(),
                spec.shape(),
                spec.compartment_id()
            ),
            Err(e) => {
                problems += 1;
                println!("{} instance: {}", "✗".red().bold(), e);
            }
        },
        Err(e) => {
            problems += 1;
            println!("{} instance: {}", "✗".red().bold(), e);
        }
    }

    // Writes and removes a transient key file, exactly like an attempt.
    match CredentialMaterializer::new().materialize(&settings.raw_credentials()) {
        Ok(material) => {
            let identity = material.identity().clone();
            material.close()?;
            println!(
                "{} credentials: user {} in {}",
                "✓".green().bold(),
                identity.user,
                identity.region
            );
        }
        Err(e) => {
            problems += 1;
            println!("{} credentials: {}", "✗".red().bold(), e);
        }
    }

    for (name, result) in [
        ("retry policy", settings.retry_policy().map(|_| ())),
        ("attempt timeout", settings.attempt_timeout().map(|_| ())),
        ("port", settings.port().map(|_| ())),
        ("notifications", settings.notify_failures().map(|_| ())),
        ("adoption", settings.adopt_existing().map(|_| ())),
    ] {
        if let Err(e) = result {
            problems += 1;
            println!("{} {}: {}", "✗".red().bold(), name, e);
        }
    }

    println!(
        "{} notification sinks: {}",
        "•".cyan(),
        settings.notifier().sink_names().join(", ")
    );

    if problems > 0 {
        eprintln!("{}", format!("✗ {} problem(s) found", problems).red().bold());
        std::process::exit(1);
    }
    println!("{}", "✓ Configuration is valid".green().bold());
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("Shutdown signal received");
}
