//! CLI commands for intake using clap.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::{
    get_settings_path, init_settings, load_settings_from, load_settings_or_default, ProcessorKind,
    Settings,
};
use crate::core::{MessageQueueService, QueueConfig, QueueStats};
use crate::processors::create_processor;
use crate::web::{run_server, Acknowledgement, AppState};
use crate::worker::{QueueWorker, WorkerConfig};

const DEFAULT_URL: &str = "http://localhost:8088";

/// intake - burst-aware message intake for conversational backends.
#[derive(Parser, Debug)]
#[command(name = "intake")]
#[command(version)]
#[command(about = "Debounce, aggregate and dispatch customer messages", long_about = None)]
pub struct Commands {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP intake and the queue worker
    Serve {
        /// Settings file (defaults to ~/.intake/settings.json)
        #[arg(long, env = "INTAKE_CONFIG")]
        config: Option<PathBuf>,

        /// Bind address
        #[arg(long, env = "INTAKE_HOST")]
        host: Option<String>,

        /// Port number
        #[arg(long, env = "INTAKE_PORT")]
        port: Option<u16>,

        /// Processor: echo, command, ollama
        #[arg(long, env = "INTAKE_PROCESSOR")]
        processor: Option<ProcessorKind>,
    },

    /// Show effective settings
    Config {
        /// Write a default settings file
        #[arg(long)]
        init: bool,
    },

    /// Show queue statistics from a running server
    Status {
        /// Server URL
        #[arg(long, env = "INTAKE_URL", default_value = DEFAULT_URL)]
        url: String,

        /// Show one customer's queue instead
        #[arg(long)]
        customer: Option<String>,
    },

    /// Send a message to a running server
    Send {
        /// Message to send
        message: String,

        /// Customer ID
        #[arg(long, default_value = "cli")]
        customer: String,

        /// Channel name
        #[arg(long, default_value = "cli")]
        channel: String,

        /// Priority: 0 (normal), 1 (high), 2 (urgent)
        #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=2))]
        priority: u8,

        /// Server URL
        #[arg(long, env = "INTAKE_URL", default_value = DEFAULT_URL)]
        url: String,
    },
}

impl Commands {
    /// Run the command.
    pub async fn run(&self) -> Result<()> {
        match &self.command {
            Command::Serve {
                config,
                host,
                port,
                processor,
            } => cmd_serve(config.as_deref(), host.clone(), *port, *processor).await,
            Command::Config { init } => cmd_config(*init).await,
            Command::Status { url, customer } => cmd_status(url, customer.as_deref()).await,
            Command::Send {
                message,
                customer,
                channel,
                priority,
                url,
            } => cmd_send(url, customer, channel, *priority, message).await,
        }
    }
}

/// Apply command-line overrides on top of loaded settings.
fn apply_overrides(
    mut settings: Settings,
    host: Option<String>,
    port: Option<u16>,
    processor: Option<ProcessorKind>,
) -> Settings {
    if let Some(host) = host {
        settings.web.host = host;
    }
    if let Some(port) = port {
        settings.web.port = port;
    }
    if let Some(kind) = processor {
        settings.processor.kind = kind;
    }
    settings
}

async fn cmd_serve(
    config: Option<&std::path::Path>,
    host: Option<String>,
    port: Option<u16>,
    processor: Option<ProcessorKind>,
) -> Result<()> {
    let settings = match config {
        Some(path) => load_settings_from(path)?,
        None => load_settings_or_default(),
    };
    let settings = apply_overrides(settings, host, port, processor);

    let service = MessageQueueService::new(QueueConfig::from(&settings.queue));
    let processor = create_processor(&settings.processor)?;
    let worker = Arc::new(QueueWorker::new(
        service,
        processor,
        WorkerConfig::from(&settings.worker),
    ));
    worker.start().await;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl+C, shutting down");
        }
        signal.cancel();
    });

    println!(
        "intake listening on {}:{} (Ctrl+C to stop)",
        settings.web.host, settings.web.port
    );

    let server_shutdown = shutdown.clone();
    let served = run_server(&settings.web, AppState::new(worker.clone()), async move {
        server_shutdown.cancelled().await
    })
    .await;

    worker.stop().await;
    served?;
    Ok(())
}

async fn cmd_config(init: bool) -> Result<()> {
    if init {
        let path = init_settings()?;
        println!("Wrote default settings to {}", path.display());
        return Ok(());
    }

    let settings = load_settings_or_default();
    println!("# {}", get_settings_path()?.display());
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}

async fn cmd_status(url: &str, customer: Option<&str>) -> Result<()> {
    let client = reqwest::Client::new();
    let base = url.trim_end_matches('/');

    if let Some(customer_id) = customer {
        let status: serde_json::Value = client
            .get(format!("{}/api/queue/customers/{}", base, customer_id))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    let stats: QueueStats = client
        .get(format!("{}/api/queue/stats", base))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    println!("{}", stats);
    Ok(())
}

async fn cmd_send(
    url: &str,
    customer: &str,
    channel: &str,
    priority: u8,
    message: &str,
) -> Result<()> {
    let body = serde_json::json!({
        "customer_id": customer,
        "content": message,
        "channel": channel,
        "priority": priority,
    });

    let response = reqwest::Client::new()
        .post(format!("{}/api/messages", url.trim_end_matches('/')))
        .json(&body)
        .send()
        .await?;

    let status = response.status();
    if status.is_client_error() && status != reqwest::StatusCode::TOO_MANY_REQUESTS {
        anyhow::bail!("Server rejected message: {}", status);
    }

    let ack: Acknowledgement = response.json().await?;
    match (&ack.message_id, &ack.reason) {
        (Some(id), None) => println!("Queued message {}", id),
        (_, Some(reason)) => println!("Not queued: {}", reason),
        (None, None) => println!("Not queued"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Commands::command().debug_assert();
    }

    #[test]
    fn test_serve_accepts_overrides() {
        let args =
            Commands::try_parse_from(["intake", "serve", "--port", "9000", "--processor", "ollama"])
                .unwrap();

        let Command::Serve { port, processor, .. } = args.command else {
            panic!("expected serve");
        };
        assert_eq!(port, Some(9000));
        assert_eq!(processor, Some(ProcessorKind::Ollama));

        let settings = apply_overrides(Settings::default(), None, port, processor);
        assert_eq!(settings.web.port, 9000);
        assert_eq!(settings.web.host, "0.0.0.0");
        assert_eq!(settings.processor.kind, ProcessorKind::Ollama);
    }

    #[test]
    fn test_send_rejects_out_of_range_priority() {
        assert!(Commands::try_parse_from(["intake", "send", "hi", "--priority", "3"]).is_err());

        let args = Commands::try_parse_from(["intake", "send", "hi", "--customer", "c9"]).unwrap();
        let Command::Send { customer, priority, .. } = args.command else {
            panic!("expected send");
        };
        assert_eq!(customer, "c9");
        assert_eq!(priority, 0);
    }
}
