use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::BufReader;
use tracing::info;

use guardchat::chat::{self, ChatSession};
use guardchat::completion::AzureOpenAiClient;
use guardchat::config::{AppConfig, CompletionSettings, PipelineConfig, ScanBackend, ScanSettings};
use guardchat::report::ThreatReport;
use guardchat::scan::{self, ScanRequest};
use guardchat::ExchangePipeline;

// Define the command-line interface structure using clap
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start an interactive chat where every exchange is security scanned.
    Chat {
        #[arg(long, value_enum, env = "GUARDCHAT_SCAN_BACKEND", default_value_t = ScanBackend::Api, help = "Scan client implementation.")]
        backend: ScanBackend,
        #[arg(long, help = "Maximum number of messages kept as model context.")]
        max_history: Option<usize>,
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..), help = "Per-call timeout in seconds for scans and completions.")]
        timeout: Option<u64>,
    },
    /// Scan a single piece of text and print the verdict.
    Scan {
        text: String,
        #[arg(long, help = "Scan the text as a model response instead of a prompt.")]
        response: bool,
        #[arg(long, value_enum, env = "GUARDCHAT_SCAN_BACKEND", default_value_t = ScanBackend::Api, help = "Scan client implementation.")]
        backend: ScanBackend,
    },
    /// Validate configuration and print a summary.
    Check,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load .env file if present (scanner and Azure credentials)
    dotenvy::dotenv().ok();

    // Reads log level from RUST_LOG (e.g. RUST_LOG=info,guardchat=debug)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    info!("guardchat starting with command: {:?}", cli.command);

    match cli.command {
        Commands::Chat { backend, max_history, timeout } => {
            let mut config = AppConfig::from_env().context("Invalid configuration")?;
            if let Some(max_history) = max_history {
                config.pipeline.max_history = max_history;
            }
            if let Some(secs) = timeout {
                config.pipeline.timeout = Duration::from_secs(secs);
            }

            let scanner = scan::build_client(backend, &config.scan).context("Failed to initialize scan client")?;
            let completer = Arc::new(AzureOpenAiClient::new(config.completion));
            let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
            let pipeline = ExchangePipeline::new(scanner, completer, config.pipeline).with_events(tx);

            info!(%backend, "Starting interactive chat session...");
            let mut session = ChatSession::new(pipeline);
            let stdin = BufReader::new(tokio::io::stdin());
            let mut stdout = tokio::io::stdout();
            chat::run_chat_loop(&mut session, stdin, &mut stdout, Some(rx))
                .await
                .context("Chat session failed")?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Scan { text, response, backend } => {
            let settings = ScanSettings::from_env().context("Invalid scan configuration")?;
            let pipeline_config = PipelineConfig::from_env().context("Invalid pipeline configuration")?;
            let scanner = scan::build_client(backend, &settings).context("Failed to initialize scan client")?;

            let request = if response {
                ScanRequest::response(&settings.profile_name, text, pipeline_config.metadata.clone())
            } else {
                ScanRequest::prompt(&settings.profile_name, text, pipeline_config.metadata.clone())
            };
            println!("Transaction ID: {}", request.tr_id);

            let verdict = scanner
                .scan(&request, pipeline_config.timeout)
                .await
                .context("Security scan failed")?;
            print!("{}", ThreatReport::from_verdict(&verdict).render());

            if verdict.is_blocking(pipeline_config.alert_policy) {
                println!("BLOCKED");
                Ok(ExitCode::from(2))
            } else {
                println!("ALLOWED");
                Ok(ExitCode::SUCCESS)
            }
        }
        Commands::Check => {
            let scan = ScanSettings::from_env().context("Scan service configuration")?;
            let completion = CompletionSettings::from_env().context("Azure OpenAI configuration")?;
            let pipeline = PipelineConfig::from_env().context("Pipeline configuration")?;

            println!("Scan endpoint:     {}", scan.endpoint);
            println!("Scan API key:      {}", scan.api_key.masked());
            println!("Scan profile:      {}", scan.profile_name);
            println!("Scan retries:      {}", scan.num_retries);
            println!("Azure endpoint:    {}", completion.endpoint);
            println!("Azure key:         {}", completion.api_key.masked());
            println!("Azure deployment:  {}", completion.deployment);
            println!("Azure API version: {}", completion.api_version);
            println!("Timeout:           {}s", pipeline.timeout.as_secs());
            println!("Max history:       {}", pipeline.max_history);
            println!("Alert policy:      {:?}", pipeline.alert_policy);
            println!("Configuration OK");
            Ok(ExitCode::SUCCESS)
        }
    }
}
