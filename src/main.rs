use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use tracing::{error, info};

use foodhunter::{
    chat, export, web_server, Credentials, OutputFormat, Provider, ReportPipeline, SecretStore,
    Settings, Transcript,
};

// Define the command-line interface structure using clap
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    options: ReportOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Debug)]
struct ReportOptions {
    /// Completion provider: deepseek, openai or moonshot.
    #[arg(long, global = true, value_parser = parse_provider)]
    provider: Option<Provider>,
    /// LLM API key, used when LLM_API_KEY is not set.
    #[arg(long, global = true)]
    llm_api_key: Option<String>,
    /// Search API key, used when TAVILY_API_KEY is not set.
    #[arg(long, global = true)]
    search_api_key: Option<String>,
    /// Report layout: markdown or html.
    #[arg(long, global = true, value_parser = parse_format)]
    format: Option<OutputFormat>,
    /// Number of search results fed to the model.
    #[arg(long, global = true)]
    max_results: Option<usize>,
    /// Sampling temperature for the report.
    #[arg(long, global = true)]
    temperature: Option<f32>,
    /// Let the model rewrite the request into a search query first.
    #[arg(long, global = true)]
    rewrite_query: bool,
    /// Add the current year-month to the search query.
    #[arg(long, global = true)]
    with_month: bool,
    /// Look up a picture for each dish card (html format only).
    #[arg(long, global = true)]
    with_images: bool,
}

// Define the available subcommands
#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the FoodHunter web UI.
    Serve {
        #[arg(long, default_value_t = 8501, help = "Port for the web server.")]
        port: u16,
    },
    /// Produce a single report and print it.
    Ask {
        /// What you want to know, e.g. "最近火锅店有什么新的甜品爆款？"
        request: String,
        #[arg(long, help = "Also write the report to a timestamped file.")]
        save: bool,
        #[arg(long, default_value = ".", help = "Directory for --save.")]
        out_dir: PathBuf,
    },
    /// Engage in a text-based chat session with FoodHunter.
    Chat,
}

fn parse_provider(s: &str) -> Result<Provider, String> {
    s.parse().map_err(|e: foodhunter::ReportError| e.to_string())
}

fn parse_format(s: &str) -> Result<OutputFormat, String> {
    s.parse().map_err(|e: foodhunter::ReportError| e.to_string())
}

impl ReportOptions {
    fn settings(&self) -> Settings {
        let mut settings = Settings::from_env();
        if let Some(provider) = self.provider {
            settings.provider = provider;
        }
        if let Some(format) = self.format {
            settings.format = format;
        }
        if let Some(max_results) = self.max_results {
            settings.max_results = max_results.max(1);
        }
        if let Some(temperature) = self.temperature {
            settings = settings.with_temperature(temperature);
        }
        settings.rewrite_query = self.rewrite_query;
        settings.enrich_images = self.with_images;
        settings.query = settings.query.with_month(self.with_month);
        settings
    }

    fn credentials(&self, secrets: &SecretStore) -> Credentials {
        Credentials::resolve(
            secrets,
            self.llm_api_key.clone(),
            self.search_api_key.clone(),
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (for environment variables like API keys)
    dotenvy::dotenv().ok();

    // Reads log level from RUST_LOG (e.g., RUST_LOG=info,foodhunter=debug)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    info!("FoodHunter starting with command: {:?}", cli.command);

    let secrets = SecretStore::from_env();
    let pipeline = ReportPipeline::new(cli.options.settings())
        .context("Failed to initialize report pipeline")?;

    match cli.command {
        Commands::Serve { port } => {
            info!("Starting FoodHunter web UI on port {}...", port);

            let mut web_server_handle = tokio::spawn(async move {
                if let Err(e) = web_server::start_web_server(port, pipeline, secrets).await {
                    error!("Web server failed: {:?}", e);
                }
            });

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Ctrl-C received, initiating shutdown...");
                    web_server_handle.abort();
                }
                res = &mut web_server_handle => {
                    match res {
                        Ok(_) => info!("Web server task completed unexpectedly."),
                        Err(e) if e.is_panic() => error!("Web server task panicked: {:?}", e),
                        Err(e) => error!("Web server task failed: {:?}", e),
                    }
                }
            }
            info!("Shutdown complete.");
        }
        Commands::Ask {
            request,
            save,
            out_dir,
        } => {
            let credentials = cli.options.credentials(&secrets);
            let mut transcript = Transcript::new();
            let report = pipeline
                .run(&mut transcript, &request, &credentials, None)
                .await
                .context("出错啦")?;
            println!("{}", report.content);

            if save {
                let path = export::save_report(&out_dir, &report, Local::now())?;
                eprintln!("Saved report to {}", path.display());
            }
        }
        Commands::Chat => {
            let credentials = cli.options.credentials(&secrets);
            chat::run_terminal_chat(&pipeline, &credentials)
                .await
                .context("Chat session failed")?;
        }
    }

    Ok(())
}
