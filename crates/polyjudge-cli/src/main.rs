//! Polyjudge CLI
//!
//! A command-line tool for running submissions through the polyjudge runtimes.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use polyjudge::{CompileClient, Config, Dispatcher, EXAMPLE_CONFIG, Language, Question};
use tracing::{Level, debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "polyjudge")]
#[command(about = "A tool for judging code submissions in several languages")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new configuration file
    Init {
        /// Output path (default: polyjudge.toml)
        #[arg(short, long, default_value = "polyjudge.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Run a submission against a question's examples
    Run {
        /// Source file to run
        #[arg(value_name = "FILE")]
        source: PathBuf,

        /// Language (javascript, python, cpp, c, java)
        #[arg(short, long)]
        language: String,

        /// Question JSON with `examples` and an optional `functionName`
        #[arg(short, long)]
        question: Option<PathBuf>,
    },

    /// List available languages
    Languages,

    /// Show the effective configuration
    ShowConfig,

    /// Check that runtime modules and remote services are reachable
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Init { output, force } => init_config(&output, force).await,
        Commands::Run {
            source,
            language,
            question,
        } => {
            let config = load_config(cli.config.as_deref())?;
            run_submission(&config, &source, &language, question.as_deref()).await
        }
        Commands::Languages => {
            list_languages(&load_config(cli.config.as_deref())?);
            Ok(())
        }
        Commands::ShowConfig => show_config(&load_config(cli.config.as_deref())?),
        Commands::Health => check_health(&load_config(cli.config.as_deref())?).await,
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    if let Some(path) = path {
        info!(?path, "loading configuration");
    } else {
        debug!("using default configuration");
    }
    Config::load(path).context("failed to load configuration")
}

async fn run_submission(
    config: &Config,
    source: &Path,
    language: &str,
    question: Option<&Path>,
) -> Result<()> {
    let code = tokio::fs::read_to_string(source)
        .await
        .context("failed to read source file")?;

    let question = match question {
        Some(path) => {
            let raw = tokio::fs::read_to_string(path)
                .await
                .context("failed to read question file")?;
            serde_json::from_str::<Question>(&raw).context("failed to parse question file")?
        }
        None => Question::default(),
    };

    let dispatcher = Dispatcher::from_config(config).context("failed to start runtimes")?;
    let result = dispatcher.execute_code(language, &code, &question).await;

    println!(
        "{}",
        serde_json::to_string_pretty(&result).context("failed to serialize result")?
    );

    if result.is_accepted() {
        Ok(())
    } else {
        std::process::exit(1);
    }
}

fn list_languages(config: &Config) {
    println!("Available languages:\n");

    for language in Language::ALL {
        let timeout = config
            .limits_for(language)
            .timeout_ms
            .map(|ms| format!("{ms} ms"))
            .unwrap_or_else(|| "none".to_string());
        let backend = match language {
            Language::JavaScript => "embedded",
            Language::Python | Language::Cpp | Language::C => "wasi",
            Language::Java => "remote",
        };
        println!("  {:<12} {:<9} timeout {}", language.id(), backend, timeout);
    }
}

fn show_config(config: &Config) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(config).context("failed to serialize configuration")?
    );
    Ok(())
}

async fn check_health(config: &Config) -> Result<()> {
    let mut healthy = true;

    healthy &= report_module("python", &config.python.module);
    for language in [Language::Cpp, Language::C] {
        let Some(native) = config.native(language) else {
            continue;
        };
        healthy &= report_module(language.id(), &native.interpreter);

        if let Some(url) = native.compile_service.as_deref() {
            match CompileClient::new(url) {
                Ok(client) => match client.health().await {
                    Ok(()) => println!("  {:<12} compile service {url} ok", language.id()),
                    Err(e) => {
                        warn!(language = language.id(), error = %e, "compile service unhealthy");
                        println!("  {:<12} compile service {url} unavailable: {e}", language.id());
                    }
                },
                Err(e) => {
                    healthy = false;
                    println!("  {:<12} compile service {url} invalid: {e}", language.id());
                }
            }
        }
    }

    for endpoint in &config.java.endpoints {
        println!("  {:<12} endpoint {endpoint}", "java");
    }

    if healthy {
        Ok(())
    } else {
        anyhow::bail!("one or more runtime modules are missing")
    }
}

fn report_module(name: &str, path: &Path) -> bool {
    let found = path.is_file();
    let state = if found { "ok" } else { "missing" };
    println!("  {:<12} module {} {state}", name, path.display());
    found
}

async fn init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists at '{}'. Use --force to overwrite.",
            output.display()
        );
    }

    tokio::fs::write(output, EXAMPLE_CONFIG)
        .await
        .context("failed to write configuration file")?;

    println!("Created configuration file at '{}'", output.display());
    Ok(())
}
