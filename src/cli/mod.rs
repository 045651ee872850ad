//! Command-line interface parsing and handling
//!
//! `serve` runs the relay, `ask` is a terminal client for a running relay,
//! and `config` prints the settings the relay would start with.

pub mod ask;
pub mod serve;

#[cfg(test)]
mod tests;

use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::cli::ask::{run_ask, AskArgs};
use crate::cli::serve::{run_serve, ServeArgs};
use crate::core::config::{default_config_path, load_settings, path_display, SettingsOverrides};
use crate::utils::logging::init_tracing;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("VERGEN_GIT_DESCRIBE"),
    ", built ",
    env!("VERGEN_BUILD_TIMESTAMP"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "chatbot-relay")]
#[command(version, long_version = LONG_VERSION)]
#[command(about = "Streaming relay between an embeddable chat widget and an LLM provider")]
#[command(
    long_about = "Runs the backend for an embeddable chat widget: it accepts chat requests \
with optional file uploads, forwards them to a chat-completions provider, and relays the \
reply back as a stream of server-sent events.\n\n\
Environment Variables:\n\
  OPENAI_API_KEY    Provider API key (required unless --mock)\n\
  OPENAI_BASE_URL   Provider base URL (defaults to https://api.openai.com/v1)\n\
  PORT              Listening port (defaults to 3000)\n\
  AI_MODEL, AI_TEMPERATURE, AI_MAX_TOKENS, AI_TOP_P\n\
                    Generation parameters\n\
  RUST_LOG          Log filter (defaults to chatbot_relay=info)"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Write logs to this file instead of stderr
    #[arg(short = 'l', long, global = true, value_name = "FILE")]
    pub log: Option<PathBuf>,

    /// Configuration file to use instead of the default location
    #[arg(short = 'c', long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the relay server
    Serve(ServeArgs),
    /// Send one message to a running relay and print the reply
    Ask(AskArgs),
    /// Print the configuration file location and the resolved settings
    Config,
}

pub fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_tracing(args.log.as_deref())?;

    tokio::runtime::Runtime::new()?.block_on(async_main(args))
}

async fn async_main(args: Args) -> Result<(), Box<dyn Error>> {
    let config_path = args.config.or_else(default_config_path);

    match args.command {
        Commands::Serve(serve_args) => run_serve(serve_args, config_path).await,
        Commands::Ask(ask_args) => run_ask(ask_args).await,
        Commands::Config => {
            match &config_path {
                Some(path) => println!("Config file: {}", path_display(path)),
                None => println!("Config file: (no config directory available)"),
            }
            let settings = load_settings(config_path.as_deref(), &SettingsOverrides::default())?;
            println!("bind         = {}", settings.bind);
            println!("port         = {}", settings.port);
            println!("base_url     = {}", settings.base_url);
            println!("model        = {}", settings.generation.model);
            println!("temperature  = {}", settings.generation.temperature);
            println!("max_tokens   = {}", settings.generation.max_tokens);
            println!("top_p        = {}", settings.generation.top_p);
            println!(
                "api_key      = {}",
                if settings.api_key.is_some() {
                    "(set)"
                } else {
                    "(not set)"
                }
            );
            Ok(())
        }
    }
}
