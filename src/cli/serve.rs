//! `serve`: run the relay until interrupted

use std::error::Error;
use std::path::PathBuf;

use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::core::config::{load_settings, SettingsOverrides};
use crate::server::{self, AppState, ServerMode};

#[derive(clap::Args, Debug, Default, Clone)]
pub struct ServeArgs {
    /// Port to listen on (overrides PORT and the config file)
    #[arg(short = 'P', long)]
    pub port: Option<u16>,

    /// Address to bind
    #[arg(long)]
    pub bind: Option<String>,

    /// Provider base URL (overrides OPENAI_BASE_URL)
    #[arg(long, value_name = "URL")]
    pub base_url: Option<String>,

    /// Model to request (overrides AI_MODEL)
    #[arg(short = 'm', long)]
    pub model: Option<String>,

    /// Answer with canned replies instead of calling a provider
    #[arg(long)]
    pub mock: bool,
}

impl ServeArgs {
    pub fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            port: self.port,
            bind: self.bind.clone(),
            base_url: self.base_url.clone(),
            model: self.model.clone(),
        }
    }

    pub fn mode(&self) -> ServerMode {
        if self.mock {
            ServerMode::Mock
        } else {
            ServerMode::Live
        }
    }
}

pub async fn run_serve(args: ServeArgs, config_path: Option<PathBuf>) -> Result<(), Box<dyn Error>> {
    let settings = load_settings(config_path.as_deref(), &args.overrides())?;
    let state = AppState::from_settings(&settings, args.mode())?;

    let listener = TcpListener::bind((settings.bind.as_str(), settings.port)).await?;
    let addr = listener.local_addr()?;
    println!("Chat relay running on http://{addr}");
    if args.mock {
        println!("Mock mode: replies are canned, no provider is called");
    }

    server::serve(listener, state, shutdown_signal()).await?;
    info!("relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("interrupt received, shutting down"),
        Err(err) => {
            warn!(error = %err, "cannot listen for ctrl-c; running until killed");
            std::future::pending::<()>().await;
        }
    }
}
