use std::env;

use clap::Parser;
use cli::{Args, Commands};
use context::AppContext;
use logging::setup_logging;
use miette::{IntoDiagnostic, Result};
use mirrorkit_config::config::{config_path, Config};
use tracing::{debug, info};

mod cli;
mod context;
mod logging;
mod mirror;
mod progress;
mod utils;

fn load_config(args: &Args) -> Result<Config> {
    let path = match args.config.as_deref() {
        Some(path) if path.is_relative() => {
            Some(env::current_dir().into_diagnostic()?.join(path))
        }
        other => other.map(ToOwned::to_owned),
    };
    let path = config_path(path.as_deref());
    debug!(path = %path.display(), "config file");
    Ok(Config::load(&path)?)
}

async fn handle_cli() -> Result<()> {
    let args = Args::parse();

    setup_logging(&args);
    utils::set_color(!args.no_color && !args.json);
    utils::set_progress(!args.no_progress && !args.json && !args.quiet);

    let config = load_config(&args)?;

    match args.command {
        Commands::Config => {
            info!("{}", config.to_toml()?);
        }
        Commands::Mirror { command } => {
            let ctx = AppContext::open(config)?;
            let result = mirror::run(&ctx, command).await;
            progress::stop();
            result?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .build(),
        )
    }))
    .ok();

    if let Err(err) = handle_cli().await {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}
