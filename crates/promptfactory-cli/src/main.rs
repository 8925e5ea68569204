use clap::Parser;

mod cli;
mod templates;

use cli::args::Cli;
use cli::commands::{dispatch, exit_codes};
use promptfactory_core::config::{FactoryConfig, LogFormat};
use tracing_subscriber::EnvFilter;

fn init_logging(cfg: &FactoryConfig) {
    let filter = EnvFilter::try_new(cfg.log_level()).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    match cfg.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let cli = Cli::parse();

    let mut cfg = match promptfactory_core::config::load_config(&cli.config, cli.strict) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(exit_codes::CONFIG_ERROR);
        }
    };
    if let Err(e) = cfg.apply_env() {
        eprintln!("{}", e);
        std::process::exit(exit_codes::CONFIG_ERROR);
    }
    init_logging(&cfg);

    let code = match dispatch(cli, cfg).await {
        Ok(code) => code,
        Err(e) => {
            match promptfactory_core::errors::try_map_error(&e) {
                Some(msg) => eprintln!("{}", msg),
                None => eprintln!("fatal: {e:?}"),
            }
            exit_codes::CONFIG_ERROR
        }
    };
    std::process::exit(code);
}
