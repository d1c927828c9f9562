// src/main.rs

use tokio::time::Instant;

use procdag::config::load_and_validate;
use procdag::errors::Result;
use procdag::{cli, logging, run};

#[tokio::main]
async fn main() {
    if let Err(err) = run_main().await {
        eprintln!("procdag error: {err}");
        std::process::exit(err.exit_code());
    }
}

async fn run_main() -> Result<()> {
    let started = Instant::now();
    let args = cli::parse();
    let cfg = load_and_validate(&args.config)?;

    let log_dir = args.log_dir.clone().or_else(|| cfg.logging.dir.clone());
    logging::init_logging(args.log_level, log_dir.as_deref())?;

    run(&args, cfg, started).await
}
