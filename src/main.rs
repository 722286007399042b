use matic::args::Args;
use matic::config::AppConfig;
use matic::pipeline::{self, Stage};
use matic::xlsx::XlsxEditor;
use std::process;
use tracing::{info, Level};
use tracing_subscriber::fmt::time::ChronoLocal;

fn main() {
    let args = Args::parse();

    let mut config = AppConfig::from_env();
    if let Some(root) = &args.root {
        config = AppConfig {
            verbose: config.verbose,
            ..AppConfig::with_root(root)
        };
    }
    config.verbose |= args.verbose;

    tracing_subscriber::fmt()
        .with_timer(ChronoLocal::new(String::from("%Y-%m-%d %H:%M:%S")))
        .with_target(true)
        .with_level(true)
        .with_max_level(if config.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    info!("Starting matic");
    info!("Configuration: {:?}", config);

    let mut editor = XlsxEditor::new();
    let result = match args.stage.as_deref().map(str::parse::<Stage>) {
        None => pipeline::run_all(&config, &mut editor),
        Some(Ok(stage)) => pipeline::run_stages(&[stage], &config, &mut editor),
        Some(Err(err)) => {
            eprintln!("{}", err);
            process::exit(2);
        }
    };

    // The runner has already logged the failing stage.
    if result.is_err() {
        process::exit(1);
    }
    info!("All stages finished");
}
