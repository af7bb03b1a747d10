use clap::Parser;
use pubsub_sandbox::{init_tracing, run, Cli};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.json) {
        eprintln!("{}", e);
        std::process::exit(e.exit_code());
    }

    match run(&cli).await {
        Ok(summary) => info!(published = summary.published, "Done"),
        Err(e) => {
            error!(error = %e, "Sandbox failed");
            std::process::exit(e.exit_code());
        }
    }
}
