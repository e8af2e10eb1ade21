use clap::Parser;
use mass_pension::{api, telemetry};

#[tokio::main]
async fn main() {
    let cli = api::Cli::parse();
    telemetry::init_tracing(cli.log_json, cli.log_level.into());

    if let Err(e) = api::run(cli).await {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
