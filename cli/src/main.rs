use clap::Parser;
use parking_cli::ParkingCli;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = ParkingCli::parse();
    if let Err(err) = cli.run().await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
