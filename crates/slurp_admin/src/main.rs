use clap::Parser;
use slurp_admin::{Cli, run};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Log level from `SLURP_LOG_LEVEL`, then `RUST_LOG`, default `info`.
    let log_env = std::env::var("SLURP_LOG_LEVEL")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_new(format!("{log_env},reqwest=warn,hyper=warn"))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .compact()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .with_env_filter(env_filter)
        .init();
    tracing::info!("slurp-admin: log filter: {}", log_env);

    let cli = Cli::parse();
    for line in run(cli.command).await? {
        println!("{line}");
    }
    Ok(())
}
