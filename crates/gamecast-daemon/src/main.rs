//! gamecast: live match commentary relay binary.

use clap::Parser;

use gamecast_daemon::cli::{self, Command};
use gamecast_daemon::client::rpc_call;
use gamecast_daemon::runtime;

fn init_tracing() {
    let filter = std::env::var("GAMECAST_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();
    let socket_path = args.socket_path.unwrap_or_else(cli::default_socket_path);

    match args.command {
        Command::Serve(opts) => {
            init_tracing();
            tracing::info!("gamecast server starting");
            runtime::serve(opts, &socket_path).await?;
        }
        Command::Listen(opts) => {
            init_tracing();
            tracing::info!(url = %opts.url, "gamecast listener starting");
            runtime::listen(opts).await?;
        }
        Command::Establish(opts) => {
            let params = serde_json::json!({ "token": opts.token, "user": opts.user });
            let result = rpc_call(&socket_path, "establish", params).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Disconnect(opts) => {
            let params = serde_json::json!({ "token": opts.token, "user": opts.user });
            let result = rpc_call(&socket_path, "disconnect", params).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Ingest(opts) => {
            let result = runtime::ingest_file(opts, &socket_path).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Status => {
            let result = rpc_call(&socket_path, "status", serde_json::json!({})).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}
