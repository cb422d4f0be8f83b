//! CLI definition using clap derive.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use gamecast_core::detect::{DEFAULT_CS_MILESTONES, DEFAULT_GOLD_MILESTONES};
use gamecast_core::prompt::DEFAULT_VOICE;

use crate::openai::{DEFAULT_BASE_URL, DEFAULT_CHAT_MODEL, DEFAULT_SPEECH_MODEL};

#[derive(Parser, Debug)]
#[command(name = "gamecast", about = "Live match commentary relay")]
pub struct Cli {
    /// Ingest socket path (default: $XDG_RUNTIME_DIR/gamecast/gamecast.sock)
    #[arg(long, short = 's', global = true, env = "GAMECAST_SOCKET")]
    pub socket_path: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the match service, the WebSocket hub and the ingest socket
    Serve(ServeOpts),
    /// Subscribe to a hub and play incoming commentary
    Listen(ListenOpts),
    /// Open a session for a user
    Establish(SessionOpts),
    /// End the active session
    Disconnect(SessionOpts),
    /// Send one live-game payload (JSON file, `-` for stdin)
    Ingest(IngestOpts),
    /// Show session and subscriber status
    Status,
}

#[derive(Args, Debug)]
pub struct ServeOpts {
    /// WebSocket listen address for listeners
    #[arg(long, default_value = "127.0.0.1:8765")]
    pub ws_addr: SocketAddr,

    /// Shared secret every ingest request must present
    #[arg(long, env = "GAMECAST_SECRET_TOKEN", hide_env_values = true)]
    pub secret_token: String,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: String,

    #[arg(long, env = "OPENAI_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub openai_base_url: String,

    #[arg(long, default_value = DEFAULT_CHAT_MODEL)]
    pub chat_model: String,

    #[arg(long, default_value = DEFAULT_SPEECH_MODEL)]
    pub speech_model: String,

    #[arg(long, default_value = DEFAULT_VOICE)]
    pub voice: String,

    /// Timeout for each commentary or speech request, in seconds
    #[arg(long, default_value = "30")]
    pub request_timeout_secs: u64,

    /// Maximum concurrent listener connections
    #[arg(long, default_value = "64")]
    pub max_connections: usize,

    /// Gold milestones, comma separated
    #[arg(long, value_delimiter = ',', default_values_t = DEFAULT_GOLD_MILESTONES.to_vec())]
    pub gold_milestones: Vec<f64>,

    /// Creep-score milestones, comma separated
    #[arg(long, value_delimiter = ',', default_values_t = DEFAULT_CS_MILESTONES.to_vec())]
    pub cs_milestones: Vec<u32>,
}

#[derive(Args, Debug)]
pub struct ListenOpts {
    /// Hub WebSocket URL
    #[arg(long, env = "GAMECAST_BACKEND_WS_URL", default_value = "ws://127.0.0.1:8765")]
    pub url: String,

    /// Output channel to connect the player to
    #[arg(long, default_value = "default")]
    pub channel: String,

    #[arg(long, default_value = "5")]
    pub reconnect_delay_secs: u64,

    #[arg(long, default_value = "30")]
    pub playback_timeout_secs: u64,

    /// Player program; receives the clip path as its last argument
    #[arg(long, default_value = crate::sink::DEFAULT_PLAYER)]
    pub player: PathBuf,

    /// Extra player argument (repeatable; replaces the defaults)
    #[arg(long = "player-arg", allow_hyphen_values = true)]
    pub player_args: Vec<String>,
}

#[derive(Args, Debug)]
pub struct SessionOpts {
    #[arg(long, env = "GAMECAST_SECRET_TOKEN", hide_env_values = true)]
    pub token: String,

    #[arg(long)]
    pub user: String,
}

#[derive(Args, Debug)]
pub struct IngestOpts {
    #[arg(long, env = "GAMECAST_SECRET_TOKEN", hide_env_values = true)]
    pub token: String,

    #[arg(long, short = 'f')]
    pub file: PathBuf,
}

/// Default socket path using $USER for per-user isolation.
pub fn default_socket_path() -> String {
    if let Ok(dir) = std::env::var("XDG_RUNTIME_DIR") {
        return format!("{dir}/gamecast/gamecast.sock");
    }
    let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    format!("/tmp/gamecast-{user}/gamecast.sock")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_defaults() {
        let cli = Cli::try_parse_from([
            "gamecast",
            "serve",
            "--secret-token",
            "t",
            "--openai-api-key",
            "k",
        ])
        .unwrap();
        let Command::Serve(opts) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(opts.ws_addr, "127.0.0.1:8765".parse().unwrap());
        assert_eq!(opts.chat_model, "gpt-4");
        assert_eq!(opts.voice, "onyx");
        assert_eq!(opts.gold_milestones, DEFAULT_GOLD_MILESTONES.to_vec());
        assert_eq!(opts.cs_milestones, vec![50, 100, 150, 200, 250, 300]);
    }

    #[test]
    fn milestone_lists_are_comma_separated() {
        let cli = Cli::try_parse_from([
            "gamecast",
            "serve",
            "--secret-token",
            "t",
            "--openai-api-key",
            "k",
            "--gold-milestones",
            "2000,1000",
            "--cs-milestones",
            "75",
        ])
        .unwrap();
        let Command::Serve(opts) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(opts.gold_milestones, vec![2000.0, 1000.0]);
        assert_eq!(opts.cs_milestones, vec![75]);
    }

    #[test]
    fn listen_player_args() {
        let cli = Cli::try_parse_from([
            "gamecast",
            "-s",
            "/tmp/x.sock",
            "listen",
            "--url",
            "ws://hub:9000",
            "--player",
            "mpv",
            "--player-arg",
            "--no-video",
        ])
        .unwrap();
        assert_eq!(cli.socket_path.as_deref(), Some("/tmp/x.sock"));
        let Command::Listen(opts) = cli.command else {
            panic!("expected listen");
        };
        assert_eq!(opts.url, "ws://hub:9000");
        assert_eq!(opts.player_args, vec!["--no-video"]);
        assert_eq!(opts.reconnect_delay_secs, 5);
    }

    #[test]
    fn ingest_requires_file() {
        assert!(Cli::try_parse_from(["gamecast", "ingest", "--token", "t"]).is_err());
    }
}
