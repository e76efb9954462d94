use clap::Parser;
use std::path::PathBuf;
use tokio::time::Duration;

use crate::codec::RequestCodec;

pub const HOST: &str = "127.0.0.1";
pub const PORT: u16 = 6379;
pub const PERSISTENCE_PATH: &str = "./redos-data.json";
pub const PERSISTENCE_INTERVAL_MS: u64 = 5000;

/// Server configuration. Every option can also be given through the environment.
#[derive(Parser, Debug, Clone)]
#[command(name = "redos-server", version, about = "In-memory key-value server")]
pub struct Config {
    /// The host to listen on
    #[arg(long, env = "REDOS_HOST", default_value = HOST)]
    pub host: String,

    /// The port to listen on
    #[arg(short, long, env = "REDOS_PORT", default_value_t = PORT)]
    pub port: u16,

    /// Snapshot file, loaded on startup and rewritten periodically
    #[arg(long, env = "REDOS_PERSISTENCE_PATH", default_value = PERSISTENCE_PATH)]
    pub persistence_path: PathBuf,

    /// Milliseconds between two snapshots
    #[arg(long, env = "REDOS_PERSISTENCE_INTERVAL_MS", default_value_t = PERSISTENCE_INTERVAL_MS)]
    pub persistence_interval_ms: u64,

    /// Run without loading or writing snapshots
    #[arg(long)]
    pub no_persistence: bool,

    /// Largest request, in bytes, the server buffers before closing the connection
    #[arg(long, env = "MAX_FRAME_SIZE", default_value_t = RequestCodec::max_frame_size())]
    pub max_frame_size: usize,
}

impl Config {
    pub fn persistence_interval(&self) -> Duration {
        Duration::from_millis(self.persistence_interval_ms)
    }

    pub fn persistence_path(&self) -> Option<&PathBuf> {
        (!self.no_persistence).then_some(&self.persistence_path)
    }

    /// Configuration for an in-process server on an ephemeral port with persistence off.
    pub fn ephemeral() -> Config {
        Config {
            port: 0,
            no_persistence: true,
            ..Config::default()
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: HOST.to_string(),
            port: PORT,
            persistence_path: PathBuf::from(PERSISTENCE_PATH),
            persistence_interval_ms: PERSISTENCE_INTERVAL_MS,
            no_persistence: false,
            max_frame_size: RequestCodec::max_frame_size(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::try_parse_from(["redos-server"]).unwrap();

        assert_eq!(config.host, HOST);
        assert_eq!(config.persistence_path(), Some(&PathBuf::from(PERSISTENCE_PATH)));
        assert_eq!(config.persistence_interval(), Duration::from_secs(5));
    }

    #[test]
    fn flags() {
        let config = Config::try_parse_from([
            "redos-server",
            "--port",
            "7000",
            "--persistence-interval-ms",
            "250",
            "--no-persistence",
        ])
        .unwrap();

        assert_eq!(config.port, 7000);
        assert_eq!(config.persistence_interval(), Duration::from_millis(250));
        assert_eq!(config.persistence_path(), None);
        assert_eq!(config.bind_address(), "127.0.0.1:7000");
    }
}
