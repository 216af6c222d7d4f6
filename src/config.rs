//! Server configuration from command-line flags and environment variables.

use crate::connection::ReconnectPolicy;
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(name = "whatsapp-call-api")]
#[command(about = "HTTP API for placing and managing WhatsApp calls")]
pub struct Config {
    /// Address to bind the HTTP API to
    #[arg(long, env = "HTTP_HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// HTTP API port
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Log filter used when RUST_LOG is not set
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Consecutive reconnect attempts before giving up
    #[arg(long, env = "RECONNECT_MAX_ATTEMPTS", default_value_t = 5)]
    pub reconnect_max_attempts: u32,

    /// Delay before the first reconnect attempt, doubled on each failure
    #[arg(long, env = "RECONNECT_BASE_DELAY_MS", default_value_t = 1_000)]
    pub reconnect_base_delay_ms: u64,

    /// Upper bound for the reconnect delay
    #[arg(long, env = "RECONNECT_MAX_DELAY_MS", default_value_t = 30_000)]
    pub reconnect_max_delay_ms: u64,

    /// How long the simulated transport waits before reporting the QR as scanned
    #[arg(long, env = "PAIRING_DELAY_MS", default_value_t = 15_000)]
    pub pairing_delay_ms: u64,
}

impl Config {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: self.reconnect_max_attempts,
            base_delay: Duration::from_millis(self.reconnect_base_delay_ms),
            max_delay: Duration::from_millis(self.reconnect_max_delay_ms),
        }
    }

    pub fn pairing_delay(&self) -> Duration {
        Duration::from_millis(self.pairing_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::try_parse_from(["whatsapp-call-api"]).unwrap();
        let policy = config.reconnect_policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_delay, Duration::from_secs(1));
    }

    #[test]
    fn flags_override_defaults() {
        let config = Config::try_parse_from([
            "whatsapp-call-api",
            "--host",
            "127.0.0.1",
            "--port",
            "8080",
            "--reconnect-max-attempts",
            "2",
            "--pairing-delay-ms",
            "0",
        ])
        .unwrap();
        assert_eq!(config.addr().to_string(), "127.0.0.1:8080");
        assert_eq!(config.reconnect_policy().max_attempts, 2);
        assert!(config.pairing_delay().is_zero());
    }
}
