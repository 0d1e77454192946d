use std::env;
use std::net::SocketAddr;
use anyhow::{Context, Result};
use zeroize::{Zeroize, Zeroizing};

use crate::clock::DEFAULT_CADENCE_MS;

/// The default freshness tolerance, in windows, on either side of the current one.
pub const DEFAULT_TOLERANCE_WINDOWS: i64 = 1;

/// Credential rotation settings shared by the signer and the verifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolSettings {
    /// The rotation cadence in milliseconds.
    pub cadence_ms: i64,
    /// How many windows a credential may drift from the verifier's window.
    pub tolerance_windows: i64,
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self {
            cadence_ms: DEFAULT_CADENCE_MS,
            tolerance_windows: DEFAULT_TOLERANCE_WINDOWS,
        }
    }
}

/// The application's configuration.
#[derive(Clone)]
pub struct Config {
    /// The URL of the PostgreSQL database.
    pub database_url: String,
    /// The URL of the Redis server holding identities and rate-limit counters.
    pub redis_url: String,
    /// The address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// The master key sealing per-session secrets at rest.
    pub master_key: Zeroizing<Vec<u8>>,
    /// Credential rotation settings.
    pub protocol: ProtocolSettings,
    /// How often elapsed sessions are swept inactive, in seconds.
    pub session_sweep_interval_secs: u64,
}

impl Config {
    /// Creates a new `Config` from environment variables.
    ///
    /// `DATABASE_URL` and `MASTER_KEY` are required; everything else has a
    /// default.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Config`.
    pub fn from_env() -> Result<Self> {
        let mut master_key_hex = env::var("MASTER_KEY")
            .context("MASTER_KEY must be set (generate with: openssl rand -hex 32)")?;

        let master_key_bytes = hex::decode(&master_key_hex)
            .context("MASTER_KEY must be valid hexadecimal")?;

        master_key_hex.zeroize();

        if master_key_bytes.len() != 32 {
            anyhow::bail!("MASTER_KEY must be exactly 32 bytes (64 hex characters)");
        }

        let cadence_ms: i64 = env::var("CREDENTIAL_CADENCE_MS")
            .unwrap_or_else(|_| DEFAULT_CADENCE_MS.to_string())
            .parse()
            .context("Invalid CREDENTIAL_CADENCE_MS")?;
        if cadence_ms <= 0 {
            anyhow::bail!("CREDENTIAL_CADENCE_MS must be positive");
        }

        let tolerance_windows: i64 = env::var("CREDENTIAL_TOLERANCE_WINDOWS")
            .unwrap_or_else(|_| DEFAULT_TOLERANCE_WINDOWS.to_string())
            .parse()
            .context("Invalid CREDENTIAL_TOLERANCE_WINDOWS")?;
        if tolerance_windows < 1 {
            anyhow::bail!("CREDENTIAL_TOLERANCE_WINDOWS must be at least 1");
        }

        let session_sweep_interval_secs: u64 = env::var("SESSION_SWEEP_INTERVAL_SECS")
            .unwrap_or_else(|_| "60".to_string())
            .parse()
            .context("Invalid SESSION_SWEEP_INTERVAL_SECS")?;
        if session_sweep_interval_secs == 0 {
            anyhow::bail!("SESSION_SWEEP_INTERVAL_SECS must be positive");
        }

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .context("DATABASE_URL must be set")?,
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            bind_addr: env::var("BIND_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:3000".to_string())
                .parse()
                .context("Invalid BIND_ADDR")?,
            master_key: Zeroizing::new(master_key_bytes),
            protocol: ProtocolSettings {
                cadence_ms,
                tolerance_windows,
            },
            session_sweep_interval_secs,
        })
    }

    /// Returns the master key as a fixed-size array.
    pub fn master_key_array(&self) -> Result<[u8; 32]> {
        self.master_key
            .as_slice()
            .try_into()
            .context("MASTER_KEY must be exactly 32 bytes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_key(key: Vec<u8>) -> Config {
        Config {
            database_url: "postgres://localhost/rollcall".to_string(),
            redis_url: "redis://127.0.0.1:6379".to_string(),
            bind_addr: "127.0.0.1:3000".parse().unwrap(),
            master_key: Zeroizing::new(key),
            protocol: ProtocolSettings::default(),
            session_sweep_interval_secs: 60,
        }
    }

    #[test]
    fn test_default_protocol_settings() {
        let settings = ProtocolSettings::default();
        assert_eq!(settings.cadence_ms, 5_000);
        assert_eq!(settings.tolerance_windows, 1);
    }

    #[test]
    fn test_master_key_array() {
        let config = config_with_key(vec![7u8; 32]);
        assert_eq!(config.master_key_array().unwrap(), [7u8; 32]);

        let short = config_with_key(vec![7u8; 31]);
        assert!(short.master_key_array().is_err());
    }
}
