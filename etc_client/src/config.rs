use anyhow::Context;
use etc_codec::{ChecksumPolicy, Command};
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// How long to wait for the answer to an outstanding request
    #[serde(with = "humantime_serde")]
    pub response_timeout: Duration,
    /// Retransmissions before the session faults
    pub max_retries: u8,
    pub checksum: ChecksumPolicy,
    /// Requests issued once the transport is prepared
    pub startup_queries: Vec<Command>,
    /// Characteristics the peripheral reported, if the pipe is a Nordic UART service
    pub characteristics: Option<Vec<String>>,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            response_timeout: Duration::from_secs(3),
            max_retries: 1,
            checksum: ChecksumPolicy::default(),
            startup_queries: vec![
                Command::DeviceName,
                Command::UniqueCardData,
                Command::InitialPaymentRecord,
            ],
            characteristics: None,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let config = std::fs::read_to_string(path)?;
        toml::from_str(&config).context("Failed to read config toml file")
    }

    /// Defaults when the file does not exist.
    pub fn from_file_or_default(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }
}
