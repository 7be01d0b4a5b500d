use clap::{Parser, Subcommand};
use std::{net::SocketAddr, path::PathBuf};

#[derive(Debug, Parser)]
#[command(author, version)]
pub struct Arguments {
    /// Session configuration (defaults apply if the file does not exist)
    #[arg(short, long, default_value = "etc.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub mode: Mode,
}

#[derive(Debug, Subcommand)]
pub enum Mode {
    /// Run a session and print every event
    Monitor {
        /// Serial bridge to connect to
        #[arg(short, long, default_value = "127.0.0.1:8000")]
        address: SocketAddr,
    },
    /// Like monitor, but also read commands (RON, e.g. `DeviceName`) from a prompt
    Console {
        /// Serial bridge to connect to
        #[arg(short, long, default_value = "127.0.0.1:8000")]
        address: SocketAddr,
    },
    /// Decode a hex dump of received bytes
    Decode {
        /// Whitespace separated hex bytes
        input: PathBuf,
    },
}
