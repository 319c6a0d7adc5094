//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - daemons: list the daemon registry
//! - send: dispatch a message to a named daemon
//! - request: one request/response on a socket path
//! - serve: run a framed mock daemon

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use framesock::HeaderFormat;

/// Framesock - length-prefixed JSON messaging over Unix domain sockets
#[derive(Parser, Debug)]
#[command(name = "framesock")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the known daemons
    Daemons,

    /// Send a JSON message to a named daemon and print the reply data
    Send {
        /// Daemon name from the registry
        daemon: String,

        /// JSON message (sent as null when omitted)
        message: Option<String>,
    },

    /// Send one JSON request to a socket using the blocking client
    Request {
        /// Path to the daemon socket
        socket: PathBuf,

        /// JSON message (sent as null when omitted)
        message: Option<String>,

        /// Print the undecoded response payload as hex
        #[arg(long)]
        raw: bool,
    },

    /// Run a mock daemon that answers every request with a fixed reply
    Serve {
        /// Path of the socket to listen on
        socket: PathBuf,

        /// JSON reply sent for every request
        #[arg(short, long, default_value = r#"{"error": 0, "data": "pong"}"#)]
        reply: String,

        /// Length header format, struct-style (e.g. "<I", ">H")
        #[arg(long, default_value = "<I")]
        header_format: HeaderFormat,
    },
}
