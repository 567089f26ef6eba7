//! frame-servers: two minimal framing servers over TCP
//!
//! One binary, one protocol per process:
//! - `http`: single HTTP-like request framed by a blank line
//! - `sum`: tagged binary values summed into a double
//!
//! Features:
//! - One client at a time, each connection torn down after one exchange
//! - Read timeout on every client read
//! - Append-only log file
//! - Configuration via CLI arguments or TOML file

mod config;
mod connection;
mod error;
mod logging;
mod protocols;
mod server;

use config::Config;
use logging::LogSink;
use server::Server;
use tracing::{error, info};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    // Initialize logging
    let log = LogSink::open(&config.log_level, &config.log_file);

    info!(
        host = %config.host,
        port = config.port,
        protocol = ?config.protocol,
        read_timeout_secs = config.read_timeout.as_secs(),
        max_request_size = config.max_request_size,
        "Starting frame-servers"
    );

    let result = Server::new(&config).run();
    if let Err(ref e) = result {
        eprintln!("Error - Could not create server socket: {e}");
        error!(error = %e, "Could not create server socket");
    }

    log.close();
    Ok(result?)
}
