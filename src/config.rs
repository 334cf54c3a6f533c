//! Command-line configuration for the server binary.

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about = "HTTP API for Sentinel-2 change detection over plots of land"
)]
pub struct ServerArgs {
    #[arg(
        short = 'p',
        long,
        default_value = "8000",
        help = "HTTP server port",
        long_help = "TCP port for the HTTP/REST server. Default: 8000."
    )]
    pub port: u16,

    #[arg(
        short = 'b',
        long,
        default_value = "0.0.0.0",
        help = "HTTP server bind address",
        long_help = "IP address to bind the HTTP server to. Use '0.0.0.0' to listen on all \
            interfaces (required for remote access), or '127.0.0.1' for localhost-only access."
    )]
    pub bind_address: String,

    #[arg(
        long,
        default_value = "30",
        help = "Per-call timeout for remote compute requests, in seconds",
        long_help = "Applied to every round-trip to the remote imagery service. A single \
            change-detection request makes several such round-trips, so its worst-case \
            latency is a small multiple of this value."
    )]
    pub request_timeout_secs: u64,
}
