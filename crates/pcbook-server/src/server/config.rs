use anyhow::bail;
use clap::Parser;
use core::time::Duration;
use pcbook_core::types::MAX_IMAGE_SIZE;
use std::path::PathBuf;

/// Runtime configuration for the `pcbook-server` binary.
///
/// All values are parsed from CLI arguments or environment variables (a
/// `.env` file is honoured), with defaults suitable for local use.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "pcbook-server",
    version,
    about = "A gRPC laptop catalog with streaming search, uploads and ratings"
)]
pub struct CliArgs {
    /// Address to listen on (TCP or Unix socket path; use --uds for Unix socket).
    ///
    /// Example: "0.0.0.0:50051" or "/tmp/pcbook.sock"
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:50051"))]
    pub server_addr: String,

    /// Listen on a Unix socket instead of TCP. If set, `SERVER_ADDR` must be a file path.
    #[arg(short, long, default_value_t = false)]
    pub uds: bool,

    /// Directory uploaded images are written to. Created on first upload.
    ///
    /// Environment variable: `IMAGE_DIR`
    #[arg(long, env = "IMAGE_DIR", default_value = "img")]
    pub image_dir: PathBuf,

    /// Maximum accepted size of a single uploaded image, in bytes.
    ///
    /// Uploads are rejected as soon as the received bytes exceed this value,
    /// before anything is written to disk.
    ///
    /// Environment variable: `MAX_IMAGE_SIZE`
    #[arg(long, env = "MAX_IMAGE_SIZE", default_value_t = MAX_IMAGE_SIZE)]
    pub max_image_size: usize,

    /// Capacity of the response buffer between a handler and its gRPC stream.
    ///
    /// Lower values increase backpressure responsiveness; higher values let a
    /// search run further ahead of a slow client.
    ///
    /// Environment variable: `STREAM_BUFFER_SIZE`
    #[arg(long, env = "STREAM_BUFFER_SIZE", default_value_t = 8)]
    pub stream_buffer_size: usize,

    /// Seconds to wait for in-flight calls to finish on shutdown before they
    /// are cancelled.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 3)]
    pub shutdown_timeout: u64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub uds: bool,
    pub image_dir: PathBuf,
    pub max_image_size: usize,
    pub stream_buffer_size: usize,
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_addr: String::from("0.0.0.0:50051"),
            uds: false,
            image_dir: PathBuf::from("img"),
            max_image_size: MAX_IMAGE_SIZE,
            stream_buffer_size: 8,
            shutdown_timeout: Duration::from_secs(3),
        }
    }
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.max_image_size == 0 {
            bail!("MAX_IMAGE_SIZE must be greater than 0");
        }

        if u32::try_from(args.max_image_size).is_err() {
            bail!(
                "MAX_IMAGE_SIZE ({}) exceeds the {} bytes an upload response can report",
                args.max_image_size,
                u32::MAX
            );
        }

        if args.stream_buffer_size == 0 {
            bail!("STREAM_BUFFER_SIZE must be greater than 0");
        }

        Ok(Self {
            server_addr: args.server_addr,
            uds: args.uds,
            image_dir: args.image_dir,
            max_image_size: args.max_image_size,
            stream_buffer_size: args.stream_buffer_size,
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
        })
    }
}
