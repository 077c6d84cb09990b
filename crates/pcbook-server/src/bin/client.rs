//! Command-line client for the laptop catalog.
//!
//! ```bash
//! pcbook-client create --count 3
//! pcbook-client search --max-price-inr 100000 --min-ram-gb 8
//! pcbook-client upload --laptop-id <ID> --path laptop.jpg
//! pcbook-client rate --laptop-id <ID> --score 7 --score 9
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use core::time::Duration;
use pcbook_core::{
    proto::{
        CreateLaptopRequest, Filter, Memory, RateLaptopRequest, SearchLaptopRequest,
        UploadImageRequest, laptop_service_client::LaptopServiceClient, memory::Unit,
    },
    sample,
    types::DEFAULT_CHUNK_SIZE,
};
use std::path::PathBuf;
use tokio_stream::StreamExt;
use tonic::{Request, codec::CompressionEncoding, transport::Channel};

#[derive(Parser, Debug)]
#[command(name = "pcbook-client", version, about = "Talks to a pcbook-server")]
struct Cli {
    /// Server endpoint.
    ///
    /// Environment variable: `SERVER_URL`
    #[arg(long, env = "SERVER_URL", default_value = "http://127.0.0.1:50051")]
    server_url: String,

    /// Per-call deadline in seconds, sent as `grpc-timeout`.
    #[arg(long, default_value_t = 5)]
    timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create random laptops.
    Create {
        #[arg(long, default_value_t = 1)]
        count: usize,
    },
    /// Stream every laptop matching the given bounds.
    Search {
        #[arg(long)]
        max_price_inr: Option<f64>,
        #[arg(long)]
        min_cpu_cores: Option<u32>,
        #[arg(long)]
        min_cpu_ghz: Option<f64>,
        #[arg(long)]
        min_ram_gb: Option<u64>,
    },
    /// Upload an image file for a laptop.
    Upload {
        #[arg(long)]
        laptop_id: String,
        #[arg(long)]
        path: PathBuf,
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,
    },
    /// Rate a laptop; each score is answered with the running average.
    Rate {
        #[arg(long)]
        laptop_id: String,
        #[arg(long = "score", required = true)]
        scores: Vec<f64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let timeout = Duration::from_secs(cli.timeout);

    let channel = Channel::from_shared(cli.server_url.clone())?
        .connect()
        .await
        .with_context(|| format!("cannot connect to {}", cli.server_url))?;
    let mut client = LaptopServiceClient::new(channel)
        .send_compressed(CompressionEncoding::Zstd)
        .accept_compressed(CompressionEncoding::Zstd);

    match cli.command {
        Command::Create { count } => create(&mut client, count, timeout).await,
        Command::Search {
            max_price_inr,
            min_cpu_cores,
            min_cpu_ghz,
            min_ram_gb,
        } => {
            let filter = Filter {
                max_price_inr,
                min_cpu_cores,
                min_cpu_ghz,
                min_ram: min_ram_gb.map(|value| Memory {
                    value,
                    unit: Unit::Gigabyte as i32,
                }),
            };
            search(&mut client, filter, timeout).await
        }
        Command::Upload {
            laptop_id,
            path,
            chunk_size,
        } => upload(&mut client, laptop_id, path, chunk_size, timeout).await,
        Command::Rate { laptop_id, scores } => rate(&mut client, laptop_id, scores, timeout).await,
    }
}

fn with_timeout<T>(msg: T, timeout: Duration) -> Request<T> {
    let mut req = Request::new(msg);
    req.set_timeout(timeout);
    req
}

async fn create(
    client: &mut LaptopServiceClient<Channel>,
    count: usize,
    timeout: Duration,
) -> anyhow::Result<()> {
    for _ in 0..count {
        let laptop = sample::new_laptop();
        let resp = client
            .create_laptop(with_timeout(
                CreateLaptopRequest {
                    laptop: Some(laptop),
                },
                timeout,
            ))
            .await?
            .into_inner();
        println!("created laptop {}", resp.id);
    }
    Ok(())
}

async fn search(
    client: &mut LaptopServiceClient<Channel>,
    filter: Filter,
    timeout: Duration,
) -> anyhow::Result<()> {
    let mut stream = client
        .search_laptop(with_timeout(
            SearchLaptopRequest {
                filter: Some(filter),
            },
            timeout,
        ))
        .await?
        .into_inner();

    let mut found = 0usize;
    while let Some(resp) = stream.next().await {
        let Some(laptop) = resp?.laptop else {
            continue;
        };
        found += 1;
        println!(
            "{} {} {} ({:.0} INR)",
            laptop.id, laptop.brand, laptop.name, laptop.price_inr
        );
    }
    println!("{found} laptop(s) found");
    Ok(())
}

async fn upload(
    client: &mut LaptopServiceClient<Channel>,
    laptop_id: String,
    path: PathBuf,
    chunk_size: usize,
    timeout: Duration,
) -> anyhow::Result<()> {
    anyhow::ensure!(chunk_size > 0, "chunk size must be greater than 0");

    let data = tokio::fs::read(&path)
        .await
        .with_context(|| format!("cannot read {}", path.display()))?;
    let image_type = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{ext}"))
        .with_context(|| format!("{} has no file extension", path.display()))?;

    let mut messages = vec![UploadImageRequest::info(laptop_id, image_type)];
    messages.extend(
        data.chunks(chunk_size)
            .map(|chunk| UploadImageRequest::chunk(chunk.to_vec())),
    );

    let resp = client
        .upload_image(with_timeout(tokio_stream::iter(messages), timeout))
        .await?
        .into_inner();
    println!("uploaded image {} ({} bytes)", resp.id, resp.size);
    Ok(())
}

async fn rate(
    client: &mut LaptopServiceClient<Channel>,
    laptop_id: String,
    scores: Vec<f64>,
    timeout: Duration,
) -> anyhow::Result<()> {
    let requests = scores.into_iter().map(move |score| RateLaptopRequest {
        laptop_id: laptop_id.clone(),
        score,
    });

    let mut stream = client
        .rate_laptop(with_timeout(tokio_stream::iter(requests), timeout))
        .await?
        .into_inner();

    while let Some(resp) = stream.next().await {
        let resp = resp?;
        println!(
            "laptop {} rated {} time(s), average {:.2}",
            resp.laptop_id, resp.rated_count, resp.average_score
        );
    }
    Ok(())
}
