//! `flowconv` worker binary.
//!
//! Reads conversation records on stdin and answers result records on
//! stdout. Logs go to stderr only; stdout carries nothing but records.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use flowconv::config::{
    DEFAULT_MAX_FRAME_SIZE, DEFAULT_MAX_INFLATED_SIZE, DEFAULT_MAX_PENDING_FRAGMENTS,
};
use flowconv::protocol::DEFAULT_MAX_PAYLOAD_SIZE;
use flowconv::{DissectorKind, Worker};

#[derive(Parser)]
#[command(name = "flowconv")]
#[command(about = "Re-render captured conversations one protocol layer at a time", long_about = None)]
struct Cli {
    /// Dissector to run on every conversation.
    #[arg(short, long, value_enum)]
    dissector: DissectorKind,

    /// Initial HTTP/2 frame buffer bound in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_FRAME_SIZE)]
    max_frame_size: u32,

    /// Pending websocket fragments at which a message is rejected.
    #[arg(long, default_value_t = DEFAULT_MAX_PENDING_FRAGMENTS)]
    max_pending_fragments: usize,

    /// Largest decompressed body or message, in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_INFLATED_SIZE)]
    max_inflated_size: usize,

    /// Largest record payload accepted on stdin, in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_PAYLOAD_SIZE)]
    max_record_size: u32,

    /// Log filter used when RUST_LOG is not set.
    #[arg(long, default_value = "flowconv=info")]
    log_level: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| cli.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let worker = Worker::builder(cli.dissector)
        .max_frame_size(cli.max_frame_size)
        .max_pending_fragments(cli.max_pending_fragments)
        .max_inflated_size(cli.max_inflated_size)
        .max_record_size(cli.max_record_size)
        .build();

    tracing::info!(dissector = worker.dissector_name(), "worker started");

    let answered = worker.run(tokio::io::stdin(), tokio::io::stdout()).await?;

    tracing::info!(answered, "worker finished");
    Ok(())
}
