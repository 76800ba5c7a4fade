use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::bail;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use mpegts_framer::monitor::{self, Input, Options};

/// PSI section monitor for MPEG-TS streams.
#[derive(Parser)]
struct Opt {
    /// UDP socket to bind and listen on (IPv4, multicast joined automatically)
    #[clap(long)]
    addr: Option<SocketAddr>,

    /// Read the stream from a file instead of the network
    #[clap(long)]
    file: Option<PathBuf>,

    /// PID to assemble sections from (repeatable)
    #[clap(long = "pid", default_values_t = [0u16])]
    pids: Vec<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let opt = Opt::parse();

    let input = match (opt.addr, opt.file) {
        (Some(addr), None) => Input::Udp(addr),
        (None, Some(path)) => Input::File(path),
        _ => bail!("specify exactly one of --addr or --file"),
    };

    monitor::run(Options {
        input,
        pids: opt.pids,
    })
    .await
}
