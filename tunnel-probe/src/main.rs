#![warn(clippy::all)]

use clap::Parser;
use libtunnel_packet::CapturedPacket;
use libtunnel_raw::{RawConn, Reader};
use libtunnel_tools::Config;
use std::fs::File;
use std::io;
use std::path::Path;
use tracing::{debug, info, Level};
use tracing_subscriber::EnvFilter;

mod display;
use display::*;

/// Decode packets as the tunnel NAT layer sees them
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<String>,

    /// Print one JSON object per packet
    #[arg(long)]
    json: bool,

    /// Stop after this number of packets
    #[arg(short = 'n', long)]
    count: Option<usize>,

    /// Capture live on this interface
    #[arg(short, long, conflicts_with = "input", required_unless_present = "input")]
    interface: Option<String>,

    /// BPF filter for live capture
    #[arg(short, long, requires = "interface")]
    filter: Option<String>,

    /// Input file ('-' for stdin)
    input: Option<String>,
}

fn load_config(config: &mut Config, filename: &str) -> Result<(), io::Error> {
    debug!("Loading configuration {}", filename);
    let path = Path::new(&filename);
    let file = File::open(path)?;
    config.load_config(file).map_err(io::Error::other)
}

fn main() -> Result<(), io::Error> {
    let args = Args::parse();

    let env_filter = EnvFilter::try_from_env("TUNNEL_PROBE_LOG")
        .unwrap_or_else(|_| EnvFilter::from_default_env().add_directive(Level::WARN.into()));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .compact()
        .init();
    info!("tunnel-probe starting");

    let mut config = Config::default();
    if let Some(filename) = &args.config {
        load_config(&mut config, filename)?;
    }

    let mut printer = Printer::new(io::stdout().lock(), args.json);
    let limit = args.count.unwrap_or(usize::MAX);

    if let Some(interface) = &args.interface {
        let filter = args.filter.as_deref().unwrap_or("");
        let mut conn =
            RawConn::open_with_config(interface, filter, &config).map_err(io::Error::other)?;
        info!("Live mode on {} (link type {})", interface, conn.link_type());

        let closer = conn.closer().map_err(io::Error::other)?;
        ctrlc::set_handler(move || {
            info!("interrupted, closing capture");
            closer.close();
        })
        .map_err(io::Error::other)?;

        while printer.seen() < limit {
            match conn.read_packet() {
                Ok(packet) => printer.print(&packet)?,
                Err(e) if e.is_timeout() => continue,
                Err(_) if conn.is_closed() => break,
                Err(e) => return Err(io::Error::other(e)),
            }
        }
        conn.close();
    } else {
        let input = args.input.as_deref().unwrap_or("-");
        let reader = if input == "-" {
            Reader::from_reader(io::stdin())
        } else {
            Reader::open_with_config(input, &config)
        }
        .map_err(io::Error::other)?;
        for packet in reader.take(limit) {
            let packet: CapturedPacket = packet.map_err(io::Error::other)?;
            printer.print(&packet)?;
        }
    }

    printer.finish()?;
    info!("tunnel-probe: done");
    Ok(())
}
