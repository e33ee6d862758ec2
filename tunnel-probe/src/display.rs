use libtunnel_packet::{CapturedPacket, PacketIndicator};
use serde_json::json;
use std::io::{self, Write};
use tracing::{info, warn};

/// Writes one line per packet, as text or JSON
pub struct Printer<W: Write> {
    out: W,
    json: bool,
    seen: usize,
    decoded: usize,
}

impl<W: Write> Printer<W> {
    pub fn new(out: W, json: bool) -> Self {
        Printer {
            out,
            json,
            seen: 0,
            decoded: 0,
        }
    }

    /// Number of packets printed (or skipped) so far
    pub fn seen(&self) -> usize {
        self.seen
    }

    pub fn print(&mut self, packet: &CapturedPacket) -> Result<(), io::Error> {
        self.seen += 1;
        let ind = match packet.indicator() {
            Ok(ind) => ind,
            Err(e) if e.is_decode_error() => {
                warn!(
                    "packet {}: {} (link type {}, {} bytes)",
                    self.seen,
                    e,
                    packet.link_type(),
                    packet.data().len()
                );
                return Ok(());
            }
            Err(e) => return Err(io::Error::other(e)),
        };
        self.decoded += 1;
        if self.json {
            display_json(&mut self.out, self.seen, packet, &ind)
        } else {
            writeln!(self.out, "{} {}", self.seen, ind)
        }
    }

    pub fn finish(mut self) -> Result<(), io::Error> {
        self.out.flush()?;
        info!(
            "{} packets, {} decoded, {} skipped",
            self.seen,
            self.decoded,
            self.seen - self.decoded
        );
        Ok(())
    }
}

fn display_json<W: Write>(
    out: &mut W,
    index: usize,
    packet: &CapturedPacket,
    ind: &PacketIndicator,
) -> Result<(), io::Error> {
    let value = json!({
        "index": index,
        "ts": packet.timestamp().as_secs_f64(),
        "quintuple": ind.quintuple().to_string(),
        "indicator": ind,
    });
    serde_json::to_writer(&mut *out, &value)?;
    writeln!(out)
}
