use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use flate2::read::GzDecoder;
use libtunnel_packet::{CapturedPacket, Linktype};
use libtunnel_tools::{CaptureError, Config, Error};
use pcap_parser::pcapng::Block;
use pcap_parser::traits::PcapReaderIterator;
use pcap_parser::{PcapBlockOwned, PcapError};
use tracing::{debug, trace, warn};

const DEFAULT_CAPACITY: usize = 128 * 1024;
const DEFAULT_MAX_CAPACITY: usize = 64 * 1024 * 1024;

/// Per-interface information of a pcap-ng section
#[derive(Clone, Copy, Debug)]
struct InterfaceInfo {
    link_type: Linktype,
    /// Timestamp units per second
    ts_units: u64,
}

fn ts_units(if_tsresol: u8) -> u64 {
    let exp = u32::from(if_tsresol & 0x7f);
    let units = if if_tsresol & 0x80 != 0 {
        2u64.checked_pow(exp)
    } else {
        10u64.checked_pow(exp)
    };
    units.filter(|&u| u > 0).unwrap_or(1_000_000)
}

fn ts_from_units(ts: u64, units: u64) -> Duration {
    let secs = ts / units;
    let frac = ts % units;
    let nanos = frac as u128 * 1_000_000_000 / units as u128;
    Duration::from_secs(secs) + Duration::from_nanos(nanos as u64)
}

/// Sequential reader of a capture file (legacy pcap or pcap-ng)
///
/// The reader is forward-only: packets are returned in file order, and the
/// stream cannot be restarted.
pub struct Reader {
    inner: Option<Box<dyn PcapReaderIterator + Send>>,
    capacity: usize,
    max_capacity: usize,
    /// Link type of legacy pcap files
    link_type: Option<Linktype>,
    nanosecond: bool,
    interfaces: Vec<InterfaceInfo>,
    packet_index: usize,
}

impl Reader {
    /// Open a capture file. Files with a `.gz` extension are decompressed on the fly.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Reader, Error> {
        Reader::open_with_config(path, &Config::default())
    }

    pub fn open_with_config<P: AsRef<Path>>(path: P, config: &Config) -> Result<Reader, Error> {
        let path = path.as_ref();
        debug!("opening capture file {}", path.display());
        let file = File::open(path)?;
        let capacity = config
            .get_usize("reader.buffer_capacity")
            .unwrap_or(DEFAULT_CAPACITY);
        let max_capacity = config
            .get_usize("reader.buffer_max_size")
            .unwrap_or(DEFAULT_MAX_CAPACITY)
            .max(capacity);
        let mut reader = if path.extension().map(|ext| ext == "gz").unwrap_or(false) {
            Reader::with_capacity(GzDecoder::new(file), capacity)?
        } else {
            Reader::with_capacity(file, capacity)?
        };
        reader.max_capacity = max_capacity;
        Ok(reader)
    }

    /// Read capture data from any source
    pub fn from_reader<R: Read + Send + 'static>(reader: R) -> Result<Reader, Error> {
        Reader::with_capacity(reader, DEFAULT_CAPACITY)
    }

    fn with_capacity<R: Read + Send + 'static>(reader: R, capacity: usize) -> Result<Reader, Error> {
        let inner = pcap_parser::create_reader(capacity, reader)
            .map_err(|e| Error::File(format!("{:?}", e)))?;
        Ok(Reader {
            inner: Some(inner),
            capacity,
            max_capacity: DEFAULT_MAX_CAPACITY.max(capacity),
            link_type: None,
            nanosecond: false,
            interfaces: Vec::new(),
            packet_index: 0,
        })
    }

    /// Read the next packet, or `None` at the end of the file
    pub fn read_packet(&mut self) -> Result<Option<CapturedPacket>, Error> {
        let reader = self
            .inner
            .as_mut()
            .ok_or(Error::Capture(CaptureError::Closed))?;
        let mut refilled = false;
        loop {
            match reader.next() {
                Ok((offset, block)) => {
                    refilled = false;
                    let packet = handle_block(
                        block,
                        &mut self.link_type,
                        &mut self.nanosecond,
                        &mut self.interfaces,
                    );
                    reader.consume(offset);
                    if let Some(packet) = packet {
                        self.packet_index += 1;
                        trace!(
                            "packet {}: {} bytes, link type {}",
                            self.packet_index,
                            packet.data().len(),
                            packet.link_type()
                        );
                        return Ok(Some(packet));
                    }
                }
                Err(PcapError::Eof) => return Ok(None),
                Err(PcapError::UnexpectedEof) => {
                    warn!(
                        "Unexpected end of file after packet {}",
                        self.packet_index
                    );
                    warn!("Hint: the input file may be truncated.");
                    return Ok(None);
                }
                Err(PcapError::BufferTooSmall) => {
                    let capacity = (self.capacity * 3) / 2;
                    if capacity > self.max_capacity {
                        warn!(
                            "requesting capacity {} over buffer_max_size {}",
                            capacity, self.max_capacity
                        );
                        return Err(Error::File("buffer size too small".to_owned()));
                    }
                    debug!("growing buffer capacity from {} to {} bytes", self.capacity, capacity);
                    if !reader.grow(capacity) {
                        return Err(Error::File("could not grow buffer".to_owned()));
                    }
                    self.capacity = capacity;
                    refilled = false;
                    reader
                        .refill()
                        .map_err(|e| Error::File(format!("{:?}", e)))?;
                }
                Err(PcapError::Incomplete(_)) => {
                    if refilled {
                        warn!(
                            "Could not read complete data block (packet_index={})",
                            self.packet_index
                        );
                        warn!("Hint: the input file may be truncated.");
                        return Ok(None);
                    }
                    refilled = true;
                    trace!("need refill");
                    reader
                        .refill()
                        .map_err(|e| Error::File(format!("{:?}", e)))?;
                }
                Err(e) => {
                    let e = Error::File(format!("{:?}", e));
                    warn!("error while reading: {}", e);
                    return Err(e);
                }
            }
        }
    }

    /// Read the bytes of the next packet, or `None` at the end of the file
    pub fn read_frame(&mut self) -> Result<Option<Vec<u8>>, Error> {
        Ok(self.read_packet()?.map(CapturedPacket::into_data))
    }

    /// Release the underlying file. Later reads fail.
    pub fn close(&mut self) {
        if self.inner.take().is_some() {
            debug!("capture file closed after {} packets", self.packet_index);
        }
    }
}

/// Update the reader state from a block, and extract the packet it holds if any
fn handle_block(
    block: PcapBlockOwned,
    link_type: &mut Option<Linktype>,
    nanosecond: &mut bool,
    interfaces: &mut Vec<InterfaceInfo>,
) -> Option<CapturedPacket> {
    match block {
        PcapBlockOwned::LegacyHeader(hdr) => {
            debug!("pcap file, linktype: {}", hdr.network);
            *link_type = Some(hdr.network);
            *nanosecond = hdr.is_nanosecond_precision();
            None
        }
        PcapBlockOwned::Legacy(b) => {
            let link_type = match link_type {
                Some(l) => *l,
                None => {
                    warn!("legacy packet before file header, skipping");
                    return None;
                }
            };
            let frac = if *nanosecond {
                Duration::from_nanos(b.ts_usec as u64)
            } else {
                Duration::from_micros(b.ts_usec as u64)
            };
            let ts = Duration::from_secs(b.ts_sec as u64) + frac;
            let caplen = (b.caplen as usize).min(b.data.len());
            Some(CapturedPacket::with_metadata(
                b.data[..caplen].to_vec(),
                link_type,
                ts,
                b.origlen,
            ))
        }
        PcapBlockOwned::NG(Block::SectionHeader(_)) => {
            debug!("pcap-ng section header");
            interfaces.clear();
            None
        }
        PcapBlockOwned::NG(Block::InterfaceDescription(idb)) => {
            debug!("pcap-ng interface {}, linktype: {}", interfaces.len(), idb.linktype);
            interfaces.push(InterfaceInfo {
                link_type: idb.linktype,
                ts_units: ts_units(idb.if_tsresol),
            });
            None
        }
        PcapBlockOwned::NG(Block::EnhancedPacket(epb)) => {
            let info = match interfaces.get(epb.if_id as usize) {
                Some(info) => *info,
                None => {
                    warn!("packet for unknown interface {}, skipping", epb.if_id);
                    return None;
                }
            };
            let ts = ((epb.ts_high as u64) << 32) | (epb.ts_low as u64);
            let caplen = (epb.caplen as usize).min(epb.data.len());
            Some(CapturedPacket::with_metadata(
                epb.data[..caplen].to_vec(),
                info.link_type,
                ts_from_units(ts, info.ts_units),
                epb.origlen,
            ))
        }
        PcapBlockOwned::NG(Block::SimplePacket(spb)) => {
            let info = match interfaces.first() {
                Some(info) => *info,
                None => {
                    warn!("simple packet with no interface, skipping");
                    return None;
                }
            };
            let caplen = (spb.origlen as usize).min(spb.data.len());
            Some(CapturedPacket::with_metadata(
                spb.data[..caplen].to_vec(),
                info.link_type,
                Duration::ZERO,
                spb.origlen,
            ))
        }
        PcapBlockOwned::NG(_) => {
            trace!("skipping pcap-ng block");
            None
        }
    }
}

impl Iterator for Reader {
    type Item = Result<CapturedPacket, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.inner.is_none() {
            return None;
        }
        match self.read_packet() {
            Ok(packet) => packet.map(Ok),
            Err(e) => {
                // the parser cannot resume after an error
                self.close();
                Some(Err(e))
            }
        }
    }
}
