use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use libtunnel_tools::{CaptureError, Error};
use pcap::{Active, Capture};
use pcap_parser::Linktype;

/// One frame as returned by a capture handle, borrowed from its internal buffer
#[derive(Debug)]
pub struct HandleFrame<'a> {
    pub data: &'a [u8],
    /// Capture time, since the Unix epoch
    pub ts: Duration,
    /// Length of the frame on the wire
    pub origlen: u32,
}

/// Capture/injection backend of a raw connection
///
/// Implemented for live libpcap captures. Other backends (and tests) can provide
/// their own implementation and wrap it with
/// [`RawConn::from_handle`](crate::RawConn::from_handle).
pub trait CaptureHandle {
    /// Block until the next frame arrives (or the read timeout expires)
    fn next_frame(&mut self) -> Result<HandleFrame<'_>, Error>;
    /// Send one frame, verbatim
    fn inject(&mut self, frame: &[u8]) -> Result<(), Error>;
    /// Link type of the captured frames
    fn link_type(&self) -> Linktype;
    /// Install a BPF filter
    fn set_filter(&mut self, filter: &str) -> Result<(), Error>;
    /// Get a thread-safe way to wake up a blocked `next_frame`
    ///
    /// The woken read must return [`CaptureError::Closed`].
    fn interrupter(&mut self) -> Arc<dyn Interrupt>;
}

/// Wakes up a read blocked on a capture handle
pub trait Interrupt: Send + Sync {
    fn interrupt(&self);
}

impl Interrupt for pcap::BreakLoop {
    fn interrupt(&self) {
        self.breakloop();
    }
}

/// Closes a raw connection from another thread
///
/// Obtained from [`RawConn::closer`](crate::RawConn::closer). Closing marks the
/// connection closed and wakes up a pending read, which then fails with
/// [`CaptureError::Closed`]. The handle itself is released by the thread owning
/// the connection, on its next operation or when the connection is dropped.
#[derive(Clone)]
pub struct Closer {
    closed: Arc<AtomicBool>,
    interrupt: Arc<dyn Interrupt>,
}

impl Closer {
    pub(crate) fn new(closed: Arc<AtomicBool>, interrupt: Arc<dyn Interrupt>) -> Self {
        Closer { closed, interrupt }
    }

    /// Close the connection. Closing twice is a no-op.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.interrupt.interrupt();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Closer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Closer")
            .field("closed", &self.is_closed())
            .finish()
    }
}

pub(crate) fn capture_error(e: pcap::Error) -> Error {
    match e {
        pcap::Error::TimeoutExpired => Error::Capture(CaptureError::Timeout),
        pcap::Error::NoMorePackets => Error::Capture(CaptureError::Closed),
        e => Error::Capture(CaptureError::Handle(e.to_string())),
    }
}

impl CaptureHandle for Capture<Active> {
    fn next_frame(&mut self) -> Result<HandleFrame<'_>, Error> {
        let packet = self.next_packet().map_err(capture_error)?;
        let header = packet.header;
        let ts = Duration::from_secs(header.ts.tv_sec as u64)
            + Duration::from_micros(header.ts.tv_usec as u64);
        Ok(HandleFrame {
            data: packet.data,
            ts,
            origlen: header.len,
        })
    }

    fn inject(&mut self, frame: &[u8]) -> Result<(), Error> {
        self.sendpacket(frame).map_err(capture_error)
    }

    fn link_type(&self) -> Linktype {
        // convert from `pcap` crate format to `pcap_parser` format
        Linktype(self.get_datalink().0)
    }

    fn set_filter(&mut self, filter: &str) -> Result<(), Error> {
        self.filter(filter, true).map_err(capture_error)
    }

    fn interrupter(&mut self) -> Arc<dyn Interrupt> {
        Arc::new(self.breakloop_handle())
    }
}
