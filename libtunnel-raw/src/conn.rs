use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use libtunnel_packet::{CapturedPacket, Linktype};
use libtunnel_tools::{CaptureError, Config, Error};
use pcap::{Active, Capture};
use tracing::{debug, trace};

use crate::device::Device;
use crate::handle::{capture_error, CaptureHandle, Closer};

/// Max size of a frame read or written by a raw connection
pub const MAX_MTU: usize = 65535;

const DEFAULT_SNAPLEN: usize = MAX_MTU;

/// Live capture options, read from the `raw` section of the configuration
#[derive(Clone, Debug)]
struct LiveOptions {
    snaplen: i32,
    promisc: bool,
    /// 0 means block forever
    timeout_ms: i32,
    immediate: bool,
    buffer_size: Option<i32>,
}

impl LiveOptions {
    fn from_config(config: &Config) -> Self {
        let to_i32 = |v: usize| i32::try_from(v).unwrap_or(i32::MAX);
        LiveOptions {
            snaplen: to_i32(config.get_usize("raw.snaplen").unwrap_or(DEFAULT_SNAPLEN)),
            promisc: config.get_bool("raw.promisc").unwrap_or(true),
            timeout_ms: to_i32(config.get_usize("raw.timeout_ms").unwrap_or(0)),
            immediate: config.get_bool("raw.immediate").unwrap_or(true),
            buffer_size: config.get_usize("raw.buffer_size").map(to_i32),
        }
    }
}

impl Default for LiveOptions {
    fn default() -> Self {
        LiveOptions::from_config(&Config::default())
    }
}

fn open_live(interface: &str, filter: &str, options: &LiveOptions) -> Result<Capture<Active>, Error> {
    debug!("opening live capture on {} ({:?})", interface, options);
    let mut cap = Capture::from_device(interface)
        .map_err(capture_error)?
        .promisc(options.promisc)
        .snaplen(options.snaplen)
        .timeout(options.timeout_ms)
        .immediate_mode(options.immediate);
    if let Some(size) = options.buffer_size {
        cap = cap.buffer_size(size);
    }
    let mut cap = cap.open().map_err(capture_error)?;
    // on error, `cap` is dropped here and the handle released
    cap.set_filter(filter)?;
    debug!("filter applied on {}: {:?}", interface, filter);
    Ok(cap)
}

/// Raw network connection: captures and injects whole frames on one interface
///
/// The connection owns its capture handle and a receive buffer of `MAX_MTU`
/// bytes. It refers to the devices it links, but does not own them.
///
/// With no read timeout, a read blocks until a frame arrives. Another thread
/// can cancel it with a [`Closer`] obtained from [`RawConn::closer`].
pub struct RawConn<H: CaptureHandle = Capture<Active>> {
    handle: Option<H>,
    closed: Arc<AtomicBool>,
    link_type: Linktype,
    buffer: Box<[u8]>,
    devices: Option<(Arc<Device>, Arc<Device>)>,
}

impl RawConn<Capture<Active>> {
    /// Open a capture on `interface`, with no device pair attached
    pub fn open(interface: &str, filter: &str) -> Result<Self, Error> {
        let cap = open_live(interface, filter, &LiveOptions::default())?;
        Ok(RawConn::from_handle(cap))
    }

    pub fn open_with_config(interface: &str, filter: &str, config: &Config) -> Result<Self, Error> {
        let cap = open_live(interface, filter, &LiveOptions::from_config(config))?;
        Ok(RawConn::from_handle(cap))
    }

    /// Open a capture on the local device, linking it to the remote device
    pub fn between(local: Arc<Device>, remote: Arc<Device>, filter: &str) -> Result<Self, Error> {
        let cap = open_live(local.name(), filter, &LiveOptions::default())?;
        let mut conn = RawConn::from_handle(cap);
        conn.devices = Some((local, remote));
        Ok(conn)
    }
}

impl<H: CaptureHandle> RawConn<H> {
    pub fn from_handle(handle: H) -> Self {
        let link_type = handle.link_type();
        trace!("raw connection: link type {}", link_type);
        RawConn {
            handle: Some(handle),
            closed: Arc::new(AtomicBool::new(false)),
            link_type,
            buffer: vec![0u8; MAX_MTU].into_boxed_slice(),
            devices: None,
        }
    }

    /// Attach a device pair to the connection
    pub fn with_devices(mut self, local: Arc<Device>, remote: Arc<Device>) -> Self {
        self.devices = Some((local, remote));
        self
    }

    /// Get a handle to close this connection from another thread
    pub fn closer(&mut self) -> Result<Closer, Error> {
        let interrupt = self.handle_mut()?.interrupter();
        Ok(Closer::new(self.closed.clone(), interrupt))
    }

    fn handle_mut(&mut self) -> Result<&mut H, Error> {
        if self.closed.load(Ordering::SeqCst) {
            self.close();
        }
        self.handle
            .as_mut()
            .ok_or(Error::Capture(CaptureError::Closed))
    }

    /// Read one frame into the receive buffer, and return the number of bytes copied
    ///
    /// Frames longer than the buffer are truncated.
    fn read_into_buffer(&mut self) -> Result<(usize, std::time::Duration, u32), Error> {
        if self.closed.load(Ordering::SeqCst) {
            self.close();
        }
        let buffer = &mut self.buffer;
        let handle = self
            .handle
            .as_mut()
            .ok_or(Error::Capture(CaptureError::Closed))?;
        let result = handle.next_frame().map(|frame| {
            let n = frame.data.len().min(buffer.len());
            if n < frame.data.len() {
                debug!("frame truncated from {} to {} bytes", frame.data.len(), n);
            }
            buffer[..n].copy_from_slice(&frame.data[..n]);
            (n, frame.ts, frame.origlen)
        });
        // closed while the read was pending
        if self.closed.load(Ordering::SeqCst) {
            self.close();
            return Err(Error::Capture(CaptureError::Closed));
        }
        result
    }

    /// Read the bytes of the next frame
    ///
    /// The returned vector is independent of the connection buffer.
    pub fn read_frame(&mut self) -> Result<Vec<u8>, Error> {
        let (n, _, _) = self.read_into_buffer()?;
        Ok(self.buffer[..n].to_vec())
    }

    /// Read the next frame, with its link type and capture metadata
    pub fn read_packet(&mut self) -> Result<CapturedPacket, Error> {
        let (n, ts, origlen) = self.read_into_buffer()?;
        trace!("raw connection: read {} bytes (origlen={})", n, origlen);
        Ok(CapturedPacket::with_metadata(
            self.buffer[..n].to_vec(),
            self.link_type,
            ts,
            origlen,
        ))
    }

    /// Inject one frame, and return the number of bytes written
    ///
    /// Frames larger than `MAX_MTU` are rejected without being sent.
    pub fn write_frame(&mut self, frame: &[u8]) -> Result<usize, Error> {
        let handle = self.handle_mut()?;
        if frame.len() > MAX_MTU {
            return Err(Error::Capture(CaptureError::Handle(format!(
                "frame of {} bytes exceeds MTU {}",
                frame.len(),
                MAX_MTU
            ))));
        }
        handle.inject(frame)?;
        trace!("raw connection: wrote {} bytes", frame.len());
        Ok(frame.len())
    }

    /// Replace the BPF filter of the open handle
    pub fn set_filter(&mut self, filter: &str) -> Result<(), Error> {
        self.handle_mut()?.set_filter(filter)
    }

    /// Release the capture handle. Closing twice is a no-op.
    pub fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        if self.handle.take().is_some() {
            debug!("raw connection closed");
        }
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.handle.is_none() || self.closed.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn link_type(&self) -> Linktype {
        self.link_type
    }

    pub fn local_device(&self) -> Option<&Arc<Device>> {
        self.devices.as_ref().map(|(local, _)| local)
    }

    pub fn remote_device(&self) -> Option<&Arc<Device>> {
        self.devices.as_ref().map(|(_, remote)| remote)
    }

    /// Test if the remote device is a loopback interface (false without devices)
    pub fn is_loopback(&self) -> bool {
        self.remote_device()
            .map(|dev| dev.is_loopback())
            .unwrap_or(false)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::handle::Interrupt;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Duration;

    #[derive(Default)]
    pub(crate) struct MockInterrupt {
        pub count: AtomicUsize,
    }

    impl Interrupt for MockInterrupt {
        fn interrupt(&self) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// In-memory capture handle
    ///
    /// Once its frames are consumed, reads time out, or block until interrupted
    /// if `blocking` is set.
    #[derive(Default)]
    pub(crate) struct MockHandle {
        pub rx: VecDeque<Vec<u8>>,
        pub tx: Vec<Vec<u8>>,
        pub filter: Option<String>,
        pub blocking: bool,
        pub interrupt: Arc<MockInterrupt>,
        current: Vec<u8>,
    }

    impl MockHandle {
        pub fn with_frames(frames: &[&[u8]]) -> Self {
            MockHandle {
                rx: frames.iter().map(|f| f.to_vec()).collect(),
                ..MockHandle::default()
            }
        }
    }

    impl CaptureHandle for MockHandle {
        fn next_frame(&mut self) -> Result<crate::HandleFrame<'_>, Error> {
            match self.rx.pop_front() {
                Some(frame) => self.current = frame,
                None if self.blocking => {
                    while self.interrupt.count.load(Ordering::SeqCst) == 0 {
                        thread::sleep(Duration::from_millis(1));
                    }
                    return Err(Error::Capture(CaptureError::Closed));
                }
                None => return Err(Error::Capture(CaptureError::Timeout)),
            }
            Ok(crate::HandleFrame {
                data: &self.current,
                ts: Duration::from_secs(1_700_000_000),
                origlen: self.current.len() as u32,
            })
        }

        fn inject(&mut self, frame: &[u8]) -> Result<(), Error> {
            self.tx.push(frame.to_vec());
            Ok(())
        }

        fn link_type(&self) -> Linktype {
            Linktype::ETHERNET
        }

        fn set_filter(&mut self, filter: &str) -> Result<(), Error> {
            self.filter = Some(filter.to_owned());
            Ok(())
        }

        fn interrupter(&mut self) -> Arc<dyn Interrupt> {
            self.interrupt.clone()
        }
    }

    #[test]
    fn raw_conn_reads_independent_copies() {
        let frames: &[&[u8]] = &[b"first", b"second"];
        let mut conn = RawConn::from_handle(MockHandle::with_frames(frames));
        let first = conn.read_frame().expect("read");
        let second = conn.read_packet().expect("read");
        assert_eq!(first, b"first");
        assert_eq!(second.data(), b"second");
        assert_eq!(second.link_type(), Linktype::ETHERNET);
        assert_eq!(second.timestamp(), Duration::from_secs(1_700_000_000));
        assert!(conn.read_frame().expect_err("empty").is_timeout());
    }

    #[test]
    fn raw_conn_truncates_to_buffer() {
        let big = vec![0xabu8; MAX_MTU + 100];
        let mut conn = RawConn::from_handle(MockHandle::with_frames(&[big.as_slice()]));
        let packet = conn.read_packet().expect("read");
        assert_eq!(packet.data().len(), MAX_MTU);
        assert_eq!(packet.origlen() as usize, MAX_MTU + 100);
    }

    #[test]
    fn raw_conn_write_and_close() {
        let mut conn = RawConn::from_handle(MockHandle::default());
        assert_eq!(conn.write_frame(&[1, 2, 3]).expect("write"), 3);
        conn.set_filter("udp").expect("filter");
        assert!(!conn.is_closed());

        conn.close();
        assert!(conn.is_closed());
        conn.close();
        assert!(matches!(
            conn.write_frame(&[1]),
            Err(Error::Capture(CaptureError::Closed))
        ));
        assert!(matches!(
            conn.read_frame(),
            Err(Error::Capture(CaptureError::Closed))
        ));
    }

    #[test]
    fn raw_conn_rejects_oversized_frame() {
        let mut conn = RawConn::from_handle(MockHandle::default());
        let big = vec![0u8; MAX_MTU + 1];
        assert!(matches!(
            conn.write_frame(&big),
            Err(Error::Capture(CaptureError::Handle(_)))
        ));
        assert_eq!(conn.write_frame(&big[..MAX_MTU]).expect("write"), MAX_MTU);
    }

    #[test]
    fn raw_conn_closer_cancels_blocked_read() {
        let handle = MockHandle {
            blocking: true,
            ..MockHandle::with_frames(&[b"first"])
        };
        let interrupt = handle.interrupt.clone();
        let mut conn = RawConn::from_handle(handle);
        let closer = conn.closer().expect("closer");
        assert!(!closer.is_closed());

        assert_eq!(conn.read_frame().expect("first frame"), b"first");

        let reader = thread::spawn(move || {
            let result = conn.read_frame();
            (result, conn)
        });
        thread::sleep(Duration::from_millis(20));
        closer.close();
        closer.clone().close();
        let (result, mut conn) = reader.join().expect("reader thread");

        assert!(matches!(result, Err(Error::Capture(CaptureError::Closed))));
        assert_eq!(interrupt.count.load(Ordering::SeqCst), 1);
        assert!(closer.is_closed());
        assert!(conn.is_closed());
        assert!(matches!(
            conn.write_frame(&[1]),
            Err(Error::Capture(CaptureError::Closed))
        ));
        assert!(matches!(conn.closer(), Err(Error::Capture(CaptureError::Closed))));
    }

    #[test]
    fn raw_conn_closer_before_read() {
        let mut conn = RawConn::from_handle(MockHandle::with_frames(&[b"first"]));
        let closer = conn.closer().expect("closer");
        closer.close();
        assert!(conn.is_closed());
        assert!(matches!(
            conn.read_frame(),
            Err(Error::Capture(CaptureError::Closed))
        ));
    }

    #[test]
    fn raw_conn_close_is_seen_by_closer() {
        let mut conn = RawConn::from_handle(MockHandle::default());
        let closer = conn.closer().expect("closer");
        conn.close();
        assert!(closer.is_closed());
    }

    #[test]
    fn raw_conn_devices() {
        let conn = RawConn::from_handle(MockHandle::default());
        assert!(conn.local_device().is_none());
        assert!(!conn.is_loopback());

        let local = Arc::new(Device::new("eth0", false));
        let remote = Arc::new(Device::new("lo", true));
        let conn = conn.with_devices(local, remote);
        assert_eq!(conn.local_device().map(|d| d.name()), Some("eth0"));
        assert!(conn.is_loopback());
    }

    #[test]
    fn live_options_defaults() {
        let options = LiveOptions::default();
        assert_eq!(options.snaplen, 65535);
        assert_eq!(options.timeout_ms, 0);
        assert!(options.promisc);
        assert!(options.buffer_size.is_none());

        let mut config = Config::default();
        config.set("raw.timeout_ms", 250i64);
        config.set("raw.promisc", false);
        let options = LiveOptions::from_config(&config);
        assert_eq!(options.timeout_ms, 250);
        assert!(!options.promisc);
    }
}
