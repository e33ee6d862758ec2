use std::io::{self, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};

use libtunnel_tools::Error;
use tracing::trace;

const SEND_TCP: &str = "send tcp packet";
const SEND_UDP: &str = "send udp packet";

fn resolve<A: ToSocketAddrs>(addr: A, op: &'static str) -> Result<SocketAddr, Error> {
    addr.to_socket_addrs()
        .map_err(|source| Error::Connection { op, source })?
        .next()
        .ok_or_else(|| Error::Connection {
            op,
            source: io::Error::new(io::ErrorKind::InvalidInput, "no address to send to"),
        })
}

/// Send `data` over a new TCP connection to `addr`, then close it
pub fn send_tcp<A: ToSocketAddrs>(addr: A, data: &[u8]) -> Result<(), Error> {
    let addr = resolve(addr, SEND_TCP)?;
    let mut stream =
        TcpStream::connect(addr).map_err(|source| Error::Connection { op: SEND_TCP, source })?;
    stream
        .write_all(data)
        .and_then(|_| stream.flush())
        .map_err(|source| Error::Connection { op: SEND_TCP, source })?;
    trace!("sent {} bytes to {} (tcp)", data.len(), addr);
    Ok(())
}

/// Send `data` as one UDP datagram to `addr`
pub fn send_udp<A: ToSocketAddrs>(addr: A, data: &[u8]) -> Result<(), Error> {
    let addr = resolve(addr, SEND_UDP)?;
    let bind: SocketAddr = if addr.is_ipv4() {
        ([0, 0, 0, 0], 0).into()
    } else {
        ([0u16; 8], 0).into()
    };
    let socket = UdpSocket::bind(bind).map_err(|source| Error::Connection { op: SEND_UDP, source })?;
    let sent = socket
        .send_to(data, addr)
        .map_err(|source| Error::Connection { op: SEND_UDP, source })?;
    if sent != data.len() {
        return Err(Error::Connection {
            op: SEND_UDP,
            source: io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short write ({} of {} bytes)", sent, data.len()),
            ),
        });
    }
    trace!("sent {} bytes to {} (udp)", sent, addr);
    Ok(())
}
