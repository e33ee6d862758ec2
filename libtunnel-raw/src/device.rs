use std::fmt;

use libtunnel_tools::{CaptureError, Error};
use tracing::error;

use crate::handle::capture_error;

/// Network interface a raw connection is bound to
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Device {
    name: String,
    loopback: bool,
}

impl Device {
    pub fn new<S: Into<String>>(name: S, loopback: bool) -> Self {
        Device {
            name: name.into(),
            loopback,
        }
    }

    /// Find an interface by name in the list reported by libpcap
    pub fn lookup(name: &str) -> Result<Device, Error> {
        let interfaces = pcap::Device::list().map_err(|e| {
            error!("Could not list network interfaces: {e:?}");
            capture_error(e)
        })?;
        interfaces
            .iter()
            .find(|iface| iface.name == name)
            .map(Device::from)
            .ok_or_else(|| {
                Error::Capture(CaptureError::Handle(format!("no such interface: {}", name)))
            })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn is_loopback(&self) -> bool {
        self.loopback
    }
}

impl From<&pcap::Device> for Device {
    fn from(dev: &pcap::Device) -> Self {
        Device::new(dev.name.clone(), dev.flags.is_loopback())
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.name)?;
        if self.loopback {
            f.write_str(" (loopback)")?;
        }
        Ok(())
    }
}
