use libtunnel_tools::{ConnId, Error};
use pcap::{Active, Capture};
use tracing::debug;

use crate::conn::RawConn;
use crate::handle::CaptureHandle;

struct Slot<H: CaptureHandle> {
    generation: u32,
    conn: Option<RawConn<H>>,
}

/// Owner of the raw connections referred to by NAT indicators
///
/// Connections are stored in reusable slots. A [`ConnId`] names a slot and the
/// generation it was issued for, so an id kept after its connection was removed
/// fails with [`Error::StaleConnection`].
pub struct ConnRegistry<H: CaptureHandle = Capture<Active>> {
    slots: Vec<Slot<H>>,
    free: Vec<usize>,
}

impl<H: CaptureHandle> Default for ConnRegistry<H> {
    fn default() -> Self {
        ConnRegistry {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }
}

impl<H: CaptureHandle> ConnRegistry<H> {
    pub fn new() -> Self {
        ConnRegistry::default()
    }

    pub fn insert(&mut self, conn: RawConn<H>) -> ConnId {
        let index = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index];
                slot.generation = slot.generation.wrapping_add(1);
                slot.conn = Some(conn);
                index
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    conn: Some(conn),
                });
                self.slots.len() - 1
            }
        };
        let id = ConnId::new(index as u32, self.slots[index].generation);
        debug!("registered connection {}", id);
        id
    }

    pub fn get(&self, id: ConnId) -> Result<&RawConn<H>, Error> {
        self.slots
            .get(id.index())
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.conn.as_ref())
            .ok_or(Error::StaleConnection(id))
    }

    pub fn get_mut(&mut self, id: ConnId) -> Result<&mut RawConn<H>, Error> {
        self.slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.conn.as_mut())
            .ok_or(Error::StaleConnection(id))
    }

    /// Take a connection out of the registry. Its id becomes stale.
    pub fn remove(&mut self, id: ConnId) -> Result<RawConn<H>, Error> {
        let conn = self
            .slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.conn.take())
            .ok_or(Error::StaleConnection(id))?;
        self.free.push(id.index());
        debug!("removed connection {}", id);
        Ok(conn)
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over live connections and their ids
    pub fn iter(&self) -> impl Iterator<Item = (ConnId, &RawConn<H>)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.conn
                .as_ref()
                .map(|conn| (ConnId::new(index as u32, slot.generation), conn))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conn::tests::MockHandle;

    #[test]
    fn registry_stale_ids() {
        let mut registry = ConnRegistry::new();
        let a = registry.insert(RawConn::from_handle(MockHandle::default()));
        let b = registry.insert(RawConn::from_handle(MockHandle::default()));
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);

        let mut conn = registry.remove(a).expect("remove");
        conn.close();
        assert!(matches!(registry.get(a), Err(Error::StaleConnection(id)) if id == a));
        assert!(registry.remove(a).is_err());

        // the slot is reused with a new generation
        let c = registry.insert(RawConn::from_handle(MockHandle::default()));
        assert_eq!(c.index(), a.index());
        assert_ne!(c, a);
        assert!(registry.get(a).is_err());
        assert!(registry.get(c).is_ok());
        assert!(registry.get_mut(b).is_ok());
        assert_eq!(registry.iter().count(), 2);
    }

    #[test]
    fn registry_write_through_id() {
        let mut registry = ConnRegistry::new();
        let id = registry.insert(RawConn::from_handle(MockHandle::default()));
        let written = registry
            .get_mut(id)
            .and_then(|conn| conn.write_frame(&[0u8; 60]))
            .expect("write");
        assert_eq!(written, 60);
    }
}
