//! Buffer pool over mapped device memory
//!
//! Each slot is owned by exactly one side at a time: the device queue or the
//! application. Dequeue moves a slot to the application, release moves it back.

use std::io;

use tracing::warn;

use crate::capture::transport::Transport;
use crate::error::{Error, Result};

/// Which side currently owns a buffer slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    Device,
    Application,
}

struct Slot<R> {
    region: R,
    owner: Owner,
}

pub struct BufferPool<R> {
    slots: Vec<Slot<R>>,
}

impl<R: AsRef<[u8]>> BufferPool<R> {
    /// Map `count` granted buffers. On failure every region mapped so far is
    /// unmapped again before the error is returned.
    pub(crate) fn map<T>(transport: &mut T, count: u32) -> Result<Self>
    where
        T: Transport<Region = R>,
    {
        let mut slots = Vec::with_capacity(count as usize);
        for index in 0..count {
            match transport.map_buffer(index) {
                Ok(region) => slots.push(Slot {
                    region,
                    owner: Owner::Application,
                }),
                Err(source) => {
                    let partial = Self { slots };
                    if let Err(err) = partial.unmap(transport) {
                        warn!("Rollback after mapping failure: {err}");
                    }
                    return Err(Error::BufferMapping { index, source });
                }
            }
        }
        Ok(Self { slots })
    }

    /// Hand every slot to the device queue.
    pub(crate) fn enqueue_all<T>(&mut self, transport: &mut T) -> Result<()>
    where
        T: Transport<Region = R>,
    {
        for index in 0..self.size() {
            transport
                .enqueue_buffer(index)
                .map_err(|source| Error::Enqueue { index, source })?;
            self.slots[index as usize].owner = Owner::Device;
        }
        Ok(())
    }

    /// Unmap every slot, continuing past failures, and report all of them.
    pub(crate) fn unmap<T>(self, transport: &mut T) -> Result<()>
    where
        T: Transport<Region = R>,
    {
        let mut failures: Vec<(u32, io::Error)> = Vec::new();
        for (index, slot) in (0u32..).zip(self.slots) {
            if let Err(err) = transport.unmap_buffer(slot.region) {
                failures.push((index, err));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::BufferRelease { failures })
        }
    }

    pub fn size(&self) -> u32 {
        self.slots.len() as u32
    }

    pub fn owner(&self, index: u32) -> Option<Owner> {
        self.slots.get(index as usize).map(|slot| slot.owner)
    }

    /// Number of slots the application currently holds.
    pub fn held(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.owner == Owner::Application)
            .count()
    }

    fn slot(&self, index: u32) -> Result<&Slot<R>> {
        self.slots.get(index as usize).ok_or(Error::InvalidIndex {
            index,
            size: self.size(),
        })
    }

    /// Move a dequeued slot to the application, returning the payload view.
    pub(crate) fn acquire(&mut self, index: u32, bytes_used: u32) -> Result<&[u8]> {
        let owner = self.slot(index)?.owner;
        if owner != Owner::Device {
            return Err(Error::Dequeue(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("device returned buffer {index} which it does not own"),
            )));
        }
        let slot = &mut self.slots[index as usize];
        slot.owner = Owner::Application;

        let region = slot.region.as_ref();
        let end = (bytes_used as usize).min(region.len());
        Ok(&region[..end])
    }

    /// Check that `index` is held by the application before it is re-queued.
    pub(crate) fn check_held(&self, index: u32) -> Result<()> {
        match self.slot(index)?.owner {
            Owner::Application => Ok(()),
            Owner::Device => Err(Error::NotHeld(index)),
        }
    }

    pub(crate) fn mark_queued(&mut self, index: u32) {
        if let Some(slot) = self.slots.get_mut(index as usize) {
            slot.owner = Owner::Device;
        }
    }
}

impl<R> std::fmt::Debug for BufferPool<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("size", &self.slots.len())
            .field(
                "owners",
                &self.slots.iter().map(|slot| slot.owner).collect::<Vec<_>>(),
            )
            .finish()
    }
}
