//! Shared-file directory: several indexes behind one physical file.
//!
//! A shared index file starts with a fixed header table of
//! `(index id, byte offset)` slots. The table is written once when the
//! file is created; each slot is patched after its index body has been
//! fully written, so a crashed build leaves the previous table intact and
//! the half-written body unreachable.
//!
//! ## Layout
//!
//! ```text
//! SharedHeader {
//!     magic: [0x46, 0x58, 0x44, 0x31]     // "FXD1"
//!     slots: [(id: u32 LE, offset: u64 LE); 10]
//! }
//! ```
//!
//! A free slot has id `u32::MAX`. A committed slot points exactly at the
//! first shape integer of its index block; readers seek there before any
//! other access.

use crate::error::{StorageError, StorageResult};
use crate::volume::IndexVolume;

/// Magic bytes for shared index files: "FXD1".
const DIRECTORY_MAGIC: [u8; 4] = [0x46, 0x58, 0x44, 0x31];

/// Maximum number of indexes sharing one physical file.
pub const MAX_SHARED_INDEXES: usize = 10;

/// Id marking a free directory slot.
const FREE_SLOT: u32 = u32::MAX;

/// Size of one serialized slot: id (4) + offset (8).
const SLOT_SIZE: usize = 12;

/// Total header size: magic + slot table.
pub const DIRECTORY_SIZE: u64 = 4 + (MAX_SHARED_INDEXES * SLOT_SIZE) as u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Slot {
    id: u32,
    offset: u64,
}

impl Slot {
    const FREE: Slot = Slot {
        id: FREE_SLOT,
        offset: 0,
    };

    fn encode(&self) -> [u8; SLOT_SIZE] {
        let mut buf = [0u8; SLOT_SIZE];
        buf[..4].copy_from_slice(&self.id.to_le_bytes());
        buf[4..].copy_from_slice(&self.offset.to_le_bytes());
        buf
    }

    fn decode(buf: &[u8]) -> Self {
        let id = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let offset = u64::from_le_bytes([
            buf[4], buf[5], buf[6], buf[7], buf[8], buf[9], buf[10], buf[11],
        ]);
        Self { id, offset }
    }
}

/// The header table of a shared index file.
///
/// Obtained from [`SharedDirectory::create`] on a fresh file or
/// [`SharedDirectory::load`] on an existing one. Builders call
/// [`reserve`](Self::reserve) before writing an index body and
/// [`commit`](Self::commit) once the body is complete.
#[derive(Debug)]
pub struct SharedDirectory {
    slots: [Slot; MAX_SHARED_INDEXES],
}

impl SharedDirectory {
    /// Writes an empty directory at the start of a fresh volume.
    ///
    /// # Errors
    ///
    /// Returns an error if the volume already holds data or the write
    /// fails.
    pub fn create(volume: &mut dyn IndexVolume) -> StorageResult<Self> {
        if !volume.is_empty()? {
            return Err(StorageError::Corrupted(
                "cannot create shared directory on a non-empty volume".into(),
            ));
        }

        let directory = Self {
            slots: [Slot::FREE; MAX_SHARED_INDEXES],
        };
        volume.seek(0)?;
        volume.write_all(&DIRECTORY_MAGIC)?;
        for slot in &directory.slots {
            volume.write_all(&slot.encode())?;
        }
        volume.flush()?;
        Ok(directory)
    }

    /// Reads and validates the directory of an existing shared file.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Corrupted`] if the magic or slot table does
    /// not parse.
    pub fn load(volume: &mut dyn IndexVolume) -> StorageResult<Self> {
        volume.seek(0)?;
        let mut magic = [0u8; 4];
        volume.read_exact(&mut magic)?;
        if magic != DIRECTORY_MAGIC {
            return Err(StorageError::Corrupted(
                "invalid shared directory magic".into(),
            ));
        }

        let mut slots = [Slot::FREE; MAX_SHARED_INDEXES];
        let mut buf = [0u8; SLOT_SIZE];
        for slot in &mut slots {
            volume.read_exact(&mut buf)?;
            *slot = Slot::decode(&buf);
            if slot.id != FREE_SLOT && slot.offset < DIRECTORY_SIZE {
                return Err(StorageError::Corrupted(format!(
                    "slot for index id {} points inside the header",
                    slot.id
                )));
            }
        }
        Ok(Self { slots })
    }

    /// Returns the byte offset of the index with the given id, if present.
    #[must_use]
    pub fn locate(&self, id: u32) -> Option<u64> {
        self.slots
            .iter()
            .find(|s| s.id == id && s.offset != 0)
            .map(|s| s.offset)
    }

    /// Returns the ids of all committed indexes.
    #[must_use]
    pub fn ids(&self) -> Vec<u32> {
        self.slots
            .iter()
            .filter(|s| s.id != FREE_SLOT && s.offset != 0)
            .map(|s| s.id)
            .collect()
    }

    /// Claims a slot for a new index id without touching the file.
    ///
    /// The slot becomes visible to readers only after [`commit`](Self::commit).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::SlotTaken`] if the id is already present or
    /// [`StorageError::DirectoryFull`] if all slots are occupied.
    pub fn reserve(&mut self, id: u32) -> StorageResult<()> {
        if id == FREE_SLOT {
            return Err(StorageError::Corrupted(format!(
                "index id {id} is reserved for free slots"
            )));
        }
        if self.slots.iter().any(|s| s.id == id) {
            return Err(StorageError::SlotTaken { id });
        }
        let slot = self
            .slots
            .iter_mut()
            .find(|s| s.id == FREE_SLOT)
            .ok_or(StorageError::DirectoryFull(MAX_SHARED_INDEXES))?;
        *slot = Slot { id, offset: 0 };
        Ok(())
    }

    /// Patches a reserved slot with the final body offset.
    ///
    /// This is the last write of a shared-mode build: until it lands, the
    /// new index body is unreachable from the directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the id was never reserved or the patch write
    /// fails.
    pub fn commit(
        &mut self,
        volume: &mut dyn IndexVolume,
        id: u32,
        offset: u64,
    ) -> StorageResult<()> {
        if offset < DIRECTORY_SIZE {
            return Err(StorageError::Corrupted(format!(
                "index body offset {offset} lies inside the header"
            )));
        }
        let index = self
            .slots
            .iter()
            .position(|s| s.id == id)
            .ok_or(StorageError::Corrupted(format!(
                "commit for unreserved index id {id}"
            )))?;

        self.slots[index].offset = offset;
        volume.seek(4 + (index * SLOT_SIZE) as u64)?;
        volume.write_all(&self.slots[index].encode())?;
        volume.flush()?;
        Ok(())
    }
}
