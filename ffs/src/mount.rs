//! Mount context (component J): every mutable structure A–I touch, bundled
//! in one value instead of the source's module-global tables (Design
//! Notes §9, "bundle these in one mount-context value threaded through API
//! calls"). A process can hold as many independent [`Mount`]s as it likes,
//! each against its own [`FlashMedium`] — there is no shared global state
//! to interfere between them.

use crate::area::{AreaDescriptor, AreaManager};
use crate::constants::*;
use crate::error::FfsError;
use crate::hash::HashIndex;
use crate::medium::{map_err, AreaId, FlashMedium};
use crate::object::{Block, Inode, Payload};
use crate::pool::{Handle, Pool};
use alloc::vec::Vec;

/// Default fixed capacities. These are not runtime configuration (spec
/// §6's "Configuration surface"): every size in this system is a
/// compile-time capacity, so a host build simply picks bigger constants
/// than an embedded one would.
pub const DEFAULT_INODE_POOL: usize = 512;
pub const DEFAULT_BLOCK_POOL: usize = 4096;
pub const DEFAULT_FILE_POOL: usize = 32;

bitflags::bitflags! {
    pub struct OpenFlags: u8 {
        const READ  = 0x01;
        const WRITE = 0x02;
        const CREATE_DIR = 0x04;
    }
}

pub(crate) struct OpenFile {
    pub inode: Handle,
    pub offset: u32,
    #[allow(dead_code)]
    pub access: OpenFlags,
}

pub struct Mount<Med: FlashMedium> {
    pub(crate) medium: Med,
    pub(crate) areas: AreaManager,
    pub(crate) hash: HashIndex,
    pub(crate) inodes: Pool<Inode>,
    pub(crate) blocks: Pool<Block>,
    pub(crate) files: Pool<OpenFile>,
    pub(crate) root: Handle,
    pub(crate) next_id: u32,
    /// Area most recently appended to by [`Self::write_inode_record`] /
    /// [`Self::write_block_record`]. GC (component H) excludes this area
    /// from source selection so it never reclaims the area a caller is in
    /// the middle of writing into (spec §4.H step 1).
    pub(crate) last_write_area: Option<AreaId>,
}

/// Opaque handle returned by [`Mount::open`]; every [`crate::file`] entry
/// point takes one of these rather than letting callers poke at inode
/// handles directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHandle(pub(crate) Handle);

impl<Med: FlashMedium> Mount<Med> {
    /// Formats a brand-new medium: writes every area header (picking
    /// `scratch_id` as the scratch area) and writes the root directory
    /// inode (id 0, parent NONE).
    pub fn format(mut medium: Med, descs: &[AreaDescriptor], scratch_id: AreaId) -> Result<Self, FfsError> {
        let areas = AreaManager::format(&mut medium, descs, scratch_id)?;
        let mut mount = Self {
            medium,
            areas,
            hash: HashIndex::new(),
            inodes: Pool::new(DEFAULT_INODE_POOL),
            blocks: Pool::new(DEFAULT_BLOCK_POOL),
            files: Pool::new(DEFAULT_FILE_POOL),
            root: Handle(0),
            next_id: 1,
            last_write_area: None,
        };
        mount.create_root()?;
        Ok(mount)
    }

    fn create_root(&mut self) -> Result<(), FfsError> {
        let (area_id, offset) = self.write_inode_record(0, 0, ID_NONE, InodeFlags::DIRECTORY, &[])?;
        let root = Inode {
            id: 0,
            seq: 0,
            area_id,
            offset,
            parent_id: ID_NONE,
            flags: InodeFlags::DIRECTORY,
            filename: [0; SHORT_FILENAME_LEN],
            filename_len: 0,
            refcnt: 0,
            payload: Payload::Directory { children: Vec::new() },
        };
        let handle = self.inodes.alloc(root)?;
        self.hash.insert(0, crate::hash::ObjectRef::Inode(handle));
        self.root = handle;
        Ok(())
    }

    pub fn root(&self) -> Handle {
        self.root
    }

    /// Consumes the mount and hands back the underlying medium, e.g. to
    /// simulate a remount by feeding it straight back into
    /// [`crate::restore::restore`].
    pub fn into_medium(self) -> Med {
        self.medium
    }

    pub(crate) fn alloc_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Bumps `next_id` so it stays strictly greater than every id ever
    /// observed (invariant 7), used by restore as it discovers ids.
    pub(crate) fn observe_id(&mut self, id: u32) {
        if id != ID_NONE && id >= self.next_id {
            self.next_id = id + 1;
        }
    }

    /// Reserves space for `size` bytes, running GC once and retrying if
    /// the first attempt reports [`FfsError::NotEnoughSpace`] (spec §4.B).
    pub(crate) fn reserve_with_gc(&mut self, size: u32) -> Result<(AreaId, u32), FfsError> {
        match self.areas.reserve_space(size) {
            Ok(r) => Ok(r),
            Err(FfsError::NotEnoughSpace) => {
                self.gc()?;
                self.areas.reserve_space(size)
            }
            Err(e) => Err(e),
        }
    }

    pub(crate) fn write_inode_record(
        &mut self,
        id: u32,
        seq: u32,
        parent_id: u32,
        flags: InodeFlags,
        filename: &[u8],
    ) -> Result<(AreaId, u32), FfsError> {
        if filename.len() > SHORT_FILENAME_LEN {
            return Err(FfsError::Invalid);
        }
        let bytes = crate::codec::encode_inode(id, seq, parent_id, flags, filename)
            .map_err(|_| FfsError::Invalid)?;
        let (area_id, offset) = self.reserve_with_gc(bytes.len() as u32)?;
        self.medium.write(area_id, offset, &bytes).map_err(map_err)?;
        self.last_write_area = Some(area_id);
        Ok((area_id, offset))
    }

    pub(crate) fn write_block_record(
        &mut self,
        id: u32,
        seq: u32,
        rank: u32,
        inode_id: u32,
        flags: crate::constants::BlockFlags,
        data: &[u8],
    ) -> Result<(AreaId, u32), FfsError> {
        let bytes = crate::codec::encode_block(id, seq, rank, inode_id, flags, data)
            .map_err(|_| FfsError::Invalid)?;
        let (area_id, offset) = self.reserve_with_gc(bytes.len() as u32)?;
        self.medium.write(area_id, offset, &bytes).map_err(map_err)?;
        self.last_write_area = Some(area_id);
        Ok((area_id, offset))
    }

    pub fn inode(&self, handle: Handle) -> Option<&Inode> {
        self.inodes.get(handle)
    }

    pub(crate) fn inode_mut(&mut self, handle: Handle) -> Option<&mut Inode> {
        self.inodes.get_mut(handle)
    }

    pub(crate) fn block(&self, handle: Handle) -> Option<&Block> {
        self.blocks.get(handle)
    }
}
