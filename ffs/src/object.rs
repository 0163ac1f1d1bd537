//! In-RAM inode/block model (component E). A tagged sum type, not
//! inheritance (Design Notes §9): [`Inode`] and [`Block`] are distinct
//! concrete types living in their own pools, and a directory's child list
//! vs. a file's block list are mutually-exclusive [`Payload`] variants.

use crate::constants::*;
use crate::error::FfsError;
use crate::hash::HashIndex;
use crate::medium::AreaId;
use crate::pool::{Handle, Pool};
use alloc::vec::Vec;

#[derive(Debug)]
pub enum Payload {
    File {
        /// Handles into the block pool, kept sorted by ascending rank.
        blocks: Vec<Handle>,
        data_len: u32,
    },
    Directory {
        /// Handles into the inode pool.
        children: Vec<Handle>,
    },
}

impl Payload {
    pub fn is_directory(&self) -> bool {
        matches!(self, Payload::Directory { .. })
    }
}

#[derive(Debug)]
pub struct Inode {
    pub id: u32,
    pub seq: u32,
    pub area_id: AreaId,
    pub offset: u32,
    pub parent_id: u32,
    pub flags: InodeFlags,
    pub filename: [u8; SHORT_FILENAME_LEN],
    pub filename_len: u8,
    pub refcnt: u8,
    pub payload: Payload,
}

impl Inode {
    pub fn filename(&self) -> &[u8] {
        &self.filename[..self.filename_len as usize]
    }

    pub fn is_directory(&self) -> bool {
        self.flags.contains(InodeFlags::DIRECTORY)
    }

    pub fn is_deleted(&self) -> bool {
        self.flags.contains(InodeFlags::DELETED)
    }

    pub fn is_dummy(&self) -> bool {
        self.flags.contains(InodeFlags::DUMMY)
    }

    pub fn data_len(&self) -> u32 {
        match &self.payload {
            Payload::File { data_len, .. } => *data_len,
            Payload::Directory { .. } => 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Block {
    pub id: u32,
    pub seq: u32,
    pub area_id: AreaId,
    pub offset: u32,
    pub inode_id: u32,
    pub rank: u32,
    pub data_len: u16,
    pub flags: BlockFlags,
}

impl Block {
    pub fn is_deleted(&self) -> bool {
        self.flags.contains(BlockFlags::DELETED)
    }
}

/// Inserts `block_handle` into `inode_handle`'s block chain, ordered by
/// ascending rank; a block already occupying that rank is resolved by
/// seq, higher wins (spec §4.E `insert_block`, Design Notes' open
/// question on equal-rank resolution). The loser of a tie is freed
/// immediately rather than left dangling, since it can no longer be
/// reached from any live inode and GC's liveness check is "present in
/// the index".
pub(crate) fn insert_block_handle(
    inodes: &mut Pool<Inode>,
    blocks: &mut Pool<Block>,
    hash: &mut HashIndex,
    inode_handle: Handle,
    block_handle: Handle,
) -> Result<(), FfsError> {
    let (new_rank, new_seq) = {
        let b = blocks.get(block_handle).ok_or(FfsError::Unexpected)?;
        (b.rank, b.seq)
    };
    let existing_list: Vec<Handle> = match &inodes.get(inode_handle).ok_or(FfsError::Unexpected)?.payload {
        Payload::File { blocks: list, .. } => list.clone(),
        Payload::Directory { .. } => return Err(FfsError::IsADirectory),
    };

    let mut new_list = Vec::with_capacity(existing_list.len() + 1);
    let mut inserted = false;
    let mut superseded = None;
    for existing in existing_list {
        let (existing_rank, existing_seq) = {
            let b = blocks.get(existing).ok_or(FfsError::Unexpected)?;
            (b.rank, b.seq)
        };
        if !inserted && existing_rank == new_rank {
            inserted = true;
            if new_seq > existing_seq {
                superseded = Some(existing);
                new_list.push(block_handle);
            } else {
                new_list.push(existing);
                if let Some(garbage) = blocks.free(block_handle) {
                    hash.remove(garbage.id);
                }
            }
            continue;
        }
        if !inserted && existing_rank > new_rank {
            new_list.push(block_handle);
            inserted = true;
        }
        new_list.push(existing);
    }
    if !inserted {
        new_list.push(block_handle);
    }

    let mut data_len = 0u32;
    for handle in &new_list {
        if let Some(b) = blocks.get(*handle) {
            if !b.is_deleted() {
                data_len += b.data_len as u32;
            }
        }
    }
    if let Some(inode) = inodes.get_mut(inode_handle) {
        if let Payload::File { blocks: slot, data_len: len_slot } = &mut inode.payload {
            *slot = new_list;
            *len_slot = data_len;
        }
    }
    if let Some(superseded) = superseded {
        if let Some(freed) = blocks.free(superseded) {
            hash.remove(freed.id);
        }
    }
    Ok(())
}
