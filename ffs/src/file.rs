//! Open/read/write/seek/close (component I), a thin wrapper over the
//! path resolver (F) and the inode/block model (E), grounded on
//! `src/ffs_priv.h`'s `ffs_file_*` prototypes.

use crate::constants::{BlockFlags, InodeFlags, BLOCK_DATA_LEN};
use crate::error::FfsError;
use crate::hash::ObjectRef;
use crate::medium::FlashMedium;
use crate::mount::{FileHandle, Mount, OpenFile, OpenFlags};
use crate::object::{insert_block_handle, Block, Payload};
use crate::path;
use alloc::vec;
use alloc::vec::Vec;

impl<Med: FlashMedium> Mount<Med> {
    /// Resolves `path`, creating a new file under its parent if it's
    /// missing and `flags` includes [`OpenFlags::WRITE`] (spec §4.I
    /// `open`). Bumps the inode's refcnt either way.
    pub fn open(&mut self, path: &[u8], flags: OpenFlags) -> Result<FileHandle, FfsError> {
        let resolved = path::resolve(self, path)?;
        let inode_handle = match resolved.inode {
            Some(h) => h,
            None if flags.contains(OpenFlags::WRITE) => self.create_file(&resolved)?,
            None => return Err(FfsError::NotFound),
        };
        {
            let inode = self.inode(inode_handle).ok_or(FfsError::Unexpected)?;
            if inode.is_directory() {
                return Err(FfsError::IsADirectory);
            }
        }
        if let Some(inode) = self.inode_mut(inode_handle) {
            inode.refcnt = inode.refcnt.saturating_add(1);
        }
        let handle = self.files.alloc(OpenFile { inode: inode_handle, offset: 0, access: flags })?;
        Ok(FileHandle(handle))
    }

    fn create_file(&mut self, resolved: &path::Resolved) -> Result<crate::pool::Handle, FfsError> {
        if resolved.name_len == 0 {
            return Err(FfsError::Invalid);
        }
        let parent_id = self.inode(resolved.parent).ok_or(FfsError::Unexpected)?.id;
        let id = self.alloc_id();
        let name = &resolved.name[..resolved.name_len as usize];
        let (area_id, offset) = self.write_inode_record(id, 0, parent_id, InodeFlags::empty(), name)?;
        let inode = crate::object::Inode {
            id,
            seq: 0,
            area_id,
            offset,
            parent_id,
            flags: InodeFlags::empty(),
            filename: resolved.name,
            filename_len: resolved.name_len,
            refcnt: 0,
            payload: Payload::File { blocks: Vec::new(), data_len: 0 },
        };
        let handle = self.inodes.alloc(inode)?;
        self.hash.insert(id, ObjectRef::Inode(handle));
        if let Err(e) = path::add_child(self, resolved.parent, handle) {
            self.inodes.free(handle);
            self.hash.remove(id);
            return Err(e);
        }
        Ok(handle)
    }

    /// Decrements the open file's inode refcnt; once it reaches zero on
    /// a tombstoned (unlinked-while-open) inode, the inode and its block
    /// chain are freed.
    pub fn close(&mut self, file: FileHandle) -> Result<(), FfsError> {
        let open = self.files.free(file.0).ok_or(FfsError::Invalid)?;
        let (refcnt_now, is_deleted) = {
            let inode = self.inode_mut(open.inode).ok_or(FfsError::Unexpected)?;
            inode.refcnt = inode.refcnt.saturating_sub(1);
            (inode.refcnt, inode.is_deleted())
        };
        if refcnt_now == 0 && is_deleted {
            path::free_inode(self, open.inode)?;
        }
        Ok(())
    }

    pub fn seek(&mut self, file: FileHandle, offset: u32) -> Result<(), FfsError> {
        let open = self.files.get_mut(file.0).ok_or(FfsError::Invalid)?;
        open.offset = offset;
        Ok(())
    }

    /// Reads up to `buf.len()` bytes starting at the file's current
    /// offset, clamped to the file's length, and advances the offset by
    /// the amount actually read (spec §4.I `read`, §4.E `read`).
    pub fn read(&mut self, file: FileHandle, buf: &mut [u8]) -> Result<usize, FfsError> {
        let (inode_handle, start) = {
            let open = self.files.get(file.0).ok_or(FfsError::Invalid)?;
            (open.inode, open.offset)
        };
        let data_len = self.inode(inode_handle).ok_or(FfsError::Unexpected)?.data_len();
        if start >= data_len {
            return Ok(0);
        }
        let want = core::cmp::min(buf.len() as u32, data_len - start) as usize;
        let block_list: Vec<crate::pool::Handle> = match &self.inode(inode_handle).ok_or(FfsError::Unexpected)?.payload {
            Payload::File { blocks, .. } => blocks.clone(),
            Payload::Directory { .. } => return Err(FfsError::IsADirectory),
        };

        let mut read_so_far = 0usize;
        let mut file_pos = 0u32;
        for block_handle in block_list {
            let block = self.blocks.get(block_handle).ok_or(FfsError::Unexpected)?;
            if block.is_deleted() {
                continue;
            }
            let block_start = file_pos;
            let block_end = file_pos + block.data_len as u32;
            file_pos = block_end;
            if block_end <= start as u32 {
                continue;
            }
            if read_so_far >= want {
                break;
            }
            let within_block_start = start.saturating_sub(block_start);
            let area_id = block.area_id;
            let record_offset = block.offset
                + crate::constants::BLOCK_HEADER_SIZE as u32
                + within_block_start;
            let avail_in_block = block.data_len as u32 - within_block_start;
            let still_wanted = (want - read_so_far) as u32;
            let n = core::cmp::min(avail_in_block, still_wanted) as usize;
            self.medium
                .read(area_id, record_offset, &mut buf[read_so_far..read_so_far + n])
                .map_err(crate::medium::map_err)?;
            read_so_far += n;
        }

        if let Some(open) = self.files.get_mut(file.0) {
            open.offset = start + read_so_far as u32;
        }
        Ok(read_so_far)
    }

    /// Appends/overwrites `data` at the file's current offset, splitting
    /// it across blocks of at most [`BLOCK_DATA_LEN`] payload bytes each.
    /// A write entirely inside the existing file length reuses the
    /// ranks of the blocks it overlaps, writing fresh higher-seq blocks
    /// (spec §4.I `write`); a write past the current end extends the
    /// file with new ranks.
    pub fn write(&mut self, file: FileHandle, data: &[u8]) -> Result<usize, FfsError> {
        let (inode_handle, start) = {
            let open = self.files.get(file.0).ok_or(FfsError::Invalid)?;
            (open.inode, open.offset)
        };
        {
            let inode = self.inode(inode_handle).ok_or(FfsError::Unexpected)?;
            if !matches!(inode.payload, Payload::File { .. }) {
                return Err(FfsError::IsADirectory);
            }
        }

        let mut written = 0usize;
        let mut pos = start;
        while written < data.len() {
            let rank = pos / BLOCK_DATA_LEN as u32;
            let within_rank = pos % BLOCK_DATA_LEN as u32;
            let space_in_rank = BLOCK_DATA_LEN - within_rank as usize;
            let chunk_len = core::cmp::min(space_in_rank, data.len() - written);
            let chunk = &data[written..written + chunk_len];
            self.write_block(inode_handle, rank, within_rank, chunk)?;
            pos += chunk_len as u32;
            written += chunk_len;
        }

        if let Some(open) = self.files.get_mut(file.0) {
            open.offset = pos;
        }
        Ok(written)
    }

    /// Writes a new block at `rank`, with `data` landing at byte offset
    /// `within_rank` inside that rank. If `rank` already has a live block,
    /// both the untouched prefix `[0, within_rank)` and the untouched tail
    /// past `within_rank + data.len()` are read forward from the old block
    /// and spliced around `data`, so the replacement block still covers
    /// the old block's full extent — a rank's byte range only ever shrinks
    /// via truncation, never via a write that merely starts or ends
    /// partway through it (spec §3 invariant 5, block chain contiguity).
    fn write_block(
        &mut self,
        inode_handle: crate::pool::Handle,
        rank: u32,
        within_rank: u32,
        data: &[u8],
    ) -> Result<(), FfsError> {
        let inode_id = self.inode(inode_handle).ok_or(FfsError::Unexpected)?.id;
        let existing = self.find_block_at_rank(inode_handle, rank);
        let within_rank = within_rank as usize;

        let mut payload = vec![0u8; within_rank];
        if let Some(existing_handle) = existing {
            let (old_len, old_area, old_offset) = {
                let b = self.blocks.get(existing_handle).ok_or(FfsError::Unexpected)?;
                (b.data_len as usize, b.area_id, b.offset)
            };
            let prefix_len = core::cmp::min(within_rank, old_len);
            if prefix_len > 0 {
                self.medium
                    .read(old_area, old_offset + crate::constants::BLOCK_HEADER_SIZE as u32, &mut payload[..prefix_len])
                    .map_err(crate::medium::map_err)?;
            }
            payload.extend_from_slice(data);
            let end_offset = within_rank + data.len();
            if old_len > end_offset {
                let tail_len = old_len - end_offset;
                let mut tail = vec![0u8; tail_len];
                let read_offset =
                    old_offset + crate::constants::BLOCK_HEADER_SIZE as u32 + end_offset as u32;
                self.medium.read(old_area, read_offset, &mut tail).map_err(crate::medium::map_err)?;
                payload.extend_from_slice(&tail);
            }
        } else {
            payload.extend_from_slice(data);
        }

        let seq = self.next_block_seq(inode_handle, rank);
        let id = self.alloc_id();
        let (area_id, offset) = self.write_block_record(id, seq, rank, inode_id, BlockFlags::empty(), &payload)?;
        let block = Block {
            id,
            seq,
            area_id,
            offset,
            inode_id,
            rank,
            data_len: payload.len() as u16,
            flags: BlockFlags::empty(),
        };
        let block_handle = self.blocks.alloc(block)?;
        self.hash.insert(id, ObjectRef::Block(block_handle));
        insert_block_handle(&mut self.inodes, &mut self.blocks, &mut self.hash, inode_handle, block_handle)
    }

    fn find_block_at_rank(&self, inode_handle: crate::pool::Handle, rank: u32) -> Option<crate::pool::Handle> {
        let inode = self.inode(inode_handle)?;
        let Payload::File { blocks, .. } = &inode.payload else { return None };
        blocks
            .iter()
            .copied()
            .find(|&h| self.blocks.get(h).is_some_and(|b| b.rank == rank))
    }

    fn next_block_seq(&self, inode_handle: crate::pool::Handle, rank: u32) -> u32 {
        let Some(inode) = self.inode(inode_handle) else { return 0 };
        let Payload::File { blocks, .. } = &inode.payload else { return 0 };
        blocks
            .iter()
            .filter_map(|h| self.blocks.get(*h))
            .filter(|b| b.rank == rank)
            .map(|b| b.seq + 1)
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::area::AreaDescriptor;
    use crate::medium::RamMedium;

    fn fresh_mount() -> Mount<RamMedium> {
        let medium = RamMedium::new(&[16384, 16384]);
        let descs = [
            AreaDescriptor { id: 0, offset: 0, length: 16384 },
            AreaDescriptor { id: 1, offset: 16384, length: 16384 },
        ];
        Mount::format(medium, &descs, 1).unwrap()
    }

    #[test]
    fn write_then_read_round_trips() {
        let mut mount = fresh_mount();
        let f = mount.open(b"/a", OpenFlags::WRITE).unwrap();
        let payload = vec![0x5Au8; 2048];
        assert_eq!(mount.write(f, &payload).unwrap(), 2048);
        mount.close(f).unwrap();

        let f2 = mount.open(b"/a", OpenFlags::READ).unwrap();
        let mut out = vec![0u8; 2048];
        assert_eq!(mount.read(f2, &mut out).unwrap(), 2048);
        assert_eq!(out, payload);
    }

    #[test]
    fn seek_then_partial_read_matches_offset() {
        let mut mount = fresh_mount();
        let f = mount.open(b"/big", OpenFlags::WRITE).unwrap();
        let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        mount.write(f, &payload).unwrap();
        mount.close(f).unwrap();

        let f2 = mount.open(b"/big", OpenFlags::READ).unwrap();
        mount.seek(f2, 5000).unwrap();
        let mut out = vec![0u8; 100];
        assert_eq!(mount.read(f2, &mut out).unwrap(), 100);
        assert_eq!(out, payload[5000..5100]);
    }

    #[test]
    fn open_without_write_on_missing_path_is_not_found() {
        let mut mount = fresh_mount();
        assert_eq!(mount.open(b"/nope", OpenFlags::READ).unwrap_err(), FfsError::NotFound);
    }

    #[test]
    fn opening_a_directory_as_a_file_is_is_a_directory() {
        let mut mount = fresh_mount();
        path::mkdir(&mut mount, b"/d").unwrap();
        assert_eq!(mount.open(b"/d", OpenFlags::READ).unwrap_err(), FfsError::IsADirectory);
    }

    #[test]
    fn overwrite_within_file_bumps_seq_and_replaces_content() {
        let mut mount = fresh_mount();
        let f = mount.open(b"/a", OpenFlags::WRITE).unwrap();
        mount.write(f, &[1u8; 100]).unwrap();
        mount.seek(f, 0).unwrap();
        mount.write(f, &[2u8; 50]).unwrap();
        mount.close(f).unwrap();

        let f2 = mount.open(b"/a", OpenFlags::READ).unwrap();
        let mut out = vec![0u8; 100];
        mount.read(f2, &mut out).unwrap();
        assert_eq!(&out[..50], &[2u8; 50]);
        assert_eq!(&out[50..], &[1u8; 50]);
    }

    #[test]
    fn sequential_writes_append_rather_than_clobber_the_rank() {
        let mut mount = fresh_mount();
        let f = mount.open(b"/a", OpenFlags::WRITE).unwrap();
        mount.write(f, &[b'A'; 100]).unwrap();
        mount.write(f, &[b'B'; 100]).unwrap();
        mount.close(f).unwrap();

        let f2 = mount.open(b"/a", OpenFlags::READ).unwrap();
        let mut out = vec![0u8; 200];
        assert_eq!(mount.read(f2, &mut out).unwrap(), 200);
        assert_eq!(&out[..100], &[b'A'; 100]);
        assert_eq!(&out[100..], &[b'B'; 100]);
    }

    #[test]
    fn unlink_while_open_tombstones_without_freeing_until_close() {
        let mut mount = fresh_mount();
        let f = mount.open(b"/a", OpenFlags::WRITE).unwrap();
        mount.write(f, b"hello").unwrap();
        path::unlink(&mut mount, b"/a").unwrap();

        // The open handle must still work: the inode survives as a
        // tombstone until this handle closes.
        mount.seek(f, 0).unwrap();
        let mut out = vec![0u8; 5];
        assert_eq!(mount.read(f, &mut out).unwrap(), 5);
        assert_eq!(out, b"hello");

        assert!(path::resolve(&mount, b"/a").unwrap().inode.is_none());
        mount.close(f).unwrap();
    }
}
