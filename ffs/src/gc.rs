//! Copy-compact garbage collector (component H), grounded on
//! `src/ffs_priv.h`'s `ffs_gc`/`ffs_gc_until` prototypes. Reclaims one
//! source area at a time into the scratch area, then the (now-emptied)
//! source becomes the new scratch — a classic log-structured two-phase
//! compaction, never touching more than one area's liveness at a time so
//! a crash mid-cycle always leaves exactly one area's data authoritative
//! (spec §4.H).

use crate::error::FfsError;
use crate::hash::ObjectRef;
use crate::medium::{map_err, AreaId, FlashMedium};
use crate::mount::Mount;

impl<Med: FlashMedium> Mount<Med> {
    /// Runs one GC cycle: picks the lowest-free-space non-scratch area
    /// (excluding whichever area the caller is currently writing into,
    /// so a GC triggered mid-reservation cannot evict its own target),
    /// relocates every live object out of it into scratch, then turns it
    /// into the new scratch area.
    pub fn gc(&mut self) -> Result<(), FfsError> {
        let Some(source) = self.choose_source() else {
            return Err(FfsError::NotEnoughSpace);
        };
        let scratch = self.areas.scratch_id().ok_or(FfsError::Unexpected)?;
        log::info!("ffs gc: reclaiming area {} into scratch {}", source, scratch);

        self.relocate_live_objects(source, scratch)?;

        self.areas.reformat_as_scratch(&mut self.medium, source)?;
        self.areas.set_scratch(&mut self.medium, scratch, false)?;

        log::info!("ffs gc: area {} is now scratch, area {} reclaimed", source, scratch);
        Ok(())
    }

    /// Picks the non-scratch area with the least free space, preferring to
    /// leave out [`Mount::last_write_area`] (spec §4.H step 1) so GC never
    /// reclaims the area a caller is in the middle of appending to. Falls
    /// back to considering it anyway if it's the only non-scratch area,
    /// since GC must still be able to make progress in that layout.
    fn choose_source(&self) -> Option<AreaId> {
        let pick = |exclude_current: bool| {
            self.areas
                .areas()
                .iter()
                .filter(|a| !a.is_scratch)
                .filter(|a| !exclude_current || Some(a.id) != self.last_write_area)
                .min_by_key(|a| a.free_space())
                .map(|a| a.id)
        };
        pick(true).or_else(|| pick(false))
    }

    /// Copies the backing bytes of every live object in `source` into
    /// `scratch`, updating each object's in-RAM `(area_id, offset)` to
    /// point at its new home. Objects superseded by a higher seq, or
    /// deleted, were never kept in the index (restore/§4.E already
    /// dropped them), so "every entry still in the index" is exactly
    /// "every live object" (spec §4.H step 2).
    fn relocate_live_objects(&mut self, source: AreaId, scratch: AreaId) -> Result<(), FfsError> {
        let mut moves: alloc::vec::Vec<(ObjectRef, u32, u32)> = alloc::vec::Vec::new();
        for (_, obj) in self.hash.iter() {
            let (offset, len) = match obj {
                ObjectRef::Inode(h) => {
                    let Some(inode) = self.inodes.get(h) else { continue };
                    if inode.area_id != source {
                        continue;
                    }
                    (inode.offset, self.inode_record_len(h))
                }
                ObjectRef::Block(h) => {
                    let Some(block) = self.blocks.get(h) else { continue };
                    if block.area_id != source {
                        continue;
                    }
                    (block.offset, self.block_record_len(h))
                }
            };
            moves.push((obj, offset, len));
        }

        for (obj, offset, len) in moves {
            let (dst_area, dst_offset) = self.reserve_with_gc_bypass(scratch, len)?;
            self.medium
                .copy(source, offset, dst_area, dst_offset, len)
                .map_err(map_err)?;
            match obj {
                ObjectRef::Inode(h) => {
                    if let Some(inode) = self.inode_mut(h) {
                        inode.area_id = dst_area;
                        inode.offset = dst_offset;
                    }
                }
                ObjectRef::Block(h) => {
                    if let Some(block) = self.blocks.get_mut(h) {
                        block.area_id = dst_area;
                        block.offset = dst_offset;
                    }
                }
            }
        }
        Ok(())
    }

    fn inode_record_len(&self, handle: crate::pool::Handle) -> u32 {
        let Some(inode) = self.inodes.get(handle) else { return 0 };
        (crate::constants::INODE_HEADER_SIZE + inode.filename_len as usize) as u32
    }

    fn block_record_len(&self, handle: crate::pool::Handle) -> u32 {
        let Some(block) = self.blocks.get(handle) else { return 0 };
        (crate::constants::BLOCK_HEADER_SIZE + block.data_len as usize) as u32
    }

    /// Reserves space directly in `scratch` during GC's own relocation
    /// pass. Bypasses [`Mount::reserve_with_gc`]'s retry-with-GC path:
    /// recursing into GC while GC is already running would reclaim the
    /// area we're relocating out of.
    fn reserve_with_gc_bypass(&mut self, scratch: AreaId, len: u32) -> Result<(AreaId, u32), FfsError> {
        self.areas.reserve_into(scratch, len)
    }
}
