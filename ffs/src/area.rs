//! Area manager (component B): area layout, scratch tracking, free-space
//! accounting, and formatting. One area is always the scratch area; GC
//! (component H) is the only thing that changes which one that is.

use crate::codec;
use crate::constants::*;
use crate::error::FfsError;
use crate::medium::{map_err, AreaId, FlashMedium};
use alloc::vec::Vec;

/// Caller-supplied description of one logical area. `offset` is purely
/// informational bookkeeping (e.g. where this area sits within a larger
/// combined flash image for logging/diagnostics) — every flash I/O call
/// addresses bytes relative to the area's own start, per the
/// [`FlashMedium`] contract.
#[derive(Debug, Clone, Copy)]
pub struct AreaDescriptor {
    pub id: AreaId,
    pub offset: u32,
    pub length: u32,
}

/// In-RAM bookkeeping for one area.
#[derive(Debug, Clone)]
pub struct Area {
    pub id: AreaId,
    pub offset: u32,
    pub length: u32,
    pub cur: u32,
    pub seq: u8,
    pub is_scratch: bool,
}

impl Area {
    pub fn free_space(&self) -> u32 {
        self.length - self.cur
    }
}

pub struct AreaManager {
    areas: Vec<Area>,
}

impl AreaManager {
    pub fn areas(&self) -> &[Area] {
        &self.areas
    }

    pub fn area(&self, id: AreaId) -> Option<&Area> {
        self.areas.iter().find(|a| a.id == id)
    }

    fn area_mut(&mut self, id: AreaId) -> Option<&mut Area> {
        self.areas.iter_mut().find(|a| a.id == id)
    }

    pub fn scratch_id(&self) -> Option<AreaId> {
        self.areas.iter().find(|a| a.is_scratch).map(|a| a.id)
    }

    pub fn total_free_space(&self) -> u64 {
        self.areas
            .iter()
            .filter(|a| !a.is_scratch)
            .map(|a| a.free_space() as u64)
            .sum()
    }

    /// Writes a fresh area header, marking exactly one area (`scratch_id`)
    /// as scratch. Used by `format` (component G/J) for a brand-new medium.
    pub fn format<Med: FlashMedium>(
        medium: &mut Med,
        descs: &[AreaDescriptor],
        scratch_id: AreaId,
    ) -> Result<Self, FfsError> {
        if descs.len() > MAX_AREAS || descs.is_empty() {
            return Err(FfsError::Invalid);
        }
        if !descs.iter().any(|d| d.id == scratch_id) {
            return Err(FfsError::Invalid);
        }
        let mut areas = Vec::with_capacity(descs.len());
        for desc in descs {
            if (desc.length as usize) < AREA_HEADER_SIZE {
                return Err(FfsError::Invalid);
            }
            let is_scratch = desc.id == scratch_id;
            let header = codec::encode_area_header(desc.length, 0, is_scratch);
            medium
                .write(desc.id, 0, &header)
                .map_err(map_err)?;
            areas.push(Area {
                id: desc.id,
                offset: desc.offset,
                length: desc.length,
                cur: AREA_HEADER_SIZE as u32,
                seq: 0,
                is_scratch,
            });
        }
        Ok(Self { areas })
    }

    /// Rebuilds the manager from areas already scanned by restore
    /// (component G), which has already validated every header.
    pub fn from_scanned(areas: Vec<Area>) -> Self {
        Self { areas }
    }

    /// Returns `(area_id, offset)` for the first non-scratch area with
    /// enough trailing free space, bumping its `cur`. Returns
    /// [`FfsError::NotEnoughSpace`] if none qualifies; the caller is
    /// expected to run GC and retry once (spec §4.B).
    pub fn reserve_space(&mut self, size: u32) -> Result<(AreaId, u32), FfsError> {
        for area in self.areas.iter_mut() {
            if area.is_scratch {
                continue;
            }
            if area.free_space() >= size {
                let offset = area.cur;
                area.cur += size;
                return Ok((area.id, offset));
            }
        }
        Err(FfsError::NotEnoughSpace)
    }

    /// Patches just the `is_scratch` byte of `id`'s header, without
    /// rewriting the rest (spec §4.B/§4.H step 4).
    pub fn set_scratch<Med: FlashMedium>(
        &mut self,
        medium: &mut Med,
        id: AreaId,
        is_scratch: bool,
    ) -> Result<(), FfsError> {
        medium
            .write(id, AREA_OFFSET_IS_SCRATCH as u32, &[is_scratch as u8])
            .map_err(map_err)?;
        if let Some(area) = self.area_mut(id) {
            area.is_scratch = is_scratch;
        }
        Ok(())
    }

    /// Erases `id` and re-formats it with a bumped `seq` as the new
    /// scratch area (spec §4.H step 3).
    pub fn reformat_as_scratch<Med: FlashMedium>(
        &mut self,
        medium: &mut Med,
        id: AreaId,
    ) -> Result<(), FfsError> {
        let (length, seq) = {
            let area = self.area_mut(id).ok_or(FfsError::Invalid)?;
            (area.length, area.seq.wrapping_add(1))
        };
        medium.erase(id).map_err(map_err)?;
        let header = codec::encode_area_header(length, seq, true);
        medium.write(id, 0, &header).map_err(map_err)?;
        if let Some(area) = self.area_mut(id) {
            area.cur = AREA_HEADER_SIZE as u32;
            area.seq = seq;
            area.is_scratch = true;
        }
        Ok(())
    }

    /// Reserves `size` bytes directly out of area `id`, regardless of its
    /// scratch flag. Used only by GC to write relocated copies into the
    /// scratch area, which [`Self::reserve_space`] otherwise always skips.
    pub fn reserve_into(&mut self, id: AreaId, size: u32) -> Result<(AreaId, u32), FfsError> {
        let area = self.area_mut(id).ok_or(FfsError::Invalid)?;
        if area.free_space() < size {
            return Err(FfsError::NotEnoughSpace);
        }
        let offset = area.cur;
        area.cur += size;
        Ok((area.id, offset))
    }

    pub fn reset_cur(&mut self, id: AreaId, cur: u32) {
        if let Some(area) = self.area_mut(id) {
            area.cur = cur;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::medium::RamMedium;

    fn descs() -> [AreaDescriptor; 3] {
        [
            AreaDescriptor { id: 0, offset: 0, length: 1024 },
            AreaDescriptor { id: 1, offset: 1024, length: 1024 },
            AreaDescriptor { id: 2, offset: 2048, length: 1024 },
        ]
    }

    #[test]
    fn format_marks_exactly_one_scratch() {
        let mut medium = RamMedium::new(&[1024, 1024, 1024]);
        let mgr = AreaManager::format(&mut medium, &descs(), 2).unwrap();
        assert_eq!(mgr.scratch_id(), Some(2));
        assert_eq!(mgr.areas().iter().filter(|a| a.is_scratch).count(), 1);
    }

    #[test]
    fn reserve_space_skips_scratch_and_full_areas() {
        let mut medium = RamMedium::new(&[1024, 1024, 1024]);
        let mut mgr = AreaManager::format(&mut medium, &descs(), 2).unwrap();
        let (area, offset) = mgr.reserve_space(100).unwrap();
        assert_eq!(area, 0);
        assert_eq!(offset, AREA_HEADER_SIZE as u32);
        mgr.reset_cur(0, 1024); // fill area 0
        let (area, _) = mgr.reserve_space(100).unwrap();
        assert_eq!(area, 1);
    }

    #[test]
    fn reserve_space_exhausted_is_not_enough_space() {
        let mut medium = RamMedium::new(&[32, 32]);
        let mut mgr = AreaManager::format(
            &mut medium,
            &[
                AreaDescriptor { id: 0, offset: 0, length: 32 },
                AreaDescriptor { id: 1, offset: 32, length: 32 },
            ],
            1,
        )
        .unwrap();
        assert_eq!(
            mgr.reserve_space(1000).unwrap_err(),
            FfsError::NotEnoughSpace
        );
    }
}
