//! Flash I/O adapter (component A).
//!
//! The Core never talks to hardware directly; it is generic over a
//! [`FlashMedium`] that exposes the three primitives a raw flash part
//! actually has: read, write-once-per-location, and full-area erase.
//! `copy` has a default implementation built from `read`+`write` in
//! `BLOCK_SIZE`-sized chunks, matching the "not atomic" contract in spec
//! §4.A: callers only ever copy into the scratch area or an append-only
//! tail, so a torn copy is re-validated rather than relied upon.

use crate::constants::BLOCK_SIZE;
use crate::error::FfsError;
use alloc::vec;

/// A logical, zero-based area id. The Core never interprets this beyond
/// indexing into the area table; physical placement is the medium's job.
pub type AreaId = u16;

pub trait FlashMedium {
    type Error: core::fmt::Debug;

    fn read(&mut self, area: AreaId, offset: u32, buf: &mut [u8]) -> Result<(), Self::Error>;
    fn write(&mut self, area: AreaId, offset: u32, buf: &[u8]) -> Result<(), Self::Error>;
    fn erase(&mut self, area: AreaId) -> Result<(), Self::Error>;

    fn copy(
        &mut self,
        from_area: AreaId,
        from_off: u32,
        to_area: AreaId,
        to_off: u32,
        len: u32,
    ) -> Result<(), Self::Error> {
        let mut remaining = len;
        let mut src = from_off;
        let mut dst = to_off;
        let mut chunk = vec![0u8; BLOCK_SIZE];
        while remaining > 0 {
            let n = core::cmp::min(remaining as usize, chunk.len());
            self.read(from_area, src, &mut chunk[..n])?;
            self.write(to_area, dst, &chunk[..n])?;
            src += n as u32;
            dst += n as u32;
            remaining -= n as u32;
        }
        Ok(())
    }
}

/// Maps any medium-level error onto the one I/O variant the Core surfaces;
/// the underlying cause is still visible to the caller via `log`.
pub(crate) fn map_err<E: core::fmt::Debug>(e: E) -> FfsError {
    log::warn!("flash medium error: {:?}", e);
    FfsError::Io
}

/// An in-memory [`FlashMedium`] used by every test in this crate (component
/// M). Each area is backed by its own `Vec<u8>`. Two failure modes can be
/// injected to drive the power-loss and I/O-error scenarios of spec §8:
///
/// - [`RamMedium::truncate_after`] makes every write past a byte budget
///   silently lose its tail, simulating a crash mid-write.
/// - [`RamMedium::fail_after`] makes every operation past an op budget
///   return an error, simulating a dead flash part.
#[derive(Debug, Clone)]
pub struct RamMedium {
    areas: alloc::vec::Vec<alloc::vec::Vec<u8>>,
    bytes_written: u64,
    truncate_after: Option<u64>,
    ops_done: u64,
    fail_after: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RamMediumError {
    AreaOutOfRange,
    OffsetOutOfRange,
    Injected,
}

impl RamMedium {
    pub fn new(area_lengths: &[u32]) -> Self {
        Self {
            areas: area_lengths.iter().map(|&l| vec![0xffu8; l as usize]).collect(),
            bytes_written: 0,
            truncate_after: None,
            ops_done: 0,
            fail_after: None,
        }
    }

    /// After this many bytes have been written in total, further writes are
    /// silently dropped rather than applied (the destination keeps whatever
    /// it held before, simulating a crash mid-write).
    pub fn truncate_after(&mut self, bytes: u64) {
        self.truncate_after = Some(bytes);
    }

    /// After this many operations (read+write+erase combined) have been
    /// performed, every further operation returns [`RamMediumError::Injected`].
    pub fn fail_after(&mut self, ops: u64) {
        self.fail_after = Some(ops);
    }

    fn check_budget(&mut self) -> Result<(), RamMediumError> {
        self.ops_done += 1;
        if let Some(budget) = self.fail_after
            && self.ops_done > budget
        {
            return Err(RamMediumError::Injected);
        }
        Ok(())
    }

    fn area_mut(&mut self, area: AreaId) -> Result<&mut alloc::vec::Vec<u8>, RamMediumError> {
        self.areas
            .get_mut(area as usize)
            .ok_or(RamMediumError::AreaOutOfRange)
    }
}

impl FlashMedium for RamMedium {
    type Error = RamMediumError;

    fn read(&mut self, area: AreaId, offset: u32, buf: &mut [u8]) -> Result<(), Self::Error> {
        self.check_budget()?;
        let area = self.area_mut(area)?;
        let end = offset as usize + buf.len();
        if end > area.len() {
            return Err(RamMediumError::OffsetOutOfRange);
        }
        buf.copy_from_slice(&area[offset as usize..end]);
        Ok(())
    }

    fn write(&mut self, area: AreaId, offset: u32, buf: &[u8]) -> Result<(), Self::Error> {
        self.check_budget()?;
        let truncate_after = self.truncate_after;
        let bytes_written = self.bytes_written;
        let area_slice = self.area_mut(area)?;
        let end = offset as usize + buf.len();
        if end > area_slice.len() {
            return Err(RamMediumError::OffsetOutOfRange);
        }
        let allowed = match truncate_after {
            Some(budget) if bytes_written >= budget => 0,
            Some(budget) => core::cmp::min(buf.len() as u64, budget - bytes_written) as usize,
            None => buf.len(),
        };
        area_slice[offset as usize..offset as usize + allowed].copy_from_slice(&buf[..allowed]);
        self.bytes_written += allowed as u64;
        Ok(())
    }

    fn erase(&mut self, area: AreaId) -> Result<(), Self::Error> {
        self.check_budget()?;
        let area = self.area_mut(area)?;
        area.fill(0xff);
        Ok(())
    }
}
