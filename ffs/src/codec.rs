//! Disk codec (component C): encodes and decodes the three on-disk record
//! kinds with magic-first framing so a scanner can cheaply resync, and a
//! CRC-32 "ecc" field covering the fixed header that precedes the
//! variable-length tail. `dvida_serialize` provides the little-endian
//! primitive (de)serialization; the teacher's own `#[derive(DvDeSer)]` is
//! an unfinished stub (see DESIGN.md), so each record is encoded/decoded
//! by hand field-by-field, the same way the teacher hand-writes
//! `ext2::DirEntry`'s (de)serialization for its variable-length tail.

use crate::constants::*;
use crate::crc::crc32;
use alloc::vec::Vec;
use dvida_serialize::{DvDeserialize, DvSerialize, Endianness};

const LE: Endianness = Endianness::Little;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Not enough bytes remained in the area to hold even a header.
    Truncated,
    /// The magic matched but the payload failed CRC validation.
    ChecksumMismatch,
}

fn put_u32(buf: &mut Vec<u8>, v: u32) {
    let mut tmp = [0u8; 4];
    v.serialize(LE, &mut tmp).unwrap();
    buf.extend_from_slice(&tmp);
}

fn put_u16(buf: &mut Vec<u8>, v: u16) {
    let mut tmp = [0u8; 2];
    v.serialize(LE, &mut tmp).unwrap();
    buf.extend_from_slice(&tmp);
}

fn get_u32(bytes: &[u8]) -> u32 {
    u32::deserialize(LE, bytes).unwrap().0
}

fn get_u16(bytes: &[u8]) -> u16 {
    u16::deserialize(LE, bytes).unwrap().0
}

// ---------------------------------------------------------------- area ---

pub struct AreaHeaderInfo {
    pub length: u32,
    pub seq: u8,
    pub is_scratch: bool,
}

/// Encodes a `disk_area` header. `is_scratch` lands at a fixed byte offset
/// (`AREA_OFFSET_IS_SCRATCH`) so GC can flip it later with a single-byte
/// patch write instead of re-encoding the whole header.
pub fn encode_area_header(length: u32, seq: u8, is_scratch: bool) -> [u8; AREA_HEADER_SIZE] {
    let mut buf = Vec::with_capacity(AREA_HEADER_SIZE);
    for m in AREA_MAGIC {
        put_u32(&mut buf, m);
    }
    put_u32(&mut buf, length);
    put_u16(&mut buf, 0); // reserved16
    buf.push(seq);
    buf.push(is_scratch as u8);
    debug_assert_eq!(buf.len(), AREA_HEADER_SIZE);
    debug_assert_eq!(AREA_OFFSET_IS_SCRATCH, buf.len() - 1);
    let mut out = [0u8; AREA_HEADER_SIZE];
    out.copy_from_slice(&buf);
    out
}

pub fn decode_area_header(bytes: &[u8]) -> Result<AreaHeaderInfo, DecodeError> {
    if bytes.len() < AREA_HEADER_SIZE {
        return Err(DecodeError::Truncated);
    }
    for (i, &want) in AREA_MAGIC.iter().enumerate() {
        if get_u32(&bytes[i * 4..]) != want {
            return Err(DecodeError::ChecksumMismatch);
        }
    }
    let length = get_u32(&bytes[16..]);
    let seq = bytes[22];
    let is_scratch = bytes[AREA_OFFSET_IS_SCRATCH] != 0;
    Ok(AreaHeaderInfo {
        length,
        seq,
        is_scratch,
    })
}

// --------------------------------------------------------------- inode ---

pub struct DecodedInode {
    pub id: u32,
    pub seq: u32,
    pub parent_id: u32,
    pub flags: InodeFlags,
    pub filename: [u8; SHORT_FILENAME_LEN],
    pub filename_len: u8,
}

pub fn encode_inode(
    id: u32,
    seq: u32,
    parent_id: u32,
    flags: InodeFlags,
    filename: &[u8],
) -> Result<Vec<u8>, DecodeError> {
    if filename.len() > SHORT_FILENAME_LEN {
        return Err(DecodeError::ChecksumMismatch);
    }
    let mut header = Vec::with_capacity(INODE_HEADER_SIZE);
    put_u32(&mut header, INODE_MAGIC);
    put_u32(&mut header, id);
    put_u32(&mut header, seq);
    put_u32(&mut header, parent_id);
    put_u16(&mut header, flags.bits());
    header.push(filename.len() as u8);
    let ecc = crc32(&header);
    put_u32(&mut header, ecc);
    debug_assert_eq!(header.len(), INODE_HEADER_SIZE);
    let mut out = header;
    out.extend_from_slice(filename);
    Ok(out)
}

/// Returns the decoded record and the total on-disk size it occupied, or
/// `None` if `bytes` doesn't start with the inode magic at all (the caller
/// should try the block magic, or treat this as end-of-log).
pub fn decode_inode(bytes: &[u8]) -> Option<Result<(DecodedInode, usize), DecodeError>> {
    if bytes.len() < 4 || get_u32(bytes) != INODE_MAGIC {
        return None;
    }
    if bytes.len() < INODE_HEADER_SIZE {
        return Some(Err(DecodeError::Truncated));
    }
    let id = get_u32(&bytes[4..]);
    let seq = get_u32(&bytes[8..]);
    let parent_id = get_u32(&bytes[12..]);
    let flags_bits = get_u16(&bytes[16..]);
    let filename_len = bytes[18];
    let ecc = get_u32(&bytes[19..]);
    let expected = crc32(&bytes[..INODE_HEADER_SIZE - 4]);
    if ecc != expected {
        return Some(Err(DecodeError::ChecksumMismatch));
    }
    let total = INODE_HEADER_SIZE + filename_len as usize;
    if bytes.len() < total || filename_len as usize > SHORT_FILENAME_LEN {
        return Some(Err(DecodeError::Truncated));
    }
    let mut filename = [0u8; SHORT_FILENAME_LEN];
    filename[..filename_len as usize]
        .copy_from_slice(&bytes[INODE_HEADER_SIZE..total]);
    Some(Ok((
        DecodedInode {
            id,
            seq,
            parent_id,
            flags: InodeFlags::from_bits_truncate(flags_bits),
            filename,
            filename_len,
        },
        total,
    )))
}

// --------------------------------------------------------------- block ---

pub struct DecodedBlock {
    pub id: u32,
    pub seq: u32,
    pub rank: u32,
    pub inode_id: u32,
    pub flags: BlockFlags,
    pub data_len: u16,
    pub data: Vec<u8>,
}

pub fn encode_block(
    id: u32,
    seq: u32,
    rank: u32,
    inode_id: u32,
    flags: BlockFlags,
    data: &[u8],
) -> Result<Vec<u8>, DecodeError> {
    if data.len() > BLOCK_MAX_DATA_SZ {
        return Err(DecodeError::ChecksumMismatch);
    }
    let mut header = Vec::with_capacity(BLOCK_HEADER_SIZE);
    put_u32(&mut header, BLOCK_MAGIC);
    put_u32(&mut header, id);
    put_u32(&mut header, seq);
    put_u32(&mut header, rank);
    put_u32(&mut header, inode_id);
    put_u16(&mut header, 0); // reserved16
    put_u16(&mut header, flags.bits());
    put_u16(&mut header, data.len() as u16);
    let ecc = crc32(&header);
    put_u32(&mut header, ecc);
    debug_assert_eq!(header.len(), BLOCK_HEADER_SIZE);
    let mut out = header;
    out.extend_from_slice(data);
    Ok(out)
}

pub fn decode_block(bytes: &[u8]) -> Option<Result<(DecodedBlock, usize), DecodeError>> {
    if bytes.len() < 4 || get_u32(bytes) != BLOCK_MAGIC {
        return None;
    }
    if bytes.len() < BLOCK_HEADER_SIZE {
        return Some(Err(DecodeError::Truncated));
    }
    let id = get_u32(&bytes[4..]);
    let seq = get_u32(&bytes[8..]);
    let rank = get_u32(&bytes[12..]);
    let inode_id = get_u32(&bytes[16..]);
    let flags_bits = get_u16(&bytes[22..]);
    let data_len = get_u16(&bytes[24..]);
    let ecc = get_u32(&bytes[26..]);
    let expected = crc32(&bytes[..BLOCK_HEADER_SIZE - 4]);
    if ecc != expected {
        return Some(Err(DecodeError::ChecksumMismatch));
    }
    let total = BLOCK_HEADER_SIZE + data_len as usize;
    if bytes.len() < total {
        return Some(Err(DecodeError::Truncated));
    }
    Some(Ok((
        DecodedBlock {
            id,
            seq,
            rank,
            inode_id,
            flags: BlockFlags::from_bits_truncate(flags_bits),
            data_len,
            data: bytes[BLOCK_HEADER_SIZE..total].to_vec(),
        },
        total,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn area_header_round_trip() {
        let encoded = encode_area_header(16384, 3, true);
        let info = decode_area_header(&encoded).unwrap();
        assert_eq!(info.length, 16384);
        assert_eq!(info.seq, 3);
        assert!(info.is_scratch);
        assert_eq!(encoded[AREA_OFFSET_IS_SCRATCH], 1);
    }

    #[test]
    fn area_header_rejects_bad_magic() {
        let mut encoded = encode_area_header(16384, 3, false);
        encoded[0] ^= 0xff;
        assert_eq!(
            decode_area_header(&encoded).unwrap_err(),
            DecodeError::ChecksumMismatch
        );
    }

    #[test]
    fn inode_round_trip() {
        let bytes = encode_inode(7, 2, ID_NONE, InodeFlags::DIRECTORY, b"etc").unwrap();
        let (decoded, size) = decode_inode(&bytes).unwrap().unwrap();
        assert_eq!(size, bytes.len());
        assert_eq!(decoded.id, 7);
        assert_eq!(decoded.seq, 2);
        assert_eq!(decoded.parent_id, ID_NONE);
        assert_eq!(decoded.flags, InodeFlags::DIRECTORY);
        assert_eq!(&decoded.filename[..decoded.filename_len as usize], b"etc");
    }

    #[test]
    fn inode_rejects_corrupted_header() {
        let mut bytes = encode_inode(7, 2, ID_NONE, InodeFlags::empty(), b"a").unwrap();
        bytes[8] ^= 0xff; // corrupt seq
        assert_eq!(
            decode_inode(&bytes).unwrap().unwrap_err(),
            DecodeError::ChecksumMismatch
        );
    }

    #[test]
    fn block_round_trip() {
        let data = [0x5Au8; 64];
        let bytes = encode_block(1, 1, 0, 9, BlockFlags::empty(), &data).unwrap();
        let (decoded, size) = decode_block(&bytes).unwrap().unwrap();
        assert_eq!(size, bytes.len());
        assert_eq!(decoded.inode_id, 9);
        assert_eq!(decoded.data, data);
    }

    #[test]
    fn non_matching_magic_returns_none() {
        let garbage = [0u8; 64];
        assert!(decode_inode(&garbage).is_none());
        assert!(decode_block(&garbage).is_none());
    }
}
