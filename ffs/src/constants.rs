//! Layout constants fixed by the on-disk format (spec §6).

/// Sentinel id meaning "no object" (the parent of the root inode).
pub const ID_NONE: u32 = 0xFFFF_FFFF;

/// Logical area id written into an object's context to mark it as living in
/// the scratch area.
pub const AREA_ID_SCRATCH: u16 = 0xFFFF;

/// Byte offset of the `is_scratch` flag within a serialized area header, so
/// a post-GC patch can flip it without rewriting the whole header.
pub const AREA_OFFSET_IS_SCRATCH: usize = 23;

pub const AREA_MAGIC: [u32; 4] = [0xb98a31e2, 0x7fb0428c, 0xace08253, 0xb185fc8e];
pub const BLOCK_MAGIC: u32 = 0x53ba23b9;
pub const INODE_MAGIC: u32 = 0x925f8bc0;

pub const SHORT_FILENAME_LEN: usize = 16;

pub const BLOCK_SIZE: usize = 512;

/// `disk_block` header size: magic+id+seq+rank+inode_id+reserved16+flags+data_len+ecc.
pub const BLOCK_HEADER_SIZE: usize = 4 + 4 + 4 + 4 + 4 + 2 + 2 + 2 + 4;
pub const BLOCK_DATA_LEN: usize = BLOCK_SIZE - BLOCK_HEADER_SIZE;

/// `disk_inode` header size: magic+id+seq+parent_id+flags+filename_len+ecc.
pub const INODE_HEADER_SIZE: usize = 4 + 4 + 4 + 4 + 2 + 1 + 4;

/// `disk_area` header size: 4 magics + length + reserved16 + seq + is_scratch.
pub const AREA_HEADER_SIZE: usize = 4 * 4 + 4 + 2 + 1 + 1;

pub const HASH_SIZE: usize = 256;
pub const MAX_AREAS: usize = 32;
pub const BLOCK_MAX_DATA_SZ: usize = 2048;

bitflags::bitflags! {
    /// `fdi_flags` bits on a disk/in-RAM inode.
    pub struct InodeFlags: u16 {
        const DELETED   = 0x01;
        const DUMMY     = 0x02;
        const DIRECTORY = 0x04;
        const TEST      = 0x80;
    }
}

bitflags::bitflags! {
    /// `fdb_flags` bits on a disk/in-RAM block.
    pub struct BlockFlags: u16 {
        const DELETED = 0x01;
    }
}
