//! Path resolver (component F): tokenizes `/`-separated paths and walks
//! the in-RAM tree built by [`crate::object`], grounded on the teacher's
//! own path-walk shape in `ext2`'s directory lookup but built against a
//! handle-based tree instead of block-cached directory pages.

use crate::constants::{InodeFlags, SHORT_FILENAME_LEN};
use crate::error::FfsError;
use crate::hash::ObjectRef;
use crate::medium::FlashMedium;
use crate::mount::Mount;
use crate::object::{Inode, Payload};
use crate::pool::Handle;
use alloc::vec::Vec;

/// Splits a path into components, rejecting any component longer than
/// [`SHORT_FILENAME_LEN`] (spec §4.F). Repeated or leading/trailing `/`
/// collapse away, same as a conventional path parser: `"/a//b/"` and
/// `"a/b"` tokenize identically.
fn split_components(path: &[u8]) -> Result<Vec<&[u8]>, FfsError> {
    let mut out = Vec::new();
    for part in path.split(|&b| b == b'/') {
        if part.is_empty() {
            continue;
        }
        if part.len() > SHORT_FILENAME_LEN {
            return Err(FfsError::Invalid);
        }
        out.push(part);
    }
    Ok(out)
}

fn find_child<Med: FlashMedium>(mount: &Mount<Med>, parent: Handle, name: &[u8]) -> Option<Handle> {
    let inode = mount.inode(parent)?;
    let Payload::Directory { children } = &inode.payload else {
        return None;
    };
    children.iter().copied().find(|&h| {
        mount
            .inode(h)
            .is_some_and(|child| !child.is_deleted() && child.filename() == name)
    })
}

/// Outcome of resolving a path: the named object if it exists, the
/// directory that contains (or would contain) it, and the leaf component
/// name — callers that create objects (mkdir, open-for-write) need the
/// name even when `inode` is `None`.
pub struct Resolved {
    pub inode: Option<Handle>,
    pub parent: Handle,
    pub name: [u8; SHORT_FILENAME_LEN],
    pub name_len: u8,
}

/// Walks `path` from the root (spec §4.F). A missing leaf is not an
/// error: `inode` comes back `None` with `parent` set to the directory
/// that would hold it, so `open(..., WRITE)` can create on the spot. A
/// non-directory in the interior of the path is [`FfsError::NotADirectory`].
pub fn resolve<Med: FlashMedium>(mount: &Mount<Med>, path: &[u8]) -> Result<Resolved, FfsError> {
    let comps = split_components(path)?;
    if comps.is_empty() {
        return Ok(Resolved {
            inode: Some(mount.root()),
            parent: mount.root(),
            name: [0; SHORT_FILENAME_LEN],
            name_len: 0,
        });
    }
    let mut cur = mount.root();
    let last = comps.len() - 1;
    for (i, comp) in comps.iter().enumerate() {
        let cur_inode = mount.inode(cur).ok_or(FfsError::Unexpected)?;
        if !cur_inode.is_directory() {
            return Err(FfsError::NotADirectory);
        }
        if i == last {
            let mut name = [0u8; SHORT_FILENAME_LEN];
            name[..comp.len()].copy_from_slice(comp);
            return Ok(Resolved {
                inode: find_child(mount, cur, comp),
                parent: cur,
                name,
                name_len: comp.len() as u8,
            });
        }
        cur = find_child(mount, cur, comp).ok_or(FfsError::NotFound)?;
    }
    unreachable!("comps is non-empty so the loop always returns on the last component")
}

pub(crate) fn add_child<Med: FlashMedium>(
    mount: &mut Mount<Med>,
    parent: Handle,
    child: Handle,
) -> Result<(), FfsError> {
    match &mut mount.inode_mut(parent).ok_or(FfsError::Unexpected)?.payload {
        Payload::Directory { children } => {
            children.push(child);
            Ok(())
        }
        Payload::File { .. } => Err(FfsError::NotADirectory),
    }
}

pub(crate) fn remove_child<Med: FlashMedium>(
    mount: &mut Mount<Med>,
    parent: Handle,
    child: Handle,
) -> Result<(), FfsError> {
    match &mut mount.inode_mut(parent).ok_or(FfsError::Unexpected)?.payload {
        Payload::Directory { children } => {
            children.retain(|&h| h != child);
            Ok(())
        }
        Payload::File { .. } => Err(FfsError::Unexpected),
    }
}

/// Frees an inode's pool slot and hash entry and, for a file, every block
/// it still owns (component E `dec_refcnt`). Called once an unlinked
/// inode's refcnt reaches zero.
pub(crate) fn free_inode<Med: FlashMedium>(mount: &mut Mount<Med>, handle: Handle) -> Result<(), FfsError> {
    let inode = mount.inodes.free(handle).ok_or(FfsError::Unexpected)?;
    mount.hash.remove(inode.id);
    if let Payload::File { blocks, .. } = inode.payload {
        for block_handle in blocks {
            if let Some(block) = mount.block(block_handle) {
                mount.hash.remove(block.id);
            }
            mount.blocks.free(block_handle);
        }
    }
    Ok(())
}

/// Creates a new, empty directory at `path` (component F `new_dir`).
pub fn mkdir<Med: FlashMedium>(mount: &mut Mount<Med>, path: &[u8]) -> Result<Handle, FfsError> {
    let resolved = resolve(mount, path)?;
    if resolved.inode.is_some() {
        return Err(FfsError::Exists);
    }
    if resolved.name_len == 0 {
        return Err(FfsError::Invalid);
    }
    let parent_id = mount.inode(resolved.parent).ok_or(FfsError::Unexpected)?.id;
    let id = mount.alloc_id();
    let name = &resolved.name[..resolved.name_len as usize];
    let (area_id, offset) = mount.write_inode_record(id, 0, parent_id, InodeFlags::DIRECTORY, name)?;
    let inode = Inode {
        id,
        seq: 0,
        area_id,
        offset,
        parent_id,
        flags: InodeFlags::DIRECTORY,
        filename: resolved.name,
        filename_len: resolved.name_len,
        // Directories are never opened through the file API (component I
        // rejects them with `IsADirectory`), so refcnt — the open-handle
        // count — sits at 0 for their whole lifetime, same as a freshly
        // created file before its first `open`.
        refcnt: 0,
        payload: Payload::Directory { children: Vec::new() },
    };
    let handle = mount.inodes.alloc(inode)?;
    mount.hash.insert(id, ObjectRef::Inode(handle));
    if let Err(e) = add_child(mount, resolved.parent, handle) {
        mount.inodes.free(handle);
        mount.hash.remove(id);
        return Err(e);
    }
    Ok(handle)
}

/// Removes the object at `path` (component F `unlink`). A non-empty
/// directory cannot be unlinked. RAM detach and the on-disk tombstone are
/// both always performed, detach first, matching `delete_from_ram` /
/// `delete_from_disk`'s crash-safe ordering (spec §4.E).
///
/// `refcnt` counts open file handles, not tree references, so unlink never
/// touches it directly: an inode with outstanding handles must survive as
/// a tombstone until its last [`crate::file`] `close` (spec §3's lifecycle
/// note), and `close` is the only thing that ever decrements `refcnt`. An
/// inode with no open handles (`refcnt == 0`, the common case for
/// directories, which are never opened) is freed here immediately.
pub fn unlink<Med: FlashMedium>(mount: &mut Mount<Med>, path: &[u8]) -> Result<(), FfsError> {
    let resolved = resolve(mount, path)?;
    let handle = resolved.inode.ok_or(FfsError::NotFound)?;
    let (id, seq, parent_id, flags, filename, filename_len) = {
        let inode = mount.inode(handle).ok_or(FfsError::Unexpected)?;
        if let Payload::Directory { children } = &inode.payload {
            if !children.is_empty() {
                return Err(FfsError::IsADirectory);
            }
        }
        (
            inode.id,
            inode.seq,
            inode.parent_id,
            inode.flags,
            inode.filename,
            inode.filename_len,
        )
    };
    let new_seq = seq + 1;
    let new_flags = flags | InodeFlags::DELETED;
    mount.write_inode_record(id, new_seq, parent_id, new_flags, &filename[..filename_len as usize])?;

    remove_child(mount, resolved.parent, handle)?;
    let refcnt_is_zero = {
        let inode = mount.inode_mut(handle).ok_or(FfsError::Unexpected)?;
        inode.seq = new_seq;
        inode.flags |= InodeFlags::DELETED;
        inode.refcnt == 0
    };
    if refcnt_is_zero {
        free_inode(mount, handle)?;
    }
    Ok(())
}

/// Moves `from` to `to`, possibly across directories (component F
/// `rename`): destination's parent must exist and hold no child of that
/// name already.
pub fn rename<Med: FlashMedium>(mount: &mut Mount<Med>, from: &[u8], to: &[u8]) -> Result<(), FfsError> {
    let src = resolve(mount, from)?;
    let src_handle = src.inode.ok_or(FfsError::NotFound)?;
    let dst = resolve(mount, to)?;
    if dst.inode.is_some() {
        return Err(FfsError::Exists);
    }
    if dst.name_len == 0 {
        return Err(FfsError::Invalid);
    }

    let (id, old_seq, flags) = {
        let inode = mount.inode(src_handle).ok_or(FfsError::Unexpected)?;
        (inode.id, inode.seq, inode.flags)
    };
    let new_parent_id = mount.inode(dst.parent).ok_or(FfsError::Unexpected)?.id;
    let new_seq = old_seq + 1;
    let name = &dst.name[..dst.name_len as usize];
    let (area_id, offset) = mount.write_inode_record(id, new_seq, new_parent_id, flags, name)?;

    remove_child(mount, src.parent, src_handle)?;
    {
        let inode = mount.inode_mut(src_handle).ok_or(FfsError::Unexpected)?;
        inode.seq = new_seq;
        inode.area_id = area_id;
        inode.offset = offset;
        inode.parent_id = new_parent_id;
        inode.filename = dst.name;
        inode.filename_len = dst.name_len;
    }
    add_child(mount, dst.parent, src_handle)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::area::AreaDescriptor;
    use crate::medium::RamMedium;

    fn fresh_mount() -> Mount<RamMedium> {
        let medium = RamMedium::new(&[4096, 4096]);
        let descs = [
            AreaDescriptor { id: 0, offset: 0, length: 4096 },
            AreaDescriptor { id: 1, offset: 4096, length: 4096 },
        ];
        Mount::format(medium, &descs, 1).unwrap()
    }

    #[test]
    fn resolve_root_returns_root_as_both_inode_and_parent() {
        let mount = fresh_mount();
        let r = resolve(&mount, b"/").unwrap();
        assert_eq!(r.inode, Some(mount.root()));
        assert_eq!(r.parent, mount.root());
    }

    #[test]
    fn mkdir_then_resolve_finds_it() {
        let mut mount = fresh_mount();
        let dir = mkdir(&mut mount, b"/etc").unwrap();
        let r = resolve(&mount, b"/etc").unwrap();
        assert_eq!(r.inode, Some(dir));
        assert!(mkdir(&mut mount, b"/etc").is_err());
    }

    #[test]
    fn mkdir_missing_parent_is_not_found() {
        let mut mount = fresh_mount();
        assert_eq!(
            mkdir(&mut mount, b"/a/b").unwrap_err(),
            FfsError::NotFound
        );
    }

    #[test]
    fn descending_through_a_file_is_not_a_directory() {
        let mut mount = fresh_mount();
        let id = mount.alloc_id();
        let (area_id, offset) = mount
            .write_inode_record(id, 0, 0, InodeFlags::empty(), b"f")
            .unwrap();
        let inode = Inode {
            id,
            seq: 0,
            area_id,
            offset,
            parent_id: 0,
            flags: InodeFlags::empty(),
            filename: {
                let mut n = [0u8; SHORT_FILENAME_LEN];
                n[0] = b'f';
                n
            },
            filename_len: 1,
            refcnt: 1,
            payload: Payload::File { blocks: Vec::new(), data_len: 0 },
        };
        let h = mount.inodes.alloc(inode).unwrap();
        mount.hash.insert(id, ObjectRef::Inode(h));
        add_child(&mut mount, mount.root(), h).unwrap();
        assert_eq!(
            resolve(&mount, b"/f/x").unwrap_err(),
            FfsError::NotADirectory
        );
    }

    #[test]
    fn rename_moves_across_directories() {
        let mut mount = fresh_mount();
        mkdir(&mut mount, b"/d1").unwrap();
        mkdir(&mut mount, b"/d2").unwrap();
        let x = mkdir(&mut mount, b"/d1/x").unwrap();
        rename(&mut mount, b"/d1/x", b"/d2/z").unwrap();
        assert!(resolve(&mut mount, b"/d1/x").unwrap().inode.is_none());
        assert_eq!(resolve(&mount, b"/d2/z").unwrap().inode, Some(x));
    }

    #[test]
    fn unlink_removes_empty_directory_and_frees_it() {
        let mut mount = fresh_mount();
        mkdir(&mut mount, b"/d").unwrap();
        unlink(&mut mount, b"/d").unwrap();
        assert!(resolve(&mount, b"/d").unwrap().inode.is_none());
    }

    #[test]
    fn unlink_non_empty_directory_fails() {
        let mut mount = fresh_mount();
        mkdir(&mut mount, b"/d").unwrap();
        mkdir(&mut mount, b"/d/x").unwrap();
        assert_eq!(unlink(&mut mount, b"/d").unwrap_err(), FfsError::IsADirectory);
    }

    #[test]
    fn component_over_16_bytes_is_invalid() {
        let mount = fresh_mount();
        assert_eq!(
            resolve(&mount, b"/this_name_is_way_too_long").unwrap_err(),
            FfsError::Invalid
        );
    }
}
