//! End-to-end scenarios against the public `Mount` API, covering the
//! concrete scenarios enumerated for this filesystem: basic round-trip,
//! multi-block seek, cross-directory rename, GC-triggering fill, power-
//! loss truncation fuzzing, and bulk create/unlink.

use ffs::medium::RamMedium;
use ffs::{path, AreaDescriptor, FfsError, Mount, OpenFlags};
use rand::Rng;

fn descs(n: usize, area_len: u32) -> Vec<AreaDescriptor> {
    (0..n)
        .map(|i| AreaDescriptor {
            id: i as u16,
            offset: i as u32 * area_len,
            length: area_len,
        })
        .collect()
}

#[test]
fn scenario_1_basic_write_read_and_remount() {
    let lengths = [16384u32, 16384, 16384, 16384, 16384];
    let medium = RamMedium::new(&lengths);
    let descs = descs(5, 16384);
    let mut mount = Mount::format(medium, &descs, 4).unwrap();

    let f = mount.open(b"/a", OpenFlags::WRITE).unwrap();
    let payload = [0x5Au8; 2048];
    assert_eq!(mount.write(f, &payload).unwrap(), 2048);
    mount.close(f).unwrap();

    let medium = mount.into_medium();
    let mut mount2 = ffs::restore(medium, &descs).unwrap();
    let handle = path::resolve(&mount2, b"/a").unwrap().inode.unwrap();
    assert_eq!(mount2.inode(handle).unwrap().data_len(), 2048);

    let fh = mount2.open(b"/a", OpenFlags::READ).unwrap();
    let mut out = [0u8; 2048];
    assert_eq!(mount2.read(fh, &mut out).unwrap(), 2048);
    assert!(out.iter().all(|&b| b == 0x5A));
}

#[test]
fn scenario_2_large_write_seek_partial_read() {
    let medium = RamMedium::new(&[16384, 16384]);
    let descs = descs(2, 16384);
    let mut mount = Mount::format(medium, &descs, 1).unwrap();

    let f = mount.open(b"/big", OpenFlags::WRITE).unwrap();
    let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
    mount.write(f, &payload).unwrap();
    mount.close(f).unwrap();

    let f2 = mount.open(b"/big", OpenFlags::READ).unwrap();
    mount.seek(f2, 5000).unwrap();
    let mut out = [0u8; 100];
    mount.read(f2, &mut out).unwrap();
    assert_eq!(out, payload[5000..5100]);
}

#[test]
fn scenario_3_cross_directory_rename_survives_remount() {
    let medium = RamMedium::new(&[8192, 8192, 8192]);
    let descs = descs(3, 8192);
    let mut mount = Mount::format(medium, &descs, 2).unwrap();

    path::mkdir(&mut mount, b"/d1").unwrap();
    path::mkdir(&mut mount, b"/d1/x").unwrap();
    path::mkdir(&mut mount, b"/d1/y").unwrap();
    path::mkdir(&mut mount, b"/d2").unwrap();
    path::rename(&mut mount, b"/d1/x", b"/d2/z").unwrap();

    let medium = mount.into_medium();
    let mount2 = ffs::restore(medium, &descs).unwrap();
    assert!(path::resolve(&mount2, b"/d2/z").unwrap().inode.is_some());
    assert!(path::resolve(&mount2, b"/d1/x").unwrap().inode.is_none());
    assert!(path::resolve(&mount2, b"/d1/y").unwrap().inode.is_some());
}

#[test]
fn scenario_4_fill_triggers_gc_and_tree_survives_remount() {
    let medium = RamMedium::new(&[2048, 2048, 2048]);
    let descs = descs(3, 2048);
    let mut mount = Mount::format(medium, &descs, 2).unwrap();

    for i in 0..60 {
        path::mkdir(&mut mount, format!("/f{i}").as_bytes())
            .expect("mkdir should succeed even once gc is required");
    }

    let medium = mount.into_medium();
    let mount2 = ffs::restore(medium, &descs).unwrap();
    for i in 0..60 {
        assert!(
            path::resolve(&mount2, format!("/f{i}").as_bytes()).unwrap().inode.is_some(),
            "f{i} missing after gc + remount"
        );
    }
}

#[test]
fn scenario_5_power_loss_truncation_at_every_point_leaves_a_valid_prefix_or_nothing() {
    let mut rng = rand::thread_rng();
    let area_lengths = [8192u32, 8192];
    let descs = descs(2, 8192);
    let payload: Vec<u8> = (0..1500).map(|_| rng.gen()).collect();

    // 4096 bytes comfortably covers formatting both areas plus writing
    // one small file; sweep every truncation point up to there.
    for truncate_at in (0..4096u64).step_by(37) {
        let mut medium = RamMedium::new(&area_lengths);
        medium.truncate_after(truncate_at);
        // truncate_after also applies to Mount::format's own header writes;
        // a medium too damaged to even format is reported, not panicked on.
        let Ok(mut mount) = Mount::format(medium, &descs, 1) else {
            continue;
        };
        let open_result = mount.open(b"/a", OpenFlags::WRITE);
        let Ok(f) = open_result else { continue };
        let _ = mount.write(f, &payload);
        let _ = mount.close(f);

        let medium = mount.into_medium();
        let restored = ffs::restore(medium, &descs).expect("restore must never fail, even on a torn write");
        match path::resolve(&restored, b"/a") {
            Ok(r) => {
                if let Some(handle) = r.inode {
                    let len = restored.inode(handle).unwrap().data_len() as usize;
                    assert!(len <= payload.len());
                }
            }
            Err(e) => assert_eq!(e, FfsError::NotFound),
        }
    }
}

#[test]
fn scenario_6_bulk_create_then_unlink_every_other_then_remount() {
    let medium = RamMedium::new(&[16384, 16384, 16384]);
    let descs = descs(3, 16384);
    let mut mount = Mount::format(medium, &descs, 2).unwrap();

    for i in 0..50 {
        path::mkdir(&mut mount, format!("/n{i}").as_bytes()).unwrap();
    }
    for i in (0..50).step_by(2) {
        path::unlink(&mut mount, format!("/n{i}").as_bytes()).unwrap();
    }

    let medium = mount.into_medium();
    let mount2 = ffs::restore(medium, &descs).unwrap();
    for i in 0..50 {
        let exists = path::resolve(&mount2, format!("/n{i}").as_bytes()).unwrap().inode.is_some();
        assert_eq!(exists, i % 2 == 1, "n{i} survival mismatch");
    }
}
