//! Exit-code behavior of the `par` binary on real files.

use std::path::Path;
use std::process::Command;

fn par() -> Command {
    Command::new(env!("CARGO_BIN_EXE_par"))
}

fn write_patterned(path: &Path, len: usize, seed: u8) {
    let data: Vec<u8> = (0..len).map(|i| (i as u8).wrapping_mul(13) ^ seed).collect();
    std::fs::write(path, data).unwrap();
}

#[test]
fn create_verify_repair_cycle_par2() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.dat");
    let b = dir.path().join("b.dat");
    write_patterned(&a, 5000, 1);
    write_patterned(&b, 2500, 2);
    let index = dir.path().join("x.par2");

    let status = par()
        .args(["create", "-s", "2000", "-c", "3"])
        .arg(&index)
        .arg(&a)
        .arg(&b)
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(0));
    assert!(index.exists());

    let status = par().arg("verify").arg(&index).status().unwrap();
    assert_eq!(status.code(), Some(0), "clean set verifies clean");

    std::fs::remove_file(&b).unwrap();
    let status = par().arg("verify").arg(&index).status().unwrap();
    assert_eq!(status.code(), Some(1), "repairable damage exits 1");

    let status = par().arg("repair").arg(&index).status().unwrap();
    assert_eq!(status.code(), Some(0), "repair succeeds");
    assert!(b.exists());

    let status = par().arg("verify").arg(&index).status().unwrap();
    assert_eq!(status.code(), Some(0), "repaired set verifies clean");
}

#[test]
fn unrepairable_damage_exits_2() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.dat");
    let b = dir.path().join("b.dat");
    write_patterned(&a, 16, 1);
    write_patterned(&b, 16, 2);
    let index = dir.path().join("x.par2");

    let status = par()
        .args(["create", "-s", "4", "-c", "3"])
        .arg(&index)
        .arg(&a)
        .arg(&b)
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(0));

    // Eight slices gone, three recovery slices available.
    std::fs::remove_file(&a).unwrap();
    std::fs::remove_file(&b).unwrap();

    let status = par().arg("verify").arg(&index).status().unwrap();
    assert_eq!(status.code(), Some(2));

    let status = par().arg("repair").arg(&index).status().unwrap();
    assert_eq!(status.code(), Some(2));
}

#[test]
fn par1_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.dat");
    let b = dir.path().join("b.dat");
    write_patterned(&a, 100, 3);
    write_patterned(&b, 80, 4);
    let index = dir.path().join("set.par");

    let status = par()
        .args(["create", "-c", "2"])
        .arg(&index)
        .arg(&a)
        .arg(&b)
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(0));
    assert!(dir.path().join("set.p01").exists());
    assert!(dir.path().join("set.p02").exists());

    std::fs::remove_file(&a).unwrap();
    let status = par().arg("verify").arg(&index).status().unwrap();
    assert_eq!(status.code(), Some(1));

    let status = par().arg("repair").arg(&index).status().unwrap();
    assert_eq!(status.code(), Some(0));

    let restored = std::fs::read(&a).unwrap();
    let expected: Vec<u8> = (0..100).map(|i| (i as u8).wrapping_mul(13) ^ 3).collect();
    assert_eq!(restored, expected);
}

#[test]
fn bad_arguments_exit_3() {
    let status = par()
        .args(["create", "-s", "1001"]) // not a multiple of 4
        .arg("x.par2")
        .arg("missing.dat")
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(3));

    let status = par().arg("frobnicate").status().unwrap();
    assert_eq!(status.code(), Some(3));
}

#[test]
fn missing_data_file_exits_6() {
    let dir = tempfile::tempdir().unwrap();
    let index = dir.path().join("x.par2");
    let status = par()
        .args(["create", "-c", "1"])
        .arg(&index)
        .arg(dir.path().join("no-such-file.dat"))
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(6));
}
