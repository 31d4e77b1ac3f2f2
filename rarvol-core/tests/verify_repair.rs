use rand::{rngs::StdRng, Rng, SeedableRng};
use rarvol_core::encode::{Encoder, EncoderConfig};
use rarvol_core::manifest::Manifest;
use rarvol_core::repair::{check_volume, repair_volume};
use rarvol_core::verify::{file_crc32, verify, VolumeStatus};
use rarvol_core::Error;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

fn make_set(dir: &Path) -> PathBuf {
    let mut rng = StdRng::seed_from_u64(99);
    let mut data = vec![0u8; 250_000];
    rng.fill(&mut data[..]);
    let src = dir.join("payload.bin");
    std::fs::write(&src, &data).unwrap();
    let cfg = EncoderConfig {
        volume_size: 100_000,
        output_dir: dir.join("set"),
        ..EncoderConfig::new(&src)
    };
    Encoder::encode(&cfg).unwrap();
    dir.join("set")
}

fn flip(path: &Path, offset: u64) {
    let mut f = std::fs::OpenOptions::new().read(true).write(true).open(path).unwrap();
    let mut b = [0u8; 1];
    f.seek(SeekFrom::Start(offset)).unwrap();
    f.read_exact(&mut b).unwrap();
    f.seek(SeekFrom::Start(offset)).unwrap();
    f.write_all(&[b[0] ^ 0x5a]).unwrap();
}

#[test]
fn fresh_set_verifies_and_checks_clean() {
    let td = tempfile::tempdir().unwrap();
    let set = make_set(td.path());
    let report = verify(&set.join("payload.sfv")).unwrap();
    assert_eq!(report.volumes.len(), 3);
    assert!(report.all_ok());

    for name in ["payload.rar", "payload.r00", "payload.r01"] {
        let r = check_volume(&set.join(name)).unwrap();
        assert!(r.is_clean(), "{name}: {r:?}");
        assert_eq!(r.parity_sectors, if name == "payload.r01" { 2 } else { 3 });
    }
}

#[test]
fn verify_reports_mismatch_and_missing() {
    let td = tempfile::tempdir().unwrap();
    let set = make_set(td.path());
    let expected = file_crc32(&set.join("payload.r00")).unwrap();
    flip(&set.join("payload.r00"), 1234);
    std::fs::remove_file(set.join("payload.r01")).unwrap();

    let report = verify(&set.join("payload.sfv")).unwrap();
    assert_eq!((report.ok(), report.bad(), report.missing()), (1, 1, 1));
    let r00 = report.volumes.iter().find(|v| v.name == "payload.r00").unwrap();
    assert_eq!(r00.expected, expected);
    assert!(matches!(r00.status, VolumeStatus::Mismatch { actual } if actual != expected));
    assert!(!report.all_ok());
}

#[test]
fn repair_restores_single_damaged_sectors() {
    let td = tempfile::tempdir().unwrap();
    let set = make_set(td.path());
    let vol = set.join("payload.rar");
    let original = std::fs::read(&vol).unwrap();

    // Sectors 9 and 10 fall in different residue classes of the 3 parity sectors.
    flip(&vol, 9 * 512 + 100);
    flip(&vol, 10 * 512 + 3);
    let r = check_volume(&vol).unwrap();
    assert_eq!(r.damaged, vec![9, 10]);
    assert!(r.is_repairable());

    let fixed = repair_volume(&vol).unwrap();
    assert_eq!(fixed.repaired, vec![9, 10]);
    assert!(fixed.unrepairable.is_empty());
    assert!(std::fs::read(&vol).unwrap() == original);
    assert!(verify(&set.join("payload.sfv")).unwrap().all_ok());
}

#[test]
fn repair_refuses_same_class_damage() {
    let td = tempfile::tempdir().unwrap();
    let set = make_set(td.path());
    let vol = set.join("payload.r00");
    flip(&vol, 9 * 512);
    flip(&vol, 12 * 512);

    let r = check_volume(&vol).unwrap();
    assert_eq!(r.unrepairable, vec![9, 12]);
    let fixed = repair_volume(&vol).unwrap();
    assert!(fixed.repaired.is_empty());
    assert_eq!(fixed.unrepairable, vec![9, 12]);
}

#[test]
fn manifest_parse_skips_comments() {
    let text = b"; generated\r\n\r\nmy file.rar 0000abcd\r\nmy file.r00 DEADBEEF\n";
    let m = Manifest::parse(text).unwrap();
    assert_eq!(m.len(), 2);
    assert_eq!(m.get("my file.rar"), Some(0xabcd));
    assert_eq!(m.get("my file.r00"), Some(0xdead_beef));
    assert!(matches!(Manifest::parse(b"nocrc\r\n"), Err(Error::Malformed(_))));
}

#[test]
fn manifest_renders_latin1_crlf() {
    let mut m = Manifest::new();
    m.insert("b\u{e9}.r00", 0x10);
    m.insert("b\u{e9}.rar", 0xabcdef01);
    assert_eq!(m.render().unwrap(), b"b\xe9.r00 00000010\r\nb\xe9.rar abcdef01\r\n".to_vec());
}

#[test]
fn check_rejects_non_volume() {
    let td = tempfile::tempdir().unwrap();
    let p = td.path().join("junk.bin");
    std::fs::write(&p, vec![7u8; 4000]).unwrap();
    assert!(matches!(check_volume(&p), Err(Error::Malformed(_))));
}

#[test]
fn verify_rejects_entries_outside_the_sfv_directory() {
    let td = tempfile::tempdir().unwrap();
    let set = td.path().join("set");
    std::fs::create_dir(&set).unwrap();
    std::fs::write(td.path().join("outside.bin"), b"secret").unwrap();

    for entry in ["../outside.bin", "sub/x.rar", "sub\\x.rar", ".."] {
        let sfv = set.join("bad.sfv");
        std::fs::write(&sfv, format!("{entry} 00000000\r\n")).unwrap();
        assert!(matches!(verify(&sfv), Err(Error::Malformed(_))), "{entry}");
    }
    let abs = td.path().join("outside.bin");
    let sfv = set.join("abs.sfv");
    std::fs::write(&sfv, format!("{} 00000000\r\n", abs.display())).unwrap();
    assert!(matches!(verify(&sfv), Err(Error::Malformed(_))));
}

#[test]
fn empty_volume_is_malformed() {
    let td = tempfile::tempdir().unwrap();
    let p = td.path().join("empty.rar");
    std::fs::write(&p, b"").unwrap();
    assert!(matches!(check_volume(&p), Err(Error::Malformed(_))));
    assert!(matches!(repair_volume(&p), Err(Error::Malformed(_))));
}
