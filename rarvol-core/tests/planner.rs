use chrono::NaiveDate;
use proptest::prelude::*;
use rarvol_core::header::FileEntry;
use rarvol_core::planner::*;
use rarvol_core::timestamp::Timestamp;
use rarvol_core::volume::VolumeNaming;
use rarvol_core::Error;

fn entry(name: &str, size: u64) -> FileEntry {
    let t = NaiveDate::from_ymd_opt(2020, 1, 2).unwrap().and_hms_opt(3, 4, 6).unwrap();
    FileEntry::new(name, &Timestamp::new(t).unwrap(), size).unwrap()
}

#[test]
fn recovery_sector_counts() {
    assert_eq!(max_recovery_sectors(0), 1);
    assert_eq!(max_recovery_sectors(511), 1);
    assert_eq!(max_recovery_sectors(512), 2);
    assert_eq!(max_recovery_sectors(100_000), 3);
    assert_eq!(max_recovery_sectors(15_000_000), 177);
    assert_eq!(max_recovery_sectors(u64::MAX / 8), 524_288);
}

#[test]
fn usable_payload_for_default_size() {
    assert_eq!(usable_payload(15_000_000, 177).unwrap(), 14_851_288);
    assert!(matches!(usable_payload(500, 1), Err(Error::InvalidArgument(_))));
}

#[test]
fn nearly_empty_last_quantum_is_dropped() {
    // 10 full quanta plus a leftover of 1, 2 and 3 bytes; one parity sector.
    let base = 514 * 10 + 54 + 512 + 20;
    assert_eq!(usable_payload(base + 1, 1).unwrap(), 5120);
    assert_eq!(usable_payload(base + 2, 1).unwrap(), 5120);
    assert_eq!(usable_payload(base + 3, 1).unwrap(), 5121);
    assert_eq!(usable_payload(base, 1).unwrap(), 5120);
}

#[test]
fn unencodable_volume_names_rejected_when_planning() {
    let e = entry("data.bin", 10);
    assert!(matches!(
        VolumePlan::new(&e, DEFAULT_VOLUME_SIZE, "\u{0100}x", VolumeNaming::Legacy),
        Err(Error::UnsupportedName { .. })
    ));
    let plan = VolumePlan::new(&e, DEFAULT_VOLUME_SIZE, "caf\u{e9}", VolumeNaming::Legacy).unwrap();
    assert_eq!(plan.manifest_name, "caf\u{e9}.sfv");
}

#[test]
fn forty_megabytes_in_three_volumes() {
    let e = entry("data.bin", 40_000_000);
    assert_eq!(volume_prefix_size(&e), 64);
    let plan = VolumePlan::new(&e, DEFAULT_VOLUME_SIZE, "data", VolumeNaming::Legacy).unwrap();

    let names: Vec<&str> = plan.volumes.iter().map(|v| v.name.as_str()).collect();
    assert_eq!(names, ["data.rar", "data.r00", "data.r01"]);
    assert_eq!(plan.max_recovery_sectors, 177);
    assert_eq!(plan.max_payload, 14_851_224);

    let sizes: Vec<u64> = plan.volumes.iter().map(|v| v.total_size).collect();
    assert_eq!(sizes, [15_000_000, 15_000_000, 10_400_892]);
    assert_eq!(plan.volumes[2].payload_size, 10_297_552);
    assert_eq!(plan.volumes[2].recovery_sectors, 123);
    assert_eq!(plan.volumes[1].data_offset, 14_851_224);

    assert!(plan.volumes[0].is_first && !plan.volumes[0].is_last);
    assert!(plan.volumes[2].is_last);
    assert_eq!(plan.manifest_name, "data.sfv");
    assert_eq!(plan.manifest_size, 3 * (8 + 1 + 8 + 2));
}

#[test]
fn empty_and_tiny_inputs_rejected() {
    let e = entry("data.bin", 0);
    assert!(matches!(
        VolumePlan::new(&e, DEFAULT_VOLUME_SIZE, "data", VolumeNaming::Legacy),
        Err(Error::InvalidArgument(_))
    ));
    let e = entry("data.bin", 10);
    assert!(matches!(
        VolumePlan::new(&e, 700, "data", VolumeNaming::Legacy),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn numbered_naming_not_supported() {
    let e = entry("data.bin", 10);
    assert!(matches!(
        VolumePlan::new(&e, DEFAULT_VOLUME_SIZE, "data", VolumeNaming::Numbered),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn legacy_names_advance_letters() {
    let n = |i| VolumeNaming::Legacy.volume_name("x", i, 1000);
    assert_eq!(n(0).unwrap(), "x.rar");
    assert_eq!(n(1).unwrap(), "x.r00");
    assert_eq!(n(100).unwrap(), "x.r99");
    assert_eq!(n(101).unwrap(), "x.s00");
    assert_eq!(n(900).unwrap(), "x.z99");
    assert!(n(901).is_err());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn plan_covers_file_exactly(file_size in 1u64..5_000_000, volume_size in 20_000u64..10_000_000) {
        let e = entry("f.bin", file_size);
        let plan = VolumePlan::new(&e, volume_size, "f", VolumeNaming::Legacy).unwrap();

        let sum: u64 = plan.volumes.iter().map(|v| v.payload_size).sum();
        prop_assert_eq!(sum, file_size);
        prop_assert_eq!(plan.volumes.len() as u64, plan_volumes(file_size, plan.max_payload));

        let mut offset = 0;
        for (i, v) in plan.volumes.iter().enumerate() {
            prop_assert_eq!(v.index as usize, i);
            prop_assert_eq!(v.data_offset, offset);
            prop_assert!(v.total_size <= volume_size);
            if !v.is_last {
                prop_assert_eq!(v.payload_size, plan.max_payload);
                prop_assert_eq!(v.recovery_sectors, plan.max_recovery_sectors);
            }
            offset += v.payload_size;
        }
        prop_assert!(plan.volumes.last().unwrap().is_last);
    }

    #[test]
    fn recovery_sectors_monotone_and_odd(a in 0u64..1u64 << 40, b in 0u64..1u64 << 40) {
        let (lo, hi) = (a.min(b), a.max(b));
        prop_assert!(max_recovery_sectors(lo) <= max_recovery_sectors(hi));
        let n = max_recovery_sectors(hi);
        prop_assert!(n >= 1 && n <= 524_288);
        if n >= 6 && n < 524_288 {
            prop_assert_eq!(n % 2, 1);
        }
    }
}
