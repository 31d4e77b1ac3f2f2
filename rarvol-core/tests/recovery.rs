use proptest::prelude::*;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rarvol_core::block::{BlockHeader, BLOCK_SUB, LONG_BLOCK, SKIP_IF_UNKNOWN};
use rarvol_core::checksum::sector_crc;
use rarvol_core::recovery::*;
use rarvol_core::repair::{rebuild_sector, scan};

/// `data` followed by its recovery record, as it sits in a volume.
fn protect(data: &[u8], n: u32) -> Vec<u8> {
    let rr = RecoveryBlock::from_reader(&mut &data[..], data.len() as u64, n).unwrap();
    let mut out = data.to_vec();
    rr.write_to(&mut out).unwrap();
    out
}

fn random(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.gen()).collect()
}

#[test]
fn record_layout() {
    let data = random(5000, 1);
    let rr = RecoveryBlock::from_reader(&mut &data[..], 5000, 3).unwrap();
    assert_eq!(rr.sector_crcs.len(), 10);
    assert_eq!(rr.sector_count(), 3);
    assert_eq!(rr.data_len(), 10 * 2 + 3 * 512);

    let hdr = rr.header();
    assert_eq!(hdr.len() as u64, RR_HEADER_SIZE);
    assert_eq!(RR_HEADER_SIZE, 54);
    let h = BlockHeader::parse(&hdr).unwrap();
    assert_eq!(h.kind, BLOCK_SUB);
    assert_eq!(h.flags, LONG_BLOCK | SKIP_IF_UNKNOWN);
    assert_eq!(h.add_size, Some(rr.data_len() as u32));
    assert!(h.verify_crc(&hdr));
    assert_eq!(&hdr[32..34], b"RR");
    assert_eq!(&hdr[34..42], b"Protect+");
    assert_eq!(&hdr[42..46], &3u32.to_le_bytes());
    assert_eq!(&hdr[46..54], &10u64.to_le_bytes());

    // Last sector is zero padded before hashing.
    let mut tail = [0u8; 512];
    tail[..5000 - 9 * 512].copy_from_slice(&data[9 * 512..]);
    assert_eq!(rr.sector_crcs[9], sector_crc(&tail));

    // Parity slot 1 holds sectors 1, 4 and 7.
    let mut p = ParitySector::zeroed();
    for i in [1u64, 4, 7] {
        p.xor_in(&read_sector(&data, 5000, i));
    }
    assert_eq!(&rr.parity[1], &p);
}

#[test]
fn builder_matches_chunked_feed() {
    let data = random(3333, 2);
    let whole = RecoveryBlock::from_reader(&mut &data[..], 3333, 5).unwrap();
    let mut b = RecoveryBuilder::new(5);
    for chunk in data.chunks(100) {
        b.update(chunk);
    }
    let chunked = b.finish();
    assert_eq!(whole.sector_crcs, chunked.sector_crcs);
    assert_eq!(whole.parity, chunked.parity);
    assert_eq!(whole.record_crc(), chunked.record_crc());
}

#[test]
fn locate_finds_record_by_tag() {
    let data = random(4096, 3);
    let vol = protect(&data, 7);
    let rr = RecoveryRecord::locate(&vol).unwrap();
    assert_eq!(rr.offset, 4096);
    assert_eq!(rr.sector_count, 7);
    assert_eq!(rr.protected_sectors, 8);
    assert!(rr.is_intact(&vol));
}

#[test]
fn damaged_record_is_detected() {
    let data = random(4096, 4);
    let mut vol = protect(&data, 3);
    let last = vol.len() - 1;
    vol[last] ^= 0xff;
    let (rr, report) = scan(&vol).unwrap();
    assert!(!rr.is_intact(&vol));
    assert!(!report.record_intact);
    assert!(report.damaged.is_empty());
}

#[test]
fn two_damaged_sectors_in_one_class_are_unrepairable() {
    let data = random(512 * 12, 5);
    let mut vol = protect(&data, 3);
    vol[2 * 512 + 7] ^= 1;
    vol[5 * 512 + 9] ^= 1;
    vol[512 + 1] ^= 1;
    let (_, report) = scan(&vol).unwrap();
    assert_eq!(report.damaged, vec![1, 2, 5]);
    assert_eq!(report.unrepairable, vec![2, 5]);
    assert!(!report.is_repairable());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn any_single_sector_rebuilds(len in 1usize..20_000, n in 1u32..12, seed in any::<u64>(), pick in any::<u64>()) {
        let data = random(len, seed);
        let mut vol = protect(&data, n);
        let sectors = protected_sectors(len as u64);
        let victim = pick % sectors;

        let start = (victim * 512) as usize;
        let end = (start + 512).min(len);
        for b in &mut vol[start..end] {
            *b = !*b;
        }

        let (rr, report) = scan(&vol).unwrap();
        prop_assert_eq!(&report.damaged, &vec![victim]);
        prop_assert!(report.is_repairable());
        let rebuilt = rebuild_sector(&vol, &rr, victim);
        prop_assert_eq!(&rebuilt[..end - start], &data[start..end]);
        prop_assert!(rebuilt[end - start..].iter().all(|&b| b == 0));
    }
}
