#![forbid(unsafe_code)]

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use hfs_ondisk::{
    DirSlot, FileAttributes, HfsHeader, Rfe, VolumeAttributes, encode_dir_cluster,
    slots_per_cluster,
};
use hfs_types::{
    BOOTABLE_SIGNATURE, ByteOrder, ClusterIndex, HEADER_RESERVED_SENTINEL, PackedDate, RFE_SIZE,
    pad_field,
};

const CLUSTER_SIZE: u64 = 4096;

fn header_bytes(order: ByteOrder) -> [u8; 512] {
    HfsHeader {
        signature: u32::from_be_bytes(*b"HFS0"),
        byte_order: order,
        next_alloc: ClusterIndex(2),
        cluster_size: CLUSTER_SIZE,
        clusters_available: 1022,
        name: pad_field(b"bench"),
        attributes: VolumeAttributes::NORMAL,
        creation_date: PackedDate::from_ymd(2026, 1, 1),
        owner_id: 0,
        reserved: HEADER_RESERVED_SENTINEL,
        clusters: 1024,
        boot_signature: BOOTABLE_SIGNATURE,
    }
    .to_bytes()
    .expect("encode header")
}

fn full_dir_cluster() -> Vec<u8> {
    let entries: Vec<Rfe> = (0..slots_per_cluster(CLUSTER_SIZE) - 1)
        .map(|i| {
            Rfe::new_file(
                format!("file{i:04}").as_bytes(),
                b"dat",
                FileAttributes::NORMAL,
                0,
                PackedDate::from_ymd(2026, 1, 1),
            )
        })
        .collect();
    encode_dir_cluster(CLUSTER_SIZE, &entries, ClusterIndex::END, ByteOrder::Little)
        .expect("encode dir cluster")
}

fn bench_header_parse(c: &mut Criterion) {
    let little = header_bytes(ByteOrder::Little);
    let big = header_bytes(ByteOrder::Big);

    c.bench_function("header_parse_little", |b| {
        b.iter(|| HfsHeader::parse_from_bytes(black_box(&little)).expect("header parse"));
    });
    c.bench_function("header_parse_big", |b| {
        b.iter(|| HfsHeader::parse_from_bytes(black_box(&big)).expect("header parse"));
    });
}

fn bench_dir_cluster_decode(c: &mut Criterion) {
    let cluster = full_dir_cluster();

    c.bench_function("dir_cluster_decode", |b| {
        b.iter(|| {
            for slot in black_box(&cluster).chunks_exact(RFE_SIZE) {
                let decoded = DirSlot::parse_from_bytes(slot, ByteOrder::Little).expect("slot");
                black_box(decoded);
            }
        });
    });
}

fn bench_dir_cluster_encode(c: &mut Criterion) {
    let cluster = full_dir_cluster();
    let entries: Vec<Rfe> = cluster
        .chunks_exact(RFE_SIZE)
        .filter_map(|slot| match DirSlot::parse_from_bytes(slot, ByteOrder::Little) {
            Ok(DirSlot::Entry(rfe)) => Some(rfe),
            _ => None,
        })
        .collect();

    c.bench_function("dir_cluster_encode", |b| {
        b.iter(|| {
            let out = encode_dir_cluster(
                CLUSTER_SIZE,
                black_box(&entries),
                ClusterIndex::END,
                ByteOrder::Little,
            )
            .expect("encode");
            black_box(out);
        });
    });
}

criterion_group!(
    codec,
    bench_header_parse,
    bench_dir_cluster_decode,
    bench_dir_cluster_encode,
);
criterion_main!(codec);
