use criterion::{black_box, criterion_group, criterion_main, Criterion};

use mdd::unpack::{FrameScanner, IntervalSet};

fn wire_block(id: &str, equipment: &str, payload: &[u8]) -> Vec<u8> {
    let mut out = vec![0x01];
    out.extend_from_slice(id.as_bytes());
    out.extend_from_slice(equipment.as_bytes());
    out.extend_from_slice(format!("_{:04x}A51eb01a4_01_89ab", payload.len()).as_bytes());
    out.push(0x02);
    for &b in payload {
        match b {
            0x2b => out.extend_from_slice(&[0x18, 0x6b]),
            0x18 => out.extend_from_slice(&[0x18, 0x58]),
            b => out.push(b),
        }
    }
    out.push(0x03);
    out
}

fn scan(c: &mut Criterion) {
    // 1000 blocks with separators and a sprinkling of stuffed bytes
    let mut payload = vec![0x41u8; 512];
    payload[100] = 0x2b;
    payload[101] = 0x18;
    let mut stream = Vec::new();
    for _ in 0..1000 {
        stream.extend_from_slice(&wire_block("WA", "1236820", &payload));
        stream.push(b'\n');
    }

    c.bench_function("scan_1000_blocks", |b| {
        b.iter(|| {
            let count = FrameScanner::new(black_box(&stream), 0, stream.len()).count();
            assert_eq!(count, 1000);
        });
    });
}

fn intervals(c: &mut Criterion) {
    c.bench_function("interval_insert_subtract", |b| {
        b.iter(|| {
            let mut set = IntervalSet::new();
            for i in 0..500u64 {
                set.insert(i * 10, i * 10 + 8);
            }
            for i in 0..500u64 {
                set.subtract(i * 10 + 2, i * 10 + 4);
            }
            black_box(set)
        });
    });
}

criterion_group!(benches, scan, intervals);
criterion_main!(benches);
