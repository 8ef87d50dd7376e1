use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use sercom::encoding::{EncodingKind, StreamEncoder};

const CHUNK: usize = 1024;

fn make_payload(size: usize) -> Vec<u8> {
    // Half text, half noise, roughly what firmware images look like to gzip.
    (0..size)
        .map(|i| {
            if (i / 4096) % 2 == 0 {
                b"console=ttyS0,115200 "[i % 21]
            } else {
                (i.wrapping_mul(2654435761) >> 13) as u8
            }
        })
        .collect()
}

fn encode_all(kind: EncodingKind, data: &[u8]) -> usize {
    let mut enc = StreamEncoder::new(kind);
    let mut total = 0;
    for chunk in data.chunks(CHUNK) {
        total += enc.encode(chunk).unwrap().len();
    }
    total + enc.finish().unwrap().len()
}

fn bench_stream_encoders(c: &mut Criterion) {
    let mut group = c.benchmark_group("stream_encoder");

    for size in [16 * 1024, 256 * 1024, 1024 * 1024].iter() {
        let data = make_payload(*size);
        group.throughput(Throughput::Bytes(*size as u64));

        for kind in [EncodingKind::Base64, EncodingKind::Gzip] {
            group.bench_with_input(BenchmarkId::new(kind.as_str(), size), &data, |b, data| {
                b.iter(|| encode_all(kind, black_box(data)));
            });
        }
    }
    group.finish();
}

fn bench_fiq_heavy_input(c: &mut Criterion) {
    // Raw bytes whose base64 is "fiqfiqfiq...", the worst case for line splitting.
    let data: Vec<u8> = [0x7e, 0x2a, 0x9f, 0x8a, 0xa7, 0xe2, 0xa9, 0xf8, 0xaa]
        .iter()
        .copied()
        .cycle()
        .take(64 * 1024)
        .collect();

    c.bench_function("base64_fiq_splitting", |b| {
        b.iter(|| encode_all(EncodingKind::Base64, black_box(&data)));
    });
}

criterion_group!(benches, bench_stream_encoders, bench_fiq_heavy_input);
criterion_main!(benches);
