use criterion::{black_box, criterion_group, criterion_main, Criterion};
use grit_pack::xdelta::XDeltaIndex;

fn xdelta_similar_buffers(c: &mut Criterion) {
    let source: Vec<u8> = (0..64 * 1024u32).map(|i| (i % 251) as u8).collect();
    let mut target = source.clone();
    target.splice(1000..1000, b"an inserted run of bytes".iter().copied());
    target.truncate(60 * 1024);

    c.bench_function("xdelta_index_64k", |b| {
        b.iter(|| XDeltaIndex::new(black_box(source.clone())))
    });

    let index = XDeltaIndex::new(source);
    c.bench_function("xdelta_compress_64k", |b| {
        b.iter(|| index.compress(black_box(&target)))
    });
}

criterion_group!(benches, xdelta_similar_buffers);
criterion_main!(benches);
