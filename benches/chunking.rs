use criterion::{Criterion, criterion_group, criterion_main};
use kb_engine::embeddings::chunking::{ChunkParams, split_text};
use std::fmt::Write;
use std::hint::black_box;

fn build_corpus() -> String {
    let mut text = String::new();
    for section in 0..40 {
        for sentence in 0..25 {
            let _ = write!(
                text,
                "Sentence {} of section {} discusses markets, prices, and trade-offs. ",
                sentence, section
            );
        }
        text.push_str("\n\n");
    }
    text
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let corpus = build_corpus();
    let params = ChunkParams::default();
    c.bench_function("chunking", |b| {
        b.iter(|| split_text(black_box(&corpus), black_box(&params)))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
