//! Benchmarks for reply classification.
//!
//! Every assistant reply goes through `classify` before it is appended, so
//! the classifier sits on the path between a response arriving and the
//! message rendering. Replies are pre-generated in the three shapes the
//! backend produces: Markdown image links, bare URLs, and plain prose.

use std::time::Duration;

use cartwise_chat::classify;
use criterion::{criterion_group, criterion_main, Criterion};

/// A product answer with a Markdown image link.
fn generate_markdown_reply(index: usize) -> String {
    let ext = ["png", "jpg", "webp", "gif"][index % 4];
    format!(
        "Here are the running shoes you asked about. They come in red, navy \
         and charcoal, sizes 38 to 46, and are currently on sale. \
         [Trail Runner {}](https://cdn.example.com/products/{}/main.{}) \
         Free delivery applies to orders over fifty euros.",
        index, index, ext
    )
}

/// A reply linking a non-image document with a bare URL.
fn generate_bare_url_reply(index: usize) -> String {
    format!(
        "The sizing guide for this model is available at \
         https://docs.example.com/guides/sizing-{}.pdf and lists every \
         measurement in both EU and US units.",
        index
    )
}

/// Plain prose without any link.
fn generate_plain_reply(index: usize) -> String {
    format!(
        "We currently have {} pairs in stock across all warehouses. Most \
         orders ship within two working days and returns are free for \
         thirty days after delivery.",
        index
    )
}

fn bench_classify(c: &mut Criterion) {
    let markdown: Vec<String> = (0..1000).map(generate_markdown_reply).collect();
    let bare: Vec<String> = (0..1000).map(generate_bare_url_reply).collect();
    let plain: Vec<String> = (0..1000).map(generate_plain_reply).collect();

    let mut group = c.benchmark_group("classify");
    group.sample_size(200);
    group.measurement_time(Duration::from_secs(5));

    for (name, replies) in [
        ("markdown_image", &markdown),
        ("bare_url_text", &bare),
        ("plain_text", &plain),
    ] {
        group.bench_function(name, |b| {
            let mut idx = 0usize;
            b.iter(|| {
                let reply = &replies[idx % replies.len()];
                idx += 1;
                classify(Some(reply))
            });
        });
    }

    group.bench_function("empty_fallback", |b| b.iter(|| classify(None)));

    group.finish();
}

criterion_group!(benches, bench_classify);
criterion_main!(benches);
