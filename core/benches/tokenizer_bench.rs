use criterion::{criterion_group, criterion_main, Criterion};
use fti_core::tokenizer::tokenize;
use fti_core::{open_for_read, open_for_write, Document, IndexWriter, Language, Schema};

const TEXT: &str = "An incremental index walks a directory tree, skips files whose \
modification time has not advanced, and re-analyzes the rest. Running the \
indexer twice over an unchanged tree performs no work on the second run. \
Queries are analyzed with the same stemmer, so searching for run finds running.";

fn bench_tokenize(c: &mut Criterion) {
    let text = TEXT.repeat(50);
    c.bench_function("tokenize_paragraphs", |b| b.iter(|| tokenize(&text)));
}

fn bench_search(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = open_for_write(dir.path(), Schema::file_index(Language::English)).unwrap();
    for i in 0..500 {
        let words = TEXT.split_whitespace().cycle().skip(i % 40).take(60).collect::<Vec<_>>().join(" ");
        let id = format!("/docs/{i}.txt");
        writer
            .add(Document::new(id.clone()).with_field("path", id).with_field("content", words).with_field("mtime", i as f64))
            .unwrap();
    }
    writer.close().unwrap();

    let reader = open_for_read(dir.path()).unwrap();
    c.bench_function("search_two_terms", |b| b.iter(|| reader.search("directory running", 0, 10).unwrap()));
    c.bench_function("search_phrase", |b| b.iter(|| reader.search("\"modification time\"", 0, 10).unwrap()));
}

criterion_group!(benches, bench_tokenize, bench_search);
criterion_main!(benches);
