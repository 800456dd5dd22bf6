use bookshelf_api::backend::InMemoryBackend;
use bookshelf_api::gateway::{QueryGateway, BOOK_LIST};
use bookshelf_api::key::BOOKS_TAG;
use bookshelf_api::repository::Page;
use bookshelf_api::{Author, Book, CacheExpander, MemoryStore};
use criterion::{criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use tokio::runtime::Runtime;

async fn seeded_store(books: usize) -> MemoryStore {
    let store = MemoryStore::new();
    let mut author = Author::new("Iain", "Banks");
    let mut uow = store.unit_of_work();
    uow.persist(&mut author);
    for i in 0..books {
        let mut book = Book::new(format!("Book {}", i));
        book.cover_text = Some("A Culture novel".to_string());
        book.author = Some(author.clone());
        uow.persist(&mut book);
    }
    uow.flush().await.expect("Failed to seed store");
    store
}

fn bench_book_list(c: &mut Criterion) {
    let runtime = Runtime::new().expect("Failed to build runtime");
    let store = runtime.block_on(seeded_store(500));
    let gateway = QueryGateway::new(Arc::new(CacheExpander::new(InMemoryBackend::new())));
    let page = Page::new(1, 50);

    let store = &store;
    let gateway = &gateway;

    let mut group = c.benchmark_group("book_list");

    group.bench_function("cached", |b| {
        b.to_async(&runtime).iter(|| async move {
            gateway
                .list::<Book, _>(BOOK_LIST, store, page)
                .await
                .expect("Failed to list")
        })
    });

    group.bench_function("invalidated", |b| {
        b.to_async(&runtime).iter(|| async move {
            gateway
                .invalidate(&[BOOKS_TAG])
                .await
                .expect("Failed to invalidate");
            gateway
                .list::<Book, _>(BOOK_LIST, store, page)
                .await
                .expect("Failed to list")
        })
    });

    group.finish();
}

criterion_group!(benches, bench_book_list);
criterion_main!(benches);
