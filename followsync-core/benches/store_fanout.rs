use criterion::{black_box, criterion_group, criterion_main, Criterion};

use followsync_core::{AuthorId, FollowStatusStore};

fn seeded_store(authors: usize) -> (FollowStatusStore, Vec<AuthorId>) {
    let store = FollowStatusStore::for_viewer("viewer");
    let ids: Vec<AuthorId> = (0..authors).map(|i| AuthorId::new(format!("author-{i}"))).collect();
    store.seed(ids.iter().map(|id| (id.clone(), false)));
    (store, ids)
}

fn set_with_keyed_subscribers(c: &mut Criterion) {
    let (store, ids) = seeded_store(500);
    let _subscriptions: Vec<_> = ids
        .iter()
        .flat_map(|id| [store.subscribe(id, |_| {}), store.subscribe(id, |_| {})])
        .collect();

    let mut flip = false;
    c.bench_function("set_500_authors_2_buttons_each", |b| {
        b.iter(|| {
            flip = !flip;
            store.set(black_box(&ids[250]), flip);
        })
    });
}

fn seed_with_keyed_subscribers(c: &mut Criterion) {
    let (store, ids) = seeded_store(500);
    let _subscriptions: Vec<_> = ids.iter().map(|id| store.subscribe(id, |_| {})).collect();

    c.bench_function("seed_500_authors", |b| {
        b.iter(|| store.seed(ids.iter().map(|id| (id.clone(), true))))
    });
}

criterion_group!(benches, set_with_keyed_subscribers, seed_with_keyed_subscribers);
criterion_main!(benches);
