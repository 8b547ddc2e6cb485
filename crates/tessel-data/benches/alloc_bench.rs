use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tessel_data::allocators::{make_address, HandleAlloc, HandleHashMap, NonLocalAllocator};
use tessel_data::ecs::{EntityQuery, EntityStore};

fn bench_allocators(c: &mut Criterion) {
    let mut group = c.benchmark_group("Allocators");

    group.bench_function("HandleAlloc churn (4096)", |b| {
        let mut pool = HandleAlloc::new(4096);
        b.iter(|| {
            while let Some(idx) = pool.alloc() {
                black_box(idx);
            }
            for idx in (0..4096u16).rev() {
                pool.free(idx);
            }
        });
    });

    group.bench_function("HandleHashMap insert/find/remove (512)", |b| {
        let mut map = HandleHashMap::new(512);
        b.iter(|| {
            for i in 0..512u16 {
                map.insert((i as u32).wrapping_mul(0x9e37_79b9), i);
            }
            for i in 0..512u16 {
                black_box(map.find((i as u32).wrapping_mul(0x9e37_79b9)));
            }
            for i in 0..512u16 {
                map.remove_by_handle(i);
            }
        });
    });

    group.bench_function("NonLocalAllocator alloc/free/compact", |b| {
        let mut alloc = NonLocalAllocator::new();
        alloc.add(make_address(0, 0), 1 << 20);
        b.iter(|| {
            let blocks: Vec<u64> = (0..256).filter_map(|i| alloc.alloc(16 + (i % 7) * 48)).collect();
            for ptr in blocks {
                alloc.free(ptr);
            }
            black_box(alloc.compact());
        });
    });

    group.finish();
}

fn bench_entity_query(c: &mut Criterion) {
    let mut store = EntityStore::new(4096, 8192);
    for i in 0..4000u32 {
        let Ok(e) = store.create_entity(true) else { break };
        if let Ok(cmp) = store.create_component(&i.to_le_bytes()) {
            let _ = store.add_component(e, cmp, 1);
        }
        if i % 2 == 0 {
            if let Ok(cmp) = store.create_component(&[0u8; 12]) {
                let _ = store.add_component(e, cmp, 2);
            }
        }
    }

    let mut query = EntityQuery::new();
    c.bench_function("EntityStore query two hashes (4000 entities)", |b| {
        b.iter(|| black_box(store.query_entities(&[1, 2], &mut query)));
    });
}

criterion_group!(benches, bench_allocators, bench_entity_query);
criterion_main!(benches);
