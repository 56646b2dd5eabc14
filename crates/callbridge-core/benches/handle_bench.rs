//! Criterion benchmarks for the handle and dispatch tables.
//!
//! Every handle-table resource operation starts with a lookup, and every
//! resource event ends with a typed callback dispatch.
//!
//! Run with:
//! ```bash
//! cargo bench --package callbridge-core --bench handle_bench
//! ```

use callbridge_core::dispatch::{DispatchTable, Value};
use callbridge_core::handle::{HandleId, HandleTable};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn bench_handle_lookup(c: &mut Criterion) {
    let mut table = HandleTable::new("request");
    let ids: Vec<HandleId> = (0..1024).map(|i| table.insert(i).expect("insert")).collect();

    c.bench_function("handle_get_1024", |b| {
        b.iter(|| {
            for id in &ids {
                black_box(table.get(*id).ok());
            }
        })
    });

    c.bench_function("handle_insert_remove", |b| {
        let mut churn = HandleTable::new("video");
        b.iter(|| {
            let id = churn.insert(black_box(7u64)).expect("insert");
            churn.remove(id).expect("remove");
        })
    });
}

fn bench_dispatch(c: &mut Criterion) {
    let mut table = DispatchTable::new();
    let idx = table.register_resource_callback(|h, code, user| {
        black_box(h + code + user);
    });
    let args = [Value::I32(1), Value::I32(2), Value::I32(3)];

    c.bench_function("dispatch_resource_event", |b| {
        b.iter(|| table.invoke(black_box(idx), black_box(&args)))
    });
}

criterion_group!(benches, bench_handle_lookup, bench_dispatch);
criterion_main!(benches);
