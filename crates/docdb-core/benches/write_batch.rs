use criterion::{black_box, criterion_group, criterion_main, Criterion};
use docdb_core::{doc, CommandDispatcher, Document};
use serde_json::{json, Value};

fn insert_command(batch: usize) -> Document {
    let documents: Vec<Value> = (0..batch)
        .map(|i| json!({ "_id": i, "name": format!("user-{i}"), "age": i % 90 }))
        .collect();
    doc! { "insert" => "users", "documents" => documents }
}

fn upsert_command(batch: usize) -> Document {
    let updates: Vec<Value> = (0..batch)
        .map(|i| {
            json!({
                "q": { "_id": i },
                "u": { "$set": { "visits": 1 } },
                "upsert": true,
            })
        })
        .collect();
    doc! { "update" => "users", "updates" => updates }
}

fn bench_write_batch(c: &mut Criterion) {
    let inserts = insert_command(100);
    c.bench_function("insert_command_100_documents", |b| {
        b.iter(|| {
            let dispatcher = CommandDispatcher::default();
            black_box(
                dispatcher
                    .command("bench", &inserts, None)
                    .expect("insert should succeed"),
            );
        })
    });

    let upserts = upsert_command(100);
    c.bench_function("update_command_100_upserts", |b| {
        b.iter(|| {
            let dispatcher = CommandDispatcher::default();
            black_box(
                dispatcher
                    .command("bench", &upserts, None)
                    .expect("update should succeed"),
            );
        })
    });
}

criterion_group!(benches, bench_write_batch);
criterion_main!(benches);
