use criterion::{criterion_group, criterion_main};

mod storage;

criterion_group!(
    benches,
    bson::bench_serialize_individual,
    bson::bench_lookup,
    bson::bench_deserialize_array,
    storage::bench_kv_insert,
    storage::bench_kv_find,
    storage::bench_property_round_trip
);
criterion_main!(benches);
