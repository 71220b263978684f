use astarte_device_store::caching::Cache;
use astarte_device_store::data::Individual;
use astarte_device_store::storage::journal::RamJournal;
use astarte_device_store::storage::kv::{KvStore, StoreConfig};
use criterion::{BatchSize, Criterion, Throughput};
use rand::Rng;
use rand::distributions::Alphanumeric;

const KEYS: usize = 64;

fn random_key(rng: &mut impl Rng) -> String {
    (0..16).map(|_| char::from(rng.sample(Alphanumeric))).collect()
}

fn random_keys() -> Vec<String> {
    let mut rng = rand::thread_rng();
    (0..KEYS).map(|_| random_key(&mut rng)).collect()
}

pub fn bench_kv_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("kv_insert");
    let value = [0xA5u8; 32];
    group.throughput(Throughput::Elements(KEYS as u64));
    group.bench_function("insert_64_keys", |b| {
        b.iter_batched(
            || (RamJournal::new(), random_keys()),
            |(journal, keys)| {
                let store = KvStore::open(&journal, "bench", StoreConfig::default())
                    .expect("open failed");
                for key in &keys {
                    store.insert(key, &value).expect("insert failed");
                }
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

pub fn bench_kv_find(c: &mut Criterion) {
    let mut group = c.benchmark_group("kv_find");
    let journal = RamJournal::new();
    let store = KvStore::open(&journal, "bench", StoreConfig::default()).expect("open failed");
    let keys = random_keys();
    for key in &keys {
        store.insert(key, key.as_bytes()).expect("insert failed");
    }

    group.bench_function("find_random_key", |b| {
        let mut rng = rand::thread_rng();
        let mut buf = [0u8; 16];
        b.iter(|| {
            let key = &keys[rng.gen_range(0..keys.len())];
            store.find(key, Some(&mut buf)).expect("find failed")
        })
    });
    group.finish();
}

pub fn bench_property_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("property_round_trip");
    let journal = RamJournal::new();
    let cache = Cache::new(&journal, StoreConfig::default()).expect("cache failed");
    let value = Individual::from_string("on");

    group.bench_function("store_and_load", |b| {
        b.iter(|| {
            cache
                .store_property("org.example.Settings", "/led/mode", 1, &value)
                .expect("store failed");
            cache
                .load_property("org.example.Settings", "/led/mode")
                .expect("load failed")
        })
    });
    group.finish();
}
