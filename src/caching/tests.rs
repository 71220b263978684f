use alloc::borrow::Cow;
use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;

use super::*;
use crate::data::{Individual, MappingType};
use crate::interface::{Aggregation, Interface, InterfaceType, Introspection, Mapping, Ownership};
use crate::storage::journal::RamJournal;

fn property_interface(name: &str, ownership: Ownership) -> Interface {
    Interface {
        name: name.into(),
        major_version: 1,
        minor_version: 0,
        ownership,
        interface_type: InterfaceType::Properties,
        aggregation: Aggregation::Individual,
        mappings: vec![Mapping::new("/%{id}/value", MappingType::Integer)],
    }
}

fn introspection(interfaces: &[(&str, Ownership)]) -> Introspection {
    let mut introspection = Introspection::new();
    for (name, ownership) in interfaces {
        introspection
            .add(property_interface(name, *ownership))
            .unwrap();
    }
    introspection
}

fn cache(journal: &RamJournal) -> Cache<'_, RamJournal> {
    Cache::new(journal, StoreConfig::default()).unwrap()
}

fn cached_properties(cache: &Cache<'_, RamJournal>) -> Vec<(String, String)> {
    let mut properties = Vec::new();
    let Ok(mut iter) = cache.property_iter() else {
        return properties;
    };
    loop {
        properties.push(iter.get().unwrap());
        if iter.advance().is_err() {
            break;
        }
    }
    properties.sort();
    properties
}

#[test]
fn test_property_round_trip() {
    let journal = RamJournal::new();
    let cache = cache(&journal);

    let strings = ["north", "south"];
    let values = [
        Individual::Integer(-7),
        Individual::String(Cow::Borrowed("hello")),
        Individual::BinaryBlob(Cow::Borrowed(&[0xDE, 0xAD])),
        Individual::from_double_array(&[1.5, -2.25]),
        Individual::from_string_array(&strings),
        Individual::DateTime(1_700_000_000_000),
        Individual::from_boolean_array(&[]),
    ];
    for (i, value) in values.iter().enumerate() {
        let path = alloc::format!("/{}/value", i);
        cache.store_property("org.example.A", &path, 3, value).unwrap();
        let (major, loaded) = cache.load_property("org.example.A", &path).unwrap();
        assert_eq!(major, 3);
        assert_eq!(&loaded, value);
    }
}

#[test]
fn test_property_document_layout() {
    let journal = RamJournal::new();
    let cache = cache(&journal);
    cache
        .store_property("org.example.A", "/led/value", 2, &Individual::Integer(5))
        .unwrap();

    let store = KvStore::open(&journal, PROPERTIES_NAMESPACE, StoreConfig::default()).unwrap();
    let stored = store.find_alloc("org.example.A;/led/value").unwrap();
    let document = crate::bson::Document::new(&stored).unwrap();
    assert_eq!(document.lookup("major").unwrap().as_int32(), Ok(2));
    assert_eq!(document.lookup("type").unwrap().as_int64(), Ok(1));
    assert_eq!(document.lookup("data").unwrap().as_int32(), Ok(5));
}

#[test]
fn test_property_overwrite_and_delete() {
    let journal = RamJournal::new();
    let cache = cache(&journal);
    cache
        .store_property("org.example.A", "/x/value", 1, &Individual::Integer(1))
        .unwrap();
    cache
        .store_property("org.example.A", "/x/value", 2, &Individual::Integer(2))
        .unwrap();
    assert_eq!(
        cache.load_property("org.example.A", "/x/value"),
        Ok((2, Individual::Integer(2)))
    );

    cache.delete_property("org.example.A", "/x/value").unwrap();
    assert_eq!(
        cache.load_property("org.example.A", "/x/value"),
        Err(Error::NotFound)
    );
    // Deleting again is not an error.
    cache.delete_property("org.example.A", "/x/value").unwrap();
}

#[test]
fn test_property_malformed_document() {
    let journal = RamJournal::new();
    let cache = cache(&journal);
    let store = KvStore::open(&journal, PROPERTIES_NAMESPACE, StoreConfig::default()).unwrap();

    store.insert("org.example.A;/bad", b"garbage").unwrap();
    assert_eq!(
        cache.load_property("org.example.A", "/bad"),
        Err(Error::DocumentMalformed)
    );

    // A valid document without the data field.
    let mut ser = crate::bson::Serializer::new();
    ser.append_int32("major", 1);
    ser.append_int64("type", 1);
    store
        .insert("org.example.A;/partial", &ser.finish().unwrap())
        .unwrap();
    assert_eq!(
        cache.load_property("org.example.A", "/partial"),
        Err(Error::DocumentMalformed)
    );
}

#[test]
fn test_property_iteration() {
    let journal = RamJournal::new();
    let cache = cache(&journal);
    assert_eq!(cache.property_iter().unwrap_err(), Error::NotFound);

    cache.synchronization_set(true).unwrap();
    cache
        .store_property("org.example.A", "/1/value", 1, &Individual::Integer(1))
        .unwrap();
    cache
        .store_property("org.example.B", "/2/value", 1, &Individual::Integer(2))
        .unwrap();

    assert_eq!(
        cached_properties(&cache),
        vec![
            ("org.example.A".to_string(), "/1/value".to_string()),
            ("org.example.B".to_string(), "/2/value".to_string()),
        ]
    );
}

#[test]
fn test_end_to_end_purge_on_render() {
    let journal = RamJournal::new();
    let cache = cache(&journal);

    cache
        .store_property("com.example.Sensor", "/value", 1, &Individual::Integer(42))
        .unwrap();
    assert_eq!(
        cache.load_property("com.example.Sensor", "/value"),
        Ok((1, Individual::Integer(42)))
    );

    let current = introspection(&[("com.example.Other", Ownership::Device)]);
    let rendered = cache.get_device_owned_properties_string(&current).unwrap();
    assert_eq!(rendered, "");
    assert_eq!(
        cache.load_property("com.example.Sensor", "/value"),
        Err(Error::NotFound)
    );
}

#[test]
fn test_device_owned_properties_string() {
    let journal = RamJournal::new();
    let cache = cache(&journal);
    let value = Individual::Integer(0);
    cache.store_property("org.example.Dev", "/a/value", 1, &value).unwrap();
    cache.store_property("org.example.Srv", "/b/value", 1, &value).unwrap();
    cache.store_property("org.example.Gone", "/c/value", 1, &value).unwrap();
    cache.store_property("org.example.Dev", "/d/value", 1, &value).unwrap();

    let current = introspection(&[
        ("org.example.Dev", Ownership::Device),
        ("org.example.Srv", Ownership::Server),
    ]);

    // Rendering alone leaves the cache untouched.
    let rendered = cache.device_owned_properties_string(&current).unwrap();
    let mut entries: Vec<&str> = rendered.split(';').collect();
    entries.sort();
    assert_eq!(entries, ["org.example.Dev/a/value", "org.example.Dev/d/value"]);
    assert_eq!(cached_properties(&cache).len(), 4);

    let rendered = cache.get_device_owned_properties_string(&current).unwrap();
    let mut entries: Vec<&str> = rendered.split(';').collect();
    entries.sort();
    assert_eq!(entries, ["org.example.Dev/a/value", "org.example.Dev/d/value"]);
    assert_eq!(cached_properties(&cache).len(), 3);
    assert!(cache.load_property("org.example.Srv", "/b/value").is_ok());
    assert_eq!(
        cache.load_property("org.example.Gone", "/c/value"),
        Err(Error::NotFound)
    );
}

#[test]
fn test_purge_orphaned_properties() {
    let journal = RamJournal::new();
    let cache = cache(&journal);
    let value = Individual::Integer(0);
    for i in 0..6 {
        let interface = if i % 2 == 0 { "org.example.Kept" } else { "org.example.Gone" };
        let path = alloc::format!("/{}/value", i);
        cache.store_property(interface, &path, 1, &value).unwrap();
    }

    let current = introspection(&[("org.example.Kept", Ownership::Server)]);
    assert_eq!(cache.purge_orphaned_properties(&current), Ok(3));
    let remaining = cached_properties(&cache);
    assert_eq!(remaining.len(), 3);
    assert!(remaining.iter().all(|(name, _)| name == "org.example.Kept"));
    assert_eq!(cache.purge_orphaned_properties(&current), Ok(0));
}

#[test]
fn test_purge_server_properties() {
    let journal = RamJournal::new();
    let cache = cache(&journal);
    let value = Individual::Integer(0);
    cache.store_property("org.example.Srv", "/a/value", 1, &value).unwrap();
    cache.store_property("org.example.Srv", "/b/value", 1, &value).unwrap();
    cache.store_property("org.example.Dev", "/c/value", 1, &value).unwrap();
    cache.store_property("org.example.Gone", "/d/value", 1, &value).unwrap();

    let current = introspection(&[
        ("org.example.Srv", Ownership::Server),
        ("org.example.Dev", Ownership::Device),
    ]);
    let purged = cache
        .purge_server_properties(&current, "org.example.Srv/a/value;org.example.Other/x")
        .unwrap();
    assert_eq!(purged, 2);
    assert_eq!(
        cached_properties(&cache),
        vec![
            ("org.example.Dev".to_string(), "/c/value".to_string()),
            ("org.example.Srv".to_string(), "/a/value".to_string()),
        ]
    );

    // An empty allow list drops every server property.
    assert_eq!(cache.purge_server_properties(&current, ""), Ok(1));
    assert!(cache.load_property("org.example.Dev", "/c/value").is_ok());
}

#[test]
fn test_synchronization() {
    let journal = RamJournal::new();
    let cache = cache(&journal);
    assert_eq!(cache.synchronization_get(), Err(Error::NotFound));

    cache.synchronization_set(false).unwrap();
    assert_eq!(cache.synchronization_get(), Ok(false));
    cache.synchronization_set(true).unwrap();
    assert_eq!(cache.synchronization_get(), Ok(true));

    let store = KvStore::open(&journal, SYNCHRONIZATION_NAMESPACE, StoreConfig::default()).unwrap();
    assert_eq!(store.find_alloc("synchronization_status").unwrap(), b"true");
}

#[test]
fn test_introspection_check() {
    let journal = RamJournal::new();
    let cache = cache(&journal);
    let current = "org.example.A:1:0;org.example.B:0:1";

    assert_eq!(
        cache.introspection_check(current),
        Err(Error::OutdatedIntrospection)
    );
    cache.introspection_store(current).unwrap();
    cache.introspection_check(current).unwrap();
    assert_eq!(
        cache.introspection_check("org.example.A:1:0"),
        Err(Error::OutdatedIntrospection)
    );
    assert_eq!(
        cache.introspection_check("org.example.A:1:0;org.example.B:0:2"),
        Err(Error::OutdatedIntrospection)
    );
}
