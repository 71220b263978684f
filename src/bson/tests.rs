use super::*;
use crate::error::Error;
use alloc::vec;
use alloc::vec::Vec;

fn sample_document() -> Vec<u8> {
    let mut ser = Serializer::new();
    ser.append_double("double", 42.3);
    ser.append_string("string", "hello");
    ser.append_binary("binary", &[0xDE, 0xAD]);
    ser.append_boolean("bool", true);
    ser.append_datetime("datetime", 1_700_000_000_000);
    ser.append_int32("int32", -7);
    ser.append_int64("int64", i64::MAX);
    ser.finish().unwrap()
}

#[test]
fn test_empty_document_layout() {
    let bytes = Serializer::new().finish().unwrap();
    assert_eq!(bytes, [0x05, 0x00, 0x00, 0x00, 0x00]);

    let doc = Document::new(&bytes).unwrap();
    assert!(doc.is_empty());
    assert_eq!(doc.first_element(), Err(Error::NotFound));
    assert_eq!(doc.count_elements(), Ok(0));
}

#[test]
fn test_int32_layout() {
    let mut ser = Serializer::new();
    ser.append_int32("v", 0x0102_0304);
    let bytes = ser.finish().unwrap();
    assert_eq!(
        bytes,
        [
            0x0c, 0x00, 0x00, 0x00, // total length
            0x10, b'v', 0x00, // type and name
            0x04, 0x03, 0x02, 0x01, // payload
            0x00, // terminator
        ]
    );
}

#[test]
fn test_string_and_binary_layout() {
    let mut ser = Serializer::new();
    ser.append_string("s", "ab");
    ser.append_binary("b", &[0xFF]);
    let bytes = ser.finish().unwrap();
    assert_eq!(
        bytes,
        [
            0x18, 0x00, 0x00, 0x00, //
            0x02, b's', 0x00, 0x03, 0x00, 0x00, 0x00, b'a', b'b', 0x00, //
            0x05, b'b', 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0xFF, //
            0x00,
        ]
    );
}

#[test]
fn test_array_uses_numeric_keys() {
    let mut ser = Serializer::new();
    ser.append_array_boolean("a", &[true, false]);
    let bytes = ser.finish().unwrap();

    let doc = Document::new(&bytes).unwrap();
    let array = doc.lookup("a").unwrap();
    assert_eq!(array.kind(), ElementType::Array);

    let inner = array.as_array().unwrap();
    let names: Vec<&str> = inner.iter().map(|e| e.unwrap().name()).collect();
    assert_eq!(names, vec!["0", "1"]);
    assert_eq!(inner.lookup("1").unwrap().as_bool(), Ok(false));
}

#[test]
fn test_element_walk() {
    let bytes = sample_document();
    let doc = Document::new(&bytes).unwrap();

    let first = doc.first_element().unwrap();
    assert_eq!(first.name(), "double");
    assert_eq!(first.as_double(), Ok(42.3));

    let second = doc.next_element(&first).unwrap();
    assert_eq!(second.name(), "string");
    assert_eq!(second.as_string(), Ok("hello"));

    let mut last = second;
    while let Ok(next) = doc.next_element(&last) {
        last = next;
    }
    assert_eq!(last.name(), "int64");
    assert_eq!(doc.next_element(&last), Err(Error::NotFound));
    assert_eq!(doc.count_elements(), Ok(7));
}

#[test]
fn test_lookup() {
    let bytes = sample_document();
    let doc = Document::new(&bytes).unwrap();

    assert_eq!(doc.lookup("binary").unwrap().as_binary(), Ok(&[0xDE, 0xAD][..]));
    assert_eq!(doc.lookup("bool").unwrap().as_bool(), Ok(true));
    assert_eq!(
        doc.lookup("datetime").unwrap().as_datetime(),
        Ok(1_700_000_000_000)
    );
    assert_eq!(doc.lookup("int32").unwrap().as_int32(), Ok(-7));
    assert_eq!(doc.lookup("int64").unwrap().as_int64(), Ok(i64::MAX));
    assert_eq!(doc.lookup("missing").map(|e| e.name()), Err(Error::NotFound));
}

#[test]
fn test_type_mismatch_on_access() {
    let bytes = sample_document();
    let doc = Document::new(&bytes).unwrap();

    let int32 = doc.lookup("int32").unwrap();
    assert_eq!(int32.as_int64(), Err(Error::TypeMismatch));
    assert_eq!(int32.as_string(), Err(Error::TypeMismatch));
    assert_eq!(int32.as_document().map(|d| d.size()), Err(Error::TypeMismatch));
}

#[test]
fn test_nested_document() {
    let mut inner = Serializer::new();
    inner.append_int32("x", 1);
    let inner = inner.finish().unwrap();

    let mut outer = Serializer::new();
    outer.append_document("v", &inner);
    outer.append_datetime("t", 10);
    let bytes = outer.finish().unwrap();

    let doc = Document::new(&bytes).unwrap();
    let v = doc.lookup("v").unwrap().as_document().unwrap();
    assert_eq!(v.as_bytes(), &inner[..]);
    assert_eq!(v.lookup("x").unwrap().as_int32(), Ok(1));
    assert_eq!(doc.lookup("t").unwrap().as_datetime(), Ok(10));
}

#[test]
fn test_validity_rejects_short_buffers() {
    assert!(!check_validity(&[]));
    assert!(!check_validity(&[0x05, 0x00, 0x00, 0x00]));
}

#[test]
fn test_validity_rejects_declared_length_past_buffer() {
    let mut bytes = sample_document();
    bytes.truncate(bytes.len() - 1);
    assert!(!check_validity(&bytes));
    assert_eq!(Document::new(&bytes), Err(Error::DocumentMalformed));
}

#[test]
fn test_validity_rejects_missing_terminator() {
    let mut bytes = sample_document();
    let last = bytes.len() - 1;
    bytes[last] = 0x01;
    assert!(!check_validity(&bytes));
}

#[test]
fn test_validity_rejects_tiny_non_empty_document() {
    // Declares 7 bytes with a terminator but cannot hold an element.
    assert!(!check_validity(&[0x07, 0x00, 0x00, 0x00, 0x10, 0x00, 0x00]));
}

#[test]
fn test_validity_rejects_unknown_first_type() {
    let mut bytes = sample_document();
    bytes[4] = 0x7F;
    assert!(!check_validity(&bytes));
}

#[test]
fn test_validity_ignores_trailing_bytes() {
    let mut bytes = sample_document();
    let size = bytes.len();
    bytes.extend_from_slice(&[0xAA, 0xBB]);
    assert!(check_validity(&bytes));
    assert_eq!(Document::new(&bytes).unwrap().size(), size);
}

#[test]
fn test_overrunning_element_is_malformed() {
    // A string element whose length prefix points past the document.
    let bytes = [
        0x0e, 0x00, 0x00, 0x00, //
        0x02, b's', 0x00, 0x40, 0x00, 0x00, 0x00, b'a', 0x00, //
        0x00,
    ];
    let doc = Document::new(&bytes).unwrap();
    assert_eq!(doc.first_element(), Err(Error::DocumentMalformed));
    assert_eq!(doc.lookup("s"), Err(Error::DocumentMalformed));

    let collected: Vec<_> = doc.iter().collect();
    assert_eq!(collected, vec![Err(Error::DocumentMalformed)]);
}

#[test]
fn test_array_helpers() {
    let mut ser = Serializer::new();
    ser.append_array_int32("i", &[1, 2, 3]);
    ser.append_array_int64("l", &[]);
    ser.append_array_double("d", &[0.5]);
    ser.append_array_string("s", &["a", "bc"]);
    ser.append_array_binary("b", &[&[1u8][..], &[2u8, 3][..]]);
    ser.append_array_datetime("t", &[5]);
    let bytes = ser.finish().unwrap();

    let doc = Document::new(&bytes).unwrap();
    let ints = doc.lookup("i").unwrap().as_array().unwrap();
    assert_eq!(ints.count_elements(), Ok(3));
    assert!(doc.lookup("l").unwrap().as_array().unwrap().is_empty());

    let strings = doc.lookup("s").unwrap().as_array().unwrap();
    assert_eq!(strings.lookup("1").unwrap().as_string(), Ok("bc"));

    let blobs = doc.lookup("b").unwrap().as_array().unwrap();
    assert_eq!(blobs.lookup("1").unwrap().as_binary(), Ok(&[2u8, 3][..]));

    let dates = doc.lookup("t").unwrap().as_array().unwrap();
    assert_eq!(dates.first_element().unwrap().kind(), ElementType::DateTime);
}
