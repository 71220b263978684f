//! Append-only builder for binary documents.

use alloc::vec::Vec;
use core::fmt::Write as _;

use heapless::String;

use super::{BINARY_SUBTYPE_GENERIC, ElementType, LEN_PREFIX_SIZE};
use crate::error::Error;

/// Largest document length that can be encoded in the signed length prefix.
pub const MAX_DOCUMENT_SIZE: usize = i32::MAX as usize;

/// Builder for a single binary document.
///
/// Elements are appended in order. [`Serializer::finish`] writes the
/// terminator, backfills the length prefix and hands back the encoded bytes.
/// Since `finish` consumes the builder, nothing can be appended to a
/// document once it has been terminated.
///
/// Appends never fail. An allocation failure, or a nested array that cannot
/// be encoded, is remembered and reported by [`Serializer::finish`].
///
/// # Examples
///
/// ```rust
/// use astarte_device_store::bson::Serializer;
///
/// let mut ser = Serializer::new();
/// ser.append_boolean("ok", true);
/// let bytes = ser.finish().unwrap();
/// assert_eq!(bytes, [0x0a, 0, 0, 0, 0x08, b'o', b'k', 0, 0x01, 0x00]);
/// ```
#[derive(Debug, Clone)]
pub struct Serializer {
    buf: Vec<u8>,
    failure: Option<Error>,
}

impl Default for Serializer {
    fn default() -> Self {
        Self::new()
    }
}

impl Serializer {
    /// Start an empty document.
    pub fn new() -> Self {
        let mut ser = Self {
            buf: Vec::new(),
            failure: None,
        };
        ser.extend(&[0u8; LEN_PREFIX_SIZE]);
        ser
    }

    /// Number of bytes written so far, length prefix included.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns `true` when no element has been appended yet.
    pub fn is_empty(&self) -> bool {
        self.buf.len() == LEN_PREFIX_SIZE
    }

    pub fn append_double(&mut self, name: &str, value: f64) {
        self.header(ElementType::Double, name);
        self.extend(&value.to_le_bytes());
    }

    pub fn append_int32(&mut self, name: &str, value: i32) {
        self.header(ElementType::Int32, name);
        self.extend(&value.to_le_bytes());
    }

    pub fn append_int64(&mut self, name: &str, value: i64) {
        self.header(ElementType::Int64, name);
        self.extend(&value.to_le_bytes());
    }

    /// Append a UTF-8 string. The length prefix counts the trailing NUL.
    pub fn append_string(&mut self, name: &str, value: &str) {
        self.header(ElementType::String, name);
        let len = (value.len() + 1) as u32;
        self.extend(&len.to_le_bytes());
        self.extend(value.as_bytes());
        self.extend(&[0]);
    }

    /// Append a generic binary blob (subtype `0x00`).
    pub fn append_binary(&mut self, name: &str, value: &[u8]) {
        self.header(ElementType::Binary, name);
        self.extend(&(value.len() as u32).to_le_bytes());
        self.extend(&[BINARY_SUBTYPE_GENERIC]);
        self.extend(value);
    }

    pub fn append_boolean(&mut self, name: &str, value: bool) {
        self.header(ElementType::Boolean, name);
        self.extend(&[u8::from(value)]);
    }

    /// Append a timestamp expressed in milliseconds since the Unix epoch.
    pub fn append_datetime(&mut self, name: &str, value: i64) {
        self.header(ElementType::DateTime, name);
        self.extend(&value.to_le_bytes());
    }

    /// Append an already terminated document as a sub-document.
    pub fn append_document(&mut self, name: &str, document: &[u8]) {
        self.header(ElementType::Document, name);
        self.extend(document);
    }

    pub fn append_array_double(&mut self, name: &str, values: &[f64]) {
        self.append_array(name, values, |ser, key, v| ser.append_double(key, *v));
    }

    pub fn append_array_int32(&mut self, name: &str, values: &[i32]) {
        self.append_array(name, values, |ser, key, v| ser.append_int32(key, *v));
    }

    pub fn append_array_int64(&mut self, name: &str, values: &[i64]) {
        self.append_array(name, values, |ser, key, v| ser.append_int64(key, *v));
    }

    pub fn append_array_string<S: AsRef<str>>(&mut self, name: &str, values: &[S]) {
        self.append_array(name, values, |ser, key, v| {
            ser.append_string(key, v.as_ref())
        });
    }

    pub fn append_array_binary<B: AsRef<[u8]>>(&mut self, name: &str, values: &[B]) {
        self.append_array(name, values, |ser, key, v| {
            ser.append_binary(key, v.as_ref())
        });
    }

    pub fn append_array_boolean(&mut self, name: &str, values: &[bool]) {
        self.append_array(name, values, |ser, key, v| ser.append_boolean(key, *v));
    }

    pub fn append_array_datetime(&mut self, name: &str, values: &[i64]) {
        self.append_array(name, values, |ser, key, v| ser.append_datetime(key, *v));
    }

    /// Terminate the document and return its encoded bytes.
    ///
    /// # Errors
    ///
    /// - [`Error::OutOfMemory`] if any append could not grow the buffer
    /// - [`Error::DocumentTooLarge`] if the document exceeds
    ///   [`MAX_DOCUMENT_SIZE`]
    pub fn finish(mut self) -> Result<Vec<u8>, Error> {
        self.extend(&[0]);
        if let Some(err) = self.failure {
            error!("Document serialization failed: {}", err);
            return Err(err);
        }
        let len = self.buf.len();
        if len > MAX_DOCUMENT_SIZE {
            error!("Document of {} bytes is too large", len);
            return Err(Error::DocumentTooLarge);
        }
        self.buf[..LEN_PREFIX_SIZE].copy_from_slice(&(len as u32).to_le_bytes());
        Ok(self.buf)
    }

    fn append_array<T>(
        &mut self,
        name: &str,
        values: &[T],
        mut append: impl FnMut(&mut Serializer, &str, &T),
    ) {
        let mut inner = Serializer::new();
        for (idx, value) in values.iter().enumerate() {
            let key = index_key(idx);
            append(&mut inner, &key, value);
        }
        match inner.finish() {
            Ok(doc) => {
                self.header(ElementType::Array, name);
                self.extend(&doc);
            }
            Err(err) => self.failure = Some(err),
        }
    }

    fn header(&mut self, kind: ElementType, name: &str) {
        self.extend(&[kind as u8]);
        self.extend(name.as_bytes());
        self.extend(&[0]);
    }

    fn extend(&mut self, bytes: &[u8]) {
        if self.failure.is_some() {
            return;
        }
        if self.buf.try_reserve(bytes.len()).is_err() {
            self.failure = Some(Error::OutOfMemory);
            return;
        }
        self.buf.extend_from_slice(bytes);
    }
}

/// Decimal element name for the array entry at `idx`.
pub(crate) fn index_key(idx: usize) -> String<20> {
    let mut key = String::new();
    // 20 digits hold any usize.
    let _ = write!(key, "{}", idx);
    key
}
