//! Zero-copy reader for binary documents.
//!
//! A [`Document`] borrows the buffer it was created from and every
//! [`Element`] handed out borrows the same buffer. Nothing is copied until a
//! caller converts an element into an owned value.

use super::{EMPTY_DOCUMENT_SIZE, ElementType, LEN_PREFIX_SIZE};
use crate::error::Error;

/// Smallest non-empty document: prefix, type, empty name, one payload byte
/// and the terminator.
const MIN_NON_EMPTY_SIZE: usize = LEN_PREFIX_SIZE + 3 + 1;

/// Check that `buf` holds a well formed document.
///
/// This must be called on any buffer of untrusted origin before looking at
/// its elements. The checks are, in order:
///
/// 1. the buffer holds at least an empty document (5 bytes)
/// 2. the declared length fits in the buffer and covers at least 5 bytes
/// 3. the byte at the end of the declared length is the `0x00` terminator
/// 4. a non-empty document is at least 8 bytes long
/// 5. the first element has a supported type tag
///
/// The buffer may be longer than the declared length; trailing bytes are
/// ignored.
///
/// # Examples
///
/// ```rust
/// use astarte_device_store::bson::check_validity;
///
/// assert!(check_validity(&[0x05, 0, 0, 0, 0]));
/// // Declared length larger than the buffer
/// assert!(!check_validity(&[0x06, 0, 0, 0, 0]));
/// // Missing terminator
/// assert!(!check_validity(&[0x05, 0, 0, 0, 1]));
/// ```
pub fn check_validity(buf: &[u8]) -> bool {
    if buf.len() < EMPTY_DOCUMENT_SIZE {
        warn!("Buffer too small: no document found");
        return false;
    }
    let declared = match read_u32(buf, 0) {
        Some(len) => len as usize,
        None => return false,
    };
    if buf.len() < declared {
        warn!(
            "Buffer of {} bytes is smaller than the declared document size {}",
            buf.len(),
            declared
        );
        return false;
    }
    if declared < EMPTY_DOCUMENT_SIZE {
        warn!("Declared document size {} is below the minimum", declared);
        return false;
    }
    if buf[declared - 1] != 0 {
        warn!("Document is not terminated by a null byte");
        return false;
    }
    if declared == EMPTY_DOCUMENT_SIZE {
        return true;
    }
    if declared < MIN_NON_EMPTY_SIZE {
        warn!("Document data too small");
        return false;
    }
    if ElementType::from_u8(buf[LEN_PREFIX_SIZE]).is_none() {
        warn!("Unrecognized document first type {}", buf[LEN_PREFIX_SIZE]);
        return false;
    }
    true
}

/// A validated document borrowing its source buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Document<'a> {
    bytes: &'a [u8],
}

impl<'a> Document<'a> {
    /// Validate `buf` with [`check_validity`] and borrow it as a document.
    ///
    /// The document covers exactly the declared length; any trailing bytes
    /// in `buf` are ignored.
    ///
    /// # Errors
    ///
    /// [`Error::DocumentMalformed`] if the buffer fails validation.
    pub fn new(buf: &'a [u8]) -> Result<Self, Error> {
        if !check_validity(buf) {
            return Err(Error::DocumentMalformed);
        }
        let declared = read_u32(buf, 0).ok_or(Error::DocumentMalformed)? as usize;
        Ok(Self {
            bytes: &buf[..declared],
        })
    }

    /// Encoded bytes of the document, length prefix and terminator included.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Total encoded size in bytes.
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.len() == EMPTY_DOCUMENT_SIZE
    }

    /// First element of the document.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] for an empty document
    /// - [`Error::DocumentMalformed`] if the element overruns the document
    pub fn first_element(&self) -> Result<Element<'a>, Error> {
        self.element_at(LEN_PREFIX_SIZE)
    }

    /// Element following `current`.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] when `current` is the last element
    /// - [`Error::DocumentMalformed`] if the element overruns the document
    pub fn next_element(&self, current: &Element<'a>) -> Result<Element<'a>, Error> {
        self.element_at(current.end)
    }

    /// Find the first element called `name`.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if no element has that name
    /// - [`Error::DocumentMalformed`] if the walk hits a malformed element
    pub fn lookup(&self, name: &str) -> Result<Element<'a>, Error> {
        for element in self.iter() {
            let element = element?;
            if element.name == name {
                return Ok(element);
            }
        }
        Err(Error::NotFound)
    }

    /// Walk the elements in order.
    pub fn iter(&self) -> Elements<'a> {
        Elements {
            doc: *self,
            next: LEN_PREFIX_SIZE,
            done: false,
        }
    }

    /// Count the elements of the document.
    pub fn count_elements(&self) -> Result<usize, Error> {
        self.iter().try_fold(0, |count, element| element.map(|_| count + 1))
    }

    fn element_at(&self, pos: usize) -> Result<Element<'a>, Error> {
        // The list of elements ends right before the terminator.
        let list_end = self.bytes.len() - 1;
        if pos >= list_end {
            return Err(Error::NotFound);
        }

        let tag = self.bytes[pos];
        let kind = ElementType::from_u8(tag).ok_or_else(|| {
            warn!("Unrecognized element type {}", tag);
            Error::DocumentMalformed
        })?;

        let name_start = pos + 1;
        let name_len = self.bytes[name_start..list_end]
            .iter()
            .position(|b| *b == 0)
            .ok_or(Error::DocumentMalformed)?;
        let name = core::str::from_utf8(&self.bytes[name_start..name_start + name_len])
            .map_err(|_| Error::DocumentMalformed)?;

        let value_start = name_start + name_len + 1;
        let prefixed = |extra: usize| {
            read_u32(self.bytes, value_start)
                .and_then(|len| (len as usize).checked_add(extra))
                .ok_or(Error::DocumentMalformed)
        };
        let value_size = match kind {
            ElementType::String => prefixed(4)?,
            ElementType::Document | ElementType::Array => prefixed(0)?,
            ElementType::Binary => prefixed(4 + 1)?,
            ElementType::Int32 => 4,
            ElementType::Double | ElementType::DateTime | ElementType::Int64 => 8,
            ElementType::Boolean => 1,
        };
        let value_end = value_start
            .checked_add(value_size)
            .filter(|end| *end <= list_end)
            .ok_or_else(|| {
                warn!("Element {} overruns the document", name);
                Error::DocumentMalformed
            })?;

        Ok(Element {
            kind,
            name,
            value: &self.bytes[value_start..value_end],
            end: value_end,
        })
    }
}

impl<'a> IntoIterator for &Document<'a> {
    type Item = Result<Element<'a>, Error>;
    type IntoIter = Elements<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the elements of a [`Document`].
///
/// Yields `Err` at most once, for the first malformed element, and stops.
#[derive(Debug, Clone)]
pub struct Elements<'a> {
    doc: Document<'a>,
    next: usize,
    done: bool,
}

impl<'a> Iterator for Elements<'a> {
    type Item = Result<Element<'a>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.doc.element_at(self.next) {
            Ok(element) => {
                self.next = element.end;
                Some(Ok(element))
            }
            Err(Error::NotFound) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

/// A single named element of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Element<'a> {
    kind: ElementType,
    name: &'a str,
    value: &'a [u8],
    end: usize,
}

impl<'a> Element<'a> {
    /// Wire type of the element.
    pub fn kind(&self) -> ElementType {
        self.kind
    }

    pub fn name(&self) -> &'a str {
        self.name
    }

    /// Raw payload bytes, without type tag and name.
    pub fn raw_value(&self) -> &'a [u8] {
        self.value
    }

    pub fn as_double(&self) -> Result<f64, Error> {
        self.expect(ElementType::Double)?;
        Ok(f64::from_le_bytes(self.fixed()?))
    }

    pub fn as_int32(&self) -> Result<i32, Error> {
        self.expect(ElementType::Int32)?;
        Ok(i32::from_le_bytes(self.fixed()?))
    }

    pub fn as_int64(&self) -> Result<i64, Error> {
        self.expect(ElementType::Int64)?;
        Ok(i64::from_le_bytes(self.fixed()?))
    }

    /// Milliseconds since the Unix epoch.
    pub fn as_datetime(&self) -> Result<i64, Error> {
        self.expect(ElementType::DateTime)?;
        Ok(i64::from_le_bytes(self.fixed()?))
    }

    pub fn as_bool(&self) -> Result<bool, Error> {
        self.expect(ElementType::Boolean)?;
        let [byte] = self.fixed()?;
        Ok(byte != 0)
    }

    /// Borrow the string payload, without its terminator.
    pub fn as_string(&self) -> Result<&'a str, Error> {
        self.expect(ElementType::String)?;
        // The payload is the u32 length, the bytes and a NUL, and the length
        // prefix already sized the payload when the element was parsed.
        match self.value.split_last() {
            Some((0, body)) if body.len() >= 4 => {
                core::str::from_utf8(&body[4..]).map_err(|_| Error::DocumentMalformed)
            }
            _ => Err(Error::DocumentMalformed),
        }
    }

    /// Borrow the binary payload, skipping length and subtype.
    pub fn as_binary(&self) -> Result<&'a [u8], Error> {
        self.expect(ElementType::Binary)?;
        self.value.get(5..).ok_or(Error::DocumentMalformed)
    }

    pub fn as_document(&self) -> Result<Document<'a>, Error> {
        self.expect(ElementType::Document)?;
        Document::new(self.value)
    }

    pub fn as_array(&self) -> Result<Document<'a>, Error> {
        self.expect(ElementType::Array)?;
        Document::new(self.value)
    }

    fn expect(&self, kind: ElementType) -> Result<(), Error> {
        if self.kind == kind {
            Ok(())
        } else {
            Err(Error::TypeMismatch)
        }
    }

    fn fixed<const N: usize>(&self) -> Result<[u8; N], Error> {
        self.value.try_into().map_err(|_| Error::DocumentMalformed)
    }
}

fn read_u32(buf: &[u8], at: usize) -> Option<u32> {
    let bytes = buf.get(at..at.checked_add(4)?)?;
    Some(u32::from_le_bytes(bytes.try_into().ok()?))
}
