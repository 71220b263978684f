//! Single typed values.

use alloc::borrow::Cow;
use alloc::vec::Vec;

use super::MappingType;
use crate::bson::{Element, ElementType, Serializer};
use crate::error::Error;

/// A single value of one of the fourteen mapping types.
///
/// Scalars are stored inline. Strings, blobs and arrays are held in a
/// [`Cow`] so a value either borrows the memory it was built from or owns
/// it, and the two cases cannot be confused.
///
/// # Examples
///
/// ```rust
/// use astarte_device_store::bson::{Document, Serializer};
/// use astarte_device_store::data::{Individual, MappingType};
///
/// let value = Individual::from_double_array(&[1.5, 2.5]);
/// let mut ser = Serializer::new();
/// value.serialize(&mut ser, "v");
/// let bytes = ser.finish().unwrap();
///
/// let doc = Document::new(&bytes).unwrap();
/// let parsed = Individual::deserialize(&doc.lookup("v").unwrap(), MappingType::DoubleArray).unwrap();
/// assert_eq!(parsed, value);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Individual<'a> {
    Integer(i32),
    LongInteger(i64),
    Double(f64),
    String(Cow<'a, str>),
    BinaryBlob(Cow<'a, [u8]>),
    Boolean(bool),
    /// Milliseconds since the Unix epoch.
    DateTime(i64),
    IntegerArray(Cow<'a, [i32]>),
    LongIntegerArray(Cow<'a, [i64]>),
    DoubleArray(Cow<'a, [f64]>),
    StringArray(Vec<Cow<'a, str>>),
    BinaryBlobArray(Vec<Cow<'a, [u8]>>),
    BooleanArray(Cow<'a, [bool]>),
    DateTimeArray(Cow<'a, [i64]>),
}

impl<'a> Individual<'a> {
    pub fn from_integer(value: i32) -> Self {
        Individual::Integer(value)
    }

    pub fn from_longinteger(value: i64) -> Self {
        Individual::LongInteger(value)
    }

    pub fn from_double(value: f64) -> Self {
        Individual::Double(value)
    }

    pub fn from_string(value: &'a str) -> Self {
        Individual::String(Cow::Borrowed(value))
    }

    pub fn from_binary_blob(value: &'a [u8]) -> Self {
        Individual::BinaryBlob(Cow::Borrowed(value))
    }

    pub fn from_boolean(value: bool) -> Self {
        Individual::Boolean(value)
    }

    pub fn from_datetime(value: i64) -> Self {
        Individual::DateTime(value)
    }

    pub fn from_integer_array(values: &'a [i32]) -> Self {
        Individual::IntegerArray(Cow::Borrowed(values))
    }

    pub fn from_longinteger_array(values: &'a [i64]) -> Self {
        Individual::LongIntegerArray(Cow::Borrowed(values))
    }

    pub fn from_double_array(values: &'a [f64]) -> Self {
        Individual::DoubleArray(Cow::Borrowed(values))
    }

    /// Build a string array. The strings are borrowed, only the list of
    /// references is allocated.
    pub fn from_string_array(values: &[&'a str]) -> Self {
        Individual::StringArray(values.iter().map(|s| Cow::Borrowed(*s)).collect())
    }

    /// Build a binary blob array. The blobs are borrowed, only the list of
    /// references is allocated.
    pub fn from_binary_blob_array(values: &[&'a [u8]]) -> Self {
        Individual::BinaryBlobArray(values.iter().map(|b| Cow::Borrowed(*b)).collect())
    }

    pub fn from_boolean_array(values: &'a [bool]) -> Self {
        Individual::BooleanArray(Cow::Borrowed(values))
    }

    pub fn from_datetime_array(values: &'a [i64]) -> Self {
        Individual::DateTimeArray(Cow::Borrowed(values))
    }

    /// Mapping type of the stored value.
    pub fn mapping_type(&self) -> MappingType {
        match self {
            Individual::Integer(_) => MappingType::Integer,
            Individual::LongInteger(_) => MappingType::LongInteger,
            Individual::Double(_) => MappingType::Double,
            Individual::String(_) => MappingType::String,
            Individual::BinaryBlob(_) => MappingType::BinaryBlob,
            Individual::Boolean(_) => MappingType::Boolean,
            Individual::DateTime(_) => MappingType::DateTime,
            Individual::IntegerArray(_) => MappingType::IntegerArray,
            Individual::LongIntegerArray(_) => MappingType::LongIntegerArray,
            Individual::DoubleArray(_) => MappingType::DoubleArray,
            Individual::StringArray(_) => MappingType::StringArray,
            Individual::BinaryBlobArray(_) => MappingType::BinaryBlobArray,
            Individual::BooleanArray(_) => MappingType::BooleanArray,
            Individual::DateTimeArray(_) => MappingType::DateTimeArray,
        }
    }

    /// Copy any borrowed data so the value no longer depends on its source.
    pub fn into_owned(self) -> Individual<'static> {
        match self {
            Individual::Integer(v) => Individual::Integer(v),
            Individual::LongInteger(v) => Individual::LongInteger(v),
            Individual::Double(v) => Individual::Double(v),
            Individual::String(v) => Individual::String(Cow::Owned(v.into_owned())),
            Individual::BinaryBlob(v) => Individual::BinaryBlob(Cow::Owned(v.into_owned())),
            Individual::Boolean(v) => Individual::Boolean(v),
            Individual::DateTime(v) => Individual::DateTime(v),
            Individual::IntegerArray(v) => Individual::IntegerArray(Cow::Owned(v.into_owned())),
            Individual::LongIntegerArray(v) => {
                Individual::LongIntegerArray(Cow::Owned(v.into_owned()))
            }
            Individual::DoubleArray(v) => Individual::DoubleArray(Cow::Owned(v.into_owned())),
            Individual::StringArray(v) => Individual::StringArray(
                v.into_iter()
                    .map(|s| Cow::Owned(s.into_owned()))
                    .collect(),
            ),
            Individual::BinaryBlobArray(v) => Individual::BinaryBlobArray(
                v.into_iter()
                    .map(|b| Cow::Owned(b.into_owned()))
                    .collect(),
            ),
            Individual::BooleanArray(v) => Individual::BooleanArray(Cow::Owned(v.into_owned())),
            Individual::DateTimeArray(v) => {
                Individual::DateTimeArray(Cow::Owned(v.into_owned()))
            }
        }
    }

    pub fn to_integer(&self) -> Result<i32, Error> {
        match self {
            Individual::Integer(v) => Ok(*v),
            _ => Err(Error::TypeMismatch),
        }
    }

    pub fn to_longinteger(&self) -> Result<i64, Error> {
        match self {
            Individual::LongInteger(v) => Ok(*v),
            _ => Err(Error::TypeMismatch),
        }
    }

    pub fn to_double(&self) -> Result<f64, Error> {
        match self {
            Individual::Double(v) => Ok(*v),
            _ => Err(Error::TypeMismatch),
        }
    }

    pub fn to_str(&self) -> Result<&str, Error> {
        match self {
            Individual::String(v) => Ok(v),
            _ => Err(Error::TypeMismatch),
        }
    }

    pub fn to_binary_blob(&self) -> Result<&[u8], Error> {
        match self {
            Individual::BinaryBlob(v) => Ok(v),
            _ => Err(Error::TypeMismatch),
        }
    }

    pub fn to_boolean(&self) -> Result<bool, Error> {
        match self {
            Individual::Boolean(v) => Ok(*v),
            _ => Err(Error::TypeMismatch),
        }
    }

    pub fn to_datetime(&self) -> Result<i64, Error> {
        match self {
            Individual::DateTime(v) => Ok(*v),
            _ => Err(Error::TypeMismatch),
        }
    }

    pub fn to_integer_array(&self) -> Result<&[i32], Error> {
        match self {
            Individual::IntegerArray(v) => Ok(v),
            _ => Err(Error::TypeMismatch),
        }
    }

    pub fn to_longinteger_array(&self) -> Result<&[i64], Error> {
        match self {
            Individual::LongIntegerArray(v) => Ok(v),
            _ => Err(Error::TypeMismatch),
        }
    }

    pub fn to_double_array(&self) -> Result<&[f64], Error> {
        match self {
            Individual::DoubleArray(v) => Ok(v),
            _ => Err(Error::TypeMismatch),
        }
    }

    pub fn to_string_array(&self) -> Result<&[Cow<'a, str>], Error> {
        match self {
            Individual::StringArray(v) => Ok(v),
            _ => Err(Error::TypeMismatch),
        }
    }

    pub fn to_binary_blob_array(&self) -> Result<&[Cow<'a, [u8]>], Error> {
        match self {
            Individual::BinaryBlobArray(v) => Ok(v),
            _ => Err(Error::TypeMismatch),
        }
    }

    pub fn to_boolean_array(&self) -> Result<&[bool], Error> {
        match self {
            Individual::BooleanArray(v) => Ok(v),
            _ => Err(Error::TypeMismatch),
        }
    }

    pub fn to_datetime_array(&self) -> Result<&[i64], Error> {
        match self {
            Individual::DateTimeArray(v) => Ok(v),
            _ => Err(Error::TypeMismatch),
        }
    }

    /// Append the value to `ser` as an element called `key`.
    pub fn serialize(&self, ser: &mut Serializer, key: &str) {
        match self {
            Individual::Integer(v) => ser.append_int32(key, *v),
            Individual::LongInteger(v) => ser.append_int64(key, *v),
            Individual::Double(v) => ser.append_double(key, *v),
            Individual::String(v) => ser.append_string(key, v),
            Individual::BinaryBlob(v) => ser.append_binary(key, v),
            Individual::Boolean(v) => ser.append_boolean(key, *v),
            Individual::DateTime(v) => ser.append_datetime(key, *v),
            Individual::IntegerArray(v) => ser.append_array_int32(key, v),
            Individual::LongIntegerArray(v) => ser.append_array_int64(key, v),
            Individual::DoubleArray(v) => ser.append_array_double(key, v),
            Individual::StringArray(v) => ser.append_array_string(key, v),
            Individual::BinaryBlobArray(v) => ser.append_array_binary(key, v),
            Individual::BooleanArray(v) => ser.append_array_boolean(key, v),
            Individual::DateTimeArray(v) => ser.append_array_datetime(key, v),
        }
    }

    /// Read `element` as a value of `mapping_type`.
    ///
    /// Strings and blobs borrow the buffer of the document `element` comes
    /// from. Array storage is always owned.
    ///
    /// # Arguments
    ///
    /// * `element` - Element holding the value
    /// * `mapping_type` - Expected type, usually taken from the interface
    ///
    /// # Returns
    ///
    /// The decoded value. An empty wire array decodes to an empty array of
    /// the requested type.
    ///
    /// # Errors
    ///
    /// - [`Error::TypeMismatch`] if the wire type is not compatible with
    ///   `mapping_type`, or the first array element is not
    /// - [`Error::ArrayHeterogeneous`] if an array element has a different
    ///   wire type than the first one
    /// - [`Error::DocumentMalformed`] if the element cannot be decoded
    pub fn deserialize(element: &Element<'a>, mapping_type: MappingType) -> Result<Self, Error> {
        if mapping_type.is_array() {
            deserialize_array(element, mapping_type)
        } else {
            deserialize_scalar(element, mapping_type)
        }
    }
}

fn deserialize_scalar<'a>(
    element: &Element<'a>,
    mapping_type: MappingType,
) -> Result<Individual<'a>, Error> {
    if !mapping_type.is_compatible_with(element.kind()) {
        warn!("Element type is not compatible with {}", mapping_type.as_str());
        return Err(Error::TypeMismatch);
    }
    let value = match mapping_type {
        MappingType::Integer => Individual::Integer(element.as_int32()?),
        MappingType::LongInteger => Individual::LongInteger(read_longinteger(element)?),
        MappingType::Double => Individual::Double(element.as_double()?),
        MappingType::String => Individual::String(Cow::Borrowed(element.as_string()?)),
        MappingType::BinaryBlob => Individual::BinaryBlob(Cow::Borrowed(element.as_binary()?)),
        MappingType::Boolean => Individual::Boolean(element.as_bool()?),
        MappingType::DateTime => Individual::DateTime(element.as_datetime()?),
        _ => return Err(Error::InternalError),
    };
    Ok(value)
}

fn deserialize_array<'a>(
    element: &Element<'a>,
    mapping_type: MappingType,
) -> Result<Individual<'a>, Error> {
    let scalar = mapping_type.array_to_scalar()?;
    let value = match mapping_type {
        MappingType::IntegerArray => {
            Individual::IntegerArray(Cow::Owned(collect(element, scalar, Element::as_int32)?))
        }
        MappingType::LongIntegerArray => {
            Individual::LongIntegerArray(Cow::Owned(collect(element, scalar, read_longinteger)?))
        }
        MappingType::DoubleArray => {
            Individual::DoubleArray(Cow::Owned(collect(element, scalar, Element::as_double)?))
        }
        MappingType::StringArray => Individual::StringArray(collect(element, scalar, |e| {
            e.as_string().map(Cow::Borrowed)
        })?),
        MappingType::BinaryBlobArray => Individual::BinaryBlobArray(collect(element, scalar, |e| {
            e.as_binary().map(Cow::Borrowed)
        })?),
        MappingType::BooleanArray => {
            Individual::BooleanArray(Cow::Owned(collect(element, scalar, Element::as_bool)?))
        }
        MappingType::DateTimeArray => {
            Individual::DateTimeArray(Cow::Owned(collect(element, scalar, Element::as_datetime)?))
        }
        _ => return Err(Error::InternalError),
    };
    Ok(value)
}

/// Walk a wire array once, checking types as elements are read.
///
/// The first element must be compatible with `scalar`; every other element
/// must then share the first element's wire type.
fn collect<'a, T>(
    element: &Element<'a>,
    scalar: MappingType,
    read: impl Fn(&Element<'a>) -> Result<T, Error>,
) -> Result<Vec<T>, Error> {
    if element.kind() != ElementType::Array {
        warn!("Expected an array for {}", scalar.as_str());
        return Err(Error::TypeMismatch);
    }
    let array = element.as_array()?;

    let mut values = Vec::new();
    let mut first_kind = None;
    for item in array.iter() {
        let item = item?;
        match first_kind {
            None => {
                if !scalar.is_compatible_with(item.kind()) {
                    warn!("Array element type is not compatible with {}", scalar.as_str());
                    return Err(Error::TypeMismatch);
                }
                first_kind = Some(item.kind());
            }
            Some(kind) if kind != item.kind() => {
                warn!("Array of {} holds elements of different types", scalar.as_str());
                return Err(Error::ArrayHeterogeneous);
            }
            Some(_) => {}
        }
        values.try_reserve(1).map_err(|_| Error::OutOfMemory)?;
        values.push(read(&item)?);
    }
    Ok(values)
}

fn read_longinteger(element: &Element<'_>) -> Result<i64, Error> {
    match element.kind() {
        ElementType::Int32 => element.as_int32().map(i64::from),
        _ => element.as_int64(),
    }
}
