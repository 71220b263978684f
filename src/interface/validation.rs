//! Checks applied to values before they are sent or after they are received.

use super::{Interface, Mapping};
use crate::data::{Individual, ObjectEntry};
use crate::error::Error;

/// Validation of data against the interface it belongs to.
///
/// Timestamps are passed as `Some` when the value carries an explicit one.
pub trait Validate {
    /// Check a value streamed on an individual datastream.
    fn validate_individual(
        &self,
        interface: &Interface,
        path: &str,
        value: &Individual<'_>,
        timestamp: Option<i64>,
    ) -> Result<(), Error>;

    /// Check the entries of an object streamed on `path`.
    fn validate_aggregate(
        &self,
        interface: &Interface,
        path: &str,
        entries: &[ObjectEntry<'_>],
        timestamp: Option<i64>,
    ) -> Result<(), Error>;

    /// Check a property value. Properties never carry a timestamp.
    fn validate_property_set(
        &self,
        interface: &Interface,
        path: &str,
        value: &Individual<'_>,
    ) -> Result<(), Error> {
        self.validate_individual(interface, path, value, None)
    }

    /// Check a property may be unset.
    fn validate_property_unset(&self, interface: &Interface, path: &str) -> Result<(), Error>;
}

/// [`Validate`] implementation driven by the interface mappings.
///
/// - the path must match a mapping, else [`Error::MappingNotFound`]
/// - the value type must equal the mapping type and doubles must be finite,
///   else [`Error::TypeMismatch`]
/// - a timestamp must be given if and only if the mapping requires one
/// - an unset needs `allow_unset`, else [`Error::UnsetNotAllowed`]
#[derive(Debug, Clone, Copy, Default)]
pub struct MappingValidator;

impl Validate for MappingValidator {
    fn validate_individual(
        &self,
        interface: &Interface,
        path: &str,
        value: &Individual<'_>,
        timestamp: Option<i64>,
    ) -> Result<(), Error> {
        let mapping = interface.mapping_for_path(path).inspect_err(|_| {
            error!(
                "Can't find mapping in interface {} for path {}",
                interface.name.as_str(),
                path
            );
        })?;
        check_value(mapping, value)?;
        check_timestamp(mapping, timestamp)
    }

    fn validate_aggregate(
        &self,
        interface: &Interface,
        path: &str,
        entries: &[ObjectEntry<'_>],
        timestamp: Option<i64>,
    ) -> Result<(), Error> {
        for entry in entries {
            let mapping = interface.mapping_for_paths(path, entry.path)?;
            check_value(mapping, &entry.value).inspect_err(|_| {
                error!(
                    "Object entry {} of {} failed validation",
                    entry.path,
                    interface.name.as_str()
                );
            })?;
            check_timestamp(mapping, timestamp)?;
        }
        Ok(())
    }

    fn validate_property_unset(&self, interface: &Interface, path: &str) -> Result<(), Error> {
        let mapping = interface.mapping_for_path(path)?;
        if !mapping.allow_unset {
            error!(
                "Unset is not allowed for interface {}, path {}",
                interface.name.as_str(),
                path
            );
            return Err(Error::UnsetNotAllowed);
        }
        Ok(())
    }
}

fn check_value(mapping: &Mapping, value: &Individual<'_>) -> Result<(), Error> {
    if value.mapping_type() != mapping.mapping_type {
        error!(
            "Value of type {} does not match mapping type {}",
            value.mapping_type().as_str(),
            mapping.mapping_type.as_str()
        );
        return Err(Error::TypeMismatch);
    }
    let finite = match value {
        Individual::Double(v) => v.is_finite(),
        Individual::DoubleArray(values) => values.iter().all(|v| v.is_finite()),
        _ => true,
    };
    if !finite {
        error!("Double value is not a finite number");
        return Err(Error::TypeMismatch);
    }
    Ok(())
}

fn check_timestamp(mapping: &Mapping, timestamp: Option<i64>) -> Result<(), Error> {
    match (mapping.explicit_timestamp, timestamp) {
        (true, None) => {
            error!("Explicit timestamp required for {}", mapping.endpoint.as_str());
            Err(Error::ExplicitTimestampRequired)
        }
        (false, Some(_)) => {
            error!("Explicit timestamp not supported for {}", mapping.endpoint.as_str());
            Err(Error::ExplicitTimestampNotSupported)
        }
        _ => Ok(()),
    }
}
