//! The set of interfaces a device declares.

use alloc::vec::Vec;
use core::fmt;

use super::Interface;
use crate::error::Error;

/// Ordered collection of the interfaces of a device, unique by name.
///
/// Its [`Display`](fmt::Display) rendering is the introspection string sent
/// to Astarte, `name:major:minor` entries separated by `;`:
///
/// ```rust
/// use astarte_device_store::data::MappingType;
/// use astarte_device_store::interface::{
///     Aggregation, Interface, InterfaceType, Introspection, Mapping, Ownership,
/// };
///
/// let sensors = Interface {
///     name: "org.example.Sensors".into(),
///     major_version: 1,
///     minor_version: 2,
///     ownership: Ownership::Device,
///     interface_type: InterfaceType::Datastream,
///     aggregation: Aggregation::Individual,
///     mappings: vec![Mapping::new("/%{id}/value", MappingType::Double)],
/// };
/// let mut settings = sensors.clone();
/// settings.name = "org.example.Settings".into();
/// settings.major_version = 0;
///
/// let mut introspection = Introspection::new();
/// introspection.add(sensors).unwrap();
/// introspection.add(settings).unwrap();
/// assert_eq!(
///     introspection.to_string(),
///     "org.example.Sensors:1:2;org.example.Settings:0:2"
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Introspection {
    interfaces: Vec<Interface>,
}

impl Introspection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an interface not yet in the introspection.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidParameter`] if the interface is not valid
    /// - [`Error::InterfaceConflicting`] if an interface with the same name
    ///   is already present; use [`Introspection::update`] to replace it
    pub fn add(&mut self, interface: Interface) -> Result<(), Error> {
        interface.validate()?;
        if self.position(&interface.name).is_some() {
            error!("Interface {} is already present", interface.name.as_str());
            return Err(Error::InterfaceConflicting);
        }
        self.push(interface)
    }

    /// Add an interface, or replace the one with the same name by a newer
    /// version of it.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidParameter`] if the interface is not valid
    /// - [`Error::InterfaceConflicting`] if the present interface has a
    ///   different ownership or type, or a version not older than the new one
    pub fn update(&mut self, interface: Interface) -> Result<(), Error> {
        interface.validate()?;
        let Some(index) = self.position(&interface.name) else {
            return self.push(interface);
        };

        let old = &self.interfaces[index];
        warn!("Interface {} is already present", interface.name.as_str());
        if old.ownership != interface.ownership || old.interface_type != interface.interface_type {
            error!("Interface ownership or type conflicts with the one in introspection");
            return Err(Error::InterfaceConflicting);
        }
        if interface.major_version < old.major_version {
            error!("Interface has a smaller major version than the one in introspection");
            return Err(Error::InterfaceConflicting);
        }
        if interface.major_version == old.major_version
            && interface.minor_version <= old.minor_version
        {
            error!("Interface has the same major and an older or equal minor version");
            return Err(Error::InterfaceConflicting);
        }

        warn!(
            "Interface {} updated to version {}.{}",
            interface.name.as_str(),
            interface.major_version,
            interface.minor_version
        );
        self.interfaces[index] = interface;
        Ok(())
    }

    /// Look an interface up by name.
    pub fn get(&self, name: &str) -> Option<&Interface> {
        self.interfaces.iter().find(|interface| interface.name == name)
    }

    /// Remove an interface and hand it back.
    ///
    /// # Errors
    ///
    /// [`Error::InterfaceNotFound`] if no interface is called `name`.
    pub fn remove(&mut self, name: &str) -> Result<Interface, Error> {
        let index = self.position(name).ok_or(Error::InterfaceNotFound)?;
        Ok(self.interfaces.remove(index))
    }

    pub fn iter(&self) -> core::slice::Iter<'_, Interface> {
        self.interfaces.iter()
    }

    pub fn len(&self) -> usize {
        self.interfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.interfaces
            .iter()
            .position(|interface| interface.name == name)
    }

    fn push(&mut self, interface: Interface) -> Result<(), Error> {
        self.interfaces
            .try_reserve(1)
            .map_err(|_| Error::OutOfMemory)?;
        self.interfaces.push(interface);
        Ok(())
    }
}

impl<'a> IntoIterator for &'a Introspection {
    type Item = &'a Interface;
    type IntoIter = core::slice::Iter<'a, Interface>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Display for Introspection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, interface) in self.interfaces.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            write!(
                f,
                "{}:{}:{}",
                interface.name, interface.major_version, interface.minor_version
            )?;
        }
        Ok(())
    }
}
