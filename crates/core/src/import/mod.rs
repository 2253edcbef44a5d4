//! Importers that turn external API descriptions into method definitions.
//!
//! Each importer adds its object types to the shared [`TypeRegistry`] and
//! returns the synthesized methods of one group.
//!
//! [`TypeRegistry`]: crate::registry::TypeRegistry

pub mod openapi;
pub mod solidity;
