//! Domain services

mod signature_catalog;

pub use signature_catalog::{Signature, SignatureCatalog};
