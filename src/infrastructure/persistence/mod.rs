//! Recovered-file persistence

mod recovery_writer;

pub use recovery_writer::{validate_destination, RecoveryWriter};
