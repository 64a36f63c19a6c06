//! discraid - Redundant multi-disc backups
//!
//! This library stripes the numbered slices of a dar archive across sets of
//! optical discs, protecting every group of slices with parchive recovery
//! volumes on dedicated parity discs, and stages whole sets back from disc
//! when an archive is restored.

pub mod config;
pub mod error;
pub mod geometry;
pub mod operator;
pub mod scratch;
pub mod stripe;
pub mod tools;

pub use config::Config;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorKind, Result};
    pub use crate::geometry::{Geometry, NamingScheme};
    pub use crate::stripe::{Phase, ReadScheduler, SliceEvent, WriteScheduler};
}
