//! Country-scoped extraction of Overture Maps releases.
//!
//! The pipeline resolves an administrative boundary from a local store,
//! streams a remote theme partition through a coarse bounding-box
//! prefilter and writes spatially indexed per-country FlatGeobuf files,
//! optionally cut exactly to the boundary.

pub mod boundary;
pub mod config;
pub mod convert;
pub mod error;
pub mod primitives;
pub mod refine;
pub mod schema;
pub mod theme;
pub mod util;

pub use error::Error;
pub use util::Result;
