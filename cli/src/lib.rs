pub mod extract;
pub mod list_boundaries;
pub mod publish;

pub use extract::{extract, Extract};
pub use list_boundaries::{list_boundaries, ListBoundaries};
