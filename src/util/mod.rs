//! Utility types shared by the builder, serializer and reader.
//!
//! - [`Aabb`] - Axis-aligned box with surface area for SAH
//! - [`Error`] / [`Result`] - Error handling
//! - Math type re-exports from glam

mod error;
mod math;

pub use error::*;
pub use math::*;
