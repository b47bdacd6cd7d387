pub mod geometry;
pub mod localizer;
pub mod overlay;
pub mod parse;

pub use geometry::{BoundingBox, GridCell};
pub use localizer::{BboxLocalizer, GridLocalizer, Localizer};
