pub mod interpolation;
mod plotting;
pub mod polars_utils;
mod probability;

pub use plotting::*;
pub use probability::*;
