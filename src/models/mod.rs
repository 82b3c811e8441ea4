//! Data models for quotes, normalized chains and density surfaces
//!
//! This module contains the immutable values passed between pipeline
//! stages: raw quotes, the canonical strike grid, normalized chains,
//! density samples, the resampled surface and the flat output records.

mod chain;
mod density;
mod export;
mod option;
mod record;

pub use chain::*;
pub use density::*;
pub use export::*;
pub use option::*;
pub use record::*;
