//! Biocaching server payload shapes
//!
//! This module defines the JSON structures exchanged with the remote API,
//! before normalization into the canonical types of [`crate::types`].

mod raw_observation;
mod response;

pub use raw_observation::*;
pub use response::*;
