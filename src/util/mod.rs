//! Utility types and functions shared by the UDM reader and the decoders.
//!
//! - [`Type`] - the fixed tag table of the document format
//! - [`UdmPod`] - packed value types readable from array payloads
//! - [`Error`] / [`Result`] - Error handling
//! - Math re-exports from glam plus transform/color records

mod pod;
mod error;
mod math;

pub use pod::*;
pub use error::*;
pub use math::*;
