//! HyperLogLog++ cardinality sketches with the dual sparse/dense
//! representation, wire-compatible with the BigQuery/ZetaSketch
//! `HyperLogLogPlusUniqueStateProto` envelope.
//!
//! Feed [`HyperLogLogPlusPlus`] uniformly distributed 64-bit hashes; how
//! those hashes are produced is up to the caller.

pub mod encoding;
pub mod error;
pub mod estimator;
pub mod normal;
pub mod protos;
pub mod sparse;
pub mod utils;

pub mod hyperloglogplusplus;

pub use error::SketchError;
pub use hyperloglogplusplus::HyperLogLogPlusPlus;
