pub mod difference;
pub mod var_int;

pub use difference::{DifferenceDecoder, DifferenceEncoder};
