use thiserror::Error;

#[derive(Error, Debug)]
pub enum SketchError {
    /// Normal or sparse precision out of range, or `sp < p`.
    #[error("invalid precision: {0}")]
    InvalidPrecision(String),
    /// Imported sparse stream or register file is truncated or inconsistent.
    #[error("corrupt encoding: {0}")]
    CorruptEncoding(String),
    #[error("proto serialization error: {0}")]
    ProtoSerialization(#[from] protobuf::Error),
}
