//! Error type shared by every scheme in this crate
use ark_serialize::SerializationError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("point {point} is not contained in the domain [0, {nitems})")]
    PointOutOfRange { point: usize, nitems: usize },

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("server {server} does not exist in a {nservers}-server scheme")]
    ServerOutOfRange { server: usize, nservers: usize },

    #[error("position {pos} is not contained in a set of size {set_size}")]
    PositionOutOfRange { pos: usize, set_size: usize },

    #[error("buffer has length {actual}, expected {expected}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] SerializationError),
}

pub type Result<T> = std::result::Result<T, Error>;
