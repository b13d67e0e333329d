pub mod cancel;
pub mod db;
pub mod error;
pub mod kernels;
pub mod operations;
pub mod tensor;

pub use cancel::CancelToken;
pub use db::TensorDb;
pub use error::EngineError;
pub use kernels::{Activation, Reduction};
pub use operations::{apply, Operation};
pub use tensor::{broadcast_shapes, TensorValue, MAX_SLICE_ELEMENTS};
