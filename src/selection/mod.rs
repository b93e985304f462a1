//! Winner selection and the seal workflow

pub mod service;

pub use service::{RunSelectionResult, SaveResult, SealResult, SelectionService, UnsealResult};
