//! # SVM runtime
//!
//! The execution engine: the program image, the frame chain, the dispatch
//! loop, and the loader that feeds record streams into it.

pub mod frame;
pub mod image;
pub mod load_error;
pub mod loader;
pub mod machine;
pub mod runtime_error;

pub use machine::{Machine, MachineConfig};
