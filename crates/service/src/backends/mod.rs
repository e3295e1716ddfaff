//! Ready-made storage backends.
//!
//! The cache core does not depend on these; they exist so small tools and
//! tests do not have to write their own for the common cases.

pub mod json_file;
pub mod memory;

pub use json_file::JsonFileBackend;
pub use memory::MemoryBackend;
