pub mod buffer;
pub mod decoder;
pub mod manager;
pub mod output;
pub mod types;

pub use manager::LocalEngine;
