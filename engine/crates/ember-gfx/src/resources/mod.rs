pub mod buffer;
pub mod image;
pub mod memory_tier;
