pub mod attributes;
pub mod streaming;
pub mod world_creator;
pub mod stack;

pub use stack::StreamingStackPlugin;
