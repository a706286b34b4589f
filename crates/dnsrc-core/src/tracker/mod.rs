// # Record Tracker Implementations
//
// Concrete implementations of the `RecordTracker` trait.

pub mod file;
pub mod memory;

pub use file::FileRecordTracker;
pub use memory::MemoryRecordTracker;
