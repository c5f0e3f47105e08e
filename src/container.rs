//! In-memory concurrent containers.

mod extendible_hash;

pub use extendible_hash::ExtendibleHashTable;
