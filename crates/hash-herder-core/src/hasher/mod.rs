pub mod pool;
pub mod xxhash;

pub use pool::{HashOutcome, HashPool, HashResult, HashTask, Reorder};
pub use xxhash::{hash_file, hex_digest};
