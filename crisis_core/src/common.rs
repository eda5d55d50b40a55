mod var_batch;

pub use var_batch::{VarBatch, VarBatchError};

/// Clamps a mirrored counter to its display maximum.
pub fn capped(value: u32, max: u32) -> u32 {
    value.min(max)
}
