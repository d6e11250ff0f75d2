use thiserror::Error;

/// Construction-time precondition violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("minimum node capacity must be at least 2, got {0}")]
    MinCapacity(usize),

    #[error("maximum node capacity {max} is smaller than the minimum capacity {min}")]
    CapacityOrder { min: usize, max: usize },
}
