use std::time::Duration;

use thiserror::Error;

/// Errors raised while preparing an execution context.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("time limit must be greater than zero")]
    InvalidTimeLimit,
    #[error("memory limit must be greater than zero")]
    InvalidMemoryLimit,
    #[error("unknown capability module \"{0}\"")]
    UnknownCapability(String),
    #[error("failed to set up the execution engine: {0}")]
    Engine(String),
}

/// Errors raised by a single fragment evaluation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecError {
    #[error("time limit exceeded ({}s)", .0.as_secs_f64())]
    Timeout(Duration),
    #[error("{0}")]
    Compile(String),
    #[error("{0}")]
    Runtime(String),
    #[error("resource quota exceeded: {0}")]
    ResourceExceeded(String),
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::timeout(ExecError::Timeout(Duration::from_millis(1500)), "time limit exceeded (1.5s)")]
    #[case::runtime(ExecError::Runtime("division by zero".to_string()), "division by zero")]
    #[case::quota(
        ExecError::ResourceExceeded("memory".to_string()),
        "resource quota exceeded: memory"
    )]
    fn test_display(#[case] err: ExecError, #[case] expected: &str) {
        assert_eq!(err.to_string(), expected);
    }
}
