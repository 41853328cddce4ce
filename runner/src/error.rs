//! Failure taxonomy for compiling, deploying and judging a single program.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, HarnessError>;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("compilation failed: {message}")]
    Compilation { message: String },

    #[error("verification error: {message}")]
    Verification { message: String },

    #[error("deploy error: {code}")]
    Deploy { code: i32 },

    #[error("timeout: no verdict within {}ms", .after.as_millis())]
    Timeout { after: Duration },

    #[error("read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HarnessError {
    pub fn compilation(message: impl Into<String>) -> Self {
        HarnessError::Compilation {
            message: message.into(),
        }
    }

    pub fn verification(message: impl Into<String>) -> Self {
        HarnessError::Verification {
            message: message.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, HarnessError::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_names_the_bound() {
        let err = HarnessError::Timeout {
            after: Duration::from_millis(2000),
        };
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "timeout: no verdict within 2000ms");
    }

    #[test]
    fn deploy_message_carries_code() {
        assert_eq!(HarnessError::Deploy { code: -3 }.to_string(), "deploy error: -3");
    }
}
