use std::fmt;

use anyhow::Error;

/// Exit code for configuration errors (bad project, missing files).
pub const EXIT_CONFIG: i32 = 2;
/// Exit code when the external engine is not available.
pub const EXIT_ENVIRONMENT: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodedErrorKind {
    /// Invalid or incomplete project description. Detected before any
    /// external invocation.
    Config,
    /// The external engine is missing or unusable.
    Environment,
    /// An engine stage exited non-zero; its code is propagated verbatim.
    Stage { stage: u32, code: i32 },
}

#[derive(Debug, Clone)]
pub struct CodedError {
    pub code: &'static str,
    pub message: String,
    pub kind: CodedErrorKind,
}

impl CodedError {
    pub fn config(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            kind: CodedErrorKind::Config,
        }
    }

    pub fn environment(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            kind: CodedErrorKind::Environment,
        }
    }

    pub fn stage(stage: u32, exit_code: i32, message: impl Into<String>) -> Self {
        Self {
            code: "engine/stage_failed",
            message: message.into(),
            kind: CodedErrorKind::Stage {
                stage,
                code: exit_code,
            },
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self.kind {
            CodedErrorKind::Config => EXIT_CONFIG,
            CodedErrorKind::Environment => EXIT_ENVIRONMENT,
            CodedErrorKind::Stage { code, .. } => {
                if code == 0 {
                    1
                } else {
                    code
                }
            }
        }
    }
}

impl fmt::Display for CodedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for CodedError {}

pub fn find_coded_error(error: &Error) -> Option<&CodedError> {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<CodedError>())
}
