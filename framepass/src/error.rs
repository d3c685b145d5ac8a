use std::error;
use std::fmt;

/// Closed set of runtime (tier-2) error codes, matching the driver-facing
/// failure categories: init, shader generation, shader uniform set,
/// buffer generation, texture generation, target (framebuffer) creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    FailedInit,
    FailedShaderGen,
    FailedShaderUniformSet,
    FailedBufferGen,
    FailedTextureGen,
    FailedTargetCreation,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::FailedInit => "FAILED_INIT",
            ErrorCode::FailedShaderGen => "FAILED_SHADER_GEN",
            ErrorCode::FailedShaderUniformSet => "FAILED_SHADER_UNIFORM_SET",
            ErrorCode::FailedBufferGen => "FAILED_BUFFER_GEN",
            ErrorCode::FailedTextureGen => "FAILED_TEXTURE_GEN",
            ErrorCode::FailedTargetCreation => "FAILED_TARGET_CREATION",
        };
        f.write_str(s)
    }
}

/// A runtime (tier-2) error: a code plus a message built from the
/// backend's drained synchronous error state.
#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Error {
        Error {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;
