//! Drains the driver's synchronous error queue into the tagged message
//! the frontend's two-tier error policy expects (spec §4.5).

use framepass::{Error, ErrorCode};

fn gl_error_name(code: u32) -> &'static str {
    match code {
        gl::INVALID_ENUM => "GL_INVALID_ENUM",
        gl::INVALID_VALUE => "GL_INVALID_VALUE",
        gl::INVALID_OPERATION => "GL_INVALID_OPERATION",
        gl::INVALID_FRAMEBUFFER_OPERATION => "GL_INVALID_FRAMEBUFFER_OPERATION",
        gl::OUT_OF_MEMORY => "GL_OUT_OF_MEMORY",
        gl::STACK_OVERFLOW => "GL_STACK_OVERFLOW",
        gl::STACK_UNDERFLOW => "GL_STACK_UNDERFLOW",
        _ => "GL_UNKNOWN_ERROR",
    }
}

pub(crate) fn drain() -> Vec<String> {
    let mut tags = Vec::new();
    loop {
        let code = unsafe { gl::GetError() };
        if code == gl::NO_ERROR {
            break;
        }
        tags.push(gl_error_name(code).to_string());
    }
    tags
}

pub(crate) fn make_error(code: ErrorCode, context: impl Into<String>) -> Error {
    let tags = drain();
    let context = context.into();
    let message = if tags.is_empty() {
        context
    } else {
        format!("{}: {}", context, tags.join(", "))
    };
    Error::new(code, message)
}
