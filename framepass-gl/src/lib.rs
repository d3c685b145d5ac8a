//! OpenGL 3.3+ implementation of `framepass::Backend`.

mod backend;
mod buffer;
mod debug;
mod framebuffer;
mod gl_error;
mod shader;
mod texture;

pub use backend::{GlConfig, OpenGlBackend};
