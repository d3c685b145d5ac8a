//! Vertex and uniform buffer materialization, grounded on
//! `render-gl/src/buffer/mod.rs`'s DSA (`glCreateBuffers` +
//! `glNamedBufferStorage`) style.

use std::os::raw::c_void;

use framepass::backend::{BufferDesc, ScalarType};
use framepass::{Error, ErrorCode};

use crate::gl_error;

pub(crate) struct GlVertexBuffer {
    pub vbo: u32,
}

pub(crate) struct GlUniformBuffer {
    pub ubo: u32,
}

fn create_storage_buffer(bytes: &[u8]) -> Result<u32, Error> {
    let mut name = 0;
    unsafe {
        gl::CreateBuffers(1, &mut name);
        gl::NamedBufferStorage(
            name,
            bytes.len() as isize,
            if bytes.is_empty() {
                std::ptr::null()
            } else {
                bytes.as_ptr() as *const c_void
            },
            gl::DYNAMIC_STORAGE_BIT,
        );
    }
    let errors = gl_error::drain();
    if !errors.is_empty() {
        unsafe { gl::DeleteBuffers(1, &name) };
        return Err(Error::new(
            ErrorCode::FailedBufferGen,
            errors.join(", "),
        ));
    }
    Ok(name)
}

pub(crate) fn gl_scalar_type(scalar: ScalarType) -> u32 {
    match scalar {
        ScalarType::Float => gl::FLOAT,
        ScalarType::Int => gl::INT,
        ScalarType::UInt => gl::UNSIGNED_INT,
    }
}

/// Just the storage; attribute binding happens per `dispatch_vertices`
/// call in `backend.rs`, since which location each segment binds to
/// depends on the shader in scope at dispatch time, not on this buffer's
/// own layout position.
pub(crate) fn create_vertex_buffer(desc: &BufferDesc) -> Result<GlVertexBuffer, Error> {
    let vbo = create_storage_buffer(&desc.bytes)?;
    Ok(GlVertexBuffer { vbo })
}

pub(crate) fn create_uniform_buffer(desc: &BufferDesc) -> Result<GlUniformBuffer, Error> {
    let ubo = create_storage_buffer(&desc.bytes)?;
    Ok(GlUniformBuffer { ubo })
}

pub(crate) fn destroy_vertex_buffer(buf: &GlVertexBuffer) {
    unsafe { gl::DeleteBuffers(1, &buf.vbo) };
}

pub(crate) fn destroy_uniform_buffer(buf: &GlUniformBuffer) {
    unsafe { gl::DeleteBuffers(1, &buf.ubo) };
}
