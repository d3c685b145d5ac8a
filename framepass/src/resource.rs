use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::backend::{
    BufferDesc, BufferRole, DataSegment, DestroyHandle, ShaderDesc, ShaderReflection, TextureDesc,
    TextureInfo,
};
use crate::enums::Format;
use crate::error::{Error, ErrorCode, Result};
use crate::gpu::Gpu;

/// A compiled shader program (spec §3). Reference-counted; reflection is
/// populated lazily on first compile and cached for the life of the
/// handle.
#[derive(Clone)]
pub struct Shader(Arc<ShaderInner>);

struct ShaderInner {
    gpu: Gpu,
    id: u64,
    desc: ShaderDesc,
    reflection: OnceLock<ShaderReflection>,
}

impl Shader {
    pub fn new_for_code(gpu: &Gpu, vertex_source: impl Into<String>, fragment_source: impl Into<String>) -> Shader {
        Shader(Arc::new(ShaderInner {
            gpu: gpu.clone(),
            id: gpu.next_resource_id(),
            desc: ShaderDesc {
                vertex_source: vertex_source.into(),
                fragment_source: fragment_source.into(),
            },
            reflection: OnceLock::new(),
        }))
    }

    pub(crate) fn id(&self) -> u64 {
        self.0.id
    }

    pub(crate) fn gpu(&self) -> &Gpu {
        &self.0.gpu
    }

    pub(crate) fn reflection(&self) -> Option<&ShaderReflection> {
        self.0.reflection.get()
    }

    /// Compiles, links, and reflects this shader if it has not already
    /// been done, and returns the (now cached) reflection tables.
    pub(crate) fn ensure(&self) -> Result<&ShaderReflection> {
        if self.0.reflection.get().is_none() {
            let r = self.0.gpu.backend().ensure_shader(self.0.id, &self.0.desc)?;
            let _ = self.0.reflection.set(r);
        }
        Ok(self.0.reflection.get().expect("just set"))
    }
}

impl Drop for ShaderInner {
    fn drop(&mut self) {
        self.gpu.push_destroy(DestroyHandle::Program(self.id));
    }
}

impl fmt::Debug for Shader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shader").field("id", &self.0.id).finish()
    }
}

/// A vertex or uniform buffer (spec §3). The first `ensure_*` call fixes
/// the buffer's role for its lifetime; a later contradictory use is a
/// tier-1 user error, checked here in the frontend so it is testable
/// without touching a real backend.
#[derive(Clone)]
pub struct Buffer(Arc<BufferInner>);

struct BufferInner {
    gpu: Gpu,
    id: u64,
    desc: BufferDesc,
    role: OnceLock<BufferRole>,
}

impl Buffer {
    pub fn new_for_data(gpu: &Gpu, bytes: Vec<u8>, layout: Option<Vec<DataSegment>>) -> Buffer {
        Buffer(Arc::new(BufferInner {
            gpu: gpu.clone(),
            id: gpu.next_resource_id(),
            desc: BufferDesc { bytes, layout },
            role: OnceLock::new(),
        }))
    }

    pub(crate) fn id(&self) -> u64 {
        self.0.id
    }

    /// The opaque id a backend's `ensure_uniform_buffer`/`ensure_vertex_buffer`
    /// call materialized this buffer under. Public so a concrete backend
    /// crate can resolve a `Value::Buffer` bound as a uniform back to its
    /// own internal state.
    pub fn resource_id(&self) -> u64 {
        self.0.id
    }

    pub(crate) fn desc(&self) -> &BufferDesc {
        &self.0.desc
    }

    pub(crate) fn role(&self) -> Option<BufferRole> {
        self.0.role.get().copied()
    }

    /// Materializes this buffer as a vertex-attribute source. Returns
    /// `Ok(false)` (a tier-1 user error, already logged) if the buffer was
    /// previously fixed to the uniform role.
    pub(crate) fn ensure_vertex(&self) -> Result<bool> {
        match self.0.role.get() {
            Some(BufferRole::Uniform) => {
                log::error!("buffer {}: previously initialized as uniform buffer", self.0.id);
                Ok(false)
            }
            Some(BufferRole::Vertex) => Ok(true),
            None => {
                if self.0.desc.layout.is_none() {
                    return Err(Error::new(
                        ErrorCode::FailedBufferGen,
                        format!("buffer {} has no layout for vertex-role use", self.0.id),
                    ));
                }
                self.0.gpu.backend().ensure_vertex_buffer(self.0.id, &self.0.desc)?;
                let _ = self.0.role.set(BufferRole::Vertex);
                Ok(true)
            }
        }
    }

    /// Materializes this buffer as a uniform block source. Returns
    /// `Ok(false)` (a tier-1 user error, already logged) if the buffer was
    /// previously fixed to the vertex role.
    pub(crate) fn ensure_uniform(&self) -> Result<bool> {
        match self.0.role.get() {
            Some(BufferRole::Vertex) => {
                log::error!("buffer {}: previously initialized as vertex buffer", self.0.id);
                Ok(false)
            }
            Some(BufferRole::Uniform) => Ok(true),
            None => {
                self.0.gpu.backend().ensure_uniform_buffer(self.0.id, &self.0.desc)?;
                let _ = self.0.role.set(BufferRole::Uniform);
                Ok(true)
            }
        }
    }
}

impl Drop for BufferInner {
    fn drop(&mut self) {
        match self.role.get() {
            Some(BufferRole::Vertex) => self.gpu.push_destroy(DestroyHandle::VertexArray(self.id)),
            Some(BufferRole::Uniform) => self.gpu.push_destroy(DestroyHandle::Buffer(self.id)),
            None => {}
        }
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer").field("id", &self.0.id).finish()
    }
}

/// A texture (spec §3). Dimensions, format, and sample count are
/// immutable after creation; an MSAA texture used as a sampled uniform is
/// lazily shadowed by a single-sample sibling.
#[derive(Clone)]
pub struct Texture(Arc<TextureInner>);

struct TextureInner {
    gpu: Gpu,
    id: u64,
    desc: TextureDesc,
    info: OnceLock<TextureInfo>,
    shadow_id: OnceLock<u64>,
}

impl Texture {
    pub fn new_for_data(
        gpu: &Gpu,
        pixels: Vec<u8>,
        width: u32,
        height: u32,
        format: Format,
        mipmap_count: u32,
        msaa_samples: u32,
    ) -> Texture {
        Texture::from_desc(
            gpu,
            TextureDesc {
                is_cubemap: false,
                pixels,
                width,
                height,
                format,
                mipmap_count,
                msaa_samples,
            },
        )
    }

    /// Face order: +X, -X, +Y, -Y, +Z, -Z, stored back-to-back in `pixels`.
    pub fn new_cubemap_for_data(gpu: &Gpu, pixels: Vec<u8>, face_edge: u32, format: Format) -> Texture {
        Texture::from_desc(
            gpu,
            TextureDesc {
                is_cubemap: true,
                pixels,
                width: face_edge,
                height: face_edge,
                format,
                mipmap_count: 1,
                msaa_samples: 0,
            },
        )
    }

    pub fn new_depth(gpu: &Gpu, width: u32, height: u32, msaa_samples: u32) -> Texture {
        Texture::from_desc(
            gpu,
            TextureDesc {
                is_cubemap: false,
                pixels: Vec::new(),
                width,
                height,
                format: Format::Depth,
                mipmap_count: 1,
                msaa_samples,
            },
        )
    }

    fn from_desc(gpu: &Gpu, desc: TextureDesc) -> Texture {
        Texture(Arc::new(TextureInner {
            gpu: gpu.clone(),
            id: gpu.next_resource_id(),
            desc,
            info: OnceLock::new(),
            shadow_id: OnceLock::new(),
        }))
    }

    pub(crate) fn id(&self) -> u64 {
        self.0.id
    }

    /// The opaque id a backend's `ensure_texture` call materialized this
    /// texture under. Public so a concrete backend crate can resolve a
    /// `Value::Texture` bound as a sampler uniform back to its own
    /// internal state.
    pub fn resource_id(&self) -> u64 {
        self.0.id
    }

    pub(crate) fn desc(&self) -> &TextureDesc {
        &self.0.desc
    }

    pub fn ensure(&self) -> Result<TextureInfo> {
        if let Some(info) = self.0.info.get() {
            return Ok(*info);
        }
        let info = self.0.gpu.backend().ensure_texture(self.0.id, &self.0.desc)?;
        let _ = self.0.info.set(info);
        Ok(info)
    }

    /// Returns the id of this texture's non-msaa shadow sibling, creating
    /// it on first use. Only meaningful for MSAA textures.
    pub(crate) fn ensure_shadow_id(&self) -> Result<u64> {
        if let Some(id) = self.0.shadow_id.get() {
            return Ok(*id);
        }
        let shadow = self.0.gpu.backend().ensure_texture_shadow(self.0.id, &self.0.desc)?;
        let _ = self.0.shadow_id.set(shadow);
        Ok(shadow)
    }

    /// The id a sampler uniform should bind: the shadow sibling if this
    /// texture is MSAA (spec's "resolve blit before each sampled use"),
    /// otherwise the texture's own id.
    pub fn bound_resource_id(&self) -> Result<u64> {
        let info = self.ensure()?;
        if info.msaa_samples > 0 {
            self.ensure_shadow_id()
        } else {
            Ok(self.0.id)
        }
    }
}

impl Drop for TextureInner {
    fn drop(&mut self) {
        self.gpu.push_destroy(DestroyHandle::Texture(self.id));
        if let Some(shadow) = self.shadow_id.get() {
            self.gpu.push_destroy(DestroyHandle::Texture(*shadow));
        }
    }
}

impl fmt::Debug for Texture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Texture").field("id", &self.0.id).finish()
    }
}

/// The compiled, immutable instruction tree produced by the compiler
/// (spec §3). Dispatch replays it against the live context.
#[derive(Clone)]
pub struct Commands(pub(crate) Arc<crate::compile::CommandsInner>);

impl Commands {
    pub fn dispatch(&self) -> Result<()> {
        crate::dispatch::dispatch(self)
    }

    /// The most recent dispatch's human-readable call log, when the plan
    /// was compiled with debug annotations enabled.
    pub fn debug_call_log(&self) -> Option<Vec<String>> {
        self.0
            .debug_log
            .as_ref()
            .map(|log| log.lock().unwrap().run_time.clone())
    }
}
