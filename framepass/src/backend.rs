//! The `Backend` trait is the vtable spec §4.4 describes: the frontend
//! holds one `Box<dyn Backend>` per `Gpu` and forwards every lifecycle,
//! compile-time materialization, and dispatch call through it.

use fxhash::FxHashMap;

use crate::enums::{BlendFactor, Format, TestFunc, UniformType, WriteMask};
use crate::error::Result;

/// Init descriptor for a `Shader` (spec §3): GLSL sources, not yet compiled.
#[derive(Debug, Clone)]
pub struct ShaderDesc {
    pub vertex_source: String,
    pub fragment_source: String,
}

/// A single interleaved-layout element of a `Buffer`'s vertex layout.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSegment {
    pub name: String,
    pub scalar_type: ScalarType,
    pub count: u32,
    /// 0 = per-vertex, >=1 = per-instance, advanced every N instances.
    pub instance_rate: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    Float,
    Int,
    UInt,
}

impl ScalarType {
    pub fn byte_size(self) -> usize {
        match self {
            ScalarType::Float | ScalarType::Int | ScalarType::UInt => 4,
        }
    }
}

/// Init descriptor for a `Buffer` (spec §3).
#[derive(Debug, Clone)]
pub struct BufferDesc {
    pub bytes: Vec<u8>,
    pub layout: Option<Vec<DataSegment>>,
}

/// Init descriptor for a `Texture` (spec §3).
#[derive(Debug, Clone)]
pub struct TextureDesc {
    pub is_cubemap: bool,
    /// Face-major pixel data; six contiguous images when `is_cubemap`.
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: Format,
    pub mipmap_count: u32,
    pub msaa_samples: u32,
}

/// One entry of a shader's active-attribute reflection table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttributeInfo {
    pub location: i32,
    pub count: i32,
    pub gl_type: u32,
}

/// One entry of a shader's active-uniform reflection table. Arrays are
/// flattened: each element gets its own entry with a successive location.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformInfo {
    pub name: String,
    pub location: i32,
    pub count: i32,
    pub uniform_type: UniformType,
}

/// Populated at first compile (spec §4.2). `uniform_blocks` maps a named
/// uniform block (an interface block bound as a whole via a `Buffer`
/// value) to its binding index. Keyed by block name rather than a
/// member's GL location, since block-member uniforms report `-1` for
/// their default-block location and would otherwise collide.
#[derive(Debug, Clone, Default)]
pub struct ShaderReflection {
    pub attributes: FxHashMap<String, AttributeInfo>,
    pub uniforms: FxHashMap<String, UniformInfo>,
    pub ordered_uniform_names: Vec<String>,
    pub uniform_blocks: FxHashMap<String, u32>,
}

impl ShaderReflection {
    pub fn uniform(&self, name: &str) -> Option<&UniformInfo> {
        self.uniforms.get(name)
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeInfo> {
        self.attributes.get(name)
    }

    pub fn block_binding(&self, name: &str) -> Option<u32> {
        self.uniform_blocks.get(name).copied()
    }
}

/// Which role a `Buffer` has been materialized as. Fixed on first use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferRole {
    Vertex,
    Uniform,
}

/// Everything the dispatcher needs to know about a texture's storage to
/// attach/bind it, cached alongside the live driver handle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureInfo {
    pub width: u32,
    pub height: u32,
    pub format: Format,
    pub is_cubemap: bool,
    pub msaa_samples: u32,
}

/// A resolved render target within a pass, in declaration order. Carries
/// the texture's opaque resource id and its already-materialized info
/// rather than the handle itself, matching how `dispatch_vertices` and
/// `dispatch_blit` cross the frontend/backend boundary.
#[derive(Debug, Clone, Copy)]
pub struct TargetDesc {
    pub texture_id: u64,
    pub info: TextureInfo,
    pub src_blend: BlendFactor,
    pub dst_blend: BlendFactor,
}

/// Resolved per-pass state the dispatcher hands the backend at setup.
#[derive(Debug, Clone)]
pub struct PassState {
    pub dest_rect: Option<(i32, i32, i32, i32)>,
    pub write_mask: WriteMask,
    pub depth_func: Option<TestFunc>,
    pub clockwise_faces: bool,
    pub backface_cull: bool,
}

/// Resource kinds the deferred-destruction queue carries (Design Notes
/// §9), tagged by the frontend's opaque resource id so the drain site can
/// look up and delete whatever driver handle(s) the backend materialized
/// for that id, then forget its internal state for it.
#[derive(Debug, Clone, Copy)]
pub enum DestroyHandle {
    Program(u64),
    Buffer(u64),
    VertexArray(u64),
    Texture(u64),
    Framebuffer(u64),
}

/// The backend vtable. One implementation per backend (only OpenGL is
/// provided in this crate pair; Vulkan is reserved and unimplemented).
///
/// Resource identity crosses the frontend/backend boundary as an opaque
/// `u64` id assigned by the frontend at construction; the backend keeps
/// its own internal tables keyed by that id, the same way the teacher's
/// `GlArena` keeps typed sub-arenas keyed by handle.
pub trait Backend {
    /// Whether this backend is natively thread-safe (no claim discipline
    /// needed). The OpenGL backend always returns `false`.
    fn is_threadsafe(&self) -> bool;

    fn get_info(&self, key: &str) -> Option<String>;

    /// Drains the deferred-destruction queue, issuing the driver delete
    /// call appropriate to each tagged handle. Must run on the claim
    /// thread.
    fn flush(&self, pending: Vec<DestroyHandle>);

    fn ensure_shader(&self, id: u64, desc: &ShaderDesc) -> Result<ShaderReflection>;

    fn ensure_vertex_buffer(&self, id: u64, desc: &BufferDesc) -> Result<()>;

    fn ensure_uniform_buffer(&self, id: u64, desc: &BufferDesc) -> Result<()>;

    fn ensure_texture(&self, id: u64, desc: &TextureDesc) -> Result<TextureInfo>;

    /// Lazily creates (if absent) and returns the id of the non-msaa
    /// shadow sibling of an MSAA texture.
    fn ensure_texture_shadow(&self, id: u64, desc: &TextureDesc) -> Result<u64>;

    /// Grows the framebuffer stack to at least `required_depth` slots.
    fn ensure_framebuffer_stack(&self, required_depth: u32) -> Result<()>;

    fn setup_pass(
        &self,
        depth: u32,
        shader_id: Option<u64>,
        targets: &[TargetDesc],
        uniforms: &[(String, crate::value::Value)],
        reflection: Option<&ShaderReflection>,
        state: &PassState,
    ) -> Result<()>;

    /// Re-establishes this pass's framebuffer, program, uniforms, and
    /// raster state without clearing. The dispatcher calls this before a
    /// leaf dispatch that follows a nested child pass, since that child's
    /// own teardown only detaches its attachments and does not restore
    /// anything this pass bound.
    fn rebind_pass(
        &self,
        depth: u32,
        shader_id: Option<u64>,
        targets: &[TargetDesc],
        uniforms: &[(String, crate::value::Value)],
        reflection: Option<&ShaderReflection>,
        state: &PassState,
    ) -> Result<()>;

    fn teardown_pass(
        &self,
        depth: u32,
        targets: &[TargetDesc],
        uniforms: &[(String, crate::value::Value)],
        reflection: Option<&ShaderReflection>,
    ) -> Result<()>;

    fn dispatch_vertices(
        &self,
        shader_id: u64,
        reflection: &ShaderReflection,
        buffers: &[(u64, BufferDesc)],
        instances: u32,
    ) -> Result<()>;

    fn dispatch_blit(
        &self,
        depth: u32,
        src_texture_id: u64,
        src_info: &TextureInfo,
        dest_rect: (i32, i32, i32, i32),
    ) -> Result<()>;
}
