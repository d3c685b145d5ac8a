//! `OpenGlBackend`: the concrete `framepass::Backend` implementation,
//! grounded on `render-gl/src/backend.rs::OpenGlInstance` for
//! construction/config and on `render-gl/src/command/state.rs::StateCache`
//! for the setup/teardown bracketing of per-pass GL state.

use std::sync::Mutex;

use fxhash::FxHashMap;

use framepass::backend::{
    Backend, BufferDesc, DestroyHandle, PassState, ShaderDesc, ShaderReflection, TargetDesc,
    TextureDesc, TextureInfo,
};
use framepass::value::Value;
use framepass::{BlendFactor, Error, ErrorCode, TestFunc, WriteMask};

use crate::buffer::{self, gl_scalar_type, GlUniformBuffer, GlVertexBuffer};
use crate::framebuffer::{self, FramebufferStack, GlFramebuffer};
use crate::gl_error;
use crate::shader;
use crate::texture::{self, GlTexture};

/// Synthetic high bit marking an MSAA shadow texture's id, kept out of the
/// frontend's monotonically-assigned id space (`Gpu::next_resource_id`
/// never reaches it in a single process).
const SHADOW_ID_BIT: u64 = 1 << 63;

struct State {
    shaders: FxHashMap<u64, (u32, ShaderReflection)>,
    vertex_buffers: FxHashMap<u64, GlVertexBuffer>,
    uniform_buffers: FxHashMap<u64, GlUniformBuffer>,
    textures: FxHashMap<u64, GlTexture>,
    framebuffers: FramebufferStack,
    resolve_read_fbo: GlFramebuffer,
    resolve_draw_fbo: GlFramebuffer,
}

impl State {
    fn new() -> State {
        State {
            shaders: FxHashMap::default(),
            vertex_buffers: FxHashMap::default(),
            uniform_buffers: FxHashMap::default(),
            textures: FxHashMap::default(),
            framebuffers: FramebufferStack::new(),
            resolve_read_fbo: GlFramebuffer::new(),
            resolve_draw_fbo: GlFramebuffer::new(),
        }
    }
}

/// Configuration passed at construction, in the spirit of the teacher's
/// `cfg.get::<u64>("gfx.default_upload_buffer_size")` lookups. Scaled down
/// since this crate has no on-disk configuration surface of its own.
pub struct GlConfig {
    pub use_debug_layers: bool,
}

impl GlConfig {
    pub fn from_config(cfg: &config::Config) -> GlConfig {
        GlConfig {
            use_debug_layers: cfg.get::<bool>("gfx.use_debug_layers").unwrap_or(false),
        }
    }

    pub fn from_flags(flags: framepass::GpuFlags) -> GlConfig {
        GlConfig {
            use_debug_layers: flags.contains(framepass::GpuFlags::USE_DEBUG_LAYERS),
        }
    }
}

pub struct OpenGlBackend {
    state: Mutex<State>,
}

impl OpenGlBackend {
    /// Loads the OpenGL 3.3+ function pointers via `loader` and installs
    /// the debug callback if `cfg.use_debug_layers` is set. `loader` is
    /// the windowing library's `GetProcAddress`-equivalent.
    pub fn new(cfg: &GlConfig, loader: impl FnMut(&'static str) -> *const std::os::raw::c_void) -> OpenGlBackend {
        gl::load_with(loader);
        if cfg.use_debug_layers {
            crate::debug::install();
        }
        OpenGlBackend {
            state: Mutex::new(State::new()),
        }
    }
}

fn gl_blend_factor(factor: BlendFactor) -> u32 {
    match factor {
        BlendFactor::Zero => gl::ZERO,
        BlendFactor::One => gl::ONE,
        BlendFactor::SrcColor => gl::SRC_COLOR,
        BlendFactor::OneMinusSrcColor => gl::ONE_MINUS_SRC_COLOR,
        BlendFactor::DstColor => gl::DST_COLOR,
        BlendFactor::OneMinusDstColor => gl::ONE_MINUS_DST_COLOR,
        BlendFactor::SrcAlpha => gl::SRC_ALPHA,
        BlendFactor::OneMinusSrcAlpha => gl::ONE_MINUS_SRC_ALPHA,
        BlendFactor::DstAlpha => gl::DST_ALPHA,
        BlendFactor::OneMinusDstAlpha => gl::ONE_MINUS_DST_ALPHA,
        BlendFactor::ConstantColor => gl::CONSTANT_COLOR,
        BlendFactor::OneMinusConstantColor => gl::ONE_MINUS_CONSTANT_COLOR,
        BlendFactor::ConstantAlpha => gl::CONSTANT_ALPHA,
        BlendFactor::OneMinusConstantAlpha => gl::ONE_MINUS_CONSTANT_ALPHA,
        BlendFactor::SrcAlphaSaturate => gl::SRC_ALPHA_SATURATE,
        BlendFactor::Src1Color => gl::SRC1_COLOR,
        BlendFactor::OneMinusSrc1Color => gl::ONE_MINUS_SRC1_COLOR,
        BlendFactor::Src1Alpha => gl::SRC1_ALPHA,
        BlendFactor::OneMinusSrc1Alpha => gl::ONE_MINUS_SRC1_ALPHA,
    }
}

fn gl_test_func(func: TestFunc) -> u32 {
    match func {
        TestFunc::Never => gl::NEVER,
        TestFunc::Always => gl::ALWAYS,
        TestFunc::Less => gl::LESS,
        TestFunc::Lequal => gl::LEQUAL,
        TestFunc::Greater => gl::GREATER,
        TestFunc::Gequal => gl::GEQUAL,
        TestFunc::Equal => gl::EQUAL,
        TestFunc::NotEqual => gl::NOTEQUAL,
    }
}

/// Resolves an MSAA texture into its shadow sibling via the dedicated
/// resolve FBO pair, then returns the id whose GL name a sampler should
/// bind (the shadow's, if a resolve happened; the texture's own otherwise).
fn resolve_for_sampling(state: &mut State, tex: &framepass::Texture) -> Result<u64, Error> {
    let bound_id = tex.bound_resource_id()?;
    if bound_id == tex.resource_id() {
        return Ok(bound_id);
    }

    let (src_target, src_name, width, height) = {
        let src = state
            .textures
            .get(&tex.resource_id())
            .ok_or_else(|| Error::new(ErrorCode::FailedTextureGen, "msaa source texture not materialized"))?;
        (src.target, src.name, src.info.width, src.info.height)
    };
    let (dst_target, dst_name) = {
        let dst = state
            .textures
            .get(&bound_id)
            .ok_or_else(|| Error::new(ErrorCode::FailedTextureGen, "msaa shadow texture not materialized"))?;
        (dst.target, dst.name)
    };

    unsafe {
        gl::NamedFramebufferTexture(state.resolve_read_fbo.obj, gl::COLOR_ATTACHMENT0, src_name, 0);
        gl::NamedFramebufferTexture(state.resolve_draw_fbo.obj, gl::COLOR_ATTACHMENT0, dst_name, 0);
        gl::BindFramebuffer(gl::READ_FRAMEBUFFER, state.resolve_read_fbo.obj);
        gl::BindFramebuffer(gl::DRAW_FRAMEBUFFER, state.resolve_draw_fbo.obj);
        gl::BlitFramebuffer(
            0,
            0,
            width as i32,
            height as i32,
            0,
            0,
            width as i32,
            height as i32,
            gl::COLOR_BUFFER_BIT,
            gl::NEAREST,
        );
        gl::NamedFramebufferTexture(state.resolve_read_fbo.obj, gl::COLOR_ATTACHMENT0, 0, 0);
        gl::NamedFramebufferTexture(state.resolve_draw_fbo.obj, gl::COLOR_ATTACHMENT0, 0, 0);
        gl::BindFramebuffer(gl::READ_FRAMEBUFFER, 0);
        gl::BindFramebuffer(gl::DRAW_FRAMEBUFFER, 0);
    }
    let _ = (src_target, dst_target);
    Ok(bound_id)
}

fn bind_scalar_uniform(location: i32, value: &Value) {
    match value {
        Value::Bool(v) => unsafe { gl::Uniform1i(location, *v as i32) },
        Value::Int(v) => unsafe { gl::Uniform1i(location, *v) },
        Value::UInt(v) => unsafe { gl::Uniform1ui(location, *v) },
        Value::Float(v) => unsafe { gl::Uniform1f(location, *v) },
        Value::Vec2(v) => unsafe { gl::Uniform2fv(location, 1, v.as_ptr()) },
        Value::Vec3(v) => unsafe { gl::Uniform3fv(location, 1, v.as_ptr()) },
        Value::Vec4(v) => unsafe { gl::Uniform4fv(location, 1, v.as_ptr()) },
        Value::Mat4(v) => unsafe { gl::UniformMatrix4fv(location, 1, gl::FALSE, v.as_ptr()) },
        _ => {}
    }
}

fn bind_texture_uniform(state: &mut State, location: i32, tex: &framepass::Texture, unit: u32) -> Result<(), Error> {
    let bound_id = resolve_for_sampling(state, tex)?;
    let gl_tex = state
        .textures
        .get(&bound_id)
        .ok_or_else(|| Error::new(ErrorCode::FailedShaderUniformSet, "sampler texture not materialized"))?;
    let (target, name) = (gl_tex.target, gl_tex.name);
    unsafe {
        gl::ActiveTexture(gl::TEXTURE0 + unit);
        gl::BindTexture(target, name);
        gl::Uniform1i(location, unit as i32);
    }
    Ok(())
}

/// Attaches this depth slot's scratch FBO to `targets` and binds it as the
/// draw framebuffer. Shared by `setup_pass` and `rebind_pass`.
fn bind_pass_framebuffer(state: &mut State, depth: u32, targets: &[TargetDesc]) -> Result<(), Error> {
    let fbo_slot = state.framebuffers.slot(depth);
    let mut color: Vec<(u32, u32)> = Vec::with_capacity(targets.len());
    let mut depth_tex: Option<(u32, u32)> = None;
    for t in targets {
        let gl_tex = state
            .textures
            .get(&t.texture_id)
            .ok_or_else(|| Error::new(ErrorCode::FailedTargetCreation, "target texture not materialized"))?;
        if t.info.format.is_depth() {
            depth_tex = Some((gl_tex.target, gl_tex.name));
        } else {
            color.push((gl_tex.target, gl_tex.name));
        }
    }
    let fbo = framebuffer::attach(fbo_slot, &color, depth_tex)?;
    unsafe { gl::BindFramebuffer(gl::DRAW_FRAMEBUFFER, fbo) };
    Ok(())
}

/// Applies the viewport, write masks, depth test, face winding/culling,
/// and per-target blend state for a pass. Shared by `setup_pass` and
/// `rebind_pass`.
fn apply_raster_state(pass_state: &PassState, targets: &[TargetDesc]) -> Result<(), Error> {
    if let Some((x, y, w, h)) = pass_state.dest_rect {
        unsafe { gl::Viewport(x, y, w, h) };
    }

    unsafe {
        gl::ColorMask(
            pass_state.write_mask.contains(WriteMask::COLOR_RED) as u8,
            pass_state.write_mask.contains(WriteMask::COLOR_GREEN) as u8,
            pass_state.write_mask.contains(WriteMask::COLOR_BLUE) as u8,
            pass_state.write_mask.contains(WriteMask::COLOR_ALPHA) as u8,
        );
    }

    if pass_state.write_mask.contains(WriteMask::DEPTH) {
        let func = pass_state
            .depth_func
            .ok_or_else(|| Error::new(ErrorCode::FailedTargetCreation, "DEPTH write requested with no depth func"))?;
        unsafe {
            gl::Enable(gl::DEPTH_TEST);
            gl::DepthMask(gl::TRUE);
            gl::DepthFunc(gl_test_func(func));
        }
    } else {
        unsafe { gl::DepthMask(gl::FALSE) };
    }

    unsafe {
        gl::FrontFace(if pass_state.clockwise_faces { gl::CW } else { gl::CCW });
        if pass_state.backface_cull {
            gl::Enable(gl::CULL_FACE);
            gl::CullFace(gl::BACK);
        } else {
            gl::Disable(gl::CULL_FACE);
        }
    }

    for (index, target) in targets.iter().enumerate() {
        if target.info.format.is_depth() {
            continue;
        }
        unsafe {
            gl::BlendFunci(
                index as u32,
                gl_blend_factor(target.src_blend),
                gl_blend_factor(target.dst_blend),
            );
            gl::Enablei(gl::BLEND, index as u32);
        }
    }
    Ok(())
}

/// Binds the program and its uniforms (including sampler and uniform-block
/// bindings). Shared by `setup_pass` and `rebind_pass`.
fn bind_program_and_uniforms(
    state: &mut State,
    shader_id: Option<u64>,
    uniforms: &[(String, Value)],
    reflection: Option<&ShaderReflection>,
) -> Result<(), Error> {
    if let (Some(shader_id), Some(reflection)) = (shader_id, reflection) {
        let program = state
            .shaders
            .get(&shader_id)
            .map(|(program, _)| *program)
            .ok_or_else(|| Error::new(ErrorCode::FailedShaderGen, "shader not materialized"))?;
        unsafe { gl::UseProgram(program) };

        let mut next_texture_unit = 0u32;
        for (name, value) in uniforms {
            if let Value::Buffer(buf) = value {
                if let Some(block) = reflection.block_binding(name) {
                    let ubo = state
                        .uniform_buffers
                        .get(&buf.resource_id())
                        .ok_or_else(|| Error::new(ErrorCode::FailedShaderUniformSet, "uniform buffer not materialized"))?;
                    unsafe { gl::BindBufferBase(gl::UNIFORM_BUFFER, block, ubo.ubo) };
                    unsafe { gl::UniformBlockBinding(program, block, block) };
                    continue;
                }
            }

            let info = reflection
                .uniform(name)
                .ok_or_else(|| Error::new(ErrorCode::FailedShaderUniformSet, format!("uniform '{}' not found", name)))?;

            if let Value::Texture(tex) = value {
                bind_texture_uniform(state, info.location, tex, next_texture_unit)?;
                next_texture_unit += 1;
                continue;
            }
            bind_scalar_uniform(info.location, value);
        }
    }
    Ok(())
}

/// Detaches this pass's framebuffer attachments, unbinds the texture units
/// and uniform-buffer bases its uniforms occupied, and disables the
/// per-target blend state it enabled. Does NOT touch the bound program or
/// framebuffer binding itself (spec §4.3 Teardown): those persist until the
/// next `setup_pass`/`rebind_pass`, and the dispatcher rebinds defensively
/// across sibling passes rather than resetting to a neutral GL state here.
fn unbind_pass(
    state: &State,
    depth: u32,
    targets: &[TargetDesc],
    uniforms: &[(String, Value)],
    reflection: Option<&ShaderReflection>,
) {
    let fbo = state.framebuffers.slot(depth);
    framebuffer::detach(fbo, targets.iter().filter(|t| !t.info.format.is_depth()).count());
    unsafe {
        for index in 0..targets.len() as u32 {
            gl::Disablei(gl::BLEND, index);
        }
    }
    let mut next_texture_unit = 0u32;
    for (name, value) in uniforms {
        match value {
            Value::Texture(_) => {
                unsafe {
                    gl::ActiveTexture(gl::TEXTURE0 + next_texture_unit);
                    gl::BindTexture(gl::TEXTURE_2D, 0);
                }
                next_texture_unit += 1;
            }
            Value::Buffer(_) => {
                if let Some(block) = reflection.and_then(|r| r.block_binding(name)) {
                    unsafe { gl::BindBufferBase(gl::UNIFORM_BUFFER, block, 0) };
                }
            }
            _ => {}
        }
    }
}

impl Backend for OpenGlBackend {
    fn is_threadsafe(&self) -> bool {
        false
    }

    fn get_info(&self, key: &str) -> Option<String> {
        let name = match key {
            "vendor" => gl::VENDOR,
            "renderer" => gl::RENDERER,
            _ => return None,
        };
        unsafe {
            let ptr = gl::GetString(name);
            if ptr.is_null() {
                None
            } else {
                Some(std::ffi::CStr::from_ptr(ptr as *const i8).to_string_lossy().into_owned())
            }
        }
    }

    fn flush(&self, pending: Vec<DestroyHandle>) {
        let mut state = self.state.lock().unwrap();
        for handle in pending {
            match handle {
                DestroyHandle::Program(id) => {
                    if let Some((program, _)) = state.shaders.remove(&id) {
                        unsafe { gl::DeleteProgram(program) };
                    }
                }
                DestroyHandle::Buffer(id) => {
                    if let Some(ubo) = state.uniform_buffers.remove(&id) {
                        buffer::destroy_uniform_buffer(&ubo);
                    }
                }
                DestroyHandle::VertexArray(id) => {
                    if let Some(vbo) = state.vertex_buffers.remove(&id) {
                        buffer::destroy_vertex_buffer(&vbo);
                    }
                }
                DestroyHandle::Texture(id) => {
                    if let Some(tex) = state.textures.remove(&id) {
                        texture::destroy_texture(&tex);
                    }
                    let shadow_id = id | SHADOW_ID_BIT;
                    if let Some(shadow) = state.textures.remove(&shadow_id) {
                        texture::destroy_texture(&shadow);
                    }
                }
                DestroyHandle::Framebuffer(_) => {}
            }
        }
    }

    fn ensure_shader(&self, id: u64, desc: &ShaderDesc) -> framepass::Result<ShaderReflection> {
        let mut state = self.state.lock().unwrap();
        if let Some((_, reflection)) = state.shaders.get(&id) {
            return Ok(reflection.clone());
        }
        let (gl_shader, reflection) = shader::compile_and_link(desc)?;
        state.shaders.insert(id, (gl_shader.program, reflection.clone()));
        Ok(reflection)
    }

    fn ensure_vertex_buffer(&self, id: u64, desc: &BufferDesc) -> framepass::Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.vertex_buffers.contains_key(&id) {
            return Ok(());
        }
        let vb = buffer::create_vertex_buffer(desc)?;
        state.vertex_buffers.insert(id, vb);
        Ok(())
    }

    fn ensure_uniform_buffer(&self, id: u64, desc: &BufferDesc) -> framepass::Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.uniform_buffers.contains_key(&id) {
            return Ok(());
        }
        let ub = buffer::create_uniform_buffer(desc)?;
        state.uniform_buffers.insert(id, ub);
        Ok(())
    }

    fn ensure_texture(&self, id: u64, desc: &TextureDesc) -> framepass::Result<TextureInfo> {
        let mut state = self.state.lock().unwrap();
        if let Some(tex) = state.textures.get(&id) {
            return Ok(tex.info);
        }
        let tex = texture::create_texture(desc)?;
        let info = tex.info;
        state.textures.insert(id, tex);
        Ok(info)
    }

    fn ensure_texture_shadow(&self, id: u64, _desc: &TextureDesc) -> framepass::Result<u64> {
        let mut state = self.state.lock().unwrap();
        let shadow_id = id | SHADOW_ID_BIT;
        if state.textures.contains_key(&shadow_id) {
            return Ok(shadow_id);
        }
        let source = state
            .textures
            .get(&id)
            .ok_or_else(|| Error::new(ErrorCode::FailedTextureGen, "shadow requested for unmaterialized texture"))?;
        let shadow = texture::create_shadow(source)?;
        state.textures.insert(shadow_id, shadow);
        Ok(shadow_id)
    }

    fn ensure_framebuffer_stack(&self, required_depth: u32) -> framepass::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.framebuffers.ensure_depth(required_depth);
        Ok(())
    }

    fn setup_pass(
        &self,
        depth: u32,
        shader_id: Option<u64>,
        targets: &[TargetDesc],
        uniforms: &[(String, Value)],
        reflection: Option<&ShaderReflection>,
        pass_state: &PassState,
    ) -> framepass::Result<()> {
        let mut state = self.state.lock().unwrap();

        bind_pass_framebuffer(&mut state, depth, targets)?;

        // Spec §4.3 Setup step 7: clear color and depth to zero before any
        // of this pass's own write masks are applied, so a pass that
        // writes only depth (or only color) still starts from a clean
        // buffer rather than whatever a previous occupant of this slot
        // left behind.
        unsafe {
            gl::ColorMask(gl::TRUE, gl::TRUE, gl::TRUE, gl::TRUE);
            gl::DepthMask(gl::TRUE);
            gl::ClearColor(0.0, 0.0, 0.0, 0.0);
            gl::ClearDepth(0.0);
            gl::Clear(gl::COLOR_BUFFER_BIT | gl::DEPTH_BUFFER_BIT);
        }

        apply_raster_state(pass_state, targets)?;
        bind_program_and_uniforms(&mut state, shader_id, uniforms, reflection)?;

        let errors = gl_error::drain();
        if !errors.is_empty() {
            return Err(Error::new(ErrorCode::FailedTargetCreation, errors.join(", ")));
        }
        Ok(())
    }

    fn rebind_pass(
        &self,
        depth: u32,
        shader_id: Option<u64>,
        targets: &[TargetDesc],
        uniforms: &[(String, Value)],
        reflection: Option<&ShaderReflection>,
        pass_state: &PassState,
    ) -> framepass::Result<()> {
        let mut state = self.state.lock().unwrap();

        bind_pass_framebuffer(&mut state, depth, targets)?;
        apply_raster_state(pass_state, targets)?;
        bind_program_and_uniforms(&mut state, shader_id, uniforms, reflection)?;

        let errors = gl_error::drain();
        if !errors.is_empty() {
            return Err(Error::new(ErrorCode::FailedTargetCreation, errors.join(", ")));
        }
        Ok(())
    }

    fn teardown_pass(
        &self,
        depth: u32,
        targets: &[TargetDesc],
        uniforms: &[(String, Value)],
        reflection: Option<&ShaderReflection>,
    ) -> framepass::Result<()> {
        let state = self.state.lock().unwrap();
        unbind_pass(&state, depth, targets, uniforms, reflection);
        Ok(())
    }

    fn dispatch_vertices(
        &self,
        shader_id: u64,
        reflection: &ShaderReflection,
        buffers: &[(u64, BufferDesc)],
        instances: u32,
    ) -> framepass::Result<()> {
        let state = self.state.lock().unwrap();

        // A sibling nested pass may have bound a different program since
        // this pass's own setup; re-assert it before building bindings
        // that resolve attribute locations against it.
        let program = state
            .shaders
            .get(&shader_id)
            .map(|(program, _)| *program)
            .ok_or_else(|| Error::new(ErrorCode::FailedShaderGen, "shader not materialized"))?;
        unsafe { gl::UseProgram(program) };

        // One VAO spanning every buffer bound in this op, with attribute
        // locations resolved from the shader's reflection by name rather
        // than each buffer's own layout position (spec §4.3: "look up the
        // attribute in the shader by name"). A buffer-per-VAO scheme would
        // leave only the last bound buffer's attributes active at draw
        // time once more than one buffer feeds the same draw.
        let mut vao = 0;
        unsafe { gl::CreateVertexArrays(1, &mut vao) };

        let mut vertex_count = 0u32;
        for (binding, (id, desc)) in buffers.iter().enumerate() {
            let binding = binding as u32;
            let vb = state.vertex_buffers.get(id).ok_or_else(|| {
                unsafe { gl::DeleteVertexArrays(1, &vao) };
                Error::new(ErrorCode::FailedBufferGen, "vertex buffer not materialized")
            })?;

            let layout = desc.layout.as_ref();
            let stride: i32 = layout
                .map(|l| l.iter().map(|seg| seg.count as i32 * seg.scalar_type.byte_size() as i32).sum())
                .unwrap_or(0);

            let mut offset: u32 = 0;
            let mut per_vertex_stride: u32 = 0;
            if let Some(layout) = layout {
                for segment in layout {
                    let attr = reflection.attribute(&segment.name).ok_or_else(|| {
                        Error::new(
                            ErrorCode::FailedShaderGen,
                            format!("attribute '{}' does not exist in the in-scope shader", segment.name),
                        )
                    })?;
                    let location = attr.location as u32;
                    unsafe {
                        gl::EnableVertexArrayAttrib(vao, location);
                        gl::VertexArrayAttribBinding(vao, location, binding);
                        gl::VertexArrayAttribFormat(
                            vao,
                            location,
                            segment.count as i32,
                            gl_scalar_type(segment.scalar_type),
                            gl::FALSE,
                            offset,
                        );
                        if segment.instance_rate > 0 {
                            gl::VertexArrayBindingDivisor(vao, binding, segment.instance_rate);
                        } else {
                            per_vertex_stride += segment.count * segment.scalar_type.byte_size() as u32;
                        }
                    }
                    offset += segment.count * segment.scalar_type.byte_size() as u32;
                }
            }
            unsafe { gl::VertexArrayVertexBuffer(vao, binding, vb.vbo, 0, stride) };

            if per_vertex_stride > 0 {
                vertex_count = vertex_count.max(desc.bytes.len() as u32 / per_vertex_stride);
            }
        }
        if vertex_count == 0 {
            vertex_count = 3;
        }

        unsafe {
            gl::BindVertexArray(vao);
            if instances > 1 {
                gl::DrawArraysInstanced(gl::TRIANGLES, 0, vertex_count as i32, instances as i32);
            } else {
                gl::DrawArrays(gl::TRIANGLES, 0, vertex_count as i32);
            }
            gl::BindVertexArray(0);
            gl::DeleteVertexArrays(1, &vao);
        }

        let errors = gl_error::drain();
        if !errors.is_empty() {
            return Err(Error::new(ErrorCode::FailedShaderGen, errors.join(", ")));
        }
        Ok(())
    }

    fn dispatch_blit(
        &self,
        depth: u32,
        src_texture_id: u64,
        src_info: &TextureInfo,
        dest_rect: (i32, i32, i32, i32),
    ) -> framepass::Result<()> {
        let state = self.state.lock().unwrap();
        let src = state
            .textures
            .get(&src_texture_id)
            .ok_or_else(|| Error::new(ErrorCode::FailedTargetCreation, "blit source not materialized"))?;
        let is_depth = src_info.format.is_depth();
        let fbo_slot = state.framebuffers.slot(depth);
        let scratch = if is_depth {
            framebuffer::attach(fbo_slot, &[], Some((src.target, src.name)))?
        } else {
            framebuffer::attach(fbo_slot, &[(src.target, src.name)], None)?
        };
        let (x, y, w, h) = dest_rect;
        let (mask, filter) = if is_depth {
            (gl::DEPTH_BUFFER_BIT, gl::NEAREST)
        } else {
            (gl::COLOR_BUFFER_BIT, gl::LINEAR)
        };
        unsafe {
            gl::BindFramebuffer(gl::READ_FRAMEBUFFER, scratch);
            gl::BindFramebuffer(gl::DRAW_FRAMEBUFFER, 0);
            gl::BlitFramebuffer(0, 0, src_info.width as i32, src_info.height as i32, x, y, x + w, y + h, mask, filter);
        }
        framebuffer::detach(scratch, if is_depth { 0 } else { 1 });
        let errors = gl_error::drain();
        if !errors.is_empty() {
            return Err(Error::new(ErrorCode::FailedTargetCreation, errors.join(", ")));
        }
        Ok(())
    }
}
