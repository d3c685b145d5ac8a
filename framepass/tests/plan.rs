//! Integration tests for the plan/compile/dispatch pipeline, exercised
//! against a `MockBackend` that never touches a real GL context (spec
//! §8 TESTABLE PROPERTIES).

use std::sync::{Arc, Mutex};

use fxhash::FxHashMap;

use framepass::backend::{
    AttributeInfo, Backend, BufferDesc, DataSegment, DestroyHandle, PassState, ScalarType,
    ShaderDesc, ShaderReflection, TargetDesc, TextureDesc, TextureInfo, UniformInfo,
};
use framepass::{
    BlendFactor, Buffer, ErrorCode, Format, Gpu, GpuFlags, Plan, Shader, StateArg, TargetArg,
    TestFunc, Texture, UniformType, Value, WriteMask,
};

/// A backend double carrying no driver state at all: every `ensure_*`
/// synthesizes its result from the descriptor it was handed, and every
/// dispatch call is appended to a call log for assertions.
#[derive(Default)]
struct MockBackend {
    state: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    shader_reflections: FxHashMap<String, ShaderReflection>,
    framebuffer_stack_required: Option<u32>,
    shadow_calls: u32,
    calls: Vec<String>,
}

impl MockBackend {
    fn with_shader(&self, vertex_source: &str, reflection: ShaderReflection) {
        self.state
            .lock()
            .unwrap()
            .shader_reflections
            .insert(vertex_source.to_string(), reflection);
    }

    fn framebuffer_stack_required(&self) -> Option<u32> {
        self.state.lock().unwrap().framebuffer_stack_required
    }

    fn shadow_call_count(&self) -> u32 {
        self.state.lock().unwrap().shadow_calls
    }

    fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }
}

impl Backend for MockBackend {
    fn is_threadsafe(&self) -> bool {
        true
    }

    fn get_info(&self, _key: &str) -> Option<String> {
        None
    }

    fn flush(&self, _pending: Vec<DestroyHandle>) {}

    fn ensure_shader(&self, _id: u64, desc: &ShaderDesc) -> framepass::Result<ShaderReflection> {
        let state = self.state.lock().unwrap();
        Ok(state
            .shader_reflections
            .get(&desc.vertex_source)
            .cloned()
            .unwrap_or_default())
    }

    fn ensure_vertex_buffer(&self, _id: u64, _desc: &BufferDesc) -> framepass::Result<()> {
        Ok(())
    }

    fn ensure_uniform_buffer(&self, _id: u64, _desc: &BufferDesc) -> framepass::Result<()> {
        Ok(())
    }

    fn ensure_texture(&self, _id: u64, desc: &TextureDesc) -> framepass::Result<TextureInfo> {
        Ok(TextureInfo {
            width: desc.width,
            height: desc.height,
            format: desc.format,
            is_cubemap: desc.is_cubemap,
            msaa_samples: desc.msaa_samples,
        })
    }

    fn ensure_texture_shadow(&self, id: u64, desc: &TextureDesc) -> framepass::Result<u64> {
        let mut state = self.state.lock().unwrap();
        state.shadow_calls += 1;
        assert!(desc.msaa_samples > 0, "shadow only ever requested for an msaa texture");
        Ok(id | (1 << 63))
    }

    fn ensure_framebuffer_stack(&self, required_depth: u32) -> framepass::Result<()> {
        self.state.lock().unwrap().framebuffer_stack_required = Some(required_depth);
        Ok(())
    }

    fn setup_pass(
        &self,
        depth: u32,
        _shader_id: Option<u64>,
        _targets: &[TargetDesc],
        _uniforms: &[(String, Value)],
        _reflection: Option<&ShaderReflection>,
        _state: &PassState,
    ) -> framepass::Result<()> {
        self.state.lock().unwrap().calls.push(format!("setup_pass(depth={})", depth));
        Ok(())
    }

    fn rebind_pass(
        &self,
        depth: u32,
        _shader_id: Option<u64>,
        _targets: &[TargetDesc],
        _uniforms: &[(String, Value)],
        _reflection: Option<&ShaderReflection>,
        _state: &PassState,
    ) -> framepass::Result<()> {
        self.state.lock().unwrap().calls.push(format!("rebind_pass(depth={})", depth));
        Ok(())
    }

    fn teardown_pass(
        &self,
        depth: u32,
        _targets: &[TargetDesc],
        _uniforms: &[(String, Value)],
        _reflection: Option<&ShaderReflection>,
    ) -> framepass::Result<()> {
        self.state.lock().unwrap().calls.push(format!("teardown_pass(depth={})", depth));
        Ok(())
    }

    fn dispatch_vertices(
        &self,
        _shader_id: u64,
        _reflection: &ShaderReflection,
        buffers: &[(u64, BufferDesc)],
        instances: u32,
    ) -> framepass::Result<()> {
        self.state
            .lock()
            .unwrap()
            .calls
            .push(format!("dispatch_vertices(buffers={}, instances={})", buffers.len(), instances));
        Ok(())
    }

    fn dispatch_blit(
        &self,
        depth: u32,
        _src_texture_id: u64,
        _src_info: &TextureInfo,
        _dest_rect: (i32, i32, i32, i32),
    ) -> framepass::Result<()> {
        self.state.lock().unwrap().calls.push(format!("dispatch_blit(depth={})", depth));
        Ok(())
    }
}

/// `MockBackend` wrapped so a test keeps an observable handle after
/// `Gpu::new` takes ownership of the boxed trait object.
impl Backend for Arc<MockBackend> {
    fn is_threadsafe(&self) -> bool {
        self.as_ref().is_threadsafe()
    }
    fn get_info(&self, key: &str) -> Option<String> {
        self.as_ref().get_info(key)
    }
    fn flush(&self, pending: Vec<DestroyHandle>) {
        self.as_ref().flush(pending)
    }
    fn ensure_shader(&self, id: u64, desc: &ShaderDesc) -> framepass::Result<ShaderReflection> {
        self.as_ref().ensure_shader(id, desc)
    }
    fn ensure_vertex_buffer(&self, id: u64, desc: &BufferDesc) -> framepass::Result<()> {
        self.as_ref().ensure_vertex_buffer(id, desc)
    }
    fn ensure_uniform_buffer(&self, id: u64, desc: &BufferDesc) -> framepass::Result<()> {
        self.as_ref().ensure_uniform_buffer(id, desc)
    }
    fn ensure_texture(&self, id: u64, desc: &TextureDesc) -> framepass::Result<TextureInfo> {
        self.as_ref().ensure_texture(id, desc)
    }
    fn ensure_texture_shadow(&self, id: u64, desc: &TextureDesc) -> framepass::Result<u64> {
        self.as_ref().ensure_texture_shadow(id, desc)
    }
    fn ensure_framebuffer_stack(&self, required_depth: u32) -> framepass::Result<()> {
        self.as_ref().ensure_framebuffer_stack(required_depth)
    }
    fn setup_pass(
        &self,
        depth: u32,
        shader_id: Option<u64>,
        targets: &[TargetDesc],
        uniforms: &[(String, Value)],
        reflection: Option<&ShaderReflection>,
        state: &PassState,
    ) -> framepass::Result<()> {
        self.as_ref().setup_pass(depth, shader_id, targets, uniforms, reflection, state)
    }
    fn rebind_pass(
        &self,
        depth: u32,
        shader_id: Option<u64>,
        targets: &[TargetDesc],
        uniforms: &[(String, Value)],
        reflection: Option<&ShaderReflection>,
        state: &PassState,
    ) -> framepass::Result<()> {
        self.as_ref().rebind_pass(depth, shader_id, targets, uniforms, reflection, state)
    }
    fn teardown_pass(
        &self,
        depth: u32,
        targets: &[TargetDesc],
        uniforms: &[(String, Value)],
        reflection: Option<&ShaderReflection>,
    ) -> framepass::Result<()> {
        self.as_ref().teardown_pass(depth, targets, uniforms, reflection)
    }
    fn dispatch_vertices(
        &self,
        shader_id: u64,
        reflection: &ShaderReflection,
        buffers: &[(u64, BufferDesc)],
        instances: u32,
    ) -> framepass::Result<()> {
        self.as_ref().dispatch_vertices(shader_id, reflection, buffers, instances)
    }
    fn dispatch_blit(
        &self,
        depth: u32,
        src_texture_id: u64,
        src_info: &TextureInfo,
        dest_rect: (i32, i32, i32, i32),
    ) -> framepass::Result<()> {
        self.as_ref().dispatch_blit(depth, src_texture_id, src_info, dest_rect)
    }
}

fn gpu() -> (Gpu, Arc<MockBackend>) {
    let backend = Arc::new(MockBackend::default());
    let gpu = Gpu::new(GpuFlags::NO_THREAD_SAFETY, Box::new(backend.clone()));
    (gpu, backend)
}

fn pos_segment(name: &str, instance_rate: u32) -> DataSegment {
    DataSegment {
        name: name.to_string(),
        scalar_type: ScalarType::Float,
        count: 3,
        instance_rate,
    }
}

/// Registers a reflection exposing `names` as active attributes (location
/// values are irrelevant to the tests that use this) and returns a shader
/// compiled from `vertex_source`, so `append`'s attribute-existence check
/// in the compiler has something to match against.
fn shader_with_attributes(gpu: &Gpu, backend: &MockBackend, vertex_source: &str, names: &[&str]) -> Shader {
    let mut reflection = ShaderReflection::default();
    for name in names {
        reflection.attributes.insert(
            name.to_string(),
            AttributeInfo {
                location: 0,
                count: 1,
                gl_type: 0,
            },
        );
    }
    backend.with_shader(vertex_source, reflection);
    Shader::new_for_code(gpu, vertex_source, "fs")
}

#[test]
fn push_pop_returns_cursor_to_root() {
    let (gpu, _backend) = gpu();
    let shader = Shader::new_for_code(&gpu, "vs", "fs");

    let plan = Plan::new(&gpu);
    plan.push_state(&[StateArg::Shader(shader.clone())]); // root, depth 0
    plan.push_state(&[StateArg::Shader(shader.clone())]); // child, depth 1
    plan.pop(1); // cursor back to root
    plan.push_state(&[StateArg::Shader(shader.clone())]); // second child of root, depth 1

    let commands = plan.unref_to_commands(true).expect("no outstanding reference").expect("compiles");
    commands.dispatch().unwrap();

    // Both children are siblings at depth 1 under the same root: if `pop`
    // had left the cursor on the first child, the second `push_state`
    // would instead have produced a depth-2 grandchild.
    let log = commands.debug_call_log().unwrap();
    assert_eq!(
        log,
        vec![
            "setup_pass(depth=0)",
            "setup_pass(depth=1)",
            "teardown_pass(depth=1)",
            "setup_pass(depth=1)",
            "teardown_pass(depth=1)",
            "teardown_pass(depth=0)",
        ]
    );
}

#[test]
fn fake_pass_shares_parent_depth() {
    let (gpu, _backend) = gpu();
    let shader = Shader::new_for_code(&gpu, "vs", "fs");

    let plan = Plan::new(&gpu);
    plan.push_state(&[StateArg::Shader(shader.clone())]); // root, depth 0, not fake
    plan.push_state(&[]); // neither target nor shader configured: fake, shares depth 0

    let commands = plan.unref_to_commands(true).unwrap().unwrap();
    commands.dispatch().unwrap();

    let log = commands.debug_call_log().unwrap();
    assert_eq!(
        log,
        vec![
            "setup_pass(depth=0)",
            "setup_pass(depth=0)",
            "teardown_pass(depth=0)",
            "teardown_pass(depth=0)",
        ]
    );
}

#[test]
fn framebuffer_stack_sized_to_max_depth_plus_three() {
    let (gpu, backend) = gpu();
    let shader = Shader::new_for_code(&gpu, "vs", "fs");

    let plan = Plan::new(&gpu);
    plan.push_state(&[StateArg::Shader(shader.clone())]); // depth 0
    plan.push_state(&[StateArg::Shader(shader.clone())]); // depth 1
    plan.push_state(&[StateArg::Shader(shader.clone())]); // depth 2

    plan.unref_to_commands(false).unwrap().unwrap();

    assert_eq!(backend.framebuffer_stack_required(), Some(2 + 3));
}

#[test]
fn uniform_store_keeps_first_insertion_order_and_last_value() {
    let mut store = framepass::UniformStore::default();
    store.upsert("a", Value::Int(1));
    store.upsert("k", Value::Int(1));
    store.upsert("b", Value::Int(2));
    store.upsert("k", Value::Int(2));

    let ordered = store.ordered();
    let names: Vec<&str> = ordered.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["a", "k", "b"]);
    match &ordered[1].1 {
        Value::Int(v) => assert_eq!(*v, 2),
        _ => panic!("expected Int"),
    }
}

#[test]
fn shader_reflection_lookup() {
    let mut reflection = ShaderReflection::default();
    reflection.attributes.insert(
        "vertexPosition".to_string(),
        AttributeInfo {
            location: 0,
            count: 1,
            gl_type: 0,
        },
    );
    reflection.uniforms.insert(
        "mvp".to_string(),
        UniformInfo {
            name: "mvp".to_string(),
            location: 3,
            count: 1,
            uniform_type: UniformType::Mat4,
        },
    );
    reflection.uniform_blocks.insert("Camera".to_string(), 0);

    assert_eq!(reflection.attribute("vertexPosition").unwrap().location, 0);
    assert_eq!(reflection.uniform("mvp").unwrap().location, 3);
    assert_eq!(reflection.block_binding("Camera"), Some(0));
    assert!(reflection.uniform("missing").is_none());
}

#[test]
fn buffer_role_exclusivity() {
    let (gpu, backend) = gpu();
    let shader = shader_with_attributes(&gpu, &backend, "vs", &["pos"]);
    let buf = Buffer::new_for_data(&gpu, vec![0u8; 12], Some(vec![pos_segment("pos", 0)]));

    let plan = Plan::new(&gpu);
    plan.push_state(&[StateArg::Shader(shader.clone())]);
    plan.append(1, &[buf.clone()]);
    let commands = plan.unref_to_commands(false).unwrap();
    assert!(commands.is_ok(), "first plan fixes the buffer to the vertex role");

    let mut blocked_reflection = ShaderReflection::default();
    blocked_reflection.uniform_blocks.insert("block".to_string(), 0);
    backend.with_shader("vs-blocked", blocked_reflection);
    let shader2 = Shader::new_for_code(&gpu, "vs-blocked", "fs");

    let plan2 = Plan::new(&gpu);
    plan2.push_state(&[
        StateArg::Shader(shader2.clone()),
        StateArg::Uniform("block", Value::Buffer(buf.clone())),
    ]);

    let result = plan2.unref_to_commands(false);
    assert!(result.is_none(), "cross-role buffer use is a user error, not a runtime error");
}

#[test]
fn uniform_type_mismatch_fails_compile_with_named_message() {
    let (gpu, backend) = gpu();
    let mut reflection = ShaderReflection::default();
    reflection.uniforms.insert(
        "t".to_string(),
        UniformInfo {
            name: "t".to_string(),
            location: 0,
            count: 1,
            uniform_type: UniformType::Float,
        },
    );
    backend.with_shader("mismatch-vs", reflection);
    let shader = Shader::new_for_code(&gpu, "mismatch-vs", "fs");

    let plan = Plan::new(&gpu);
    plan.push_state(&[
        StateArg::Shader(shader.clone()),
        StateArg::Uniform("t", Value::Int(3)),
    ]);

    let result = plan.unref_to_commands(false).expect("runtime error, not a user error");
    let err = result.expect_err("type mismatch must fail compile");
    assert_eq!(err.code, ErrorCode::FailedShaderUniformSet);
    assert!(err.message.contains('t'));
    assert!(err.message.contains("FLOAT"));
    assert!(err.message.contains("INT"));
}

#[test]
fn consume_with_outstanding_reference_returns_none() {
    let (gpu, _backend) = gpu();
    let plan = Plan::new(&gpu);
    plan.push_state(&[]);
    let kept = plan.clone();

    assert!(plan.unref_to_commands(false).is_none());
    // The other handle is still a perfectly usable plan.
    kept.push_state(&[]);
}

#[test]
fn msaa_texture_shadow_is_created_once_and_cached() {
    let (gpu, backend) = gpu();
    let tex = Texture::new_for_data(&gpu, Vec::new(), 4, 4, Format::Rgba8, 1, 4);

    let first = tex.bound_resource_id().unwrap();
    let second = tex.bound_resource_id().unwrap();

    assert_eq!(first, second);
    assert_eq!(backend.shadow_call_count(), 1, "shadow materialization is cached after first use");
    assert_ne!(first, tex.resource_id(), "a sampled msaa texture binds its shadow, not itself");
}

#[test]
fn non_msaa_texture_binds_itself() {
    let (gpu, backend) = gpu();
    let tex = Texture::new_for_data(&gpu, Vec::new(), 4, 4, Format::Rgba8, 1, 0);

    assert_eq!(tex.bound_resource_id().unwrap(), tex.resource_id());
    assert_eq!(backend.shadow_call_count(), 0);
}

#[test]
fn instanced_append_forwards_buffer_count_and_instances() {
    let (gpu, backend) = gpu();
    let shader = shader_with_attributes(&gpu, &backend, "vs", &["pos", "instanceOffset"]);
    let cube = Buffer::new_for_data(&gpu, vec![0u8; 8 * 4 * 36], Some(vec![pos_segment("pos", 0)]));
    let offsets = Buffer::new_for_data(
        &gpu,
        vec![0u8; 3 * 4 * 10],
        Some(vec![pos_segment("instanceOffset", 1)]),
    );

    let plan = Plan::new(&gpu);
    plan.push_state(&[StateArg::Shader(shader.clone())]);
    plan.append(10, &[cube, offsets]);
    let commands = plan.unref_to_commands(false).unwrap().unwrap();
    commands.dispatch().unwrap();

    assert!(backend
        .calls()
        .contains(&"dispatch_vertices(buffers=2, instances=10)".to_string()));
}

#[test]
fn nested_pass_with_target_resolves_and_blits() {
    let (gpu, backend) = gpu();
    let shader = shader_with_attributes(&gpu, &backend, "vs", &["pos"]);
    let msaa_color = Texture::new_for_data(&gpu, Vec::new(), 64, 64, Format::Rgba8, 1, 4);
    let cube = Buffer::new_for_data(&gpu, vec![0u8; 8 * 4 * 3], Some(vec![pos_segment("pos", 0)]));

    let plan = Plan::new(&gpu);
    plan.push_state(&[
        StateArg::Dest(0, 0, 64, 64),
        StateArg::WriteMask(WriteMask::COLOR),
        StateArg::DepthFunc(TestFunc::Lequal),
        StateArg::Shader(shader.clone()),
    ]);
    plan.push_state(&[
        StateArg::Target(TargetArg::Blended(
            msaa_color.clone(),
            BlendFactor::SrcAlpha,
            BlendFactor::OneMinusSrcAlpha,
        )),
        StateArg::Shader(shader.clone()),
    ]);
    plan.append(1, &[cube]);
    plan.pop(1);
    plan.blit(&msaa_color);
    plan.pop(1);

    let commands = plan.unref_to_commands(true).unwrap().unwrap();
    commands.dispatch().unwrap();

    // The inner pass (with its own target) owns depth 1; the outer pass's
    // blit runs at depth 0, after the inner pass has torn down.
    let log = commands.debug_call_log().unwrap();
    assert_eq!(
        log,
        vec![
            "setup_pass(depth=0)",
            "setup_pass(depth=1)",
            "dispatch_vertices(buffers=1, instances=1)",
            "teardown_pass(depth=1)",
            "rebind_pass(depth=0)",
            "dispatch_blit(depth=0)",
            "teardown_pass(depth=0)",
        ]
    );
    // A blit resolves multisampling directly via `glBlitFramebuffer`
    // rather than through the sampler-uniform shadow-texture path, so the
    // shadow is never materialized here.
    assert_eq!(backend.shadow_call_count(), 0);
}
