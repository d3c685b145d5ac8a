use std::cell::RefCell;
use std::rc::Rc;

use crate::enums::{BlendFactor, TestFunc, WriteMask};
use crate::error::Error;
use crate::gpu::Gpu;
use crate::resource::{Buffer, Commands, Shader, Texture};
use crate::value::Value;
use fxhash::FxHashMap;

/// A resolved render target within a pass, in the order it was declared.
#[derive(Debug, Clone)]
pub struct Target {
    pub texture: Texture,
    pub src_blend: BlendFactor,
    pub dst_blend: BlendFactor,
}

/// Hash-by-name lookup plus an ordered name array preserving
/// first-insertion order (spec §3/§8's uniform-ordering invariant).
#[derive(Debug, Clone, Default)]
pub struct UniformStore {
    order: Vec<String>,
    values: FxHashMap<String, Value>,
}

impl UniformStore {
    pub fn upsert(&mut self, name: &str, value: Value) {
        if self.values.contains_key(name) {
            self.values.insert(name.to_string(), value);
        } else {
            self.order.push(name.to_string());
            self.values.insert(name.to_string(), value);
        }
    }

    pub fn ordered(&self) -> Vec<(String, Value)> {
        self.order
            .iter()
            .map(|n| (n.clone(), self.values[n].clone()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct VerticesOp {
    pub buffers: Vec<Buffer>,
    pub instances: u32,
}

#[derive(Debug, Clone)]
pub struct BlitOp {
    pub src: Texture,
}

#[derive(Debug, Clone)]
pub enum Child {
    Pass(usize),
    Vertices(VerticesOp),
    Blit(BlitOp),
}

/// An internal tree node carrying render state, inherited by its
/// descendants (spec §3, Glossary "Pass").
#[derive(Debug, Clone)]
pub struct PassNode {
    pub parent: Option<usize>,
    pub children: Vec<Child>,
    pub shader: Option<Shader>,
    pub targets: Vec<Target>,
    pub uniforms: UniformStore,
    pub dest_rect: Option<(i32, i32, i32, i32)>,
    pub write_mask: Option<WriteMask>,
    pub depth_func: Option<TestFunc>,
    pub clockwise_faces: Option<bool>,
    pub backface_cull: Option<bool>,
    pub depth: u32,
    pub fake: bool,
}

/// Walks `idx` and its ancestors to find the nearest in-scope shader. A
/// fake pass already carries its parent's shader by value (copied at
/// `push_group` time), but a non-fake pass that configured targets
/// without a shader leaves its own `shader` field unset and relies on
/// this walk, per spec §4.1's append-validation wording.
pub(crate) fn effective_shader(nodes: &[PassNode], start: usize) -> Option<Shader> {
    let mut cur = Some(start);
    while let Some(idx) = cur {
        if let Some(s) = &nodes[idx].shader {
            return Some(s.clone());
        }
        cur = nodes[idx].parent;
    }
    None
}

fn append_satisfied(nodes: &[PassNode], idx: usize) -> bool {
    let node = &nodes[idx];
    let shader_ok = effective_shader(nodes, idx).is_some();
    let mask_ok = node.write_mask.is_some();
    let depth_ok = match node.write_mask {
        Some(m) if m.contains(WriteMask::DEPTH) => node.depth_func.is_some(),
        _ => true,
    };
    shader_ok && mask_ok && depth_ok
}

/// In-progress node accumulated between `begin_config` and `push_group`.
struct Configuring {
    shader: Option<Shader>,
    shader_set: bool,
    targets: Vec<Target>,
    targets_set: bool,
    uniforms: UniformStore,
    dest_rect: Option<(i32, i32, i32, i32)>,
    write_mask: Option<WriteMask>,
    depth_func: Option<TestFunc>,
    clockwise_faces: Option<bool>,
    backface_cull: Option<bool>,
}

impl Configuring {
    fn new() -> Configuring {
        Configuring {
            shader: None,
            shader_set: false,
            targets: Vec::new(),
            targets_set: false,
            uniforms: UniformStore::default(),
            dest_rect: None,
            write_mask: None,
            depth_func: None,
            clockwise_faces: None,
            backface_cull: None,
        }
    }
}

struct PlanInner {
    gpu: Gpu,
    nodes: Vec<PassNode>,
    root: Option<usize>,
    cursor: Option<usize>,
    configuring: Option<Configuring>,
}

/// A mutable builder that grows an instruction tree (spec §4.1). Not
/// thread-safe across writers: plan authoring is single-threaded by
/// construction (`Rc<RefCell<_>>`), which also makes `unref_to_commands`'s
/// "exactly one reference" precondition a natural `Rc::try_unwrap`.
#[derive(Clone)]
pub struct Plan(Rc<RefCell<PlanInner>>);

/// Arguments to `config_targets`: either a bare texture (default blends
/// `ONE`/`ZERO`) or an explicit `(texture, src_blend, dst_blend)` triple.
pub enum TargetArg {
    Texture(Texture),
    Blended(Texture, BlendFactor, BlendFactor),
}

/// Arguments to `push_state`, replacing the source API's null-terminated
/// variadic list (Design Notes §9) with an explicit, typed slice.
pub enum StateArg<'a> {
    Target(TargetArg),
    Shader(Shader),
    Uniform(&'a str, Value),
    Dest(i32, i32, i32, i32),
    WriteMask(WriteMask),
    DepthFunc(TestFunc),
    ClockwiseFaces(bool),
    BackfaceCull(bool),
}

impl Plan {
    pub fn new(gpu: &Gpu) -> Plan {
        Plan(Rc::new(RefCell::new(PlanInner {
            gpu: gpu.clone(),
            nodes: Vec::new(),
            root: None,
            cursor: None,
            configuring: None,
        })))
    }

    pub fn begin_config(&self) {
        let mut inner = self.0.borrow_mut();
        if inner.configuring.is_some() {
            log::error!("begin_config: a configuring node already exists");
            return;
        }
        inner.configuring = Some(Configuring::new());
    }

    pub fn config_targets(&self, values: &[TargetArg]) {
        let mut inner = self.0.borrow_mut();
        let cfg = match inner.configuring.as_mut() {
            Some(c) => c,
            None => {
                log::error!("config_targets: no configuring node");
                return;
            }
        };
        for v in values {
            let target = match v {
                TargetArg::Texture(t) => Target {
                    texture: t.clone(),
                    src_blend: BlendFactor::One,
                    dst_blend: BlendFactor::Zero,
                },
                TargetArg::Blended(t, src, dst) => Target {
                    texture: t.clone(),
                    src_blend: *src,
                    dst_blend: *dst,
                },
            };
            cfg.targets.push(target);
        }
        cfg.targets_set = true;
    }

    pub fn config_shader(&self, shader: &Shader) {
        let mut inner = self.0.borrow_mut();
        match inner.configuring.as_mut() {
            Some(cfg) => {
                cfg.shader = Some(shader.clone());
                cfg.shader_set = true;
            }
            None => log::error!("config_shader: no configuring node"),
        }
    }

    pub fn config_uniforms(&self, kvs: &[(&str, Value)]) {
        let mut inner = self.0.borrow_mut();
        match inner.configuring.as_mut() {
            Some(cfg) => {
                for (name, value) in kvs {
                    cfg.uniforms.upsert(name, value.clone());
                }
            }
            None => log::error!("config_uniforms: no configuring node"),
        }
    }

    pub fn config_dest(&self, x: i32, y: i32, w: i32, h: i32) {
        if w == 0 || h == 0 {
            log::error!("config_dest: width and height must be non-zero");
            return;
        }
        let mut inner = self.0.borrow_mut();
        match inner.configuring.as_mut() {
            Some(cfg) => cfg.dest_rect = Some((x, y, w, h)),
            None => log::error!("config_dest: no configuring node"),
        }
    }

    pub fn config_write_mask(&self, mask: WriteMask) {
        let mut inner = self.0.borrow_mut();
        match inner.configuring.as_mut() {
            Some(cfg) => cfg.write_mask = Some(mask),
            None => log::error!("config_write_mask: no configuring node"),
        }
    }

    pub fn config_depth_test_func(&self, func: TestFunc) {
        let mut inner = self.0.borrow_mut();
        match inner.configuring.as_mut() {
            Some(cfg) => cfg.depth_func = Some(func),
            None => log::error!("config_depth_test_func: no configuring node"),
        }
    }

    pub fn config_clockwise_faces(&self, v: bool) {
        let mut inner = self.0.borrow_mut();
        match inner.configuring.as_mut() {
            Some(cfg) => cfg.clockwise_faces = Some(v),
            None => log::error!("config_clockwise_faces: no configuring node"),
        }
    }

    pub fn config_backface_cull(&self, v: bool) {
        let mut inner = self.0.borrow_mut();
        match inner.configuring.as_mut() {
            Some(cfg) => cfg.backface_cull = Some(v),
            None => log::error!("config_backface_cull: no configuring node"),
        }
    }

    pub fn push_group(&self) {
        let mut inner = self.0.borrow_mut();
        let cfg = match inner.configuring.take() {
            Some(cfg) => cfg,
            None => {
                log::error!("push_group: no configuring node");
                return;
            }
        };
        inner.commit(cfg);
    }

    /// Convenience wrapper: `begin_config`, dispatch each arg to its
    /// matching setter, then `push_group`.
    pub fn push_state(&self, args: &[StateArg<'_>]) {
        self.begin_config();
        let mut targets = Vec::new();
        for arg in args {
            match arg {
                StateArg::Target(t) => targets.push(clone_target_arg(t)),
                StateArg::Shader(s) => self.config_shader(s),
                StateArg::Uniform(name, v) => self.config_uniforms(&[(*name, v.clone())]),
                StateArg::Dest(x, y, w, h) => self.config_dest(*x, *y, *w, *h),
                StateArg::WriteMask(m) => self.config_write_mask(*m),
                StateArg::DepthFunc(f) => self.config_depth_test_func(*f),
                StateArg::ClockwiseFaces(b) => self.config_clockwise_faces(*b),
                StateArg::BackfaceCull(b) => self.config_backface_cull(*b),
            }
        }
        if !targets.is_empty() {
            self.config_targets(&targets);
        }
        self.push_group();
    }

    pub fn append(&self, instances: u32, buffers: &[Buffer]) {
        if instances < 1 {
            log::error!("append: instances must be >= 1");
            return;
        }
        let mut inner = self.0.borrow_mut();
        let cursor = match inner.cursor {
            Some(c) => c,
            None => {
                log::error!("append: no current pass");
                return;
            }
        };
        if !append_satisfied(&inner.nodes, cursor) {
            log::error!("append: shader, write-mask, and depth-func (when DEPTH is written) must be in scope");
            return;
        }
        inner.nodes[cursor].children.push(Child::Vertices(VerticesOp {
            buffers: buffers.to_vec(),
            instances,
        }));
    }

    pub fn blit(&self, src_texture: &Texture) {
        let mut inner = self.0.borrow_mut();
        let cursor = match inner.cursor {
            Some(c) => c,
            None => {
                log::error!("blit: no current pass");
                return;
            }
        };
        inner.nodes[cursor].children.push(Child::Blit(BlitOp {
            src: src_texture.clone(),
        }));
    }

    pub fn pop(&self, n: u32) {
        let mut inner = self.0.borrow_mut();
        let mut remaining = n;
        let mut walk = inner.cursor;
        while remaining > 0 {
            match walk {
                Some(idx) => {
                    walk = inner.nodes[idx].parent;
                    remaining -= 1;
                }
                None => {
                    log::error!("pop: cannot pop past root");
                    return;
                }
            }
        }
        inner.cursor = walk;
    }

    /// Consumes the plan into compiled `Commands`. Requires the caller to
    /// hold the sole remaining reference (spec §4.2): `None` if other
    /// references exist or any user-error (tier-1) path is hit during
    /// compilation; `Some(Err(_))` for a runtime (tier-2) compile failure;
    /// `Some(Ok(_))` on success.
    pub fn unref_to_commands(self, debug: bool) -> Option<Result<Commands, Error>> {
        let inner = match Rc::try_unwrap(self.0) {
            Ok(cell) => cell.into_inner(),
            Err(_) => {
                log::error!("unref_to_commands: plan still has references");
                return None;
            }
        };
        crate::compile::compile(inner.gpu, inner.nodes, inner.root, debug)
    }
}

impl PlanInner {
    fn commit(&mut self, cfg: Configuring) {
        let fake = !(cfg.targets_set || cfg.shader_set);

        match self.cursor {
            None => {
                // Becoming root.
                let node = PassNode {
                    parent: None,
                    children: Vec::new(),
                    shader: cfg.shader,
                    targets: cfg.targets,
                    uniforms: cfg.uniforms,
                    dest_rect: cfg.dest_rect,
                    write_mask: Some(cfg.write_mask.unwrap_or(WriteMask::ALL)),
                    depth_func: Some(cfg.depth_func.unwrap_or(TestFunc::Lequal)),
                    clockwise_faces: Some(cfg.clockwise_faces.unwrap_or(false)),
                    backface_cull: Some(cfg.backface_cull.unwrap_or(true)),
                    depth: 0,
                    fake: false,
                };
                let idx = self.nodes.len();
                self.nodes.push(node);
                self.root = Some(idx);
                self.cursor = Some(idx);
            }
            Some(parent_idx) => {
                let (parent_depth, parent_shader, parent_targets, parent_write_mask, parent_depth_func, parent_cw, parent_cull) = {
                    let p = &self.nodes[parent_idx];
                    (
                        p.depth,
                        p.shader.clone(),
                        p.targets.clone(),
                        p.write_mask,
                        p.depth_func,
                        p.clockwise_faces,
                        p.backface_cull,
                    )
                };

                let (shader, targets, depth) = if fake {
                    (parent_shader, parent_targets, parent_depth)
                } else {
                    (cfg.shader, cfg.targets, parent_depth + 1)
                };

                let node = PassNode {
                    parent: Some(parent_idx),
                    children: Vec::new(),
                    shader,
                    targets,
                    uniforms: cfg.uniforms,
                    dest_rect: cfg.dest_rect,
                    write_mask: cfg.write_mask.or(parent_write_mask),
                    depth_func: cfg.depth_func.or(parent_depth_func),
                    clockwise_faces: cfg.clockwise_faces.or(parent_cw),
                    backface_cull: cfg.backface_cull.or(parent_cull),
                    depth,
                    fake,
                };
                let idx = self.nodes.len();
                self.nodes.push(node);
                self.nodes[parent_idx].children.push(Child::Pass(idx));
                self.cursor = Some(idx);
            }
        }
    }
}

fn clone_target_arg(t: &TargetArg) -> TargetArg {
    match t {
        TargetArg::Texture(tex) => TargetArg::Texture(tex.clone()),
        TargetArg::Blended(tex, s, d) => TargetArg::Blended(tex.clone(), *s, *d),
    }
}
