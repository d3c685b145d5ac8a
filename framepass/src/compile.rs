//! The Compiler (spec §4.2): validates, materializes resources for, and
//! lowers a plan's instruction tree into immutable `Commands`.

use std::sync::Mutex;

use crate::error::{Error, ErrorCode};
use crate::gpu::Gpu;
use crate::plan::{effective_shader, Child, PassNode};
use crate::resource::Commands;
use crate::value::Value;

/// Compile-time and most-recent-dispatch-time human-readable call logs,
/// populated only when the plan was consumed with debug annotations on.
#[derive(Debug, Default)]
pub(crate) struct DebugLog {
    pub compile_time: Vec<String>,
    pub run_time: Vec<String>,
}

pub(crate) struct CommandsInner {
    pub gpu: Gpu,
    pub nodes: Vec<PassNode>,
    pub root: Option<usize>,
    pub debug_log: Option<Mutex<DebugLog>>,
}

/// Tier-1 (user error, already logged) vs tier-2 (runtime error, carries
/// code + message) compile failure.
enum Fail {
    User,
    Runtime(Error),
}

type CResult<T> = Result<T, Fail>;

pub(crate) fn compile(
    gpu: Gpu,
    nodes: Vec<PassNode>,
    root: Option<usize>,
    debug: bool,
) -> Option<Result<Commands, Error>> {
    let mut log: Vec<String> = Vec::new();

    let outcome = match root {
        Some(root_idx) => visit(&nodes, root_idx, &mut log),
        None => Ok(()),
    };

    if let Err(fail) = outcome {
        return match fail {
            Fail::User => None,
            Fail::Runtime(e) => {
                gpu.handle_runtime_error(&e);
                Some(Err(e))
            }
        };
    }

    let max_depth = nodes.iter().map(|n| n.depth).max().unwrap_or(0);
    // Two scratch slots beyond the deepest pass's own slot (Design Notes
    // §9(a)): the safe upper bound is preserved even though fake passes
    // never consume a slot of their own.
    let required_depth = max_depth + 3;
    if let Err(e) = gpu.backend().ensure_framebuffer_stack(required_depth) {
        gpu.handle_runtime_error(&e);
        return Some(Err(e));
    }

    let debug_log = if debug {
        Some(Mutex::new(DebugLog {
            compile_time: log,
            run_time: Vec::new(),
        }))
    } else {
        None
    };

    Some(Ok(Commands(std::sync::Arc::new(CommandsInner {
        gpu,
        nodes,
        root,
        debug_log,
    }))))
}

fn visit(nodes: &[PassNode], idx: usize, log: &mut Vec<String>) -> CResult<()> {
    let node = &nodes[idx];

    if let Some(shader) = &node.shader {
        shader.ensure().map_err(Fail::Runtime)?;
        log.push(format!("ensure_shader(pass={})", idx));
    }

    for target in &node.targets {
        target.texture.ensure().map_err(Fail::Runtime)?;
    }

    validate_uniforms(nodes, idx, log)?;

    for child in &node.children {
        match child {
            Child::Pass(child_idx) => visit(nodes, *child_idx, log)?,
            Child::Vertices(vop) => {
                let shader = effective_shader(nodes, idx);
                let reflection = match &shader {
                    Some(s) => Some(s.ensure().map_err(Fail::Runtime)?),
                    None => None,
                };
                for buf in &vop.buffers {
                    match buf.ensure_vertex() {
                        Ok(true) => {}
                        Ok(false) => return Err(Fail::User),
                        Err(e) => return Err(Fail::Runtime(e)),
                    }
                    if let (Some(reflection), Some(layout)) = (reflection, &buf.desc().layout) {
                        for seg in layout {
                            if reflection.attribute(&seg.name).is_none() {
                                return Err(Fail::Runtime(Error::new(
                                    ErrorCode::FailedShaderGen,
                                    format!("attribute '{}' does not exist in the in-scope shader", seg.name),
                                )));
                            }
                        }
                    }
                }
                log.push(format!("ensure_vertices(pass={}, buffers={})", idx, vop.buffers.len()));
            }
            Child::Blit(bop) => {
                bop.src.ensure().map_err(Fail::Runtime)?;
                log.push(format!("ensure_blit(pass={})", idx));
            }
        }
    }

    Ok(())
}

fn validate_uniforms(nodes: &[PassNode], idx: usize, log: &mut Vec<String>) -> CResult<()> {
    let node = &nodes[idx];
    if node.uniforms.is_empty() {
        return Ok(());
    }
    let shader = effective_shader(nodes, idx);
    for (name, value) in node.uniforms.ordered() {
        let shader = shader.clone().ok_or_else(|| {
            Fail::Runtime(Error::new(
                ErrorCode::FailedShaderUniformSet,
                format!("{}: no shader in scope", name),
            ))
        })?;
        let reflection = shader.ensure().map_err(Fail::Runtime)?;

        if let Value::Buffer(buf) = &value {
            // A named uniform block, bound as a whole via a uniform buffer.
            if reflection.block_binding(&name).is_none() {
                return Err(Fail::Runtime(Error::new(
                    ErrorCode::FailedShaderUniformSet,
                    format!("uniform block '{}' does not exist", name),
                )));
            }
            match buf.ensure_uniform() {
                Ok(true) => {}
                Ok(false) => return Err(Fail::User),
                Err(e) => return Err(Fail::Runtime(e)),
            }
            log.push(format!("validate_uniform_block({})", name));
            continue;
        }

        let info = reflection.uniform(&name).ok_or_else(|| {
            Fail::Runtime(Error::new(
                ErrorCode::FailedShaderUniformSet,
                format!("uniform '{}' does not exist", name),
            ))
        })?;
        if !value.accepted_uniform_types().contains(&info.uniform_type) {
            return Err(Fail::Runtime(Error::new(
                ErrorCode::FailedShaderUniformSet,
                format!(
                    "{}: expected {}, got {}",
                    name,
                    info.uniform_type,
                    value.gl_type_name()
                ),
            )));
        }
        if let Value::Texture(tex) = &value {
            let info = tex.ensure().map_err(Fail::Runtime)?;
            if info.msaa_samples > 0 {
                tex.ensure_shadow_id().map_err(Fail::Runtime)?;
            }
        }
        log.push(format!("validate_uniform({})", name));
    }
    Ok(())
}
