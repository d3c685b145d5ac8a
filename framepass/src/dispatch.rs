//! The Dispatcher (spec §4.3): walks a compiled tree pre-order, bracketing
//! each pass's children with backend setup/teardown calls and issuing
//! leaf draw/blit calls in order.

use crate::backend::{PassState, TargetDesc};
use crate::compile::CommandsInner;
use crate::enums::WriteMask;
use crate::error::Result;
use crate::plan::{effective_shader, Child};
use crate::resource::Commands;

pub(crate) fn dispatch(commands: &Commands) -> Result<()> {
    let inner = &commands.0;
    if !inner.gpu.check_claim("commands_dispatch") {
        return Ok(());
    }
    if let Some(log) = &inner.debug_log {
        log.lock().unwrap().run_time.clear();
    }
    if let Some(root) = inner.root {
        if let Err(e) = visit(inner, root) {
            inner.gpu.handle_runtime_error(&e);
            return Err(e);
        }
    }
    Ok(())
}

fn log_line(inner: &CommandsInner, line: impl Into<String>) {
    if let Some(log) = &inner.debug_log {
        log.lock().unwrap().run_time.push(line.into());
    }
}

fn visit(inner: &CommandsInner, idx: usize) -> Result<()> {
    let node = &inner.nodes[idx];
    let backend = inner.gpu.backend();

    let mut targets: Vec<TargetDesc> = Vec::with_capacity(node.targets.len());
    for t in &node.targets {
        let info = t.texture.ensure()?;
        targets.push(TargetDesc {
            texture_id: t.texture.id(),
            info,
            src_blend: t.src_blend,
            dst_blend: t.dst_blend,
        });
    }

    let uniforms = node.uniforms.ordered();
    // Walks ancestors for a non-fake node that configured targets without
    // its own shader (spec §4.1); a fake node already carries its parent's
    // shader by value. Must agree with `compile.rs`'s own use of
    // `effective_shader`, or a plan that compiles successfully could fail
    // at dispatch over what "shader in scope" means for the same node.
    let in_scope_shader = effective_shader(&inner.nodes, idx);
    let shader_id = in_scope_shader.as_ref().map(|s| s.id());
    let reflection = in_scope_shader.as_ref().and_then(|s| s.reflection());

    let state = PassState {
        dest_rect: node.dest_rect,
        write_mask: node.write_mask.unwrap_or(WriteMask::ALL),
        depth_func: node.depth_func,
        clockwise_faces: node.clockwise_faces.unwrap_or(false),
        backface_cull: node.backface_cull.unwrap_or(true),
    };

    backend.setup_pass(node.depth, shader_id, &targets, &uniforms, reflection, &state)?;
    log_line(inner, format!("setup_pass(depth={})", node.depth));

    // A nested pass's own teardown only detaches its attachments and
    // unbinds its texture/buffer-base slots; it does not restore this
    // node's own framebuffer/program/raster state. Rebind defensively
    // before any leaf dispatch that follows one, so a sibling after a
    // nested pass does not run against whatever the nested pass last
    // bound (spec §4.3 Teardown).
    let mut needs_rebind = false;

    for child in &node.children {
        match child {
            Child::Pass(child_idx) => {
                visit(inner, *child_idx)?;
                needs_rebind = true;
            }
            Child::Vertices(vop) => {
                if needs_rebind {
                    backend.rebind_pass(node.depth, shader_id, &targets, &uniforms, reflection, &state)?;
                    needs_rebind = false;
                }
                let shader_id = shader_id.ok_or_else(|| {
                    crate::error::Error::new(
                        crate::error::ErrorCode::FailedShaderGen,
                        "vertices op dispatched with no shader in scope",
                    )
                })?;
                let reflection = reflection.ok_or_else(|| {
                    crate::error::Error::new(
                        crate::error::ErrorCode::FailedShaderGen,
                        "vertices op dispatched with no shader reflection available",
                    )
                })?;
                let buffers: Vec<_> = vop
                    .buffers
                    .iter()
                    .map(|b| (b.id(), b.desc().clone()))
                    .collect();
                backend.dispatch_vertices(shader_id, reflection, &buffers, vop.instances)?;
                log_line(
                    inner,
                    format!("dispatch_vertices(depth={}, instances={})", node.depth, vop.instances),
                );
            }
            Child::Blit(bop) => {
                if needs_rebind {
                    backend.rebind_pass(node.depth, shader_id, &targets, &uniforms, reflection, &state)?;
                    needs_rebind = false;
                }
                let dest = node.dest_rect.unwrap_or((0, 0, 0, 0));
                let tex_info = bop.src.ensure()?;
                backend.dispatch_blit(node.depth, bop.src.id(), &tex_info, dest)?;
                log_line(inner, format!("dispatch_blit(depth={})", node.depth));
            }
        }
    }

    backend.teardown_pass(node.depth, &targets, &uniforms, reflection)?;
    log_line(inner, format!("teardown_pass(depth={})", node.depth));

    Ok(())
}
