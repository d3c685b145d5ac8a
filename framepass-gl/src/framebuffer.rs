//! The dispatcher's scratch framebuffer stack, grounded on
//! `render-gl/src/framebuffer.rs::GlFramebuffer::new`'s DSA attach +
//! draw-buffers + completeness-check pattern. One scratch FBO per tree
//! depth, attached and detached fresh on every `setup_pass`/
//! `teardown_pass` pair, per spec §9 Design Notes.

use framepass::{Error, ErrorCode};

const MAX_COLOR_ATTACHMENTS: usize = 8;

pub(crate) struct GlFramebuffer {
    pub obj: u32,
}

impl GlFramebuffer {
    pub(crate) fn new() -> GlFramebuffer {
        let mut obj = 0;
        unsafe { gl::CreateFramebuffers(1, &mut obj) };
        GlFramebuffer { obj }
    }
}

impl Drop for GlFramebuffer {
    fn drop(&mut self) {
        unsafe { gl::DeleteFramebuffers(1, &self.obj) };
    }
}

/// The per-`Gpu` stack of scratch FBOs, grown on demand up to the depth
/// the compiler computed (`max_depth + 3` slots, spec §9 Design Notes).
pub(crate) struct FramebufferStack {
    slots: Vec<GlFramebuffer>,
}

impl FramebufferStack {
    pub(crate) fn new() -> FramebufferStack {
        FramebufferStack { slots: Vec::new() }
    }

    pub(crate) fn ensure_depth(&mut self, required: u32) {
        while self.slots.len() < required as usize {
            self.slots.push(GlFramebuffer::new());
        }
    }

    pub(crate) fn slot(&self, depth: u32) -> u32 {
        self.slots[depth as usize].obj
    }
}

/// Attaches `color_textures` (in declaration order) and an optional depth
/// texture to the scratch FBO at `fbo`, enables the matching draw
/// buffers, and checks completeness. Attaches the default framebuffer
/// (`0`) when `color_textures` is empty and there is no depth texture,
/// per spec's "no targets configured renders to the default framebuffer"
/// rule.
pub(crate) fn attach(
    fbo: u32,
    color_textures: &[(u32, u32)],
    depth_texture: Option<(u32, u32)>,
) -> Result<u32, Error> {
    if color_textures.is_empty() && depth_texture.is_none() {
        return Ok(0);
    }

    assert!(color_textures.len() <= MAX_COLOR_ATTACHMENTS);

    for (index, &(target, name)) in color_textures.iter().enumerate() {
        let attachment = gl::COLOR_ATTACHMENT0 + index as u32;
        unsafe {
            if target == gl::TEXTURE_2D_MULTISAMPLE || target == gl::TEXTURE_2D {
                gl::NamedFramebufferTexture(fbo, attachment, name, 0);
            } else {
                gl::NamedFramebufferTextureLayer(fbo, attachment, name, 0, 0);
            }
        }
    }

    if let Some((_, name)) = depth_texture {
        unsafe {
            gl::NamedFramebufferTexture(fbo, gl::DEPTH_ATTACHMENT, name, 0);
        }
    }

    let draw_buffers: Vec<u32> = (0..color_textures.len() as u32)
        .map(|i| gl::COLOR_ATTACHMENT0 + i)
        .collect();
    unsafe {
        if draw_buffers.is_empty() {
            gl::NamedFramebufferDrawBuffer(fbo, gl::NONE);
        } else {
            gl::NamedFramebufferDrawBuffers(fbo, draw_buffers.len() as i32, draw_buffers.as_ptr());
        }
    }

    let status = unsafe { gl::CheckNamedFramebufferStatus(fbo, gl::DRAW_FRAMEBUFFER) };
    if status != gl::FRAMEBUFFER_COMPLETE {
        return Err(Error::new(
            ErrorCode::FailedTargetCreation,
            format!("framebuffer incomplete: status {:#x}", status),
        ));
    }
    Ok(fbo)
}

/// Detaches every attachment point so the scratch FBO is clean for the
/// next pass that reuses this depth slot.
pub(crate) fn detach(fbo: u32, color_count: usize) {
    if fbo == 0 {
        return;
    }
    for index in 0..color_count as u32 {
        unsafe {
            gl::NamedFramebufferTexture(fbo, gl::COLOR_ATTACHMENT0 + index, 0, 0);
        }
    }
    unsafe {
        gl::NamedFramebufferTexture(fbo, gl::DEPTH_ATTACHMENT, 0, 0);
        gl::NamedFramebufferDrawBuffer(fbo, gl::NONE);
    }
}
