//! Texture materialization: format mapping and 2D/cubemap/depth/MSAA
//! storage creation, grounded on `render-gl/src/texture.rs`'s DSA
//! (`glCreateTextures` + `glTextureStorage*`) pattern.

use std::os::raw::c_void;

use framepass::backend::{TextureDesc, TextureInfo};
use framepass::{Error, ErrorCode, Format};

use crate::gl_error;

pub(crate) struct GlTexture {
    pub name: u32,
    pub target: u32,
    pub info: TextureInfo,
}

struct FormatTriple {
    internal: u32,
    format: u32,
    ty: u32,
}

fn format_triple(format: Format) -> FormatTriple {
    match format {
        Format::R8 => FormatTriple {
            internal: gl::R8,
            format: gl::RED,
            ty: gl::UNSIGNED_BYTE,
        },
        Format::Ra8 => FormatTriple {
            internal: gl::RG8,
            format: gl::RG,
            ty: gl::UNSIGNED_BYTE,
        },
        Format::Rgb8 => FormatTriple {
            internal: gl::RGB8,
            format: gl::RGB,
            ty: gl::UNSIGNED_BYTE,
        },
        Format::Rgba8 => FormatTriple {
            internal: gl::RGBA8,
            format: gl::RGBA,
            ty: gl::UNSIGNED_BYTE,
        },
        Format::R32 => FormatTriple {
            internal: gl::R32F,
            format: gl::RED,
            ty: gl::FLOAT,
        },
        Format::Rgb32 => FormatTriple {
            internal: gl::RGB32F,
            format: gl::RGB,
            ty: gl::FLOAT,
        },
        Format::Rgba32 => FormatTriple {
            internal: gl::RGBA32F,
            format: gl::RGBA,
            ty: gl::FLOAT,
        },
        Format::Depth => FormatTriple {
            internal: gl::DEPTH_COMPONENT32F,
            format: gl::DEPTH_COMPONENT,
            ty: gl::FLOAT,
        },
    }
}

fn gl_target(desc: &TextureDesc) -> u32 {
    if desc.is_cubemap {
        gl::TEXTURE_CUBE_MAP
    } else if desc.msaa_samples > 0 {
        gl::TEXTURE_2D_MULTISAMPLE
    } else {
        gl::TEXTURE_2D
    }
}

pub(crate) fn create_texture(desc: &TextureDesc) -> Result<GlTexture, Error> {
    let triple = format_triple(desc.format);
    let target = gl_target(desc);
    let mut name = 0;
    unsafe { gl::CreateTextures(target, 1, &mut name) };

    let levels = desc.mipmap_count.max(1) as i32;
    unsafe {
        if desc.msaa_samples > 0 {
            gl::TextureStorage2DMultisample(
                name,
                desc.msaa_samples as i32,
                triple.internal,
                desc.width as i32,
                desc.height as i32,
                gl::TRUE,
            );
        } else {
            gl::TextureStorage2D(name, levels, triple.internal, desc.width as i32, desc.height as i32);
        }
    }

    if !desc.pixels.is_empty() && desc.msaa_samples == 0 {
        let face_bytes = desc.pixels.len() / if desc.is_cubemap { 6 } else { 1 };
        if desc.is_cubemap {
            for face in 0..6u32 {
                let slice = &desc.pixels[face as usize * face_bytes..(face as usize + 1) * face_bytes];
                unsafe {
                    gl::TextureSubImage3D(
                        name,
                        0,
                        0,
                        0,
                        face as i32,
                        desc.width as i32,
                        desc.height as i32,
                        1,
                        triple.format,
                        triple.ty,
                        slice.as_ptr() as *const c_void,
                    );
                }
            }
        } else {
            unsafe {
                gl::TextureSubImage2D(
                    name,
                    0,
                    0,
                    0,
                    desc.width as i32,
                    desc.height as i32,
                    triple.format,
                    triple.ty,
                    desc.pixels.as_ptr() as *const c_void,
                );
            }
        }
        if levels > 1 {
            unsafe { gl::GenerateTextureMipmap(name) };
        }
    }

    let errors = gl_error::drain();
    if !errors.is_empty() {
        unsafe { gl::DeleteTextures(1, &name) };
        return Err(Error::new(ErrorCode::FailedTextureGen, errors.join(", ")));
    }

    Ok(GlTexture {
        name,
        target,
        info: TextureInfo {
            width: desc.width,
            height: desc.height,
            format: desc.format,
            is_cubemap: desc.is_cubemap,
            msaa_samples: desc.msaa_samples,
        },
    })
}

/// Creates the single-sample sibling of an MSAA texture, used as the
/// resolve target before the texture is sampled as a uniform.
pub(crate) fn create_shadow(source: &GlTexture) -> Result<GlTexture, Error> {
    let shadow_desc = TextureDesc {
        is_cubemap: false,
        pixels: Vec::new(),
        width: source.info.width,
        height: source.info.height,
        format: source.info.format,
        mipmap_count: 1,
        msaa_samples: 0,
    };
    create_texture(&shadow_desc)
}

pub(crate) fn destroy_texture(tex: &GlTexture) {
    unsafe { gl::DeleteTextures(1, &tex.name) };
}
