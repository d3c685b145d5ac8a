//! Shader compile/link/reflect, grounded on
//! `render-gl/src/pipeline/shader.rs`'s compile+info-log pattern and
//! `goud_engine`'s global-`gl::`-function call style. No SPIR-V path:
//! reflection walks the linked program's active attributes/uniforms/
//! uniform blocks directly, since the spec excludes shader
//! cross-compilation.

use std::ffi::CString;

use fxhash::FxHashMap;

use framepass::backend::{AttributeInfo, ShaderDesc, ShaderReflection, UniformInfo};
use framepass::{Error, ErrorCode, UniformType};

use crate::gl_error;

pub(crate) struct GlShader {
    pub program: u32,
}

pub(crate) fn compile_and_link(desc: &ShaderDesc) -> Result<(GlShader, ShaderReflection), Error> {
    let vs = compile_stage(gl::VERTEX_SHADER, &desc.vertex_source)?;
    let fs = compile_stage(gl::FRAGMENT_SHADER, &desc.fragment_source)?;

    let program = unsafe { gl::CreateProgram() };
    unsafe {
        gl::AttachShader(program, vs);
        gl::AttachShader(program, fs);
        gl::LinkProgram(program);
        gl::DeleteShader(vs);
        gl::DeleteShader(fs);
    }

    let mut status = gl::FALSE as i32;
    unsafe { gl::GetProgramiv(program, gl::LINK_STATUS, &mut status) };
    if status != gl::TRUE as i32 {
        let log = get_program_info_log(program);
        unsafe { gl::DeleteProgram(program) };
        return Err(gl_error::make_error(ErrorCode::FailedShaderGen, log));
    }

    let reflection = reflect(program);
    Ok((GlShader { program }, reflection))
}

fn compile_stage(stage: u32, source: &str) -> Result<u32, Error> {
    let shader = unsafe { gl::CreateShader(stage) };
    let c_source = CString::new(source).unwrap_or_default();
    unsafe {
        gl::ShaderSource(shader, 1, &c_source.as_ptr(), std::ptr::null());
        gl::CompileShader(shader);
    }
    let mut status = gl::FALSE as i32;
    unsafe { gl::GetShaderiv(shader, gl::COMPILE_STATUS, &mut status) };
    if status != gl::TRUE as i32 {
        let log = get_shader_info_log(shader);
        unsafe { gl::DeleteShader(shader) };
        return Err(gl_error::make_error(ErrorCode::FailedShaderGen, log));
    }
    Ok(shader)
}

fn get_shader_info_log(shader: u32) -> String {
    let mut len = 0;
    unsafe { gl::GetShaderiv(shader, gl::INFO_LOG_LENGTH, &mut len) };
    if len <= 0 {
        return String::new();
    }
    let mut buf = vec![0u8; len as usize];
    unsafe {
        gl::GetShaderInfoLog(shader, len, std::ptr::null_mut(), buf.as_mut_ptr() as *mut i8);
    }
    buf.pop();
    String::from_utf8_lossy(&buf).into_owned()
}

fn get_program_info_log(program: u32) -> String {
    let mut len = 0;
    unsafe { gl::GetProgramiv(program, gl::INFO_LOG_LENGTH, &mut len) };
    if len <= 0 {
        return String::new();
    }
    let mut buf = vec![0u8; len as usize];
    unsafe {
        gl::GetProgramInfoLog(program, len, std::ptr::null_mut(), buf.as_mut_ptr() as *mut i8);
    }
    buf.pop();
    String::from_utf8_lossy(&buf).into_owned()
}

fn map_gl_uniform_type(gl_type: u32) -> Option<UniformType> {
    match gl_type {
        gl::BOOL => Some(UniformType::Bool),
        gl::INT => Some(UniformType::Int),
        gl::UNSIGNED_INT => Some(UniformType::UInt),
        gl::FLOAT => Some(UniformType::Float),
        gl::FLOAT_VEC2 => Some(UniformType::Vec2),
        gl::FLOAT_VEC3 => Some(UniformType::Vec3),
        gl::FLOAT_VEC4 => Some(UniformType::Vec4),
        gl::FLOAT_MAT4 => Some(UniformType::Mat4),
        gl::SAMPLER_2D => Some(UniformType::Sampler2D),
        gl::SAMPLER_CUBE => Some(UniformType::SamplerCube),
        _ => None,
    }
}

fn get_resource_name(buf_len: usize, fill: impl FnOnce(*mut i32, *mut i8)) -> String {
    let mut name_buf = vec![0u8; buf_len];
    let mut length: i32 = 0;
    fill(&mut length, name_buf.as_mut_ptr() as *mut i8);
    name_buf.truncate(length.max(0) as usize);
    String::from_utf8_lossy(&name_buf).into_owned()
}

fn uniform_location(program: u32, name: &str) -> i32 {
    let c_name = CString::new(name).unwrap_or_default();
    unsafe { gl::GetUniformLocation(program, c_name.as_ptr()) }
}

/// Enumerates active attributes, active uniforms (flattened, one entry
/// per array element, with the `[0]` suffix stripped from the base name
/// per spec §4.2), and active uniform blocks.
fn reflect(program: u32) -> ShaderReflection {
    let mut attributes = FxHashMap::default();
    let mut uniforms = FxHashMap::default();
    let mut ordered_uniform_names = Vec::new();
    let mut uniform_blocks = FxHashMap::default();

    let mut attrib_count = 0;
    unsafe { gl::GetProgramiv(program, gl::ACTIVE_ATTRIBUTES, &mut attrib_count) };
    for i in 0..attrib_count as u32 {
        let mut size = 0;
        let mut gl_type = 0;
        let name = get_resource_name(256, |len, ptr| unsafe {
            gl::GetActiveAttrib(program, i, 256, len, &mut size, &mut gl_type, ptr);
        });
        let c_name = CString::new(name.clone()).unwrap_or_default();
        let location = unsafe { gl::GetAttribLocation(program, c_name.as_ptr()) };
        attributes.insert(
            name,
            AttributeInfo {
                location,
                count: size,
                gl_type,
            },
        );
    }

    let mut uniform_count = 0;
    unsafe { gl::GetProgramiv(program, gl::ACTIVE_UNIFORMS, &mut uniform_count) };
    for i in 0..uniform_count as u32 {
        let mut size = 0;
        let mut gl_type = 0;
        let mut name = get_resource_name(256, |len, ptr| unsafe {
            gl::GetActiveUniform(program, i, 256, len, &mut size, &mut gl_type, ptr);
        });
        if let Some(stripped) = name.strip_suffix("[0]") {
            name = stripped.to_string();
        }
        let uniform_type = match map_gl_uniform_type(gl_type) {
            Some(t) => t,
            None => continue,
        };
        let base_location = uniform_location(program, &name);
        let element_count = size.max(1);
        for element in 0..element_count {
            let element_name = if element_count > 1 {
                format!("{}[{}]", name, element)
            } else {
                name.clone()
            };
            let location = base_location + element;
            uniforms.insert(
                element_name.clone(),
                UniformInfo {
                    name: element_name.clone(),
                    location,
                    count: 1,
                    uniform_type,
                },
            );
            ordered_uniform_names.push(element_name);
        }
        if element_count > 1 {
            // The bare (unsuffixed) name also resolves, to element 0,
            // matching how a user binds the whole array by its base name.
            uniforms.insert(
                name.clone(),
                UniformInfo {
                    name,
                    location: base_location,
                    count: element_count,
                    uniform_type,
                },
            );
        }
    }

    // Keyed by block name rather than a member's default-block location:
    // block-member uniforms report location -1, so a location-keyed map
    // would collide across more than one block.
    let mut block_count = 0;
    unsafe { gl::GetProgramiv(program, gl::ACTIVE_UNIFORM_BLOCKS, &mut block_count) };
    for block_index in 0..block_count as u32 {
        let block_name = get_resource_name(256, |len, ptr| unsafe {
            gl::GetActiveUniformBlockName(program, block_index, 256, len, ptr);
        });
        uniform_blocks.insert(block_name, block_index);
    }

    ShaderReflection {
        attributes,
        uniforms,
        ordered_uniform_names,
        uniform_blocks,
    }
}
