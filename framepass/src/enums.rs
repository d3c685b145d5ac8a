//! Closed enumerations from the external interface (spec §6), bit-exact.

use bitflags::bitflags;

bitflags! {
    /// Flags passed to `Gpu::new`.
    pub struct GpuFlags: u32 {
        const BACKEND_OPENGL    = 1 << 0;
        const BACKEND_VULKAN    = 1 << 1;
        const USE_DEBUG_LAYERS  = 1 << 2;
        const NO_THREAD_SAFETY  = 1 << 3;
        const NO_FALLBACK       = 1 << 4;
        const EXIT_ON_ERROR     = 1 << 5;
        const LOG_ERRORS        = 1 << 6;
    }
}

bitflags! {
    /// Color/depth write mask bits, plus the aliases the frontend exposes.
    pub struct WriteMask: u32 {
        const COLOR_RED   = 1;
        const COLOR_GREEN = 2;
        const COLOR_BLUE  = 4;
        const COLOR_ALPHA = 8;
        const DEPTH       = 16;
        const RGB   = Self::COLOR_RED.bits | Self::COLOR_GREEN.bits | Self::COLOR_BLUE.bits;
        const COLOR = Self::RGB.bits | Self::COLOR_ALPHA.bits;
        const ALL   = Self::COLOR.bits | Self::DEPTH.bits;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TestFunc {
    Never,
    Always,
    Less,
    Lequal,
    Greater,
    Gequal,
    Equal,
    NotEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
    ConstantColor,
    OneMinusConstantColor,
    ConstantAlpha,
    OneMinusConstantAlpha,
    SrcAlphaSaturate,
    Src1Color,
    OneMinusSrc1Color,
    Src1Alpha,
    OneMinusSrc1Alpha,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKey {
    Target,
    Shader,
    Uniform,
    Dest,
    WriteMask,
    DepthFunc,
    ClockwiseFaces,
    BackfaceCull,
}

/// Texture pixel formats, plus the internal depth sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    R8,
    Ra8,
    Rgb8,
    Rgba8,
    R32,
    Rgb32,
    Rgba32,
    /// Internal sentinel selecting a depth attachment rather than a color one.
    Depth,
}

impl Format {
    /// Per spec §6: bytes needed to store one pixel of this format.
    /// The `Depth` sentinel has no client-visible pixel size; callers that
    /// need to size a depth texture's storage use the driver's own depth
    /// component size instead.
    pub fn bytes_per_pixel(self) -> Option<usize> {
        match self {
            Format::R8 => Some(1),
            Format::Ra8 => Some(2),
            Format::Rgb8 => Some(3),
            Format::Rgba8 => Some(4),
            Format::R32 => Some(4),
            Format::Rgb32 => Some(12),
            Format::Rgba32 => Some(16),
            Format::Depth => None,
        }
    }

    pub fn is_depth(self) -> bool {
        matches!(self, Format::Depth)
    }
}

/// The expected GL uniform type for a shader reflection entry, per the
/// Value-variant -> GL-uniform-type table in spec §4.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformType {
    Bool,
    Int,
    UInt,
    Float,
    Vec2,
    Vec3,
    Vec4,
    Mat4,
    Sampler2D,
    SamplerCube,
}

impl fmt::Display for UniformType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UniformType::Bool => "BOOL",
            UniformType::Int => "INT",
            UniformType::UInt => "UNSIGNED_INT",
            UniformType::Float => "FLOAT",
            UniformType::Vec2 => "FLOAT_VEC2",
            UniformType::Vec3 => "FLOAT_VEC3",
            UniformType::Vec4 => "FLOAT_VEC4",
            UniformType::Mat4 => "FLOAT_MAT4",
            UniformType::Sampler2D => "SAMPLER_2D",
            UniformType::SamplerCube => "SAMPLER_CUBE",
        };
        f.write_str(s)
    }
}

use std::fmt;
