use crate::enums::UniformType;
use crate::resource::{Buffer, Shader, Texture};

/// Tagged union used for uniforms, state arguments, and tuple composition
/// (spec §3). Unlike the source API this always owns its interior; there
/// is no separate "foreign" (borrowed) construction form, since Rust
/// ownership already gives the initialized, owning shape on construction.
#[derive(Debug, Clone)]
pub enum Value {
    Shader(Shader),
    Buffer(Buffer),
    Texture(Texture),
    Bool(bool),
    Int(i32),
    UInt(u32),
    Float(f32),
    Pointer(usize),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Mat4([f32; 16]),
    Rect { x: i32, y: i32, w: i32, h: i32 },
    KeyVal(String, Box<Value>),
    Tuple2(Box<Value>, Box<Value>),
    Tuple3(Box<Value>, Box<Value>, Box<Value>),
    Tuple4(Box<Value>, Box<Value>, Box<Value>, Box<Value>),
}

impl Value {
    /// Human-readable variant name, used in compile-error messages.
    pub fn variant_name(&self) -> &'static str {
        match self {
            Value::Shader(_) => "Shader",
            Value::Buffer(_) => "Buffer",
            Value::Texture(_) => "Texture",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::UInt(_) => "UInt",
            Value::Float(_) => "Float",
            Value::Pointer(_) => "Pointer",
            Value::Vec2(_) => "Vec2",
            Value::Vec3(_) => "Vec3",
            Value::Vec4(_) => "Vec4",
            Value::Mat4(_) => "Mat4",
            Value::Rect { .. } => "Rect",
            Value::KeyVal(..) => "KeyVal",
            Value::Tuple2(..) => "Tuple2",
            Value::Tuple3(..) => "Tuple3",
            Value::Tuple4(..) => "Tuple4",
        }
    }

    /// The GL-style uniform type name for this value, used on the "got"
    /// side of a compile-error message so it reads in the same casing as
    /// `UniformType`'s `Display` impl on the "expected" side. Falls back to
    /// `variant_name` for variants with no GL uniform-type equivalent.
    pub fn gl_type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "BOOL",
            Value::Int(_) => "INT",
            Value::UInt(_) => "UNSIGNED_INT",
            Value::Float(_) => "FLOAT",
            Value::Vec2(_) => "FLOAT_VEC2",
            Value::Vec3(_) => "FLOAT_VEC3",
            Value::Vec4(_) => "FLOAT_VEC4",
            Value::Mat4(_) => "FLOAT_MAT4",
            Value::Texture(_) => "SAMPLER_2D",
            _ => self.variant_name(),
        }
    }

    /// The set of GL uniform types this value's variant may legally bind
    /// to, per the table in spec §4.2. Returns an empty slice for variants
    /// that are never legal uniform values (e.g. `Rect`, tuples).
    pub fn accepted_uniform_types(&self) -> &'static [UniformType] {
        match self {
            Value::Bool(_) => &[UniformType::Bool],
            Value::Int(_) => &[UniformType::Int],
            Value::UInt(_) => &[UniformType::UInt],
            Value::Float(_) => &[UniformType::Float],
            Value::Vec2(_) => &[UniformType::Vec2],
            Value::Vec3(_) => &[UniformType::Vec3],
            Value::Vec4(_) => &[UniformType::Vec4],
            Value::Mat4(_) => &[UniformType::Mat4],
            Value::Texture(_) => &[UniformType::Sampler2D, UniformType::SamplerCube],
            _ => &[],
        }
    }
}
