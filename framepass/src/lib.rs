//! Backend-agnostic frontend for a retained-mode GPU rendering pipeline:
//! the `Value` tagged union, resource handles, the `Plan` builder, the
//! compiler, and the dispatcher. A concrete backend (such as
//! `framepass-gl`) implements the `Backend` trait and is handed to
//! `Gpu::new`.

pub mod backend;
pub mod enums;
pub mod error;
mod compile;
mod dispatch;
mod gpu;
mod plan;
mod resource;
pub mod value;

pub use backend::{Backend, DestroyHandle};
pub use enums::{BlendFactor, Format, GpuFlags, StateKey, TestFunc, UniformType, WriteMask};
pub use error::{Error, ErrorCode, Result};
pub use gpu::Gpu;
pub use plan::{Plan, StateArg, Target, TargetArg, UniformStore};
pub use resource::{Buffer, Commands, Shader, Texture};
pub use value::Value;
