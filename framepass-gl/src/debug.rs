//! The GL debug message callback, installed when `GpuFlags::USE_DEBUG_LAYERS`
//! is set. Grounded on `render-gl/src/backend.rs`'s `debug_callback` and its
//! severity -> `log::Level` mapping.

use std::os::raw::c_void;
use std::{slice, str};

extern "system" fn debug_callback(
    _source: u32,
    _kind: u32,
    _id: u32,
    severity: u32,
    length: i32,
    message: *const i8,
    _user_param: *mut c_void,
) {
    let text = unsafe {
        str::from_utf8(slice::from_raw_parts(message as *const u8, length.max(0) as usize))
            .unwrap_or("<non-utf8 GL debug message>")
    };
    let level = match severity {
        gl::DEBUG_SEVERITY_HIGH => log::Level::Error,
        gl::DEBUG_SEVERITY_MEDIUM => log::Level::Warn,
        gl::DEBUG_SEVERITY_LOW => log::Level::Info,
        gl::DEBUG_SEVERITY_NOTIFICATION => log::Level::Debug,
        _ => log::Level::Debug,
    };
    log::log!(level, "(GL) {}", text);
}

pub(crate) fn install() {
    unsafe {
        gl::Enable(gl::DEBUG_OUTPUT);
        gl::Enable(gl::DEBUG_OUTPUT_SYNCHRONOUS);
        gl::DebugMessageCallback(Some(debug_callback), std::ptr::null());
        gl::DebugMessageControl(
            gl::DONT_CARE,
            gl::DONT_CARE,
            gl::DONT_CARE,
            0,
            std::ptr::null(),
            gl::TRUE,
        );
    }
}
