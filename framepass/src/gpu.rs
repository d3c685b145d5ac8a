use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

use crate::backend::{Backend, DestroyHandle};
use crate::enums::GpuFlags;
use crate::error::Error;

/// Process-facing handle to a backend (spec §3). Reference-counted via
/// `Arc`; cloning is a ref, dropping the last clone does not itself
/// destroy anything (resources hold their own strong reference to their
/// `Gpu` and drive the destroy queue independently).
#[derive(Clone)]
pub struct Gpu(Arc<GpuInner>);

struct GpuInner {
    backend: Box<dyn Backend>,
    flags: GpuFlags,
    next_id: AtomicU64,
    /// The "single-bit lock" of spec §3/§5: which thread currently holds
    /// this Gpu's claim. `None` means unclaimed.
    claim: Mutex<Option<ThreadId>>,
    /// The dedicated destroyed-objects lock (Design Notes §9); never held
    /// across a driver call.
    destroy_queue: Mutex<Vec<DestroyHandle>>,
}

impl Gpu {
    /// Per the resolved Open Question on backend construction (SPEC_FULL
    /// §6): backend selection is a type/constructor choice, not a runtime
    /// flag switch, since only one backend is implemented.
    pub fn new(flags: GpuFlags, backend: Box<dyn Backend>) -> Gpu {
        Gpu(Arc::new(GpuInner {
            backend,
            flags,
            next_id: AtomicU64::new(1),
            claim: Mutex::new(None),
            destroy_queue: Mutex::new(Vec::new()),
        }))
    }

    pub fn flags(&self) -> GpuFlags {
        self.0.flags
    }

    pub(crate) fn backend(&self) -> &dyn Backend {
        self.0.backend.as_ref()
    }

    pub(crate) fn next_resource_id(&self) -> u64 {
        self.0.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn get_info(&self, key: &str) -> Option<String> {
        self.0.backend.get_info(key)
    }

    pub fn steal_this_thread(&self) {
        let mut claim = self.0.claim.lock().unwrap();
        *claim = Some(thread::current().id());
    }

    pub fn release_this_thread(&self) {
        let mut claim = self.0.claim.lock().unwrap();
        *claim = None;
    }

    /// Whether the calling thread may issue a mutating backend call right
    /// now. Logs a critical and returns `false` on mismatch rather than
    /// panicking (spec §5: "mismatch logs a critical and aborts the
    /// call", aborts the *call*, not the process).
    pub(crate) fn check_claim(&self, op: &str) -> bool {
        if self.0.flags.contains(GpuFlags::NO_THREAD_SAFETY) || self.0.backend.is_threadsafe() {
            return true;
        }
        let claim = self.0.claim.lock().unwrap();
        match *claim {
            Some(id) if id == thread::current().id() => true,
            _ => {
                log::error!("{}: calling thread does not hold the gpu claim", op);
                false
            }
        }
    }

    pub(crate) fn push_destroy(&self, handle: DestroyHandle) {
        self.0.destroy_queue.lock().unwrap().push(handle);
    }

    /// Applies the `LOG_ERRORS`/`EXIT_ON_ERROR` flags (spec §4.5/§7) at the
    /// boundary where a runtime (tier-2) error is about to surface to the
    /// caller. `EXIT_ON_ERROR` terminates the process; it never returns.
    pub(crate) fn handle_runtime_error(&self, err: &Error) {
        if self.0.flags.contains(GpuFlags::LOG_ERRORS) {
            log::error!("{}", err);
        }
        if self.0.flags.contains(GpuFlags::EXIT_ON_ERROR) {
            log::error!("exit_on_error: terminating after {}", err);
            std::process::exit(1);
        }
    }

    /// Drains the destroy queue and hands it to the backend. Must run on
    /// the claim thread; a claim mismatch is a no-op (the queue is left
    /// untouched for a later, correctly-threaded flush).
    pub fn flush(&self) {
        if !self.check_claim("gpu_flush") {
            return;
        }
        let pending = std::mem::take(&mut *self.0.destroy_queue.lock().unwrap());
        if pending.is_empty() {
            return;
        }
        self.0.backend.flush(pending);
    }
}
