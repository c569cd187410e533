//! Scoped routing of unrecoverable backend errors
//!
//! Cranelift reports broken invariants by panicking. A single process-wide
//! panic hook is installed the first time a scope is opened; it forwards the
//! panic message to the innermost [`FatalErrorScope`] open on the panicking
//! thread and falls back to the previously installed hook otherwise. Scopes
//! are stacked per thread, so nested or concurrent pipelines never see each
//! other's faults.

use std::any::Any;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use thiserror::Error;

/// An unrecoverable error raised inside the backend
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("error in backend: {message}")]
pub struct BackendFault {
    pub message: String,
}

type Captured = Rc<RefCell<Vec<String>>>;

thread_local! {
    static SCOPES: RefCell<Vec<(u64, Captured)>> = const { RefCell::new(Vec::new()) };
}

static HOOK: OnceLock<()> = OnceLock::new();
static NEXT_SCOPE: AtomicU64 = AtomicU64::new(1);

fn install_hook() {
    HOOK.get_or_init(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let message = payload_message(info.payload());
            if !route_to_scope(&message) {
                previous(info);
            }
        }));
    });
}

/// Deliver a message to the innermost scope on this thread
fn route_to_scope(message: &str) -> bool {
    SCOPES
        .try_with(|scopes| {
            let Ok(scopes) = scopes.try_borrow() else {
                return false;
            };
            match scopes.last() {
                Some((_, captured)) => match captured.try_borrow_mut() {
                    Ok(mut captured) => {
                        captured.push(message.to_string());
                        true
                    }
                    Err(_) => false,
                },
                None => false,
            }
        })
        .unwrap_or(false)
}

fn payload_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown backend failure".to_string()
    }
}

/// A registration of this thread as the receiver of backend faults
///
/// Released on drop, on every exit path. The guard is neither `Send` nor
/// `Sync`: it must be dropped on the thread that opened it.
pub struct FatalErrorScope {
    id: u64,
    captured: Captured,
    _thread_bound: PhantomData<*const ()>,
}

impl FatalErrorScope {
    /// Open a scope on the current thread
    #[must_use]
    pub fn install() -> Self {
        install_hook();
        let id = NEXT_SCOPE.fetch_add(1, Ordering::Relaxed);
        let captured: Captured = Rc::default();
        SCOPES.with(|scopes| scopes.borrow_mut().push((id, Rc::clone(&captured))));
        Self {
            id,
            captured,
            _thread_bound: PhantomData,
        }
    }

    /// Run `f`, converting a backend panic into a [`BackendFault`]
    pub fn run<T>(&self, f: impl FnOnce() -> T) -> Result<T, BackendFault> {
        panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
            let routed = self.captured.borrow_mut().pop();
            BackendFault {
                message: routed.unwrap_or_else(|| payload_message(payload.as_ref())),
            }
        })
    }

    /// Messages routed to this scope that were not consumed by [`run`](Self::run)
    #[must_use]
    pub fn take_messages(&self) -> Vec<String> {
        std::mem::take(&mut *self.captured.borrow_mut())
    }

    /// Number of scopes open on the current thread
    #[must_use]
    pub fn depth() -> usize {
        SCOPES.with(|scopes| scopes.borrow().len())
    }
}

impl Drop for FatalErrorScope {
    fn drop(&mut self) {
        let id = self.id;
        let _ = SCOPES.try_with(|scopes| {
            let mut scopes = scopes.borrow_mut();
            if let Some(pos) = scopes.iter().rposition(|(scope, _)| *scope == id) {
                scopes.remove(pos);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_passes_through_values() {
        let scope = FatalErrorScope::install();
        assert_eq!(scope.run(|| 41 + 1), Ok(42));
    }

    #[test]
    fn run_converts_panics() {
        let scope = FatalErrorScope::install();
        let fault = scope
            .run(|| -> i32 { panic!("verifier exploded") })
            .unwrap_err();
        assert_eq!(fault.message, "verifier exploded");
        assert_eq!(fault.to_string(), "error in backend: verifier exploded");
        assert!(scope.take_messages().is_empty());
    }

    #[test]
    fn scopes_are_released_on_drop() {
        let before = FatalErrorScope::depth();
        {
            let _outer = FatalErrorScope::install();
            let inner = FatalErrorScope::install();
            assert_eq!(FatalErrorScope::depth(), before + 2);
            let fault = inner.run(|| panic!("inner only")).unwrap_err();
            assert_eq!(fault.message, "inner only");
        }
        assert_eq!(FatalErrorScope::depth(), before);
    }

    #[test]
    fn scopes_on_other_threads_are_independent() {
        let _scope = FatalErrorScope::install();
        let depth = std::thread::spawn(|| {
            let scope = FatalErrorScope::install();
            let fault = scope.run(|| panic!("worker")).unwrap_err();
            (FatalErrorScope::depth(), fault.message)
        })
        .join()
        .unwrap();
        assert_eq!(depth, (1, "worker".to_string()));
        assert_eq!(FatalErrorScope::depth(), 1);
    }
}
