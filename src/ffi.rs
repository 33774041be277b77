//! C ABI surface for interpreters embedded in the same process.
//!
//! The host hands the interpreter an opaque handle to a shared
//! [`CallRouter`]; the interpreter's native module then calls
//! `capbridge_call` with a JSON call envelope and receives the JSON reply.
//!
//! # Lifecycle
//!
//! ```text
//! ffi::into_handle(router) → handle                 (Rust side)
//! capbridge_handle_retain(handle) → handle          (extra owner)
//! capbridge_call(handle, call_json) → reply json    (caller frees via capbridge_string_free)
//! capbridge_handle_release(handle)                  (once per owner)
//! ```
//!
//! # Thread safety
//!
//! All functions are safe to call from any thread. The handle is a
//! reference-counted pointer; calls on it never need external locking.

use std::ffi::{CStr, CString, c_char, c_void};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::bridge::router::CallRouter;

/// Version string returned by `capbridge_version`.
static VERSION: &CStr = c"capbridge 1";

/// Converts a router into an opaque handle owning one strong reference.
///
/// The handle must eventually be passed to `capbridge_handle_release`.
#[must_use]
pub fn into_handle(router: Arc<CallRouter>) -> *mut c_void {
    Arc::into_raw(router) as *mut c_void
}

/// Convert a nullable C string pointer to a `&str`.
///
/// Returns `None` if `ptr` is null or if the bytes are not valid UTF-8.
///
/// # Safety
///
/// `ptr` must be null or point to a valid null-terminated C string.
unsafe fn cstr_to_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    // SAFETY: caller guarantees ptr is null or a valid C string.
    unsafe { CStr::from_ptr(ptr) }.to_str().ok()
}

/// Convert a Rust `String` to a C-owned `*mut c_char`.
///
/// The caller must free the returned pointer via `capbridge_string_free`.
/// Returns null if the string contains an interior NUL byte.
fn string_to_c(s: String) -> *mut c_char {
    match CString::new(s) {
        Ok(cs) => cs.into_raw(),
        Err(_) => std::ptr::null_mut(),
    }
}

/// Borrow the router behind a handle.
///
/// # Safety
///
/// `handle` must be null or a live handle from [`into_handle`] /
/// `capbridge_handle_retain` with at least one unreleased reference.
unsafe fn borrow_router<'a>(handle: *const c_void) -> Option<&'a CallRouter> {
    if handle.is_null() {
        return None;
    }
    // SAFETY: handle came from Arc::into_raw and is still owned by the caller.
    Some(unsafe { &*(handle as *const CallRouter) })
}

/// Execute one call envelope and return the reply envelope as JSON.
///
/// Returns null if `handle` or `call_json` is null or not UTF-8. Malformed
/// JSON yields an error reply, not null.
///
/// # Safety
///
/// `handle` must be a live handle. `call_json` must be null or a valid
/// null-terminated C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn capbridge_call(
    handle: *const c_void,
    call_json: *const c_char,
) -> *mut c_char {
    // SAFETY: caller guarantees handle is live.
    let Some(router) = (unsafe { borrow_router(handle) }) else {
        return std::ptr::null_mut();
    };
    // SAFETY: caller guarantees call_json is null or a valid C string.
    let Some(json) = (unsafe { cstr_to_str(call_json) }) else {
        return std::ptr::null_mut();
    };

    match panic::catch_unwind(AssertUnwindSafe(|| router.route_json(json))) {
        Ok(reply) => string_to_c(reply),
        Err(_) => {
            tracing::error!("panic while routing foreign call");
            std::ptr::null_mut()
        }
    }
}

/// Add an owner to a handle. Returns the same handle (null for null).
///
/// # Safety
///
/// `handle` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn capbridge_handle_retain(handle: *const c_void) -> *const c_void {
    if handle.is_null() {
        return handle;
    }
    // SAFETY: handle came from Arc::into_raw and has a live strong count.
    unsafe { Arc::increment_strong_count(handle as *const CallRouter) };
    handle
}

/// Drop one owner of a handle. The router is freed with its last owner.
///
/// # Safety
///
/// `handle` must be null (no-op) or a live handle. Each owner releases
/// exactly once.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn capbridge_handle_release(handle: *const c_void) {
    if handle.is_null() {
        return;
    }
    // SAFETY: handle came from Arc::into_raw; this gives back one reference.
    unsafe { Arc::decrement_strong_count(handle as *const CallRouter) };
}

/// Free a string returned by `capbridge_call`.
///
/// Passing null is a safe no-op.
///
/// # Safety
///
/// `s` must be null or a pointer previously returned by `capbridge_call`.
/// Must not be freed more than once.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn capbridge_string_free(s: *mut c_char) {
    if s.is_null() {
        return;
    }
    // SAFETY: s was created by CString::into_raw in string_to_c.
    let _ = unsafe { CString::from_raw(s) };
}

/// Static version string. Must not be freed.
#[unsafe(no_mangle)]
pub extern "C" fn capbridge_version() -> *const c_char {
    VERSION.as_ptr()
}
