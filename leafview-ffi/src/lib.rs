//! C-compatible FFI wrappers around leafview-core.
//!
//! The Swift frontend hands the coordinator a table of callbacks
//! (`LeafviewHostCallbacks`) and drives it through `leafview_*` calls. Complex
//! values cross the boundary as JSON. Callers must free returned strings with
//! `leafview_free_string`.
//!
//! All extern "C" functions are wrapped in `ffi_catch` so Rust panics never
//! cross the FFI boundary. Panic payloads are logged before returning the
//! fallback value.
//!
//! Host callbacks never run on the main thread. Window and screen callbacks
//! run on the coordinator's runtime threads; archive opens and dialog
//! prompts run on its blocking pool and may block until the user answers.
//! The frontend is responsible for hopping to the main thread where AppKit
//! requires it.
#![allow(clippy::not_unsafe_ptr_arg_deref)]

use std::collections::HashMap;
use std::ffi::{c_void, CStr, CString};
use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use leafview_core::events::EventReceiver;
use leafview_core::host::{
    Dialogs, Host, IdentityChoice, ImageSource, PasswordChoice, Screen, WindowSystem,
};
use leafview_core::settings::{self, CoordinatorSettings};
use leafview_core::{OpenCoordinator, OpenError, OsHandle, Rect, RestoreEntry, WindowId};
use tokio::runtime::Runtime;

/// Size of the buffers handed to callbacks that return a string.
const CALLBACK_BUFFER_LEN: usize = 1024;

/// Run `f` inside `catch_unwind`, logging the panic payload before returning the
/// fallback value.
fn ffi_catch<T>(fallback: T, f: impl FnOnce() -> T + std::panic::UnwindSafe) -> T {
    match catch_unwind(f) {
        Ok(v) => v,
        Err(payload) => {
            let msg = if let Some(s) = payload.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic payload".to_string()
            };
            log::error!("FFI panic caught: {}", msg);
            fallback
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn to_rust_str(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    // SAFETY: Caller guarantees `ptr` is a valid, null-terminated C string
    // whose memory remains valid for the duration of this call.
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .ok()
        .map(String::from)
}

/// Build a `CString`, dropping interior NUL bytes instead of failing.
fn sanitized_c_string(s: &str) -> CString {
    match CString::new(s) {
        Ok(cs) => cs,
        Err(_) => {
            log::warn!(
                "String contains interior NUL bytes, sanitizing ({} chars)",
                s.len()
            );
            let sanitized: String = s.chars().filter(|&c| c != '\0').collect();
            CString::new(sanitized).unwrap_or_default()
        }
    }
}

fn to_c_string(s: &str) -> *mut c_char {
    sanitized_c_string(s).into_raw()
}

/// Read the NUL-terminated string a callback wrote into `buf`.
fn read_buffer(buf: &[u8]) -> Option<String> {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8(buf[..end].to_vec()).ok()
}

// ---------------------------------------------------------------------------
// Memory management
// ---------------------------------------------------------------------------

/// Free a string previously returned by a `leafview_*` function.
#[no_mangle]
pub extern "C" fn leafview_free_string(s: *mut c_char) {
    ffi_catch(
        (),
        AssertUnwindSafe(|| {
            if !s.is_null() {
                // SAFETY: `s` was previously returned by `CString::into_raw` from
                // one of the `leafview_*` functions, so it is valid to reclaim it.
                unsafe {
                    drop(CString::from_raw(s));
                }
            }
        }),
    );
}

// ---------------------------------------------------------------------------
// Host callbacks
// ---------------------------------------------------------------------------

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LeafviewRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl From<LeafviewRect> for Rect {
    fn from(r: LeafviewRect) -> Self {
        Rect::new(r.x, r.y, r.width, r.height)
    }
}

impl From<Rect> for LeafviewRect {
    fn from(r: Rect) -> Self {
        Self {
            x: r.x,
            y: r.y,
            width: r.width,
            height: r.height,
        }
    }
}

/// `open_image` status codes.
pub const LEAFVIEW_OPEN_OK: i32 = 0;
pub const LEAFVIEW_OPEN_NOT_FOUND: i32 = 1;
pub const LEAFVIEW_OPEN_PASSWORD_REQUIRED: i32 = 2;
pub const LEAFVIEW_OPEN_WRONG_PASSWORD: i32 = 3;
pub const LEAFVIEW_OPEN_UNSUPPORTED: i32 = 4;

/// `prompt_file_identity` answers. Any other value cancels.
pub const LEAFVIEW_IDENTITY_CONTINUE: i32 = 0;
pub const LEAFVIEW_IDENTITY_START_OVER: i32 = 1;

/// Callback table supplied by the frontend. `context` is passed back as the
/// first argument of every callback.
///
/// * `request_window`: create a new viewer window; report it back with
///   `leafview_window_constructed`.
/// * `apply_frame`: move and resize the window behind an OS handle.
/// * `visible_bounds`: usable area of the main screen.
/// * `open_image`: load `path` (with an optional password), write the page
///   count to the out pointer and return a `LEAFVIEW_OPEN_*` code.
/// * `file_key`: write the identity key of `path` into the buffer and return
///   its length in bytes (no NUL needed), or -1 if the file has none.
/// * `prompt_password`: ask for a password for the named file; write it into
///   the buffer and return its length, or -1 if the user cancelled.
/// * `prompt_file_identity`: the file changed since it was saved; return a
///   `LEAFVIEW_IDENTITY_*` answer.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct LeafviewHostCallbacks {
    pub context: *mut c_void,
    pub request_window: extern "C" fn(context: *mut c_void),
    pub apply_frame: extern "C" fn(context: *mut c_void, os_handle: u64, frame: LeafviewRect),
    pub visible_bounds: extern "C" fn(context: *mut c_void) -> LeafviewRect,
    pub open_image: extern "C" fn(
        context: *mut c_void,
        path: *const c_char,
        password: *const c_char,
        page_count: *mut u32,
    ) -> i32,
    pub file_key: extern "C" fn(
        context: *mut c_void,
        path: *const c_char,
        buf: *mut c_char,
        buf_len: usize,
    ) -> i32,
    pub prompt_password: extern "C" fn(
        context: *mut c_void,
        file_name: *const c_char,
        buf: *mut c_char,
        buf_len: usize,
    ) -> i32,
    pub prompt_file_identity: extern "C" fn(
        context: *mut c_void,
        existing_key: *const c_char,
        new_key: *const c_char,
    ) -> i32,
}

struct CallbackHost {
    callbacks: LeafviewHostCallbacks,
}

// SAFETY: The frontend guarantees that `context` outlives the coordinator and
// that every callback may be invoked from any thread.
unsafe impl Send for CallbackHost {}
unsafe impl Sync for CallbackHost {}

impl CallbackHost {
    /// Call a callback that fills a string buffer and returns the byte
    /// length it wrote. Returns `None` for a negative length, and for a
    /// length that does not fit, since a cut-off key or password is never
    /// the right one.
    fn read_string(&self, call: impl FnOnce(*mut c_char, usize) -> i32) -> Option<String> {
        let mut buf = vec![0u8; CALLBACK_BUFFER_LEN];
        let written = call(buf.as_mut_ptr().cast(), buf.len());
        let len = usize::try_from(written).ok()?;
        if len >= buf.len() {
            log::warn!(
                "Host callback wrote {} bytes into a {}-byte buffer; ignoring it",
                len,
                buf.len()
            );
            return None;
        }
        read_buffer(&buf[..len])
    }
}

impl WindowSystem for CallbackHost {
    fn request_window(&self) {
        (self.callbacks.request_window)(self.callbacks.context);
    }

    fn apply_frame(&self, window: OsHandle, frame: Rect) {
        (self.callbacks.apply_frame)(self.callbacks.context, window.0, frame.into());
    }
}

impl Screen for CallbackHost {
    fn visible_bounds(&self) -> Rect {
        (self.callbacks.visible_bounds)(self.callbacks.context).into()
    }
}

impl ImageSource for CallbackHost {
    fn open(&self, path: &str, password: Option<&str>) -> Result<usize, OpenError> {
        let path = sanitized_c_string(path);
        let password = password.map(sanitized_c_string);
        let password_ptr = password.as_ref().map_or(std::ptr::null(), |p| p.as_ptr());
        let mut page_count: u32 = 0;
        let status = (self.callbacks.open_image)(
            self.callbacks.context,
            path.as_ptr(),
            password_ptr,
            &mut page_count,
        );
        match status {
            LEAFVIEW_OPEN_OK => Ok(page_count as usize),
            LEAFVIEW_OPEN_NOT_FOUND => Err(OpenError::NotFound),
            LEAFVIEW_OPEN_PASSWORD_REQUIRED => Err(OpenError::PasswordRequired),
            LEAFVIEW_OPEN_WRONG_PASSWORD => Err(OpenError::WrongPassword),
            LEAFVIEW_OPEN_UNSUPPORTED => Err(OpenError::Unsupported),
            other => Err(OpenError::Io(format!("frontend status {}", other))),
        }
    }

    fn file_key(&self, path: &str) -> Option<String> {
        let path = sanitized_c_string(path);
        self.read_string(|buf, len| {
            (self.callbacks.file_key)(self.callbacks.context, path.as_ptr(), buf, len)
        })
    }
}

impl Dialogs for CallbackHost {
    fn prompt_password(&self, file_name: &str) -> PasswordChoice {
        let file_name = sanitized_c_string(file_name);
        match self.read_string(|buf, len| {
            (self.callbacks.prompt_password)(self.callbacks.context, file_name.as_ptr(), buf, len)
        }) {
            Some(password) => PasswordChoice::Password(password),
            None => PasswordChoice::Cancelled,
        }
    }

    fn prompt_file_identity(&self, existing_key: &str, new_key: &str) -> IdentityChoice {
        let existing_key = sanitized_c_string(existing_key);
        let new_key = sanitized_c_string(new_key);
        let answer = (self.callbacks.prompt_file_identity)(
            self.callbacks.context,
            existing_key.as_ptr(),
            new_key.as_ptr(),
        );
        match answer {
            LEAFVIEW_IDENTITY_CONTINUE => IdentityChoice::Continue,
            LEAFVIEW_IDENTITY_START_OVER => IdentityChoice::StartOver,
            _ => IdentityChoice::Cancelled,
        }
    }
}

// ---------------------------------------------------------------------------
// Coordinator handles
// ---------------------------------------------------------------------------

/// Inner data for a coordinator handle, stored in the global registry.
struct CoordinatorInner {
    coordinator: OpenCoordinator,
    runtime: Arc<Runtime>,
    event_rx: parking_lot::Mutex<EventReceiver>,
}

/// Global registry mapping handle addresses to their inner data. The pointer
/// handed to C is only ever used as a key.
fn coordinator_registry() -> &'static parking_lot::Mutex<HashMap<usize, Arc<CoordinatorInner>>> {
    static REGISTRY: OnceLock<parking_lot::Mutex<HashMap<usize, Arc<CoordinatorInner>>>> =
        OnceLock::new();
    REGISTRY.get_or_init(|| parking_lot::Mutex::new(HashMap::new()))
}

/// Look up a handle in the global registry and run `f` with the inner data.
/// Returns `default` if the handle is null or freed.
fn with_coordinator<T>(
    handle: *mut CoordinatorHandle,
    default: T,
    f: impl FnOnce(&CoordinatorInner) -> T,
) -> T {
    if handle.is_null() {
        return default;
    }
    let key = handle as usize;
    let guard = coordinator_registry().lock();
    match guard.get(&key) {
        Some(inner) => {
            let inner = Arc::clone(inner);
            drop(guard); // Release lock before calling f
            f(&inner)
        }
        None => {
            log::warn!("Attempted to use invalid or freed coordinator handle");
            default
        }
    }
}

/// Opaque handle token for the C API. Never dereferenced, only used as a key.
/// Not zero-sized, so every boxed handle gets a distinct address.
pub struct CoordinatorHandle {
    _private: u8,
}

/// Create a coordinator driven by the given callbacks.
///
/// `settings_json` may be null, in which case the settings file in the user's
/// config directory is used. Returns null on invalid arguments. The caller
/// must free the handle with `leafview_coordinator_free`.
#[no_mangle]
pub extern "C" fn leafview_coordinator_new(
    callbacks: *const LeafviewHostCallbacks,
    settings_json: *const c_char,
) -> *mut CoordinatorHandle {
    ffi_catch(
        std::ptr::null_mut(),
        AssertUnwindSafe(|| {
            if callbacks.is_null() {
                return std::ptr::null_mut();
            }
            // SAFETY: Caller guarantees `callbacks` points to a valid table; it
            // is copied so the caller's storage need not outlive this call.
            let callbacks = unsafe { *callbacks };

            let settings = match to_rust_str(settings_json) {
                None => settings::load(),
                Some(json) => match serde_json::from_str::<CoordinatorSettings>(&json) {
                    Ok(s) => s,
                    Err(e) => {
                        log::error!("Invalid coordinator settings: {}", e);
                        return std::ptr::null_mut();
                    }
                },
            };

            let runtime = match Runtime::new() {
                Ok(rt) => Arc::new(rt),
                Err(e) => {
                    log::error!("Failed to create Tokio runtime for coordinator: {}", e);
                    return std::ptr::null_mut();
                }
            };

            let host = Host::from_shared(Arc::new(CallbackHost { callbacks }));
            let (coordinator, events) = OpenCoordinator::new(host, settings);
            let inner = Arc::new(CoordinatorInner {
                coordinator,
                runtime,
                event_rx: parking_lot::Mutex::new(events),
            });

            // Allocate a stable address to use as an opaque handle key
            let handle = Box::into_raw(Box::new(CoordinatorHandle { _private: 0 }));
            coordinator_registry().lock().insert(handle as usize, inner);
            handle
        }),
    )
}

/// Free a coordinator handle. Pending opens are abandoned.
#[no_mangle]
pub extern "C" fn leafview_coordinator_free(handle: *mut CoordinatorHandle) {
    ffi_catch(
        (),
        AssertUnwindSafe(|| {
            if handle.is_null() {
                return;
            }
            let key = handle as usize;
            let removed = coordinator_registry().lock().remove(&key);
            if removed.is_none() {
                log::warn!("leafview_coordinator_free called on already-freed handle");
                return; // Don't double-free
            }
            // SAFETY: `handle` was allocated by `Box::into_raw` in
            // `leafview_coordinator_new`. The registry removal above ensures
            // this only happens once per handle.
            unsafe {
                drop(Box::from_raw(handle));
            }
        }),
    );
}

// ---------------------------------------------------------------------------
// Window lifecycle
// ---------------------------------------------------------------------------

/// Allocate an id for a window the frontend is about to construct.
#[no_mangle]
pub extern "C" fn leafview_window_new_id() -> u64 {
    ffi_catch(0, || WindowId::next().as_u64())
}

/// Report that window `window_id` finished constructing. It becomes the owner
/// and receives any pending open request.
#[no_mangle]
pub extern "C" fn leafview_window_constructed(handle: *mut CoordinatorHandle, window_id: u64) {
    ffi_catch(
        (),
        AssertUnwindSafe(|| {
            with_coordinator(handle, (), |inner| {
                let _guard = inner.runtime.enter();
                inner
                    .coordinator
                    .window_constructed(WindowId::from_raw(window_id));
            })
        }),
    );
}

/// Attach the OS window handle to `window_id`. Returns false for unknown ids.
#[no_mangle]
pub extern "C" fn leafview_window_set_os_handle(
    handle: *mut CoordinatorHandle,
    window_id: u64,
    os_handle: u64,
) -> bool {
    ffi_catch(
        false,
        AssertUnwindSafe(|| {
            with_coordinator(handle, false, |inner| {
                inner
                    .coordinator
                    .set_os_handle(WindowId::from_raw(window_id), OsHandle(os_handle))
            })
        }),
    )
}

#[no_mangle]
pub extern "C" fn leafview_window_closed(handle: *mut CoordinatorHandle, window_id: u64) {
    ffi_catch(
        (),
        AssertUnwindSafe(|| {
            with_coordinator(handle, (), |inner| {
                inner.coordinator.window_closed(WindowId::from_raw(window_id));
            })
        }),
    );
}

#[no_mangle]
pub extern "C" fn leafview_window_focused(handle: *mut CoordinatorHandle, os_handle: u64) {
    ffi_catch(
        (),
        AssertUnwindSafe(|| {
            with_coordinator(handle, (), |inner| {
                inner
                    .coordinator
                    .window_focused(OsHandle(os_handle), Instant::now());
            })
        }),
    );
}

// ---------------------------------------------------------------------------
// Open requests
// ---------------------------------------------------------------------------

/// Open `path`, reusing an empty owner window unless `force_new_window`.
///
/// Returns 0 once the request is queued, or -1 on invalid arguments. The
/// outcome arrives through `leafview_poll_event`.
#[no_mangle]
pub extern "C" fn leafview_request_open(
    handle: *mut CoordinatorHandle,
    path: *const c_char,
    force_new_window: bool,
) -> i32 {
    ffi_catch(
        -1,
        AssertUnwindSafe(|| {
            let Some(path) = to_rust_str(path) else {
                return -1;
            };
            with_coordinator(handle, -1, |inner| {
                let coordinator = inner.coordinator.clone();
                inner.runtime.spawn(async move {
                    coordinator.request_open(path, force_new_window).await;
                });
                0
            })
        }),
    )
}

/// Open `path` in the owning window, replacing what it shows.
#[no_mangle]
pub extern "C" fn leafview_request_replace(
    handle: *mut CoordinatorHandle,
    path: *const c_char,
) -> i32 {
    ffi_catch(
        -1,
        AssertUnwindSafe(|| {
            let Some(path) = to_rust_str(path) else {
                return -1;
            };
            with_coordinator(handle, -1, |inner| {
                let coordinator = inner.coordinator.clone();
                inner.runtime.spawn(async move {
                    coordinator.request_replace(path).await;
                });
                0
            })
        }),
    )
}

/// Restore a saved session. `entries_json` is a JSON array of restore
/// entries (`file_path`, `frame`, and optionally `file_key`, `current_page`,
/// `accessible`).
///
/// Returns 0 once queued, -1 on invalid arguments. A restore rejected because
/// another one is in flight is reported as a `RestoreDropped` event.
#[no_mangle]
pub extern "C" fn leafview_request_session_restore(
    handle: *mut CoordinatorHandle,
    entries_json: *const c_char,
) -> i32 {
    ffi_catch(
        -1,
        AssertUnwindSafe(|| {
            let Some(json) = to_rust_str(entries_json) else {
                return -1;
            };
            let entries: Vec<RestoreEntry> = match serde_json::from_str(&json) {
                Ok(entries) => entries,
                Err(e) => {
                    log::warn!("Invalid session restore entries: {}", e);
                    return -1;
                }
            };
            with_coordinator(handle, -1, |inner| {
                let coordinator = inner.coordinator.clone();
                inner.runtime.spawn(async move {
                    if let Err(e) = coordinator.request_session_restore(entries).await {
                        log::info!("Session restore not started: {}", e);
                    }
                });
                0
            })
        }),
    )
}

/// Poll for coordinator events.
///
/// Returns a JSON object tagged by `"type"`, or null if no events are
/// pending. The caller must free the returned string with
/// `leafview_free_string`.
#[no_mangle]
pub extern "C" fn leafview_poll_event(handle: *mut CoordinatorHandle) -> *mut c_char {
    ffi_catch(
        std::ptr::null_mut(),
        AssertUnwindSafe(|| {
            with_coordinator(handle, std::ptr::null_mut(), |inner| {
                let event = match inner.event_rx.lock().try_recv() {
                    Ok(event) => event,
                    Err(_) => return std::ptr::null_mut(),
                };
                match serde_json::to_string(&event) {
                    Ok(json) => to_c_string(&json),
                    Err(e) => {
                        log::error!("Failed to serialize coordinator event: {}", e);
                        std::ptr::null_mut()
                    }
                }
            })
        }),
    )
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Load coordinator settings from disk. Returns JSON; free with
/// `leafview_free_string`.
#[no_mangle]
pub extern "C" fn leafview_settings_load() -> *mut c_char {
    ffi_catch(
        std::ptr::null_mut(),
        AssertUnwindSafe(|| match serde_json::to_string(&settings::load()) {
            Ok(json) => to_c_string(&json),
            Err(_) => std::ptr::null_mut(),
        }),
    )
}

/// Save coordinator settings from JSON. Returns true on success.
#[no_mangle]
pub extern "C" fn leafview_settings_save(json: *const c_char) -> bool {
    ffi_catch(
        false,
        AssertUnwindSafe(|| {
            let Some(json) = to_rust_str(json) else {
                return false;
            };
            match serde_json::from_str::<CoordinatorSettings>(&json) {
                Ok(s) => match settings::save(&s) {
                    Ok(()) => true,
                    Err(e) => {
                        log::warn!("Failed to save coordinator settings: {}", e);
                        false
                    }
                },
                Err(e) => {
                    log::warn!("Invalid coordinator settings JSON: {}", e);
                    false
                }
            }
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    extern "C" fn noop_request_window(_: *mut c_void) {}

    extern "C" fn noop_apply_frame(_: *mut c_void, _: u64, _: LeafviewRect) {}

    extern "C" fn screen(_: *mut c_void) -> LeafviewRect {
        LeafviewRect {
            x: 0.0,
            y: 0.0,
            width: 1440.0,
            height: 900.0,
        }
    }

    extern "C" fn open_seven_pages(
        _: *mut c_void,
        path: *const c_char,
        _: *const c_char,
        page_count: *mut u32,
    ) -> i32 {
        if to_rust_str(path).as_deref() != Some("/books/seven.cbz") {
            return LEAFVIEW_OPEN_NOT_FOUND;
        }
        // SAFETY: the coordinator always passes a valid out pointer.
        unsafe { *page_count = 7 };
        LEAFVIEW_OPEN_OK
    }

    extern "C" fn no_file_key(_: *mut c_void, _: *const c_char, _: *mut c_char, _: usize) -> i32 {
        -1
    }

    extern "C" fn cancel_password(
        _: *mut c_void,
        _: *const c_char,
        _: *mut c_char,
        _: usize,
    ) -> i32 {
        -1
    }

    extern "C" fn cancel_identity(_: *mut c_void, _: *const c_char, _: *const c_char) -> i32 {
        -1
    }

    fn callbacks() -> LeafviewHostCallbacks {
        LeafviewHostCallbacks {
            context: std::ptr::null_mut(),
            request_window: noop_request_window,
            apply_frame: noop_apply_frame,
            visible_bounds: screen,
            open_image: open_seven_pages,
            file_key: no_file_key,
            prompt_password: cancel_password,
            prompt_file_identity: cancel_identity,
        }
    }

    fn poll_json(handle: *mut CoordinatorHandle) -> Option<serde_json::Value> {
        for _ in 0..500 {
            let ptr = leafview_poll_event(handle);
            if !ptr.is_null() {
                let json = to_rust_str(ptr).unwrap();
                leafview_free_string(ptr);
                return Some(serde_json::from_str(&json).unwrap());
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        None
    }

    #[test]
    fn to_c_string_strips_interior_nul() {
        let ptr = to_c_string("a\0b");
        assert_eq!(to_rust_str(ptr).as_deref(), Some("ab"));
        leafview_free_string(ptr);
    }

    #[test]
    fn read_buffer_stops_at_nul() {
        assert_eq!(read_buffer(b"key\0junk").as_deref(), Some("key"));
        assert_eq!(read_buffer(b"no terminator").as_deref(), Some("no terminator"));
        assert_eq!(read_buffer(&[0xff, 0xfe]), None);
    }

    fn write_into(buf: *mut c_char, len: usize, bytes: &[u8]) {
        assert!(bytes.len() <= len);
        // SAFETY: `buf` has room for `len` bytes.
        unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), buf.cast::<u8>(), bytes.len()) };
    }

    #[test]
    fn callback_strings_use_the_reported_length() {
        let host = CallbackHost {
            callbacks: callbacks(),
        };

        let key = host.read_string(|buf, len| {
            write_into(buf, len, b"abc123trailing");
            6
        });
        assert_eq!(key.as_deref(), Some("abc123"));

        let empty = host.read_string(|_, _| 0);
        assert_eq!(empty.as_deref(), Some(""));

        assert_eq!(host.read_string(|_, _| -1), None);
    }

    #[test]
    fn oversized_callback_strings_are_rejected() {
        let host = CallbackHost {
            callbacks: callbacks(),
        };

        let full = host.read_string(|buf, len| {
            write_into(buf, len, &vec![b'x'; len]);
            len as i32
        });
        assert_eq!(full, None);

        let overflow = host.read_string(|_, len| (len * 4) as i32);
        assert_eq!(overflow, None);
    }

    #[test]
    fn null_handles_fall_back() {
        let null = std::ptr::null_mut();
        assert!(!leafview_window_set_os_handle(null, 1, 1));
        assert!(leafview_poll_event(null).is_null());
        assert_eq!(leafview_request_open(null, std::ptr::null(), false), -1);
        leafview_coordinator_free(null);
    }

    #[test]
    fn invalid_settings_json_is_rejected() {
        let table = callbacks();
        let json = CString::new("not json").unwrap();
        assert!(leafview_coordinator_new(&table, json.as_ptr()).is_null());
    }

    #[test]
    fn open_in_constructed_window_reports_file_opened() {
        let table = callbacks();
        let settings = CString::new("{}").unwrap();
        let handle = leafview_coordinator_new(&table, settings.as_ptr());
        assert!(!handle.is_null());

        let window = leafview_window_new_id();
        leafview_window_constructed(handle, window);
        assert!(leafview_window_set_os_handle(handle, window, 42));

        let path = CString::new("/books/seven.cbz").unwrap();
        assert_eq!(leafview_request_open(handle, path.as_ptr(), false), 0);

        let event = poll_json(handle).expect("event arrives");
        assert_eq!(event["type"], "FileOpened");
        assert_eq!(event["window"], window);
        assert_eq!(event["page_count"], 7);

        leafview_coordinator_free(handle);
    }

    #[test]
    fn malformed_restore_entries_are_rejected() {
        let table = callbacks();
        let settings = CString::new("{}").unwrap();
        let handle = leafview_coordinator_new(&table, settings.as_ptr());
        let bad = CString::new("[{\"frame\": 1}]").unwrap();
        assert_eq!(leafview_request_session_restore(handle, bad.as_ptr()), -1);
        leafview_coordinator_free(handle);
    }
}
