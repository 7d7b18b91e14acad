//! FFI bindings for FitSphere sensing
//!
//! C-compatible functions for driving a [`SensorSession`] from the platform
//! adapter (browser glue, iOS, Android). All functions use null-terminated C
//! strings. Returned strings are allocated here and must be freed by the caller
//! using `fitsphere_free_string`.
//!
//! Every call on a session handle must come from the thread that owns it.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use serde::Serialize;

use crate::config::SessionConfig;
use crate::error::SensingError;
use crate::schema::{RecordAdapter, SensorRecord};
use crate::session::{SensorSession, StartOutcome};
use crate::types::{Capabilities, DashboardUpdate};

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Serialize `value` into a caller-owned C string, or record the error
fn to_json_cstr<T: Serialize>(value: &T) -> *mut c_char {
    match serde_json::to_string(value) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&SensingError::from(e).to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Session API
// ============================================================================

/// Opaque handle to a SensorSession
pub struct SessionHandle {
    session: SensorSession<Vec<DashboardUpdate>>,
}

impl SessionHandle {
    fn take_updates(&mut self) -> Vec<DashboardUpdate> {
        std::mem::take(self.session.sink_mut())
    }
}

#[derive(Serialize)]
struct StartResponse {
    #[serde(flatten)]
    outcome: StartOutcome,
    updates: Vec<DashboardUpdate>,
}

/// Create an idle session.
///
/// # Safety
/// - `config_json` must be a valid null-terminated C string, or NULL for the
///   default configuration.
/// - Returns a pointer that must be freed with `fitsphere_session_free`.
/// - Returns NULL on error; call `fitsphere_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn fitsphere_session_new(config_json: *const c_char) -> *mut SessionHandle {
    clear_last_error();

    let config = if config_json.is_null() {
        SessionConfig::default()
    } else {
        let json = match cstr_to_string(config_json) {
            Some(s) => s,
            None => {
                set_last_error("Invalid config string pointer");
                return ptr::null_mut();
            }
        };
        match SessionConfig::from_json(&json) {
            Ok(config) => config,
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        }
    };

    match SensorSession::new(config, Vec::new()) {
        Ok(session) => Box::into_raw(Box::new(SessionHandle { session })),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a session.
///
/// # Safety
/// - `session` must be a valid pointer returned by `fitsphere_session_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn fitsphere_session_free(session: *mut SessionHandle) {
    if !session.is_null() {
        drop(Box::from_raw(session));
    }
}

/// Start a session with the platform's capability probe.
///
/// Returns `{"permission_request": id|null, "location_watch": {...}|null,
/// "updates": [...]}`. When `permission_request` is set the adapter must show
/// the prompt and push a `permission` record with that id.
///
/// # Safety
/// - `session` must be a valid pointer returned by `fitsphere_session_new`.
/// - `capabilities_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `fitsphere_free_string`.
/// - Returns NULL on error; call `fitsphere_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn fitsphere_session_start(
    session: *mut SessionHandle,
    capabilities_json: *const c_char,
    now_ms: i64,
) -> *mut c_char {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return ptr::null_mut();
    }

    let handle = &mut *session;

    let json = match cstr_to_string(capabilities_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid capabilities string pointer");
            return ptr::null_mut();
        }
    };

    let capabilities: Capabilities = match serde_json::from_str(&json) {
        Ok(caps) => caps,
        Err(e) => {
            set_last_error(&SensingError::from(e).to_string());
            return ptr::null_mut();
        }
    };

    match handle.session.start(capabilities, now_ms) {
        Ok(outcome) => to_json_cstr(&StartResponse {
            outcome,
            updates: handle.take_updates(),
        }),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Push one `fitsphere.sensor_record.v1` record and return the resulting
/// updates as a JSON array.
///
/// # Safety
/// - `session` must be a valid pointer returned by `fitsphere_session_new`.
/// - `record_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `fitsphere_free_string`.
/// - Returns NULL on error; call `fitsphere_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn fitsphere_session_push(
    session: *mut SessionHandle,
    record_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return ptr::null_mut();
    }

    let handle = &mut *session;

    let json = match cstr_to_string(record_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid record string pointer");
            return ptr::null_mut();
        }
    };

    let record: SensorRecord = match serde_json::from_str(&json) {
        Ok(record) => record,
        Err(e) => {
            set_last_error(&SensingError::from(e).to_string());
            return ptr::null_mut();
        }
    };

    if let Err(e) = record.validate() {
        set_last_error(&format!("Invalid record: {}", e));
        return ptr::null_mut();
    }

    let event = RecordAdapter::to_event(&record, handle.session.pending_permission());
    match handle.session.handle(event) {
        Ok(()) => to_json_cstr(&handle.take_updates()),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Current dashboard state as JSON.
///
/// # Safety
/// - `session` must be a valid pointer returned by `fitsphere_session_new`.
/// - Returns a newly allocated string that must be freed with `fitsphere_free_string`.
/// - Returns NULL on error; call `fitsphere_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn fitsphere_session_snapshot(session: *const SessionHandle) -> *mut c_char {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return ptr::null_mut();
    }

    let handle = &*session;
    to_json_cstr(&handle.session.snapshot())
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by FitSphere functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a FitSphere function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn fitsphere_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next FitSphere function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn fitsphere_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn fitsphere_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;

    unsafe fn take_string(ptr: *mut c_char) -> String {
        assert!(!ptr.is_null(), "unexpected error: {:?}", last_error());
        let s = CStr::from_ptr(ptr).to_str().unwrap().to_string();
        fitsphere_free_string(ptr);
        s
    }

    unsafe fn last_error() -> Option<String> {
        let err = fitsphere_last_error();
        if err.is_null() {
            None
        } else {
            Some(CStr::from_ptr(err).to_str().unwrap().to_string())
        }
    }

    unsafe fn push(session: *mut SessionHandle, record: &str) -> serde_json::Value {
        let record = CString::new(record).unwrap();
        let result = fitsphere_session_push(session, record.as_ptr());
        serde_json::from_str(&take_string(result)).unwrap()
    }

    #[test]
    fn test_ffi_session_lifecycle() {
        unsafe {
            let config = CString::new(r#"{"simulation":{"seed":3}}"#).unwrap();
            let session = fitsphere_session_new(config.as_ptr());
            assert!(!session.is_null());

            let caps = CString::new(
                r#"{"motion":true,"orientation":true,"permission_required":true,"geolocation":true}"#,
            )
            .unwrap();
            let started: serde_json::Value = serde_json::from_str(&take_string(
                fitsphere_session_start(session, caps.as_ptr(), 1_000),
            ))
            .unwrap();
            assert_eq!(started["permission_request"], 1);
            assert_eq!(started["location_watch"]["timeout_ms"], 5000);
            assert!(started["updates"].as_array().unwrap().len() >= 2);

            let updates = push(session, r#"{"type":"permission","t":1100,"status":"granted"}"#);
            assert!(updates
                .as_array()
                .unwrap()
                .iter()
                .any(|u| u["kind"] == "control" && u["label"] == "Step Counter Enabled"));

            push(session, r#"{"type":"motion","t":1200,"acceleration":{"x":0,"y":0,"z":13.0}}"#);
            let snapshot: serde_json::Value =
                serde_json::from_str(&take_string(fitsphere_session_snapshot(session))).unwrap();
            assert_eq!(snapshot["total_steps"], 1);
            assert_eq!(snapshot["state"]["state"], "active");

            fitsphere_session_free(session);
        }
    }

    #[test]
    fn test_ffi_default_config() {
        unsafe {
            let session = fitsphere_session_new(ptr::null());
            assert!(!session.is_null());
            fitsphere_session_free(session);
        }
    }

    #[test]
    fn test_ffi_error_handling() {
        unsafe {
            let bad_config = CString::new(r#"{"step":{"window_size":0}}"#).unwrap();
            assert!(fitsphere_session_new(bad_config.as_ptr()).is_null());
            assert!(last_error().unwrap().contains("window_size"));

            let session = fitsphere_session_new(ptr::null());
            let record = CString::new("not json").unwrap();
            assert!(fitsphere_session_push(session, record.as_ptr()).is_null());
            assert!(last_error().is_some());

            let record = CString::new(r#"{"type":"tick","t":-5}"#).unwrap();
            assert!(fitsphere_session_push(session, record.as_ptr()).is_null());
            assert!(last_error().unwrap().contains("Negative timestamp"));

            assert!(fitsphere_session_push(ptr::null_mut(), record.as_ptr()).is_null());

            let caps = CString::new("{}").unwrap();
            assert!(fitsphere_session_start(session, caps.as_ptr(), -1).is_null());
            assert!(last_error().unwrap().contains("Timestamp out of range"));

            let started = fitsphere_session_start(session, caps.as_ptr(), 0);
            take_string(started);
            let updates = push(session, &format!(r#"{{"type":"tick","t":{}}}"#, i64::MAX));
            assert!(updates.is_array());
            fitsphere_session_free(session);
        }
    }

    #[test]
    fn test_ffi_version() {
        unsafe {
            let version = fitsphere_version();
            assert!(!version.is_null());
            let version_str = CStr::from_ptr(version).to_str().unwrap();
            assert_eq!(version_str, env!("CARGO_PKG_VERSION"));
        }
    }
}
