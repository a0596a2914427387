//! FFI bindings for Stepflux
//!
//! This module provides C-compatible functions for driving the step engine
//! from a mobile host. All functions use C strings (null-terminated) and return
//! allocated memory that must be freed by the caller using `stepflux_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::config::EngineConfig;
use crate::engine::StepEngine;

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Set the last error message
fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Clear the last error message
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

// ============================================================================
// Engine API
// ============================================================================

/// Opaque handle to a StepEngine
pub struct StepEngineHandle {
    engine: StepEngine,
}

/// Create a new engine.
///
/// # Safety
/// - `config_json` may be NULL (defaults) or a valid null-terminated C string.
/// - Returns a pointer that must be freed with `stepflux_engine_free`.
/// - Returns NULL on error; call `stepflux_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn stepflux_engine_new(config_json: *const c_char) -> *mut StepEngineHandle {
    clear_last_error();

    let config = if config_json.is_null() {
        EngineConfig::default()
    } else {
        let json = match cstr_to_string(config_json) {
            Some(s) => s,
            None => {
                set_last_error("Invalid config string pointer");
                return ptr::null_mut();
            }
        };
        match EngineConfig::from_json(&json) {
            Ok(config) => config,
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        }
    };

    let handle = Box::new(StepEngineHandle {
        engine: StepEngine::new(config),
    });
    Box::into_raw(handle)
}

/// Free an engine.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `stepflux_engine_new`.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn stepflux_engine_free(engine: *mut StepEngineHandle) {
    if !engine.is_null() {
        drop(Box::from_raw(engine));
    }
}

/// Push one JSON-encoded raw sample and return the processing result as JSON.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `stepflux_engine_new`.
/// - `sample_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `stepflux_free_string`.
/// - Returns NULL when the sample was dropped (malformed, out of order, counter
///   regression); the engine stays usable. Call `stepflux_last_error` for the reason.
#[no_mangle]
pub unsafe extern "C" fn stepflux_engine_push(
    engine: *mut StepEngineHandle,
    sample_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }

    let handle = &mut *engine;

    let json_str = match cstr_to_string(sample_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid sample string pointer");
            return ptr::null_mut();
        }
    };

    let processed = match handle.engine.ingest_json(&json_str) {
        Ok(processed) => processed,
        Err(e) => {
            set_last_error(&e.to_string());
            return ptr::null_mut();
        }
    };

    match serde_json::to_string(&processed) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Current totals as JSON.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `stepflux_engine_new`.
/// - Returns a newly allocated string that must be freed with `stepflux_free_string`.
/// - Returns NULL on error; call `stepflux_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn stepflux_engine_totals(engine: *mut StepEngineHandle) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }

    let handle = &*engine;

    match handle.engine.save_totals_json() {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Diagnostic counters as JSON.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `stepflux_engine_new`.
/// - Returns a newly allocated string that must be freed with `stepflux_free_string`.
/// - Returns NULL on error; call `stepflux_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn stepflux_engine_diagnostics(
    engine: *mut StepEngineHandle,
) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }

    let handle = &*engine;

    match serde_json::to_string(&handle.engine.diagnostics()) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Seed the engine with persisted totals.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `stepflux_engine_new`.
/// - `json` must be a valid null-terminated C string.
/// - Returns 0 on success, non-zero on error.
/// - On error, call `stepflux_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn stepflux_engine_load_totals(
    engine: *mut StepEngineHandle,
    json: *const c_char,
) -> i32 {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return -1;
    }

    let handle = &mut *engine;

    let json_str = match cstr_to_string(json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid JSON string pointer");
            return -1;
        }
    };

    match handle.engine.load_totals_json(&json_str) {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by Stepflux functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a Stepflux function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn stepflux_free_string(ptr: *mut c_char) {
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
/// - The returned pointer is valid until the next Stepflux function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn stepflux_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the Stepflux library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn stepflux_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    fn pulse(timestamp_ms: i64) -> CString {
        CString::new(format!(
            r#"{{"kind": "step_pulse", "timestamp_ms": {}, "values": [1.0]}}"#,
            timestamp_ms
        ))
        .unwrap()
    }

    #[test]
    fn test_ffi_engine_lifecycle() {
        unsafe {
            let engine = stepflux_engine_new(ptr::null());
            assert!(!engine.is_null());

            for t in [0, 600, 1_200] {
                let sample = pulse(t);
                let result = stepflux_engine_push(engine, sample.as_ptr());
                assert!(!result.is_null());

                let result_str = CStr::from_ptr(result).to_str().unwrap();
                assert!(result_str.contains("accepted"));
                stepflux_free_string(result);
            }

            let totals = stepflux_engine_totals(engine);
            assert!(!totals.is_null());
            let totals_json: serde_json::Value =
                serde_json::from_str(CStr::from_ptr(totals).to_str().unwrap()).unwrap();
            assert_eq!(totals_json["step_count"], 3);

            // Seed a second engine from the saved totals
            let engine2 = stepflux_engine_new(ptr::null());
            assert_eq!(stepflux_engine_load_totals(engine2, totals), 0);

            let sample = pulse(0);
            let result = stepflux_engine_push(engine2, sample.as_ptr());
            stepflux_free_string(result);

            let diagnostics = stepflux_engine_diagnostics(engine2);
            let diagnostics_json: serde_json::Value =
                serde_json::from_str(CStr::from_ptr(diagnostics).to_str().unwrap()).unwrap();
            assert_eq!(diagnostics_json["steps_accepted"], 1);

            stepflux_free_string(diagnostics);
            stepflux_free_string(totals);
            stepflux_engine_free(engine);
            stepflux_engine_free(engine2);
        }
    }

    #[test]
    fn test_ffi_counter_config() {
        let config = CString::new(r#"{"step_source": "counter_based"}"#).unwrap();

        unsafe {
            let engine = stepflux_engine_new(config.as_ptr());
            assert!(!engine.is_null());

            let sample = pulse(0);
            let result = stepflux_engine_push(engine, sample.as_ptr());
            let result_str = CStr::from_ptr(result).to_str().unwrap();
            assert!(result_str.contains("ignored_inactive_source"));

            stepflux_free_string(result);
            stepflux_engine_free(engine);
        }
    }

    #[test]
    fn test_ffi_dropped_sample_sets_error() {
        unsafe {
            let engine = stepflux_engine_new(ptr::null());

            let later = pulse(5_000);
            stepflux_free_string(stepflux_engine_push(engine, later.as_ptr()));

            let earlier = pulse(1_000);
            let result = stepflux_engine_push(engine, earlier.as_ptr());
            assert!(result.is_null());

            let error = stepflux_last_error();
            assert!(!error.is_null());
            let error_str = CStr::from_ptr(error).to_str().unwrap();
            assert!(error_str.contains("Out-of-order"));

            stepflux_engine_free(engine);
        }
    }

    #[test]
    fn test_ffi_invalid_config() {
        let config = CString::new(r#"{"shake_threshold": -2.0}"#).unwrap();

        unsafe {
            let engine = stepflux_engine_new(config.as_ptr());
            assert!(engine.is_null());
            assert!(!stepflux_last_error().is_null());
        }
    }

    #[test]
    fn test_ffi_version() {
        unsafe {
            let version = stepflux_version();
            assert!(!version.is_null());

            let version_str = CStr::from_ptr(version).to_str().unwrap();
            assert!(!version_str.is_empty());
        }
    }
}
