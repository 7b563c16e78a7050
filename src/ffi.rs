//! FFI bindings for daily metrics
//!
//! C-compatible functions for hosts that export platform data as JSON and
//! want a daily summary back. All functions use null-terminated C strings and
//! return allocated memory that must be freed with `dm_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use chrono::{DateTime, FixedOffset, Local};

use crate::config::AggregatorConfig;
use crate::memory::PlatformSnapshot;
use crate::report::summarize_snapshot;

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

/// Convert an optional C string; NULL maps to `Ok(None)`
unsafe fn optional_cstr(ptr: *const c_char) -> Result<Option<String>, String> {
    if ptr.is_null() {
        return Ok(None);
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map(|s| Some(s.to_string()))
        .map_err(|e| format!("String is not valid UTF-8: {e}"))
}

type SummaryArgs = (String, Option<String>, Option<String>);

unsafe fn summary_args(
    snapshot_json: *const c_char,
    config_json: *const c_char,
    now_rfc3339: *const c_char,
) -> Result<SummaryArgs, String> {
    let snapshot = optional_cstr(snapshot_json)?
        .ok_or_else(|| "Invalid snapshot string pointer".to_string())?;
    Ok((
        snapshot,
        optional_cstr(config_json)?,
        optional_cstr(now_rfc3339)?,
    ))
}

fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

fn summarize(
    snapshot_json: &str,
    config_json: Option<&str>,
    now: Option<&str>,
) -> Result<String, String> {
    let snapshot = PlatformSnapshot::from_json(snapshot_json).map_err(|e| e.to_string())?;
    let config = match config_json {
        Some(json) => AggregatorConfig::from_json(json).map_err(|e| e.to_string())?,
        None => AggregatorConfig::default(),
    };
    let now: DateTime<FixedOffset> = match now {
        Some(s) => DateTime::parse_from_rfc3339(s).map_err(|e| format!("Invalid instant: {e}"))?,
        None => Local::now().fixed_offset(),
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(|e| e.to_string())?;
    let report = runtime
        .block_on(summarize_snapshot(snapshot, config, now))
        .map_err(|e| e.to_string())?;

    serde_json::to_string(&report).map_err(|e| e.to_string())
}

// ============================================================================
// Summaries
// ============================================================================

/// Summarise an exported platform snapshot for the day containing `now`.
///
/// Returns a JSON object whose `status` is either `summary` or
/// `permission_required`.
///
/// # Safety
/// - `snapshot_json` must be a valid null-terminated C string.
/// - `config_json` and `now_rfc3339` may be NULL (defaults / local clock).
/// - Returns a newly allocated string that must be freed with `dm_free_string`.
/// - Returns NULL on error; call `dm_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn dm_summarize_snapshot(
    snapshot_json: *const c_char,
    config_json: *const c_char,
    now_rfc3339: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let result = summary_args(snapshot_json, config_json, now_rfc3339).and_then(
        |(snapshot, config, now)| summarize(&snapshot, config.as_deref(), now.as_deref()),
    );

    match result {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e);
            ptr::null_mut()
        }
    }
}

/// Validate a platform snapshot and return a JSON array of issues.
///
/// # Safety
/// - `snapshot_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `dm_free_string`.
/// - Returns NULL on error; call `dm_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn dm_validate_snapshot(snapshot_json: *const c_char) -> *mut c_char {
    clear_last_error();

    let json = match optional_cstr(snapshot_json) {
        Ok(Some(s)) => s,
        Ok(None) => {
            set_last_error("Invalid snapshot string pointer");
            return ptr::null_mut();
        }
        Err(e) => {
            set_last_error(&e);
            return ptr::null_mut();
        }
    };

    let issues = PlatformSnapshot::from_json(&json)
        .map(|snapshot| snapshot.validate())
        .and_then(|issues| serde_json::to_string(&issues));

    match issues {
        Ok(result) => string_to_cstr(&result),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by a `dm_` function.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a `dm_` function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn dm_free_string(ptr: *mut c_char) {
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
/// - The returned pointer is valid until the next `dm_` call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn dm_last_error() -> *const c_char {
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
pub unsafe extern "C" fn dm_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
