//! C ABI for embedding the worklist server.
//!
//! Every instance is addressed by a non-zero `u64` handle from
//! [`octowl_create`]. Functions taking a handle return `false` (or null) when
//! the handle is unknown. Out-parameters must be valid, writable pointers;
//! a null out-parameter makes the call return `false` without side effects.
//! Buffers and strings handed out by this library must be released with
//! [`octowl_free_buffer`] and [`octowl_free_string`].

use std::ffi::{CStr, CString, c_char};
use std::path::Path;
use std::sync::Arc;

use octowl_core::part10;
use octowl_server::config::loader::load_config;
use octowl_server::{
    CFindRq, ChannelTransport, CommandOutcome, DimseMessage, PresentationContext, Priority,
    ServerHandle, WorklistServer, registry,
};

/// The command was answered; `out_status` holds the DIMSE status.
pub const OCTOWL_FIND_RESPONDED: i32 = 1;
/// The command is not handled here.
pub const OCTOWL_FIND_DELEGATED: i32 = 0;
/// The command was rejected as an illegal call.
pub const OCTOWL_FIND_ILLEGAL_CALL: i32 = -1;
/// Unknown handle or null out-parameter.
pub const OCTOWL_FIND_INVALID: i32 = -2;

fn server(handle: u64) -> Option<Arc<WorklistServer>> {
    ServerHandle::from_raw(handle).and_then(|h| registry::global().get(h))
}

/// # Safety
/// `ptr` must be null or a valid null-terminated string.
unsafe fn optional_str<'a>(ptr: *const c_char) -> Result<Option<&'a str>, ()> {
    if ptr.is_null() {
        return Ok(None);
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map(Some)
        .map_err(|_| ())
}

/// Create a server from the TOML file at `config_path`, or from the default
/// configuration sources when it is null. Returns 0 on failure.
///
/// # Safety
/// `config_path` must be null or a valid null-terminated UTF-8 string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn octowl_create(config_path: *const c_char) -> u64 {
    octowl_core::init_local_offset();
    let Ok(path) = (unsafe { optional_str(config_path) }) else {
        return 0;
    };
    let cfg = match load_config(path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("octowl: configuration error: {e}");
            return 0;
        }
    };
    octowl_server::init_tracing_with_level(&cfg.logging.level);

    match WorklistServer::from_config(&cfg, Arc::new(ChannelTransport::new())) {
        Ok(server) => registry::global().register(server).get(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to create worklist server");
            0
        }
    }
}

/// Release a server. A running server stops once no call is using it.
#[unsafe(no_mangle)]
pub extern "C" fn octowl_destroy(handle: u64) -> bool {
    ServerHandle::from_raw(handle).is_some_and(|h| registry::global().release(h))
}

/// Set the template file for new datasets; an empty string clears it.
/// Returns whether the file exists.
///
/// # Safety
/// `path` must be a valid null-terminated UTF-8 string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn octowl_set_template_file(handle: u64, path: *const c_char) -> bool {
    let Ok(Some(path)) = (unsafe { optional_str(path) }) else {
        return false;
    };
    server(handle).is_some_and(|s| s.set_template_file(Path::new(path)))
}

#[unsafe(no_mangle)]
pub extern "C" fn octowl_clear(handle: u64) -> bool {
    server(handle).is_some_and(|s| s.clear_datasets())
}

/// Add a dataset and write its index to `out_index`.
///
/// # Safety
/// `out_index` must be null or valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn octowl_add(handle: u64, out_index: *mut usize) -> bool {
    if out_index.is_null() {
        return false;
    }
    let Some(server) = server(handle) else {
        return false;
    };
    unsafe { *out_index = server.add_dataset() };
    true
}

#[unsafe(no_mangle)]
pub extern "C" fn octowl_delete(handle: u64, index: usize) -> bool {
    server(handle).is_some_and(|s| s.remove_dataset(index))
}

/// # Safety
/// `out_count` must be null or valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn octowl_count(handle: u64, out_count: *mut usize) -> bool {
    if out_count.is_null() {
        return false;
    }
    let Some(server) = server(handle) else {
        return false;
    };
    unsafe { *out_count = server.dataset_count() };
    true
}

/// Encode the dataset at `index` as a Part-10 file image.
///
/// On success `*out_data` owns `*out_len` bytes that must be released with
/// [`octowl_free_buffer`].
///
/// # Safety
/// `out_data` and `out_len` must be null or valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn octowl_get_dataset(
    handle: u64,
    index: usize,
    out_data: *mut *mut u8,
    out_len: *mut usize,
) -> bool {
    if out_data.is_null() || out_len.is_null() {
        return false;
    }
    let Some(record) = server(handle).and_then(|s| s.get_dataset(index)) else {
        return false;
    };
    let bytes = match part10::encode(&record) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(index, error = %e, "Failed to encode dataset");
            return false;
        }
    };
    let boxed = bytes.into_boxed_slice();
    let len = boxed.len();
    unsafe {
        *out_len = len;
        *out_data = Box::into_raw(boxed).cast::<u8>();
    }
    true
}

/// Release a buffer returned by [`octowl_get_dataset`].
///
/// # Safety
/// `data` and `len` must come from one successful `octowl_get_dataset` call
/// and must not be used afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn octowl_free_buffer(data: *mut u8, len: usize) {
    if data.is_null() {
        return;
    }
    unsafe {
        drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(data, len)));
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn octowl_start(handle: u64) -> bool {
    server(handle).is_some_and(|s| s.start())
}

#[unsafe(no_mangle)]
pub extern "C" fn octowl_stop(handle: u64) -> bool {
    server(handle).is_some_and(|s| s.stop())
}

/// Status report; consumes the pending errors. Null for an unknown handle.
/// The returned pointer must be freed with [`octowl_free_string`].
#[unsafe(no_mangle)]
pub extern "C" fn octowl_status(handle: u64) -> *mut c_char {
    match server(handle) {
        Some(server) => CString::new(server.status())
            .unwrap_or_default()
            .into_raw(),
        None => std::ptr::null_mut(),
    }
}

/// # Safety
/// `ptr` must be null or come from [`octowl_status`], and must not be used
/// afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn octowl_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        unsafe {
            drop(CString::from_raw(ptr));
        }
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn octowl_mark_dirty(handle: u64, index: usize) -> bool {
    server(handle).is_some_and(|s| s.mark_dirty(index))
}

#[unsafe(no_mangle)]
pub extern "C" fn octowl_flush(handle: u64, index: usize) -> bool {
    server(handle).is_some_and(|s| s.save_dataset(index))
}

#[unsafe(no_mangle)]
pub extern "C" fn octowl_flush_all(handle: u64) -> bool {
    server(handle).is_some_and(|s| s.save_all())
}

#[unsafe(no_mangle)]
pub extern "C" fn octowl_flush_dirty(handle: u64) -> bool {
    server(handle).is_some_and(|s| s.save_dirty())
}

/// Pass a C-FIND request received by an external network layer to the
/// server. A null `sop_class_uid` stands for a missing command.
///
/// Returns one of the `OCTOWL_FIND_*` codes; on
/// [`OCTOWL_FIND_RESPONDED`] the response status is written to `out_status`.
///
/// # Safety
/// `sop_class_uid` must be null or a valid null-terminated UTF-8 string and
/// `out_status` must be valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn octowl_handle_find(
    handle: u64,
    context_id: u8,
    message_id: u16,
    sop_class_uid: *const c_char,
    out_status: *mut u16,
) -> i32 {
    if out_status.is_null() {
        return OCTOWL_FIND_INVALID;
    }
    let Some(server) = server(handle) else {
        return OCTOWL_FIND_INVALID;
    };
    let Ok(sop_class_uid) = (unsafe { optional_str(sop_class_uid) }) else {
        return OCTOWL_FIND_ILLEGAL_CALL;
    };

    let message = sop_class_uid.map(|uid| {
        DimseMessage::CFindRq(CFindRq {
            message_id,
            affected_sop_class_uid: uid.to_string(),
            priority: Priority::Medium,
        })
    });
    let context = server
        .network_settings()
        .presentation_context(context_id)
        .cloned()
        .unwrap_or_else(|| PresentationContext::worklist_find(context_id));

    match server.handle_incoming_command(message.as_ref(), &context) {
        Ok(CommandOutcome::Respond {
            response: DimseMessage::CFindRsp(rsp),
            ..
        }) => {
            unsafe { *out_status = rsp.status };
            OCTOWL_FIND_RESPONDED
        }
        Ok(_) => OCTOWL_FIND_DELEGATED,
        Err(e) => {
            tracing::debug!(error = %e, "Find request rejected");
            OCTOWL_FIND_ILLEGAL_CALL
        }
    }
}
