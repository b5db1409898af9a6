//! Uid and gid to name resolution.

use std::ffi::CStr;

/// Resolves a uid to its user name.
#[allow(unsafe_code)]
pub(crate) fn user_name(uid: u32) -> Option<String> {
    let mut passwd: libc::passwd = unsafe { std::mem::zeroed() };
    let mut buffer = vec![0u8; 4096];
    let mut result: *mut libc::passwd = std::ptr::null_mut();

    // SAFETY: buffers outlive the call and result is checked before use
    let rc = unsafe {
        libc::getpwuid_r(
            uid,
            &mut passwd,
            buffer.as_mut_ptr().cast(),
            buffer.len(),
            &mut result,
        )
    };

    if rc != 0 || result.is_null() {
        return None;
    }

    let name = unsafe { CStr::from_ptr(passwd.pw_name) };
    name.to_str().ok().map(str::to_string)
}

/// Resolves a gid to its group name.
#[allow(unsafe_code)]
pub(crate) fn group_name(gid: u32) -> Option<String> {
    let mut group: libc::group = unsafe { std::mem::zeroed() };
    let mut buffer = vec![0u8; 4096];
    let mut result: *mut libc::group = std::ptr::null_mut();

    // SAFETY: buffers outlive the call and result is checked before use
    let rc = unsafe {
        libc::getgrgid_r(
            gid,
            &mut group,
            buffer.as_mut_ptr().cast(),
            buffer.len(),
            &mut result,
        )
    };

    if rc != 0 || result.is_null() {
        return None;
    }

    let name = unsafe { CStr::from_ptr(group.gr_name) };
    name.to_str().ok().map(str::to_string)
}
