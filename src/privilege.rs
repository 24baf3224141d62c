//! Privilege drop with capability retention
//!
//! The process starts as root so the transmit side can bind raw and
//! admin sockets, then switches to an unprivileged user. The calling
//! thread keeps CAP_NET_RAW, CAP_NET_ADMIN and CAP_SYS_NICE through the
//! switch (PR_SET_KEEPCAPS is per-thread on Linux); worker threads
//! created afterwards lose the bits but keep using the already-bound
//! sockets. Built on raw syscalls, no libcap dependency.

use crate::error::{Error, Result};

/// Switch to `username`, retaining network and scheduling capabilities
/// on the calling thread.
///
/// Must be called after all sockets are bound. Empty user or a non-root
/// process is a no-op. A failed capability restore is logged and the
/// process continues with whatever it has.
#[cfg(target_os = "linux")]
pub fn drop_privileges(username: &str) -> Result<()> {
    use std::ffi::CString;

    if username.is_empty() {
        return Ok(());
    }

    // SAFETY: getuid has no preconditions.
    if unsafe { libc::getuid() } != 0 {
        tracing::info!("not running as root, skipping privilege drop");
        return Ok(());
    }

    let c_user = CString::new(username)
        .map_err(|_| Error::Privilege(format!("invalid user name '{username}'")))?;

    // SAFETY: c_user is a valid NUL-terminated string; getpwnam returns
    // a pointer into static storage or null.
    let pw = unsafe { libc::getpwnam(c_user.as_ptr()) };
    if pw.is_null() {
        return Err(Error::Privilege(format!("user '{username}' not found")));
    }
    let (target_uid, target_gid) = unsafe { ((*pw).pw_uid, (*pw).pw_gid) };

    if target_uid == 0 {
        tracing::info!("target user '{username}' is root, nothing to drop");
        return Ok(());
    }

    // Keep permitted capabilities across the coming setuid()
    if unsafe { libc::prctl(libc::PR_SET_KEEPCAPS, 1 as libc::c_ulong, 0, 0, 0) } < 0 {
        return Err(Error::Privilege(format!(
            "prctl(PR_SET_KEEPCAPS) failed: {}",
            std::io::Error::last_os_error()
        )));
    }

    // Group change must happen while still root
    if unsafe { libc::setgid(target_gid) } < 0 {
        return Err(Error::Privilege(format!(
            "setgid({target_gid}) failed: {}",
            std::io::Error::last_os_error()
        )));
    }
    if unsafe { libc::initgroups(c_user.as_ptr(), target_gid) } < 0 {
        return Err(Error::Privilege(format!(
            "initgroups failed: {}",
            std::io::Error::last_os_error()
        )));
    }

    if unsafe { libc::setuid(target_uid) } < 0 {
        return Err(Error::Privilege(format!(
            "setuid({target_uid}) failed: {}",
            std::io::Error::last_os_error()
        )));
    }

    // Verify the switch took
    if unsafe { libc::getuid() } == 0 || unsafe { libc::geteuid() } == 0 {
        return Err(Error::Privilege("still root after privilege drop".into()));
    }

    // setuid with keepcaps preserves the permitted set but clears the
    // effective set; restore it explicitly on this thread.
    restore_capabilities();

    // SAFETY: clearing the flag has no preconditions.
    unsafe { libc::prctl(libc::PR_SET_KEEPCAPS, 0 as libc::c_ulong, 0, 0, 0) };

    tracing::info!("dropped privileges to '{username}' (uid={target_uid}, gid={target_gid})");
    Ok(())
}

#[cfg(target_os = "linux")]
fn restore_capabilities() {
    const LINUX_CAPABILITY_VERSION_3: u32 = 0x2008_0522;
    const CAP_NET_ADMIN: u32 = 12;
    const CAP_NET_RAW: u32 = 13;
    const CAP_SYS_NICE: u32 = 23;

    #[repr(C)]
    struct CapUserHeader {
        version: u32,
        pid: libc::c_int,
    }

    #[repr(C)]
    #[derive(Clone, Copy, Default)]
    struct CapUserData {
        effective: u32,
        permitted: u32,
        inheritable: u32,
    }

    let header = CapUserHeader {
        version: LINUX_CAPABILITY_VERSION_3,
        pid: 0, // current thread
    };

    let caps = (1u32 << CAP_NET_RAW) | (1u32 << CAP_NET_ADMIN) | (1u32 << CAP_SYS_NICE);
    let data = [
        CapUserData {
            effective: caps,
            permitted: caps,
            inheritable: 0,
        },
        // capabilities 32–63: none needed
        CapUserData::default(),
    ];

    // SAFETY: header and data match the kernel's capset v3 ABI.
    let rc = unsafe { libc::syscall(libc::SYS_capset, &header, data.as_ptr()) };
    if rc < 0 {
        // Non-fatal: transmit keeps working on the already-bound sockets,
        // the cadence thread just cannot elevate its scheduling class.
        tracing::warn!(
            "capset failed ({}), continuing without capabilities",
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(target_os = "linux"))]
pub fn drop_privileges(username: &str) -> Result<()> {
    if !username.is_empty() {
        tracing::warn!("privilege drop is only supported on Linux, ignoring user '{username}'");
    }
    Ok(())
}
