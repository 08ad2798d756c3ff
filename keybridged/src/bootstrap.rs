/// Best-effort process hardening on Linux, applied before any secret is fetched.
///
/// 1. **`PR_SET_DUMPABLE 0`**: no core dumps, and other unprivileged
///    processes of the same user cannot read `/proc/<pid>/mem`.
/// 2. **`mlockall(MCL_CURRENT | MCL_FUTURE)`**: keeps every page in RAM so
///    private keys are never written to swap.  Usually needs
///    `CAP_IPC_LOCK` or a large enough `RLIMIT_MEMLOCK`.
///
/// Failures are logged and otherwise ignored.
pub fn secure_bootstrap() {
    #[cfg(target_os = "linux")]
    {
        disable_dumps();
        lock_memory();
    }
}

#[cfg(target_os = "linux")]
fn disable_dumps() {
    // SAFETY: PR_SET_DUMPABLE takes a plain integer and touches no memory.
    let ret = unsafe { libc::prctl(libc::PR_SET_DUMPABLE, 0 as libc::c_ulong) };
    if ret == 0 {
        tracing::debug!("process marked non-dumpable");
    } else {
        let err = std::io::Error::last_os_error();
        tracing::warn!("could not disable core dumps: {err}");
    }
}

#[cfg(target_os = "linux")]
fn lock_memory() {
    // SAFETY: mlockall has no memory-safety preconditions.
    let ret = unsafe { libc::mlockall(libc::MCL_CURRENT | libc::MCL_FUTURE) };
    if ret == 0 {
        tracing::debug!("process memory locked");
    } else {
        let err = std::io::Error::last_os_error();
        tracing::warn!("could not lock memory, keys may be swapped to disk: {err}");
    }
}
