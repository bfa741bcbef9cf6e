use fsbroker_ipc::{errno, Handle};
use fsbroker_ipc_messages::BrokerReply;
use fsbroker_policy::{Policy, PolicyRequest, PolicyVerdict};
use libc::c_int;

// Both syscalls are issued directly, relative to AT_FDCWD: whitelisted paths
// are all absolute, so the broker's working directory never comes into play.

pub(crate) fn proxied_open_file(
    policy: &Policy,
    path: &str,
    flags: c_int,
) -> (BrokerReply, Option<Handle>) {
    let req = PolicyRequest::FileOpen { path, flags };
    let (path, flags) = match policy.evaluate_request(&req) {
        PolicyVerdict::Granted { path, flags } => (path, flags),
        _ => return (BrokerReply::SyscallResult(-policy.denied_errno()), None),
    };
    let res = unsafe { libc::syscall(libc::SYS_openat, libc::AT_FDCWD, path.as_ptr(), flags) };
    if res < 0 {
        // Returning here is safe and won't leak any file descriptor, openat() did not
        // open one if it returned an error
        return (BrokerReply::SyscallResult(-errno()), None);
    }
    // Safety: the kernel just created this descriptor, nothing else in this process refers to it
    match unsafe { Handle::from_raw(res as c_int) } {
        Ok(handle) => (BrokerReply::SyscallResult(0), Some(handle)),
        Err(_) => (BrokerReply::SyscallResult(-libc::EBADF), None),
    }
}

pub(crate) fn proxied_access_file(
    policy: &Policy,
    path: &str,
    mode: c_int,
) -> (BrokerReply, Option<Handle>) {
    let req = PolicyRequest::FileAccess { path, mode };
    let (path, mode) = match policy.evaluate_request(&req) {
        PolicyVerdict::Granted { path, flags } => (path, flags),
        _ => return (BrokerReply::SyscallResult(-policy.denied_errno()), None),
    };
    let res = unsafe { libc::syscall(libc::SYS_faccessat, libc::AT_FDCWD, path.as_ptr(), mode) };
    if res < 0 {
        return (BrokerReply::SyscallResult(-errno()), None);
    }
    (BrokerReply::SyscallResult(res as c_int), None)
}
