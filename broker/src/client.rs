use crate::process::{BrokerProcess, BrokerState};
use fsbroker_ipc::{Handle, IpcChannel, IpcError, IPC_MESSAGE_MAX_SIZE};
use fsbroker_ipc_messages::{BrokerReply, BrokerRequest};
use fsbroker_policy::PolicyRequest;
use libc::{c_char, c_int};
use log::{debug, warn};
use std::ffi::CStr;

const REPLY_BUFFER_SIZE: usize = 32;

impl BrokerProcess {
    /// Opens `path` in the broker and returns the resulting file descriptor,
    /// now owned by the caller, or a negative errno.
    ///
    /// Returns `-denied_errno` if the policy forbids it, and `-ENOMEM` if
    /// the broker cannot be reached.
    pub fn open(&self, path: &str, flags: c_int) -> c_int {
        if self.denied_locally(&PolicyRequest::FileOpen { path, flags }) {
            return -self.config.policy().denied_errno();
        }
        let request = BrokerRequest::Open { path, flags };
        // Descriptors received are only CLOEXEC if the caller asked for it
        let cloexec = (flags & libc::O_CLOEXEC) != 0;
        match self.exchange(&request, cloexec) {
            Ok((BrokerReply::SyscallResult(0), Some(handle))) => handle.into_raw(),
            Ok((BrokerReply::SyscallResult(res), None)) if res < 0 => res,
            Ok((reply, handle)) => {
                self.report_failure(&request, &MalformedReply(&reply, handle.is_some()));
                -libc::ENOMEM
            }
            Err(e) => {
                self.report_failure(&request, &e);
                -libc::ENOMEM
            }
        }
    }

    /// Checks whether `path` is accessible with `mode` from the broker, and
    /// returns 0 or a negative errno (see `open()`)
    pub fn access(&self, path: &str, mode: c_int) -> c_int {
        if self.denied_locally(&PolicyRequest::FileAccess { path, mode }) {
            return -self.config.policy().denied_errno();
        }
        let request = BrokerRequest::Access { path, mode };
        match self.exchange(&request, true) {
            Ok((BrokerReply::SyscallResult(res), None)) => res,
            Ok((reply, handle)) => {
                self.report_failure(&request, &MalformedReply(&reply, handle.is_some()));
                -libc::ENOMEM
            }
            Err(e) => {
                self.report_failure(&request, &e);
                -libc::ENOMEM
            }
        }
    }

    /// Same as `open()`, for callers holding a C string.
    ///
    /// # Safety
    ///
    /// `path` must be null or point to a NUL-terminated string which stays
    /// valid for the duration of the call.
    pub unsafe fn open_raw(&self, path: *const c_char, flags: c_int) -> c_int {
        if path.is_null() {
            return -libc::EFAULT;
        }
        match CStr::from_ptr(path).to_str() {
            Ok(path) => self.open(path, flags),
            // No whitelisted path is ever invalid UTF-8
            Err(_) => -self.config.policy().denied_errno(),
        }
    }

    /// Same as `access()`, for callers holding a C string.
    ///
    /// # Safety
    ///
    /// See `open_raw()`.
    pub unsafe fn access_raw(&self, path: *const c_char, mode: c_int) -> c_int {
        if path.is_null() {
            return -libc::EFAULT;
        }
        match CStr::from_ptr(path).to_str() {
            Ok(path) => self.access(path, mode),
            Err(_) => -self.config.policy().denied_errno(),
        }
    }

    fn denied_locally(&self, request: &PolicyRequest) -> bool {
        self.config.fast_check_in_client
            && !self.config.policy().evaluate_request(request).is_granted()
    }

    // Sends `request` along with the writing end of a fresh reply channel,
    // and blocks until the broker answers on it.
    fn exchange(
        &self,
        request: &BrokerRequest,
        cloexec: bool,
    ) -> Result<(BrokerReply, Option<Handle>), IpcError<'static>> {
        let control_channel = match &self.state {
            BrokerState::Initialized {
                control_channel, ..
            } => control_channel,
            BrokerState::Uninitialized => return Err(IpcError::PeerDisconnected),
        };
        let (reply_reader, reply_writer) = IpcChannel::new()?;
        let mut buf = [0u8; IPC_MESSAGE_MAX_SIZE];
        debug!("Sending request: {}", request);
        control_channel.send(request, Some(reply_writer.as_handle()), &mut buf)?;
        // Only the broker holds a writing end now: if it dies, we read EOF
        drop(reply_writer);
        let mut buf = [0u8; REPLY_BUFFER_SIZE];
        let (reply, handles) = match reply_reader.recv::<BrokerReply>(&mut buf, cloexec) {
            Ok(Some(m)) => m,
            Ok(None) => return Err(IpcError::PeerDisconnected),
            Err(e) => return Err(e.into_owned()),
        };
        let mut handles = handles.into_iter();
        match (handles.next(), handles.len()) {
            (handle, 0) => Ok((reply, handle)),
            (_, extra) => Err(IpcError::UnexpectedHandleCount {
                expected: 1,
                received: extra + 1,
            }),
        }
    }

    fn report_failure(&self, request: &BrokerRequest, err: &dyn core::fmt::Display) {
        if !self.config.quiet_failures_for_tests {
            warn!("Unable to perform {} through broker: {}", request, err);
        }
    }
}

// A reply which contradicts itself (e.g. success without a file descriptor)
struct MalformedReply<'a>(&'a BrokerReply, bool);

impl core::fmt::Display for MalformedReply<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "malformed reply {:?} ({} file descriptor)",
            self.0,
            if self.1 { "with" } else { "without" }
        )
    }
}
