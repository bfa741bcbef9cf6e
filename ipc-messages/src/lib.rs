use serde::{Deserialize, Serialize};

// Sent by clients on the control channel, always with exactly one file
// descriptor attached: the end of a fresh channel on which the broker must
// write its reply.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
pub enum BrokerRequest<'a> {
    // open(path, flags) without a mode: files are never created
    Open { path: &'a str, flags: libc::c_int },
    // access(path, mode)
    Access { path: &'a str, mode: libc::c_int },
}

// Sent by the broker on the reply channel. A successful Open carries the new
// file descriptor as ancillary data, the result itself is then 0.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
pub enum BrokerReply {
    // Non-negative on success, -errno otherwise
    SyscallResult(libc::c_int),
}

// Sent once by a freshly forked broker, before it starts serving requests
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
pub enum BrokerStartupStatus {
    Ready,
    SetupHookFailed,
}

impl core::fmt::Display for BrokerRequest<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            BrokerRequest::Open { path, flags } => write!(f, "open({:?}, {:#o})", path, flags),
            BrokerRequest::Access { path, mode } => write!(f, "access({:?}, {:#o})", path, mode),
        }
    }
}
