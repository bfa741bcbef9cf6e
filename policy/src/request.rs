use crate::policy::{Policy, PolicyVerdict};
use libc::{
    c_int, F_OK, O_ACCMODE, O_APPEND, O_ASYNC, O_CLOEXEC, O_CREAT, O_DIRECT, O_DIRECTORY, O_EXCL,
    O_LARGEFILE, O_NDELAY, O_NOATIME, O_NOCTTY, O_NOFOLLOW, O_NONBLOCK, O_RDONLY, O_RDWR, O_SYNC,
    O_TRUNC, O_WRONLY, R_OK, W_OK, X_OK,
};

// Flags a client may combine with its access mode when opening a file.
// O_CREAT is deliberately absent: brokered open() never takes a mode.
const SUPPORTED_FILE_OPEN_FLAGS: c_int = O_APPEND
    | O_ASYNC
    | O_CLOEXEC
    | O_DIRECT
    | O_DIRECTORY
    | O_EXCL
    | O_LARGEFILE
    | O_NOATIME
    | O_NOCTTY
    | O_NOFOLLOW
    | O_NONBLOCK
    | O_NDELAY
    | O_SYNC
    | O_TRUNC;

#[derive(Debug, PartialEq, Eq)]
pub enum PolicyRequest<'a> {
    FileOpen { path: &'a str, flags: c_int },
    FileAccess { path: &'a str, mode: c_int },
}

impl Policy {
    pub fn evaluate_request(&self, req: &PolicyRequest) -> PolicyVerdict<'_> {
        let res = match req {
            PolicyRequest::FileOpen { path, flags } => self.check_file_open(path, *flags),
            PolicyRequest::FileAccess { path, mode } => self.check_file_access(path, *mode),
        };
        self.log_verdict(req, &res);
        res
    }

    fn check_file_open(&self, path: &str, flags: c_int) -> PolicyVerdict<'_> {
        if (flags & O_CREAT) != 0 {
            return PolicyVerdict::UnsupportedFlags {
                flags: O_CREAT,
                why: "files cannot be created",
            };
        }
        let unsupported = flags & !(O_ACCMODE | SUPPORTED_FILE_OPEN_FLAGS);
        if unsupported != 0 {
            return PolicyVerdict::UnsupportedFlags {
                flags: unsupported,
                why: "open flag not supported",
            };
        }
        // O_CLOEXEC only affects the descriptor table it is opened in, it is
        // reinstated by the client when it receives the descriptor.
        let flags = flags & !O_CLOEXEC;
        let path = match flags & O_ACCMODE {
            O_RDONLY => self.readable_path(path),
            O_WRONLY => self.writable_path(path),
            O_RDWR => self.readable_path(path).and(self.writable_path(path)),
            _ => {
                return PolicyVerdict::UnsupportedFlags {
                    flags: flags & O_ACCMODE,
                    why: "invalid access mode",
                }
            }
        };
        match path {
            Some(path) => PolicyVerdict::Granted { path, flags },
            None => PolicyVerdict::DeniedByPolicy {
                why: match flags & O_ACCMODE {
                    O_RDONLY => "path is not readable",
                    O_WRONLY => "path is not writable",
                    _ => "path is not both readable and writable",
                },
            },
        }
    }

    fn check_file_access(&self, path: &str, mode: c_int) -> PolicyVerdict<'_> {
        if (mode & X_OK) != 0 {
            return PolicyVerdict::UnsupportedFlags {
                flags: X_OK,
                why: "execute permission is never granted",
            };
        }
        let path = match mode {
            F_OK => self.readable_path(path).or_else(|| self.writable_path(path)),
            R_OK => self.readable_path(path),
            W_OK => self.writable_path(path),
            m if m == (R_OK | W_OK) => self.readable_path(path).and(self.writable_path(path)),
            other => {
                return PolicyVerdict::UnsupportedFlags {
                    flags: other,
                    why: "access mode not supported",
                }
            }
        };
        match path {
            Some(path) => PolicyVerdict::Granted { path, flags: mode },
            None => PolicyVerdict::DeniedByPolicy {
                why: "path is not whitelisted for this mode",
            },
        }
    }
}

impl<'a> core::fmt::Display for PolicyRequest<'a> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> Result<(), core::fmt::Error> {
        match self {
            PolicyRequest::FileOpen { path, flags } => {
                write!(f, "opening file {path} with flags {flags:#o}")
            }
            PolicyRequest::FileAccess { path, mode } => {
                write!(f, "checking access to file {path} with mode {mode:#o}")
            }
        }
    }
}
