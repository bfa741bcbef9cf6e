use libc::c_int;

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum PolicyError {
    UnsupportedFilesystemPath {
        path: String,
        why: &'static str,
    },
    InvalidDeniedErrno {
        errno: c_int,
    },
}

impl core::fmt::Display for PolicyError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::UnsupportedFilesystemPath { path, why } => {
                write!(f, "path {:?} cannot be whitelisted: {}", path, why)
            }
            Self::InvalidDeniedErrno { errno } => {
                write!(f, "{} is not a valid errno to report denials with", errno)
            }
        }
    }
}

impl std::error::Error for PolicyError {}
