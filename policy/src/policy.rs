use crate::error::PolicyError;
use crate::path::whitelistable_path;
use crate::PolicyRequest;
use libc::c_int;
use log::{debug, warn};
use std::collections::{BTreeSet, HashMap};
use std::ffi::{CStr, CString};

#[derive(Debug, PartialEq, Eq)]
pub enum PolicyVerdict<'p> {
    // `path` is owned by the policy: this is what must be handed to the
    // kernel, never the string received from the client.
    Granted { path: &'p CStr, flags: c_int },
    DeniedByPolicy { why: &'static str },
    UnsupportedFlags { flags: c_int, why: &'static str },
}

impl PolicyVerdict<'_> {
    pub fn is_granted(&self) -> bool {
        matches!(self, PolicyVerdict::Granted { .. })
    }
}

/// Exact-match whitelists of paths a broker may open or check on behalf of
/// its client, and the errno it reports when it refuses to.
///
/// Paths are never canonicalized: a client must request a path in exactly
/// the form it was added here (no trailing slash, no `..`, no symlink
/// resolution).
#[derive(Clone, PartialEq, Eq)]
pub struct Policy {
    denied_errno: c_int,
    read_whitelist: HashMap<String, CString>,
    write_whitelist: HashMap<String, CString>,
}

impl Policy {
    // Reports denials with EPERM until told otherwise
    pub fn nothing_allowed() -> Self {
        Self {
            denied_errno: libc::EPERM,
            read_whitelist: HashMap::new(),
            write_whitelist: HashMap::new(),
        }
    }

    pub fn from_whitelists(
        denied_errno: c_int,
        read_whitelist: &[&str],
        write_whitelist: &[&str],
    ) -> Result<Self, PolicyError> {
        let mut policy = Self::nothing_allowed().with_denied_errno(denied_errno)?;
        for path in read_whitelist {
            policy.allow_file_read(path)?;
        }
        for path in write_whitelist {
            policy.allow_file_write(path)?;
        }
        Ok(policy)
    }

    pub fn with_denied_errno(mut self, denied_errno: c_int) -> Result<Self, PolicyError> {
        if denied_errno <= 0 {
            return Err(PolicyError::InvalidDeniedErrno {
                errno: denied_errno,
            });
        }
        self.denied_errno = denied_errno;
        Ok(self)
    }

    pub fn allow_file_read(&mut self, path: &str) -> Result<(), PolicyError> {
        let c_path = whitelistable_path(path)?;
        self.read_whitelist.insert(path.to_owned(), c_path);
        Ok(())
    }

    pub fn allow_file_write(&mut self, path: &str) -> Result<(), PolicyError> {
        let c_path = whitelistable_path(path)?;
        self.write_whitelist.insert(path.to_owned(), c_path);
        Ok(())
    }

    /// Positive errno value; requests denied by this policy fail with its negation
    pub fn denied_errno(&self) -> c_int {
        self.denied_errno
    }

    pub(crate) fn readable_path(&self, path: &str) -> Option<&CStr> {
        self.read_whitelist.get(path).map(CString::as_c_str)
    }

    pub(crate) fn writable_path(&self, path: &str) -> Option<&CStr> {
        self.write_whitelist.get(path).map(CString::as_c_str)
    }

    pub(crate) fn log_verdict(&self, request: &PolicyRequest, verdict: &PolicyVerdict) {
        match verdict {
            PolicyVerdict::Granted { .. } => {
                debug!("Client granted {}", request);
            }
            PolicyVerdict::DeniedByPolicy { why } => {
                warn!("Client tried {} but it is not allowed by its policy: {}", request, why);
            }
            PolicyVerdict::UnsupportedFlags { flags, why } => {
                warn!("Client tried {} but flags {:#o} are not supported: {}", request, flags, why);
            }
        }
    }
}

impl core::fmt::Debug for Policy {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let paths: BTreeSet<&String> = self
            .read_whitelist
            .keys()
            .chain(self.write_whitelist.keys())
            .collect();
        writeln!(f, "Policy (denied with errno {}) {{", self.denied_errno)?;
        for path in paths {
            writeln!(
                f,
                "    {}{}{}",
                path,
                if self.read_whitelist.contains_key(path) { " read" } else { "" },
                if self.write_whitelist.contains_key(path) { " write" } else { "" },
            )?;
        }
        write!(f, "}}")
    }
}
