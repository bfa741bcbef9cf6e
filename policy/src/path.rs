use crate::PolicyError;
use std::ffi::CString;

// Whitelisted paths are compared verbatim with what clients send, and used
// verbatim by the broker. They must be absolute so that the broker's own
// working directory never matters, and must be representable as C strings.
pub(crate) fn whitelistable_path(path: &str) -> Result<CString, PolicyError> {
    if !path.starts_with('/') {
        return Err(PolicyError::UnsupportedFilesystemPath {
            path: path.to_owned(),
            why: "path is not absolute",
        });
    }
    CString::new(path).map_err(|_| PolicyError::UnsupportedFilesystemPath {
        path: path.to_owned(),
        why: "path contains a NUL byte",
    })
}
