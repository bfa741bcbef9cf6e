use crate::error::HandleError;
use crate::errno;
use libc::{c_int, fcntl, FD_CLOEXEC, F_GETFD};
use log::error;
use std::os::unix::io::{AsRawFd, FromRawFd, IntoRawFd, RawFd};

/// Owned file descriptor, closed when dropped.
#[derive(Debug, Eq, PartialEq, Hash)]
pub struct Handle {
    val: Option<c_int>,
}

impl Handle {
    /// Takes ownership of `fd`.
    ///
    /// # Safety
    ///
    /// `fd` must be an open file descriptor owned by nobody else in this
    /// process, otherwise it will be closed twice.
    pub unsafe fn from_raw(fd: c_int) -> Result<Self, HandleError> {
        if fd < 0 {
            return Err(HandleError::InvalidHandleValue {
                raw_value: fd.into(),
            });
        }
        Ok(Handle { val: Some(fd) })
    }

    pub fn as_raw(&self) -> c_int {
        // Only into_raw() empties the option, and it consumes self
        self.val.unwrap_or(-1)
    }

    /// Releases ownership: the caller becomes responsible for closing it.
    pub fn into_raw(mut self) -> c_int {
        self.val.take().unwrap_or(-1)
    }

    /// Returns whether the descriptor survives execve() (i.e. FD_CLOEXEC is unset)
    pub fn is_inheritable(&self) -> Result<bool, HandleError> {
        let current_flags = unsafe { fcntl(self.as_raw(), F_GETFD) };
        if current_flags < 0 {
            return Err(HandleError::InternalOsOperationFailed {
                description: "fcntl(F_GETFD) failed",
                raw_handle: self.as_raw().into(),
                os_code: errno(),
            });
        }
        Ok((current_flags & FD_CLOEXEC) == 0)
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        if let Some(fd) = self.val {
            let res = unsafe { libc::close(fd) };
            if res < 0 {
                let msg = format!("close(fd={}) failed with error {}", fd, errno());
                if cfg!(debug_assertions) {
                    panic!("{}", msg);
                } else {
                    error!("{}", msg);
                }
            }
        }
    }
}

impl AsRawFd for Handle {
    fn as_raw_fd(&self) -> RawFd {
        self.as_raw()
    }
}

impl FromRawFd for Handle {
    unsafe fn from_raw_fd(fd: RawFd) -> Self {
        Handle { val: Some(fd) }
    }
}

impl IntoRawFd for Handle {
    fn into_raw_fd(self) -> RawFd {
        self.into_raw()
    }
}

pub fn downcast_to_handle<T: IntoRawFd>(resource: T) -> Handle {
    unsafe { Handle::from_raw_fd(resource.into_raw_fd()) }
}
