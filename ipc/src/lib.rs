mod channel;
mod error;
mod handle;

pub use channel::{deserialize, serialize, IpcChannel, IPC_MAX_HANDLES_PER_MESSAGE};
pub use error::{HandleError, IpcError};
pub use handle::{downcast_to_handle, Handle};

// Ceiling on the encoded size of any message exchanged with a broker, in
// either direction. Enforced when serializing, and by the size of
// reception buffers (larger messages are reported as truncated).
pub const IPC_MESSAGE_MAX_SIZE: usize = 4096;

pub fn errno() -> libc::c_int {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}
