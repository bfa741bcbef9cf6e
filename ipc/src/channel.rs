use crate::error::IpcError;
use crate::handle::Handle;
use crate::errno;
use core::ptr::{addr_of, addr_of_mut, null_mut};
use libc::{c_int, c_void};
use serde::{Deserialize, Serialize};
use std::net::Shutdown;

/// Maximum number of file descriptors accepted in a single message. Senders
/// only ever attach one, the extra room lets us tell "too many" apart from a
/// truncated control buffer and close all of them.
pub const IPC_MAX_HANDLES_PER_MESSAGE: usize = 4;

// These calls are just C arithmetic macros translated into rust, in practice they're safe (at least in this libc release)
const CMSG_SEND_SIZE: usize = unsafe { libc::CMSG_SPACE(core::mem::size_of::<c_int>() as u32) } as usize;
const CMSG_RECV_SIZE: usize = unsafe {
    libc::CMSG_SPACE((core::mem::size_of::<c_int>() * IPC_MAX_HANDLES_PER_MESSAGE) as u32)
} as usize;

/// One end of a connected `AF_UNIX`/`SOCK_SEQPACKET` socket pair. Message
/// boundaries are preserved: each send() is received by exactly one recv().
#[derive(Debug)]
pub struct IpcChannel {
    fd: Handle,
}

impl IpcChannel {
    pub fn new() -> Result<(Self, Self), IpcError<'static>> {
        // Safety: we must not return in the middle of this block. The file
        // descriptors are owned by this block and this block only.
        // If socketpair() fails, no file descriptors are returned, so no
        // resource is leaked.
        let (fd0, fd1) = unsafe {
            let mut socks: [c_int; 2] = [-1, -1];
            let res = libc::socketpair(
                libc::AF_UNIX,
                libc::SOCK_SEQPACKET | libc::SOCK_CLOEXEC,
                0,
                socks.as_mut_ptr(),
            );
            if res < 0 {
                return Err(IpcError::InternalOsOperationFailed {
                    os_code: errno(),
                    description: "socketpair() failed",
                });
            }
            (Handle::from_raw(socks[0])?, Handle::from_raw(socks[1])?)
        };
        Ok((Self { fd: fd0 }, Self { fd: fd1 }))
    }

    pub fn into_handle(self) -> Handle {
        self.fd
    }

    pub fn from_handle(handle: Handle) -> Self {
        Self { fd: handle }
    }

    pub fn as_handle(&self) -> &Handle {
        &self.fd
    }

    /// Returns whether nothing more can ever be received on this channel,
    /// because the peer is gone or reception was shut down. `recv_raw()`
    /// reports an empty message the same way as the end of the channel,
    /// this tells the two apart.
    pub fn peer_closed(&self) -> Result<bool, IpcError<'static>> {
        let mut pfd = libc::pollfd {
            fd: self.fd.as_raw(),
            events: libc::POLLRDHUP,
            revents: 0,
        };
        let res = loop {
            let res = unsafe { libc::poll(&mut pfd as *mut libc::pollfd, 1, 0) };
            if res >= 0 || errno() != libc::EINTR {
                break res;
            }
        };
        if res < 0 {
            return Err(IpcError::InternalOsOperationFailed {
                os_code: errno(),
                description: "poll() failed",
            });
        }
        Ok((pfd.revents & (libc::POLLRDHUP | libc::POLLHUP)) != 0)
    }

    /// Permanently disables one or both directions of the channel for both
    /// ends (and all processes sharing this socket).
    pub fn shutdown(&self, how: Shutdown) -> Result<(), IpcError<'static>> {
        let how = match how {
            Shutdown::Read => libc::SHUT_RD,
            Shutdown::Write => libc::SHUT_WR,
            Shutdown::Both => libc::SHUT_RDWR,
        };
        let res = unsafe { libc::shutdown(self.fd.as_raw(), how) };
        if res < 0 {
            return Err(IpcError::InternalOsOperationFailed {
                os_code: errno(),
                description: "shutdown() failed",
            });
        }
        Ok(())
    }

    /// Sends `payload` as a single message, with `handle` attached as
    /// ancillary data if provided. The handle is duplicated into the peer,
    /// our copy stays open.
    pub fn send_raw(&self, payload: &[u8], handle: Option<&Handle>) -> Result<(), IpcError<'static>> {
        let msg_iovec = libc::iovec {
            // mut is not used here, just required because iovec is used by recvmsg too
            iov_base: payload.as_ptr() as *mut c_void,
            iov_len: payload.len(),
        };
        let mut cbuf = [0u8; CMSG_SEND_SIZE];
        // Zero-initialized so that libc-specific padding fields are valid
        let mut msg: libc::msghdr = unsafe { core::mem::zeroed() };
        msg.msg_name = null_mut(); // socket is already connected, no need for this
        msg.msg_namelen = 0;
        // mut is not actually used here either, just because iovec is used by recvmsg too
        msg.msg_iov = &msg_iovec as *const libc::iovec as *mut libc::iovec;
        msg.msg_iovlen = 1;
        if handle.is_some() {
            msg.msg_control = cbuf.as_mut_ptr() as *mut c_void;
            msg.msg_controllen = CMSG_SEND_SIZE as _;
        }
        // Safety: pointers in the iovec{} must point to valid buffers of the indicated length
        // up until the sendmsg() call, pointers into the control buffer must not be directly
        // dereferenced (they might not be aligned).
        let res = unsafe {
            if let Some(handle) = handle {
                let fd = handle.as_raw();
                let cmsghdr = libc::CMSG_FIRSTHDR(&msg as *const libc::msghdr);
                addr_of_mut!((*cmsghdr).cmsg_level).write_unaligned(libc::SOL_SOCKET);
                addr_of_mut!((*cmsghdr).cmsg_type).write_unaligned(libc::SCM_RIGHTS);
                addr_of_mut!((*cmsghdr).cmsg_len)
                    .write_unaligned(libc::CMSG_LEN(core::mem::size_of::<c_int>() as u32) as _);
                core::ptr::write_unaligned(libc::CMSG_DATA(cmsghdr) as *mut c_int, fd);
            }
            libc::sendmsg(
                self.fd.as_raw(),
                &msg as *const libc::msghdr,
                libc::MSG_NOSIGNAL,
            )
        };
        if res < 0 {
            return Err(match errno() {
                libc::EPIPE | libc::ECONNRESET => IpcError::PeerDisconnected,
                os_code => IpcError::InternalOsOperationFailed {
                    os_code,
                    description: "sendmsg() failed",
                },
            });
        }
        Ok(())
    }

    /// Receives one message into `buffer`, with any file descriptor attached.
    /// Returns Ok(None) once the peer has closed its end. Received descriptors
    /// are created with O_CLOEXEC if `cloexec` is set.
    pub fn recv_raw<'a>(
        &self,
        buffer: &'a mut [u8],
        cloexec: bool,
    ) -> Result<Option<(&'a [u8], Vec<Handle>)>, IpcError<'a>> {
        let msg_iovec = libc::iovec {
            iov_base: buffer.as_mut_ptr() as *mut c_void,
            iov_len: buffer.len(),
        };
        let mut cbuf = [0u8; CMSG_RECV_SIZE];
        let mut msg: libc::msghdr = unsafe { core::mem::zeroed() };
        msg.msg_name = null_mut(); // socket is already connected, no need for this
        msg.msg_namelen = 0;
        msg.msg_iov = &msg_iovec as *const libc::iovec as *mut libc::iovec; // mut is not used here
        msg.msg_iovlen = 1;
        msg.msg_control = cbuf.as_mut_ptr() as *mut c_void;
        msg.msg_controllen = CMSG_RECV_SIZE as _;
        let flags = libc::MSG_NOSIGNAL | if cloexec { libc::MSG_CMSG_CLOEXEC } else { 0 };
        // Safety: pointers in the iovec{} must point to valid buffers of the indicated length
        // up until the recvmsg() call. There must be no early return that leaks a file descriptor
        // received. Any received cmsg header and payload pointers must not be dereferenced directly:
        // they may not be aligned within the reception buffer.
        let (read_bytes, handles) = unsafe {
            let res = loop {
                let res = libc::recvmsg(self.fd.as_raw(), &mut msg as *mut libc::msghdr, flags);
                if res >= 0 || errno() != libc::EINTR {
                    break res;
                }
            };
            if res < 0 {
                // if recvmsg() failed altogether, we can return without leaking a fd
                return Err(match errno() {
                    libc::ECONNRESET => IpcError::PeerDisconnected,
                    os_code => IpcError::InternalOsOperationFailed {
                        os_code,
                        description: "recvmsg() failed",
                    },
                });
            }
            // Take ownership of every descriptor first, so that any error reported
            // afterwards closes them all when `handles` goes out of scope.
            let mut handles = Vec::new();
            let mut unexpected_cmsg = None;
            let mut cmsghdr = libc::CMSG_FIRSTHDR(&msg as *const libc::msghdr);
            while !cmsghdr.is_null() {
                let clevel = addr_of!((*cmsghdr).cmsg_level).read_unaligned();
                let ctype = addr_of!((*cmsghdr).cmsg_type).read_unaligned();
                let clen = addr_of!((*cmsghdr).cmsg_len).read_unaligned();
                if (clevel, ctype) != (libc::SOL_SOCKET, libc::SCM_RIGHTS) {
                    // The libc handed us something unexpected other than a file descriptor,
                    // quit with an error in case it could cause a resource leak.
                    unexpected_cmsg = Some((clevel, ctype));
                } else {
                    let data_len = (clen as usize)
                        .saturating_sub(libc::CMSG_LEN(0) as usize);
                    let data = libc::CMSG_DATA(cmsghdr) as *const c_int;
                    for i in 0..(data_len / core::mem::size_of::<c_int>()) {
                        let fd = core::ptr::read_unaligned(data.add(i));
                        if let Ok(h) = Handle::from_raw(fd) {
                            handles.push(h);
                        }
                    }
                }
                cmsghdr = libc::CMSG_NXTHDR(&msg as *const libc::msghdr, cmsghdr);
            }
            if let Some((clevel, ctype)) = unexpected_cmsg {
                return Err(IpcError::UnexpectedAncillaryData { clevel, ctype });
            }
            (res as usize, handles)
        };
        // All error conditions below will implictly close any handle received,
        // no leak at this point once outside the unsafe{} block.
        if msg.msg_flags & (libc::MSG_CTRUNC | libc::MSG_TRUNC) != 0 {
            return Err(IpcError::PayloadTooBigToTransmit {
                truncated_payload: &buffer[0..read_bytes],
            });
        } else if read_bytes == 0 && handles.is_empty() {
            return Ok(None);
        }
        Ok(Some((&buffer[0..read_bytes], handles)))
    }

    pub fn send<T: Serialize>(
        &self,
        msg: &T,
        handle: Option<&Handle>,
        buffer: &mut [u8],
    ) -> Result<(), IpcError<'static>> {
        let slice = serialize(msg, buffer)?;
        self.send_raw(slice, handle)
    }

    pub fn recv<'de, T: Deserialize<'de>>(
        &self,
        buffer: &'de mut [u8],
        cloexec: bool,
    ) -> Result<Option<(T, Vec<Handle>)>, IpcError<'de>> {
        match self.recv_raw(buffer, cloexec)? {
            None => Ok(None),
            Some((bytes, handles)) => {
                let msg = deserialize(bytes)?;
                Ok(Some((msg, handles)))
            }
        }
    }
}

pub fn serialize<'a, T: Serialize>(msg: &T, buffer: &'a mut [u8]) -> Result<&'a mut [u8], IpcError<'static>> {
    postcard::to_slice(msg, buffer).map_err(|e| match e {
        postcard::Error::SerializeBufferFull => IpcError::PayloadTooBigToSerialize,
        other => IpcError::InternalSerializationError {
            description: match other {
                postcard::Error::WontImplement => "tried to use a feature postcard won't support",
                postcard::Error::NotYetImplemented => "tried to use a feature not supported by postcard",
                postcard::Error::SerializeSeqLengthUnknown => "postcard requires sequence length to be known",
                postcard::Error::SerdeSerCustom => "postcard serde serialization error",
                postcard::Error::CollectStrError => "postcard collect_str error",
                _ => "unknown",
            },
        },
    })
}

/// Decodes exactly one message: trailing bytes are treated as corruption.
pub fn deserialize<'de, T: Deserialize<'de>>(buffer: &'de [u8]) -> Result<T, IpcError<'de>> {
    let (msg, rest) = postcard::take_from_bytes(buffer).map_err(|e| IpcError::InternalDeserializationError {
        payload: buffer,
        description: match e {
            postcard::Error::WontImplement => "tried to use a feature postcard won't support",
            postcard::Error::NotYetImplemented => "tried to use a feature not supported by postcard",
            postcard::Error::DeserializeUnexpectedEnd => "postcard expected more data",
            postcard::Error::DeserializeBadVarint => "postcard found a varint that did not terminate",
            postcard::Error::DeserializeBadBool => "postcard found a bool that was neither 0 nor 1",
            postcard::Error::DeserializeBadChar | postcard::Error::DeserializeBadUtf8 => "postcard found an invalid unicode char",
            postcard::Error::DeserializeBadOption => "postcard found an option discriminant that was neither 0 nor 1",
            postcard::Error::DeserializeBadEnum => "postcard found an enum discriminant that was >u32max",
            postcard::Error::DeserializeBadEncoding => "postcard reports invalid encoding",
            postcard::Error::SerdeDeCustom => "postcard serde deserialization error",
            _ => "unknown",
        },
    })?;
    if !rest.is_empty() {
        return Err(IpcError::InternalDeserializationError {
            payload: buffer,
            description: "trailing bytes after message",
        });
    }
    Ok(msg)
}
