use crate::brokered_syscalls::{proxied_access_file, proxied_open_file};
use fsbroker_ipc::{Handle, IpcChannel, IpcError, IPC_MESSAGE_MAX_SIZE};
use fsbroker_ipc_messages::BrokerRequest;
use fsbroker_policy::Policy;
use log::{debug, warn};

// Replies are a single small integer, far from the shared ceiling
const REPLY_BUFFER_SIZE: usize = 32;

// recvmsg() failures after which the control channel is still usable
fn is_transient_recv_error(os_code: i32) -> bool {
    matches!(os_code, libc::ENOBUFS | libc::ENOMEM | libc::EAGAIN)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServeError {
    // The client closed its end of the control channel (or died)
    ControlChannelClosed,
    ControlChannelFailed { os_code: i32 },
}

/// Serves requests received on the control channel of a broker process.
///
/// Requests which cannot be decoded or don't come with exactly one reply
/// channel are dropped, and serving continues. Only the loss of the control
/// channel itself stops the loop.
pub struct BrokerServer<'p> {
    channel: IpcChannel,
    policy: &'p Policy,
    quiet_failures: bool,
}

impl<'p> BrokerServer<'p> {
    pub fn new(channel: IpcChannel, policy: &'p Policy, quiet_failures: bool) -> Self {
        Self {
            channel,
            policy,
            quiet_failures,
        }
    }

    /// Serves requests until the control channel is closed, then terminates
    /// the current process without running any destructor or atexit handler
    /// it may have inherited.
    pub fn run_forever(self) -> ! {
        loop {
            if let Err(e) = self.serve_one() {
                debug!("Broker exiting: {:?}", e);
                unsafe { libc::_exit(0) }
            }
        }
    }

    /// Blocks until one request is received, and handles it
    pub fn serve_one(&self) -> Result<(), ServeError> {
        let mut buf = [0u8; IPC_MESSAGE_MAX_SIZE];
        let (request, handles) = match self.channel.recv::<BrokerRequest>(&mut buf, true) {
            Ok(Some(m)) => m,
            Ok(None) => {
                return match self.channel.peer_closed() {
                    Ok(false) => {
                        warn!("Dropping empty request");
                        Ok(())
                    }
                    Ok(true) => Err(ServeError::ControlChannelClosed),
                    Err(IpcError::InternalOsOperationFailed { os_code, .. }) => {
                        Err(ServeError::ControlChannelFailed { os_code })
                    }
                    Err(_) => Err(ServeError::ControlChannelClosed),
                }
            }
            Err(IpcError::PeerDisconnected) => return Err(ServeError::ControlChannelClosed),
            Err(IpcError::InternalOsOperationFailed { os_code, .. })
                if is_transient_recv_error(os_code) =>
            {
                warn!("Transient failure receiving request (errno {})", os_code);
                return Ok(());
            }
            Err(IpcError::InternalOsOperationFailed { os_code, .. }) => {
                return Err(ServeError::ControlChannelFailed { os_code })
            }
            Err(e) => {
                warn!("Dropping malformed request: {}", e);
                return Ok(());
            }
        };
        let reply_channel = match <[Handle; 1]>::try_from(handles) {
            Ok([handle]) => IpcChannel::from_handle(handle),
            Err(handles) => {
                warn!(
                    "Dropping malformed request: {}",
                    IpcError::UnexpectedHandleCount {
                        expected: 1,
                        received: handles.len(),
                    }
                );
                return Ok(());
            }
        };
        debug!("Received request: {}", &request);
        let (reply, handle) = match request {
            BrokerRequest::Open { path, flags } => proxied_open_file(self.policy, path, flags),
            BrokerRequest::Access { path, mode } => proxied_access_file(self.policy, path, mode),
        };
        debug!("Sending reply: {:?} (handle={:?})", &reply, &handle);
        let mut reply_buf = [0u8; REPLY_BUFFER_SIZE];
        if let Err(e) = reply_channel.send(&reply, handle.as_ref(), &mut reply_buf) {
            if !self.quiet_failures {
                warn!("Unable to send reply to client: {}", e);
            }
        }
        // Our copy of the opened file and the reply channel are closed here
        Ok(())
    }
}
