use crate::broker_config::BrokerConfig;
use crate::error::BrokerError;
use crate::ipc_loop::BrokerServer;
use fsbroker_ipc::{errno, IpcChannel, IpcError};
use fsbroker_ipc_messages::BrokerStartupStatus;
use libc::{c_int, pid_t};
use log::{debug, info, warn};
use std::net::Shutdown;
use std::panic::AssertUnwindSafe;

// Startup statuses are a single enum tag
const STARTUP_STATUS_BUFFER_SIZE: usize = 8;

pub(crate) enum BrokerState {
    Uninitialized,
    Initialized {
        pid: pid_t,
        control_channel: IpcChannel,
    },
}

/// Handle on a helper process which performs file system operations on
/// behalf of this process, within the limits of a policy.
///
/// Nothing is started until `init()` succeeds. Dropping the handle
/// terminates the broker process.
pub struct BrokerProcess {
    pub(crate) config: BrokerConfig,
    pub(crate) state: BrokerState,
}

impl BrokerProcess {
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            state: BrokerState::Uninitialized,
        }
    }

    /// Returns the process ID of the broker, once initialized
    pub fn pid(&self) -> Option<pid_t> {
        match &self.state {
            BrokerState::Uninitialized => None,
            BrokerState::Initialized { pid, .. } => Some(*pid),
        }
    }

    /// Forks the broker process, runs `setup_hook` in it (if any), and waits
    /// until it is ready to serve requests. If the hook returns false or the
    /// broker dies before being ready, it is reaped and an error is returned.
    pub fn init(&mut self, setup_hook: Option<&dyn Fn() -> bool>) -> Result<(), BrokerError> {
        if let BrokerState::Initialized { .. } = self.state {
            return Err(BrokerError::AlreadyInitialized);
        }
        let (client_control, broker_control) = IpcChannel::new()?;
        let (client_startup, broker_startup) = IpcChannel::new()?;

        let pid = unsafe { libc::fork() };
        if pid < 0 {
            return Err(BrokerError::InternalOsOperationFailed {
                description: "fork() failed".to_owned(),
                os_code: errno(),
            });
        }
        if pid == 0 {
            drop(client_control);
            drop(client_startup);
            let config = &self.config;
            // Unwinding past this point would run the parent's code in the child
            let code = std::panic::catch_unwind(AssertUnwindSafe(|| {
                broker_main(config, broker_control, broker_startup, setup_hook)
            }))
            .unwrap_or(1);
            unsafe { libc::_exit(code) }
        }

        drop(broker_control);
        drop(broker_startup);
        if let Err(e) = wait_for_startup(&client_control, &client_startup) {
            terminate_and_reap(pid, self.config.quiet_failures_for_tests);
            return Err(e);
        }
        info!("Broker process {} ready", pid);
        self.state = BrokerState::Initialized {
            pid,
            control_channel: client_control,
        };
        Ok(())
    }
}

fn wait_for_startup(control: &IpcChannel, startup: &IpcChannel) -> Result<(), BrokerError> {
    control.shutdown(Shutdown::Read)?;
    let mut buf = [0u8; STARTUP_STATUS_BUFFER_SIZE];
    match startup.recv::<BrokerStartupStatus>(&mut buf, true) {
        Ok(Some((BrokerStartupStatus::Ready, handles))) if handles.is_empty() => Ok(()),
        Ok(Some((BrokerStartupStatus::SetupHookFailed, _))) => Err(BrokerError::SetupHookFailed),
        Ok(Some((_, handles))) => Err(BrokerError::BrokerCommunicationError(
            IpcError::UnexpectedHandleCount {
                expected: 0,
                received: handles.len(),
            },
        )),
        Ok(None) | Err(IpcError::PeerDisconnected) => {
            Err(BrokerError::ProcessExitedDuringInitialization)
        }
        Err(e) => Err(e.into()),
    }
}

// Runs in the forked child. Only returns on failure.
fn broker_main(
    config: &BrokerConfig,
    control: IpcChannel,
    startup: IpcChannel,
    setup_hook: Option<&dyn Fn() -> bool>,
) -> c_int {
    if let Err(e) = control.shutdown(Shutdown::Write) {
        warn!("Unable to shut down broker side of control channel: {}", e);
        return 1;
    }
    // The hook may use anything inherited from the parent, cleanup comes after it
    let hook_succeeded = setup_hook.map(|hook| hook()).unwrap_or(true);
    let mut keep = vec![control.as_handle().as_raw(), startup.as_handle().as_raw()];
    keep.extend_from_slice(&config.inherited_fds);
    close_inherited_fds(&keep);
    let status = if hook_succeeded {
        BrokerStartupStatus::Ready
    } else {
        BrokerStartupStatus::SetupHookFailed
    };
    let mut buf = [0u8; STARTUP_STATUS_BUFFER_SIZE];
    if let Err(e) = startup.send(&status, None, &mut buf) {
        if !config.quiet_failures_for_tests {
            warn!("Unable to report broker startup status: {}", e);
        }
        return 1;
    }
    if !hook_succeeded {
        return 1;
    }
    drop(startup);
    BrokerServer::new(control, config.policy(), config.quiet_failures_for_tests).run_forever()
}

// Closes descriptors inherited from the parent (other brokers' channels,
// in-flight reply channels from other threads, ...) except stdio and `keep`.
fn close_inherited_fds(keep: &[c_int]) {
    let entries = match std::fs::read_dir("/proc/self/fd/") {
        // Collected first: the directory stream holds a descriptor of its own
        Ok(entries) => entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().to_str().and_then(|s| s.parse::<c_int>().ok()))
            .collect::<Vec<c_int>>(),
        Err(e) => {
            warn!("Unable to list inherited file descriptors: {}", e);
            return;
        }
    };
    for fd in entries {
        if fd > libc::STDERR_FILENO && !keep.contains(&fd) {
            debug!("Closing inherited file descriptor {}", fd);
            // The enumeration's own descriptor is already closed, which fails harmlessly
            unsafe {
                libc::close(fd);
            }
        }
    }
}

fn terminate_and_reap(pid: pid_t, quiet: bool) {
    if unsafe { libc::kill(pid, libc::SIGKILL) } < 0 && !quiet {
        warn!("kill({}) failed with errno {}", pid, errno());
    }
    let mut wstatus: c_int = 0;
    loop {
        let res = unsafe { libc::waitpid(pid, &mut wstatus as *mut _, 0) };
        if res >= 0 {
            debug!("Broker process {} reaped with status {:#x}", pid, wstatus);
            break;
        }
        let err = errno();
        if err != libc::EINTR {
            if !quiet {
                warn!("waitpid({}) failed with errno {}", pid, err);
            }
            break;
        }
    }
}

impl Drop for BrokerProcess {
    fn drop(&mut self) {
        if let BrokerState::Initialized {
            pid,
            control_channel,
        } = std::mem::replace(&mut self.state, BrokerState::Uninitialized)
        {
            // The broker exits on its own once the control channel is closed,
            // SIGKILL is only there in case it is stuck
            drop(control_channel);
            terminate_and_reap(pid, self.config.quiet_failures_for_tests);
            info!("Broker process {} terminated", pid);
        }
    }
}
