use fsbroker_ipc::{HandleError, IpcError};
use fsbroker_policy::PolicyError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    AlreadyInitialized,
    InvalidPolicy(PolicyError),
    BrokerCommunicationError(IpcError<'static>),
    InternalOsOperationFailed { description: String, os_code: i32 },
    SetupHookFailed,
    ProcessExitedDuringInitialization,
}

impl From<HandleError> for BrokerError {
    fn from(err: HandleError) -> Self {
        match err {
            HandleError::InvalidHandleValue { .. } => Self::InternalOsOperationFailed {
                description: "invalid handle value used".to_owned(),
                os_code: 0,
            },
            HandleError::InternalOsOperationFailed {
                description,
                os_code,
                ..
            } => Self::InternalOsOperationFailed {
                description: description.to_owned(),
                os_code,
            },
        }
    }
}

impl From<IpcError<'_>> for BrokerError {
    fn from(err: IpcError<'_>) -> Self {
        Self::BrokerCommunicationError(err.into_owned())
    }
}

impl From<PolicyError> for BrokerError {
    fn from(err: PolicyError) -> Self {
        Self::InvalidPolicy(err)
    }
}

impl core::fmt::Display for BrokerError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::AlreadyInitialized => write!(f, "broker process already started"),
            Self::InvalidPolicy(e) => write!(f, "invalid broker policy: {}", e),
            Self::BrokerCommunicationError(e) => write!(f, "unable to communicate with broker: {}", e),
            Self::InternalOsOperationFailed { description, os_code } => {
                write!(f, "{} (errno {})", description, os_code)
            }
            Self::SetupHookFailed => write!(f, "broker setup hook failed"),
            Self::ProcessExitedDuringInitialization => {
                write!(f, "broker process exited during initialization")
            }
        }
    }
}

impl std::error::Error for BrokerError {}
