#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleError {
    InvalidHandleValue {
        raw_value: i64,
    },
    InternalOsOperationFailed {
        description: &'static str,
        raw_handle: i64,
        os_code: i32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpcError<'a> {
    // The other end was closed, or reset the connection
    PeerDisconnected,
    UnexpectedHandleCount {
        expected: usize,
        received: usize,
    },
    UnexpectedAncillaryData {
        clevel: i32,
        ctype: i32,
    },
    PayloadTooBigToTransmit {
        truncated_payload: &'a [u8],
    },
    PayloadTooBigToSerialize,
    InternalSerializationError {
        description: &'a str,
    },
    InternalDeserializationError {
        description: &'a str,
        payload: &'a [u8],
    },
    InternalOsOperationFailed {
        description: &'a str,
        os_code: i32,
    },
    InvalidHandleValueReceived {
        raw_value: i64,
    },
}

impl IpcError<'_> {
    // Drops any borrowed payload so the error can outlive the reception buffer
    pub fn into_owned(self) -> IpcError<'static> {
        match self {
            Self::PeerDisconnected => IpcError::PeerDisconnected,
            Self::UnexpectedHandleCount { expected, received } => {
                IpcError::UnexpectedHandleCount { expected, received }
            }
            Self::UnexpectedAncillaryData { clevel, ctype } => {
                IpcError::UnexpectedAncillaryData { clevel, ctype }
            }
            Self::PayloadTooBigToTransmit { .. } => IpcError::PayloadTooBigToTransmit {
                truncated_payload: &[],
            },
            Self::PayloadTooBigToSerialize => IpcError::PayloadTooBigToSerialize,
            Self::InternalSerializationError { .. } => IpcError::InternalSerializationError {
                description: "serialization failed",
            },
            Self::InternalDeserializationError { .. } => IpcError::InternalDeserializationError {
                description: "deserialization failed",
                payload: &[],
            },
            Self::InternalOsOperationFailed { os_code, .. } => IpcError::InternalOsOperationFailed {
                description: "IPC operation failed",
                os_code,
            },
            Self::InvalidHandleValueReceived { raw_value } => {
                IpcError::InvalidHandleValueReceived { raw_value }
            }
        }
    }
}

impl From<HandleError> for IpcError<'static> {
    fn from(e: HandleError) -> Self {
        match e {
            HandleError::InvalidHandleValue { raw_value } => {
                Self::InvalidHandleValueReceived { raw_value }
            }
            HandleError::InternalOsOperationFailed {
                description,
                os_code,
                ..
            } => Self::InternalOsOperationFailed {
                description,
                os_code,
            },
        }
    }
}

impl core::fmt::Display for IpcError<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::PeerDisconnected => write!(f, "peer closed its end of the channel"),
            Self::UnexpectedHandleCount { expected, received } => write!(
                f,
                "expected {} file descriptor(s) with message, received {}",
                expected, received
            ),
            Self::UnexpectedAncillaryData { clevel, ctype } => write!(
                f,
                "unexpected ancillary data with level {} and type {}",
                clevel, ctype
            ),
            Self::PayloadTooBigToTransmit { truncated_payload } => write!(
                f,
                "message truncated during reception ({} bytes kept)",
                truncated_payload.len()
            ),
            Self::PayloadTooBigToSerialize => write!(f, "message too long to be serialized"),
            Self::InternalSerializationError { description } => {
                write!(f, "serialization error: {}", description)
            }
            Self::InternalDeserializationError { description, payload } => write!(
                f,
                "deserialization error on {} bytes: {}",
                payload.len(),
                description
            ),
            Self::InternalOsOperationFailed { description, os_code } => {
                write!(f, "{} (errno {})", description, os_code)
            }
            Self::InvalidHandleValueReceived { raw_value } => {
                write!(f, "invalid file descriptor {} received", raw_value)
            }
        }
    }
}
