//! Our error types for the Cytec switch matrix.

use thiserror::Error;

use crate::matrix::ConnectionMatrix;

pub type Result<T, I> = core::result::Result<T, Error<I>>;

/// Which part of the session was talking to the instrument when something went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum Phase {
    #[strum(serialize = "handshake")]
    Handshake,
    #[strum(serialize = "configuration")]
    Configure,
    #[strum(serialize = "silencing")]
    Silence,
    #[strum(serialize = "status query")]
    Query,
    #[strum(serialize = "switching")]
    Switch,
}

/// Errors from the pure parts of the crate: matrix maths, status decoding and frame packing.
///
/// These never involve the transport, so they carry no serial error type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Relay ({module}, {output}) is outside a {modules}x{outputs} matrix")]
    IndexOutOfRange {
        module: usize,
        output: usize,
        modules: usize,
        outputs: usize,
    },
    #[error("Matrix dimensions differ: {left:?} vs {right:?}")]
    DimensionMismatch {
        left: (usize, usize),
        right: (usize, usize),
    },
    #[error("Module {module} has {found} outputs, expected {expected}")]
    RaggedMatrix {
        module: usize,
        expected: usize,
        found: usize,
    },
    #[error("Relay ({module}, {output}) has no known target state")]
    UnknownTargetCell { module: usize, output: usize },
    #[error("Malformed status response: {0}")]
    MalformedStatusResponse(String),
    #[error("Truncated status response: expected {expected} bytes, got {actual}")]
    TruncatedStatusResponse { expected: usize, actual: usize },
    #[error("Command {command:?} does not fit in a {max_len} byte frame")]
    CommandTooLong { command: String, max_len: usize },
}

/// Why the handshake or system configuration was rejected.
#[derive(Error, Debug)]
pub enum InitFailure<I: embedded_io::Error> {
    #[error("unexpected reply {0:?}")]
    UnexpectedReply(String),
    #[error("serial error {0:?}")]
    Serial(I),
    #[error("reply did not fit in the line buffer")]
    BufferOverflow,
}

/// Custom error type for Cytec switch matrix communications.
#[derive(Error, Debug)]
pub enum Error<I: embedded_io::Error> {
    #[error("Serial communication error during {phase} ({command:?}): {cause:?}")]
    Serial {
        phase: Phase,
        command: String,
        cause: I,
    },
    #[error("Initialization failed during {phase} ({command:?}): {reason}")]
    InitializationFailed {
        phase: Phase,
        command: String,
        reason: InitFailure<I>,
    },
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("Switch verification failed\nexpected:\n{expected}\nobserved:\n{observed}")]
    SwitchVerificationFailed {
        expected: ConnectionMatrix,
        observed: ConnectionMatrix,
    },
    #[error("Timed out waiting for relays to settle")]
    SwitchTimedOut,
    #[error("Communication timeout")]
    Timeout,
    #[error("Blocking instrument task was cancelled")]
    Cancelled,
    #[error("Reply did not fit in the line buffer")]
    BufferOverflow,
}
