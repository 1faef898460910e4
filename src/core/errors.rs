/*!
 * Error Types
 * Closed error taxonomy for signal contexts with thiserror and miette support
 */

use miette::Diagnostic;
use nix::errno::Errno;
use thiserror::Error;

/// Signal context operation result
pub type SignalFdResult<T> = Result<T, SignalFdError>;

/// Signal context errors
///
/// Raw OS codes are normalized into these kinds at the syscall boundary;
/// the read and reconciliation paths only ever match on the kind.
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum SignalFdError {
    #[error("Operation would block: no interest signal is pending")]
    #[diagnostic(
        code(signalfd::would_block),
        help("Wait for the context's readiness event before reading again.")
    )]
    WouldBlock,

    #[error("Resource exhausted: {0}")]
    #[diagnostic(
        code(signalfd::resource_exhausted),
        help("The process is out of descriptors, memory or queue slots. Release unused contexts.")
    )]
    ResourceExhausted(Errno),

    #[error("Invalid argument")]
    #[diagnostic(
        code(signalfd::invalid_argument),
        help("The signal set or event registration was rejected by the kernel.")
    )]
    InvalidArgument,

    #[error("Context lock still held during teardown")]
    #[diagnostic(
        code(signalfd::busy),
        help("A read or poll guard outlived the context. Terminate only after all callers finish.")
    )]
    Busy,

    #[error("Unknown signal: {0}")]
    #[diagnostic(
        code(signalfd::unknown_signal),
        help("Use a signal name such as SIGUSR1 or USR1.")
    )]
    UnknownSignal(String),

    #[error("OS error: {0}")]
    #[diagnostic(code(signalfd::os_error))]
    Os(Errno),
}

impl SignalFdError {
    /// Check if this is the expected "nothing pending" outcome
    #[inline]
    pub fn is_would_block(&self) -> bool {
        matches!(self, SignalFdError::WouldBlock)
    }

    /// Underlying OS error code, if the error came from a syscall
    pub fn os_code(&self) -> Option<i32> {
        match self {
            SignalFdError::WouldBlock => Some(Errno::EAGAIN as i32),
            SignalFdError::ResourceExhausted(errno) | SignalFdError::Os(errno) => {
                Some(*errno as i32)
            }
            SignalFdError::InvalidArgument => Some(Errno::EINVAL as i32),
            SignalFdError::Busy => Some(Errno::EBUSY as i32),
            SignalFdError::UnknownSignal(_) => None,
        }
    }

    /// Capture the calling thread's errno
    #[inline]
    pub(crate) fn last_os_error() -> Self {
        Errno::last().into()
    }
}

impl From<Errno> for SignalFdError {
    fn from(errno: Errno) -> Self {
        match errno {
            Errno::EAGAIN => SignalFdError::WouldBlock,
            Errno::EINVAL => SignalFdError::InvalidArgument,
            Errno::ENOMEM | Errno::EMFILE | Errno::ENFILE | Errno::ENOSPC => {
                SignalFdError::ResourceExhausted(errno)
            }
            other => SignalFdError::Os(other),
        }
    }
}
