//! Error types surfaced by the mediation core.

use core::fmt;

/// Errors that can occur while mediating guest GPU accesses.
///
/// Unmapped shadow-table resolutions are not an error: `resolve` returns
/// `Option` and the session layer answers reads of unmapped addresses with
/// the wire value `0xFFFFFFFF`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The VRAM page pool cannot satisfy an allocation.
    OutOfVram,
    /// A shadow page table refresh would exceed the directory cap.
    TableTooLarge,
    /// A guest address fell outside the guest's VRAM partition.
    BadTranslation,
    /// The hypervisor refused a device assignment call.
    HypervisorDenied,
    /// Malformed or out-of-order command stream.
    Protocol,
    /// The session transport failed.
    Transport,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::OutOfVram => write!(f, "out of VRAM pages"),
            Error::TableTooLarge => write!(f, "page directory count exceeds cap"),
            Error::BadTranslation => write!(f, "address outside guest VRAM partition"),
            Error::HypervisorDenied => write!(f, "hypervisor denied device assignment"),
            Error::Protocol => write!(f, "protocol violation"),
            Error::Transport => write!(f, "session transport failed"),
        }
    }
}

impl std::error::Error for Error {}
