use core::fmt::{Debug, Display, Formatter, Result as FmtResult};

/// Error type
#[derive(Debug)]
pub enum Error<E: Sized + Debug> {
    /// No presence pulse after reset
    NoPresence,
    /// Computed and received check bytes differ
    CrcMismatch(u8, u8),
    PortError(E),
}

impl<E: Sized + Debug> From<E> for Error<E> {
    fn from(e: E) -> Self {
        Error::PortError(e)
    }
}

impl<E: Sized + Debug> Display for Error<E> {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            Error::NoPresence => f.write_str("sensor not present"),
            Error::CrcMismatch(computed, received) => write!(
                f,
                "CRC error (computed {:#04x}, received {:#04x})",
                computed, received
            ),
            Error::PortError(e) => write!(f, "port error: {:?}", e),
        }
    }
}
