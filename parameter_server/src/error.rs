use std::{error::Error, fmt, io};

use machine_learning::MlErr;

/// The parameter server module's result type.
pub type Result<T> = std::result::Result<T, PsErr>;

/// Parameter server runtime failures.
#[derive(Debug)]
pub enum PsErr {
    Io(io::Error),
    Ml(MlErr),
    Checkpoint(String),
    GradientLengthMismatch {
        got: usize,
        expected: usize,
    },
    UnexpectedMessage {
        got: &'static str,
    },
}

impl fmt::Display for PsErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PsErr::Io(e) => write!(f, "io error: {e}"),
            PsErr::Ml(e) => write!(f, "model error: {e}"),
            PsErr::Checkpoint(detail) => write!(f, "checkpoint error: {detail}"),
            PsErr::GradientLengthMismatch { got, expected } => write!(
                f,
                "gradient length mismatch: got {got}, expected {expected}"
            ),
            PsErr::UnexpectedMessage { got } => {
                write!(f, "unexpected message: got {got}")
            }
        }
    }
}

impl Error for PsErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PsErr::Io(e) => Some(e),
            PsErr::Ml(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for PsErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<MlErr> for PsErr {
    fn from(value: MlErr) -> Self {
        Self::Ml(value)
    }
}

/// Boundary conversion for binaries / I/O APIs.
impl From<PsErr> for io::Error {
    fn from(value: PsErr) -> Self {
        match value {
            PsErr::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
