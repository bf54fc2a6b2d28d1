use std::{error::Error, fmt, io};

use machine_learning::MlErr;

/// The worker module's result type.
pub type Result<T> = std::result::Result<T, WorkerErr>;

/// Worker runtime failures.
#[derive(Debug)]
pub enum WorkerErr {
    Io(io::Error),
    Ml(MlErr),
    Server(String),
    UnexpectedMessage {
        epoch: usize,
        got: &'static str,
    },
    WeightsLengthMismatch {
        epoch: usize,
        got: usize,
        expected: usize,
    },
    BatchOutOfRange {
        index: usize,
        batches: usize,
    },
}

impl fmt::Display for WorkerErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerErr::Io(e) => write!(f, "io error: {e}"),
            WorkerErr::Ml(e) => write!(f, "model error: {e}"),
            WorkerErr::Server(detail) => {
                write!(f, "the parameter server reported an error: {detail}")
            }
            WorkerErr::UnexpectedMessage { epoch, got } => {
                write!(f, "unexpected message at epoch {epoch}: got {got}")
            }
            WorkerErr::WeightsLengthMismatch {
                epoch,
                got,
                expected,
            } => write!(
                f,
                "weights length mismatch at epoch {epoch}: got {got}, expected {expected}"
            ),
            WorkerErr::BatchOutOfRange { index, batches } => {
                write!(f, "batch index {index} is past the {batches} epoch batches")
            }
        }
    }
}

impl Error for WorkerErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            WorkerErr::Io(e) => Some(e),
            WorkerErr::Ml(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for WorkerErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<MlErr> for WorkerErr {
    fn from(value: MlErr) -> Self {
        Self::Ml(value)
    }
}

/// Boundary conversion for binaries / I/O APIs.
impl From<WorkerErr> for io::Error {
    fn from(value: WorkerErr) -> Self {
        match value {
            WorkerErr::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
