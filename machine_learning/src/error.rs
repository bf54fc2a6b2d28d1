use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

/// The result type used in the entire machine learning module.
pub type Result<T> = std::result::Result<T, MlErr>;

/// The machine learning module's error type.
#[derive(Debug)]
pub enum MlErr {
    Io(io::Error),
    SizeMismatch {
        a: &'static str,
        b: &'static str,
        got: usize,
        expected: usize,
    },
    EmptyModel,
    LayerDimMismatch {
        layer: usize,
        input: usize,
        prev_output: usize,
    },
    InvalidDistribution(String),
    RaggedDataset {
        data_len: usize,
        row_size: usize,
    },
    BadMagic {
        what: &'static str,
        got: u32,
        expected: u32,
    },
    Truncated {
        what: &'static str,
    },
    BadImageDims {
        rows: u32,
        cols: u32,
    },
    CountMismatch {
        images: usize,
        labels: usize,
    },
    BadLabel {
        got: u8,
    },
}

impl Display for MlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MlErr::Io(e) => write!(f, "io error: {e}"),
            MlErr::SizeMismatch {
                a,
                b,
                got,
                expected,
            } => write!(
                f,
                "There's a size mismatch between {a} and {b}, got {got} and expected {expected}"
            ),
            MlErr::EmptyModel => write!(f, "The model must have at least one layer"),
            MlErr::LayerDimMismatch {
                layer,
                input,
                prev_output,
            } => write!(
                f,
                "Layer {layer} expects {input} inputs but the previous layer outputs {prev_output}"
            ),
            MlErr::InvalidDistribution(detail) => {
                write!(f, "Failed to build the sampling distribution: {detail}")
            }
            MlErr::RaggedDataset { data_len, row_size } => write!(
                f,
                "The dataset buffer of {data_len} values is not a whole number of {row_size}-sized rows"
            ),
            MlErr::BadMagic {
                what,
                got,
                expected,
            } => write!(
                f,
                "The {what} file has magic number {got}, expected {expected}"
            ),
            MlErr::Truncated { what } => {
                write!(f, "The {what} file ends before its declared contents")
            }
            MlErr::BadImageDims { rows, cols } => {
                write!(f, "Expected 28x28 images, the file declares {rows}x{cols}")
            }
            MlErr::CountMismatch { images, labels } => write!(
                f,
                "The image file holds {images} samples but the label file holds {labels}"
            ),
            MlErr::BadLabel { got } => {
                write!(f, "Label {got} is outside the ten digit classes")
            }
        }
    }
}

impl Error for MlErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MlErr::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for MlErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

/// Boundary conversion for binaries / I/O APIs.
impl From<MlErr> for io::Error {
    fn from(value: MlErr) -> Self {
        match value {
            MlErr::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
