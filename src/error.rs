/// The error type for all encoding operations.
#[derive(Debug)]
#[non_exhaustive]
pub enum EncodingError {
    /// The pixel buffer of an [`ImageView`](crate::ImageView) does not have
    /// the expected size.
    ///
    /// An RGBA 8-bit image must have exactly `width * height * 4` bytes.
    UnexpectedBufferSize {
        expected: usize,
    },
    /// The width or height of the image is zero.
    ZeroDimension,
    /// The operation was cancelled via a
    /// [`CancellationToken`](crate::CancellationToken).
    ///
    /// When this error is returned, the writer may be in an inconsistent
    /// state. Some, all, or none of the encoded blocks may have been written.
    Cancelled,

    Io(std::io::Error),
}

impl std::fmt::Display for EncodingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncodingError::UnexpectedBufferSize { expected } => {
                write!(f, "Unexpected buffer size: expected {} bytes", expected)
            }
            EncodingError::ZeroDimension => {
                write!(f, "The width or height of the image is zero")
            }
            EncodingError::Cancelled => write!(f, "The operation was cancelled"),

            EncodingError::Io(error) => write!(f, "I/O error: {}", error),
        }
    }
}

impl From<std::io::Error> for EncodingError {
    fn from(error: std::io::Error) -> Self {
        EncodingError::Io(error)
    }
}

impl std::error::Error for EncodingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EncodingError::Io(error) => Some(error),
            _ => None,
        }
    }
}
