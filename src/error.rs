use std::fmt;
use std::path::{Path, PathBuf};

/// Errors produced while converting, walking, augmenting or transferring a dataset.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A region or label line refers to a tag that is not in the current index.
    #[error("unknown tag: {0}")]
    UnknownTag(String),

    /// A label line or class-index file could not be decoded.
    #[error("malformed annotation{location}: {reason}")]
    MalformedAnnotation { location: Location, reason: String },

    /// A label file exists without an image of the same stem.
    #[error("label file {} has no matching image", .0.display())]
    MissingImage(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("training service error: {0}")]
    Service(String),

    #[error("invalid augmentation spec: {0}")]
    InvalidSpec(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Where a malformed annotation was found. Empty when decoding a detached line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    pub path: Option<PathBuf>,
    pub line: Option<usize>,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.path, self.line) {
            (Some(path), Some(line)) => write!(f, " at {}:{}", path.display(), line),
            (Some(path), None) => write!(f, " in {}", path.display()),
            (None, Some(line)) => write!(f, " at line {}", line),
            (None, None) => Ok(()),
        }
    }
}

impl Error {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Error::MalformedAnnotation {
            location: Location::default(),
            reason: reason.into(),
        }
    }

    /// Attach file and line context to a malformed annotation error.
    /// Other variants pass through untouched.
    pub fn at(self, path: &Path, line: usize) -> Self {
        match self {
            Error::MalformedAnnotation { reason, .. } => Error::MalformedAnnotation {
                location: Location {
                    path: Some(path.to_path_buf()),
                    line: Some(line),
                },
                reason,
            },
            other => other,
        }
    }
}

impl From<ureq::Error> for Error {
    fn from(e: ureq::Error) -> Self {
        Error::Service(e.to_string())
    }
}
