use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Cursor, Read, Seek};
use std::path::PathBuf;
use std::sync::Arc;

use model::ImageOrientation;

use crate::bitmap::Bitmap;

pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

#[derive(Debug, Clone)]
enum ImageSourceKind {
    File(PathBuf),
    Bytes { label: String, bytes: Arc<[u8]> },
}

/// Where the encoded image lives, plus metadata known before decoding.
#[derive(Debug, Clone)]
pub struct ImageSource {
    kind: ImageSourceKind,
    orientation: ImageOrientation,
    preview: Option<Bitmap>,
}

impl ImageSource {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::from_kind(ImageSourceKind::File(path.into()))
    }

    pub fn bytes(label: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self::from_kind(ImageSourceKind::Bytes {
            label: label.into(),
            bytes: bytes.into(),
        })
    }

    fn from_kind(kind: ImageSourceKind) -> Self {
        Self {
            kind,
            orientation: ImageOrientation::None,
            preview: None,
        }
    }

    pub fn with_orientation(self, orientation: ImageOrientation) -> Self {
        Self {
            orientation,
            ..self
        }
    }

    /// Low resolution placeholder drawn until the base tile is decoded.
    pub fn with_preview(self, preview: Bitmap) -> Self {
        Self {
            preview: Some(preview),
            ..self
        }
    }

    pub fn orientation(&self) -> ImageOrientation {
        self.orientation
    }

    pub fn preview(&self) -> Option<&Bitmap> {
        self.preview.as_ref()
    }

    /// Every call yields an independent reader positioned at the start.
    pub fn open(&self) -> io::Result<Box<dyn ReadSeek>> {
        match &self.kind {
            ImageSourceKind::File(path) => Ok(Box::new(BufReader::new(File::open(path)?))),
            ImageSourceKind::Bytes { bytes, .. } => Ok(Box::new(Cursor::new(bytes.clone()))),
        }
    }
}

impl fmt::Display for ImageSource {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ImageSourceKind::File(path) => write!(formatter, "file {}", path.display()),
            ImageSourceKind::Bytes { label, bytes } => {
                write!(formatter, "{label} ({} bytes in memory)", bytes.len())
            }
        }
    }
}
