//! Document types: what the user selected, what the bytes actually are,
//! and the dispatch table between the two.
//!
//! The user picks an [`InputKind`] (text, pdf, image, or auto). The content
//! is sniffed independently into a [`MediaType`] from its magic bytes; file
//! extensions are never trusted. [`InputKind::resolve`] combines both into
//! the [`Route`] the ask flow takes, or a `TypeMismatch` error.

use crate::error::DocPromptError;
use serde::{Deserialize, Serialize};
use std::fmt;

const PNG_SIGNATURE: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
const JPEG_SOI: &[u8] = &[0xFF, 0xD8, 0xFF];

/// The input type tag chosen by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    /// Prompt only; no document is attached.
    Text,
    /// The document must be a PDF; its page is rasterised to JPEG.
    Pdf,
    /// The document must be a PNG or JPEG image.
    Image,
    /// Follow whatever the content turns out to be. (default)
    #[default]
    Auto,
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InputKind::Text => "text",
            InputKind::Pdf => "pdf",
            InputKind::Image => "image",
            InputKind::Auto => "auto",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for InputKind {
    type Err = DocPromptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" | "t" => Ok(InputKind::Text),
            "pdf" | "p" => Ok(InputKind::Pdf),
            "image" | "img" | "i" => Ok(InputKind::Image),
            "auto" | "a" | "" => Ok(InputKind::Auto),
            other => Err(DocPromptError::InvalidInput(format!(
                "unknown input type '{other}' (expected text, pdf, image or auto)"
            ))),
        }
    }
}

/// Content type detected from a document's leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Pdf,
    Png,
    Jpeg,
}

impl MediaType {
    /// Sniff the media type from magic bytes.
    pub fn sniff(bytes: &[u8]) -> Option<MediaType> {
        if bytes.starts_with(b"%PDF") {
            Some(MediaType::Pdf)
        } else if bytes.starts_with(PNG_SIGNATURE) {
            Some(MediaType::Png)
        } else if bytes.starts_with(JPEG_SOI) {
            Some(MediaType::Jpeg)
        } else {
            None
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            MediaType::Pdf => "application/pdf",
            MediaType::Png => "image/png",
            MediaType::Jpeg => "image/jpeg",
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, MediaType::Png | MediaType::Jpeg)
    }

    /// The matching `image` crate format, `None` for PDF.
    pub fn image_format(&self) -> Option<image::ImageFormat> {
        match self {
            MediaType::Pdf => None,
            MediaType::Png => Some(image::ImageFormat::Png),
            MediaType::Jpeg => Some(image::ImageFormat::Jpeg),
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MediaType::Pdf => "PDF",
            MediaType::Png => "PNG",
            MediaType::Jpeg => "JPEG",
        })
    }
}

/// How a request will be handled once input kind and content are reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Send the prompt alone.
    TextOnly,
    /// Rasterise a PDF page and attach it as JPEG.
    RasterisePdf,
    /// Attach the image in its own format.
    DirectImage(MediaType),
}

impl InputKind {
    /// Apply the dispatch table for a request with or without a document.
    pub fn resolve(self, media: Option<MediaType>) -> Result<Route, DocPromptError> {
        match (self, media) {
            (InputKind::Text, None) | (InputKind::Auto, None) => Ok(Route::TextOnly),
            (InputKind::Pdf, Some(MediaType::Pdf)) | (InputKind::Auto, Some(MediaType::Pdf)) => {
                Ok(Route::RasterisePdf)
            }
            (InputKind::Image, Some(m)) | (InputKind::Auto, Some(m)) if m.is_image() => {
                Ok(Route::DirectImage(m))
            }
            (InputKind::Pdf, None) | (InputKind::Image, None) => Err(DocPromptError::InvalidInput(
                format!("input type '{self}' needs a document"),
            )),
            (selected, Some(m)) => Err(DocPromptError::TypeMismatch {
                selected,
                detected: m.mime().to_string(),
            }),
        }
    }
}

/// A document loaded into memory.
#[derive(Clone)]
pub struct Document {
    /// Display name: file name, URL tail, or caller-provided label.
    pub name: String,
    pub bytes: Vec<u8>,
    pub media: MediaType,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("name", &self.name)
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .field("media", &self.media)
            .finish()
    }
}

impl Document {
    /// Build a document from bytes already in memory, sniffing its type.
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Result<Self, DocPromptError> {
        let name = name.into();
        match MediaType::sniff(&bytes) {
            Some(media) => Ok(Self { name, bytes, media }),
            None => Err(DocPromptError::UnsupportedFileType {
                name,
                magic: bytes.iter().take(8).copied().collect(),
            }),
        }
    }

    pub fn mime(&self) -> &'static str {
        self.media.mime()
    }

    /// Describe the document. Page counts need pdfium and are filled in later.
    pub fn info(&self) -> DocumentInfo {
        DocumentInfo {
            name: self.name.clone(),
            media: self.media,
            mime: self.mime().to_string(),
            size_bytes: self.bytes.len(),
            page_count: None,
            dimensions: crate::pipeline::encode::image_dimensions(&self.bytes, self.media),
        }
    }
}

/// A serialisable description of a document, shown before the model call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub name: String,
    pub media: MediaType,
    pub mime: String,
    pub size_bytes: usize,
    /// Page count, PDF only.
    pub page_count: Option<usize>,
    /// Pixel dimensions, images only.
    pub dimensions: Option<(u32, u32)>,
}
