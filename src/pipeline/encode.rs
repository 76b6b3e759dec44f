//! Image encoding: pixels or image bytes → base64 payload in `ImageData`.
//!
//! Rasterised PDF pages go out as JPEG. User images keep their own format
//! (a PNG stays a PNG) but are always decoded and re-encoded, which both
//! validates them and strips anything that is not pixel data.

use crate::document::MediaType;
use crate::error::DocPromptError;
use crate::output::AttachmentInfo;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// An encoded image ready to attach to a model request.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub image: ImageData,
    pub info: AttachmentInfo,
}

/// Encode pixels as a base64 JPEG.
///
/// JPEG has no alpha channel, so the image is flattened to RGB first.
pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<ImageData, DocPromptError> {
    let buf = jpeg_bytes(img, quality)?;
    let b64 = STANDARD.encode(&buf);
    debug!("Encoded JPEG {} bytes → {} bytes base64", buf.len(), b64.len());
    Ok(ImageData::new(b64, MediaType::Jpeg.mime()))
}

fn jpeg_bytes(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, DocPromptError> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img.to_rgb8())
        .write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality))
        .map_err(|e| DocPromptError::EncodeFailed(e.to_string()))?;
    Ok(buf)
}

/// Turn a rasterised PDF page into an [`Attachment`].
pub fn attach_page(
    img: &DynamicImage,
    page: usize,
    quality: u8,
) -> Result<Attachment, DocPromptError> {
    let image = encode_jpeg(img, quality)?;
    let info = AttachmentInfo {
        mime: image.mime_type.clone(),
        source: MediaType::Pdf,
        width: img.width(),
        height: img.height(),
        encoded_len: image.data.len(),
        page: Some(page),
    };
    Ok(Attachment { image, info })
}

/// Decode a user image and re-encode it in its own format.
///
/// Images whose longest edge exceeds `max_pixels` are scaled down first,
/// preserving aspect ratio.
pub fn attach_image(
    name: &str,
    bytes: &[u8],
    media: MediaType,
    max_pixels: u32,
    quality: u8,
) -> Result<Attachment, DocPromptError> {
    let format = media.image_format().ok_or_else(|| {
        DocPromptError::Internal(format!("attach_image called with {media} content"))
    })?;

    let decoded = image::load_from_memory_with_format(bytes, format).map_err(|e| {
        DocPromptError::ImageDecodeFailed {
            name: name.to_string(),
            media,
            detail: e.to_string(),
        }
    })?;

    let img = fit_within(decoded, max_pixels);

    let buf = match media {
        MediaType::Jpeg => jpeg_bytes(&img, quality)?,
        _ => {
            let mut buf = Vec::new();
            img.write_to(&mut Cursor::new(&mut buf), format)
                .map_err(|e| DocPromptError::EncodeFailed(e.to_string()))?;
            buf
        }
    };

    let b64 = STANDARD.encode(&buf);
    debug!(
        "Encoded {} '{}' {}x{} → {} bytes base64",
        media,
        name,
        img.width(),
        img.height(),
        b64.len()
    );

    let image = ImageData::new(b64, media.mime());
    let info = AttachmentInfo {
        mime: media.mime().to_string(),
        source: media,
        width: img.width(),
        height: img.height(),
        encoded_len: image.data.len(),
        page: None,
    };
    Ok(Attachment { image, info })
}

/// Downscale so that neither edge exceeds `max_pixels`.
fn fit_within(img: DynamicImage, max_pixels: u32) -> DynamicImage {
    if img.width() <= max_pixels && img.height() <= max_pixels {
        return img;
    }
    debug!(
        "Downscaling {}x{} to fit {} px",
        img.width(),
        img.height(),
        max_pixels
    );
    img.resize(max_pixels, max_pixels, FilterType::Triangle)
}

/// Pixel dimensions read from the image header; pixel data is not decoded.
pub fn image_dimensions(bytes: &[u8], media: MediaType) -> Option<(u32, u32)> {
    let format = media.image_format()?;
    image::ImageReader::with_format(Cursor::new(bytes), format)
        .into_dimensions()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn red_square(side: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(side, side, Rgba([255, 0, 0, 255])))
    }

    fn png_bytes(img: &DynamicImage) -> Vec<u8> {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn jpeg_from_rgba() {
        let data = encode_jpeg(&red_square(10), 90).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/jpeg");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert_eq!(MediaType::sniff(&decoded), Some(MediaType::Jpeg));
    }

    #[test]
    fn page_attachment_records_page() {
        let att = attach_page(&red_square(20), 3, 80).unwrap();
        assert_eq!(att.info.page, Some(3));
        assert_eq!(att.info.source, MediaType::Pdf);
        assert_eq!(att.info.mime, "image/jpeg");
        assert_eq!((att.info.width, att.info.height), (20, 20));
    }

    #[test]
    fn png_stays_png() {
        let bytes = png_bytes(&red_square(8));
        let att = attach_image("dot.png", &bytes, MediaType::Png, 2000, 90).unwrap();
        assert_eq!(att.image.mime_type, "image/png");
        let decoded = STANDARD.decode(&att.image.data).unwrap();
        assert_eq!(MediaType::sniff(&decoded), Some(MediaType::Png));
        assert_eq!(att.info.page, None);
    }

    #[test]
    fn large_image_is_downscaled() {
        let bytes = png_bytes(&red_square(400));
        let att = attach_image("big.png", &bytes, MediaType::Png, 100, 90).unwrap();
        assert_eq!((att.info.width, att.info.height), (100, 100));
    }

    #[test]
    fn corrupt_image_fails_decode() {
        let mut bytes = png_bytes(&red_square(4));
        bytes.truncate(20);
        let err = attach_image("cut.png", &bytes, MediaType::Png, 2000, 90).unwrap_err();
        assert!(matches!(err, DocPromptError::ImageDecodeFailed { .. }));
    }

    #[test]
    fn dimensions_of_png() {
        let bytes = png_bytes(&red_square(7));
        assert_eq!(image_dimensions(&bytes, MediaType::Png), Some((7, 7)));
        assert_eq!(image_dimensions(b"%PDF", MediaType::Pdf), None);
    }

    #[test]
    fn dimensions_come_from_header() {
        let data = encode_jpeg(&red_square(24), 80).unwrap();
        let mut bytes = STANDARD.decode(&data.data).unwrap();
        // Drop the tail of the scan data; the frame header is untouched.
        bytes.truncate(bytes.len() - 8);
        assert_eq!(image_dimensions(&bytes, MediaType::Jpeg), Some((24, 24)));
    }
}
