//! PDF rasterisation: render one page to a `DynamicImage` via pdfium.
//!
//! pdfium is a C++ library with thread-local state, so every call here runs
//! inside `tokio::task::spawn_blocking` and binds its own `Pdfium` instance.
//! Only a single page is ever rendered per request, so the bind cost is
//! paid once per question.

use crate::error::DocPromptError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::PathBuf;
use tracing::{debug, info};

/// Bind to the pdfium shared library.
///
/// Lookup order: `PDFIUM_LIB_PATH` (a library file or a directory holding
/// it), then `./lib`, then the system loader path.
pub fn bind_pdfium() -> Result<Pdfium, DocPromptError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(p) if !p.is_empty() => {
            let path = PathBuf::from(p);
            let lib = if path.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(&path)
            } else {
                path
            };
            debug!("Binding pdfium from PDFIUM_LIB_PATH: {}", lib.display());
            Pdfium::bind_to_library(lib)
        }
        _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./lib"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| DocPromptError::PdfiumBindingFailed(format!("{e:?}")))?;

    Ok(Pdfium::new(bindings))
}

/// A rasterised page and the size of the document it came from.
#[derive(Debug)]
pub struct RenderedPage {
    /// 1-indexed page number.
    pub page: usize,
    pub total_pages: usize,
    pub image: DynamicImage,
}

/// Rasterise `page` (1-indexed) of an in-memory PDF.
///
/// The longest edge of the output is capped at `max_pixels`.
pub async fn rasterise_page(
    name: &str,
    bytes: Vec<u8>,
    page: usize,
    password: Option<&str>,
    max_pixels: u32,
) -> Result<RenderedPage, DocPromptError> {
    let name = name.to_string();
    let password = password.map(str::to_string);

    tokio::task::spawn_blocking(move || {
        rasterise_page_blocking(&name, &bytes, page, password.as_deref(), max_pixels)
    })
    .await
    .map_err(|e| DocPromptError::Internal(format!("Render task panicked: {}", e)))?
}

fn rasterise_page_blocking(
    name: &str,
    bytes: &[u8],
    page: usize,
    password: Option<&str>,
    max_pixels: u32,
) -> Result<RenderedPage, DocPromptError> {
    let pdfium = bind_pdfium()?;
    let document = open_document(&pdfium, name, bytes, password)?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF '{}' loaded: {} pages", name, total_pages);

    if total_pages == 0 {
        return Err(DocPromptError::EmptyPdf {
            name: name.to_string(),
        });
    }
    if page == 0 || page > total_pages {
        return Err(DocPromptError::PageOutOfRange {
            page,
            total: total_pages,
        });
    }

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let pdf_page = pages
        .get((page - 1) as u16)
        .map_err(|e| DocPromptError::RasterisationFailed {
            page,
            detail: format!("{:?}", e),
        })?;

    let bitmap = pdf_page
        .render_with_config(&render_config)
        .map_err(|e| DocPromptError::RasterisationFailed {
            page,
            detail: format!("{:?}", e),
        })?;

    let image = bitmap.as_image();
    debug!(
        "Rendered page {} → {}x{} px",
        page,
        image.width(),
        image.height()
    );

    Ok(RenderedPage {
        page,
        total_pages,
        image,
    })
}

/// Count the pages of an in-memory PDF without rendering anything.
pub async fn page_count(
    name: &str,
    bytes: Vec<u8>,
    password: Option<&str>,
) -> Result<usize, DocPromptError> {
    let name = name.to_string();
    let password = password.map(str::to_string);

    tokio::task::spawn_blocking(move || {
        let pdfium = bind_pdfium()?;
        let document = open_document(&pdfium, &name, &bytes, password.as_deref())?;
        Ok(document.pages().len() as usize)
    })
    .await
    .map_err(|e| DocPromptError::Internal(format!("Page-count task panicked: {}", e)))?
}

fn open_document<'a>(
    pdfium: &'a Pdfium,
    name: &str,
    bytes: &'a [u8],
    password: Option<&str>,
) -> Result<PdfDocument<'a>, DocPromptError> {
    pdfium
        .load_pdf_from_byte_slice(bytes, password)
        .map_err(|e| classify_load_error(name, &format!("{:?}", e), password.is_some()))
}

/// Map a pdfium load failure onto password / corruption errors.
fn classify_load_error(name: &str, detail: &str, had_password: bool) -> DocPromptError {
    if detail.contains("Password") || detail.contains("password") {
        if had_password {
            DocPromptError::WrongPassword {
                name: name.to_string(),
            }
        } else {
            DocPromptError::PasswordRequired {
                name: name.to_string(),
            }
        }
    } else {
        DocPromptError::CorruptPdf {
            name: name.to_string(),
            detail: detail.to_string(),
        }
    }
}
