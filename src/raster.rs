//! Page rasterization.
//!
//! The [`Rasterizer`] trait is the process boundary for rendering; the
//! default [`Pdftoppm`] implementation shells out to poppler's `pdftoppm`.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use image::{ImageFormat, ImageReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::document::PageHandle;
use crate::error::PageError;
use crate::process::{run_tool, ProcessError, ProcessLimits};

/// Default rendering resolution.
pub const DEFAULT_DPI: u32 = 300;

/// A rendered page, PNG-encoded.
///
/// Owned by the page task that produced it and dropped right after OCR.
#[derive(Clone, PartialEq, Eq)]
pub struct Bitmap {
    png: Vec<u8>,
    width: u32,
    height: u32,
    dpi: u32,
}

impl Bitmap {
    /// Wrap PNG bytes, validating the header and reading the dimensions.
    pub fn from_png(png: Vec<u8>, dpi: u32) -> Result<Self, PageError> {
        let (width, height) = ImageReader::with_format(Cursor::new(&png), ImageFormat::Png)
            .into_dimensions()
            .map_err(|e| PageError::Render(format!("invalid PNG from renderer: {}", e)))?;
        if width == 0 || height == 0 {
            return Err(PageError::Render("renderer produced an empty image".into()));
        }
        Ok(Self {
            png,
            width,
            height,
            dpi,
        })
    }

    /// A white page of the given size.
    pub fn blank(width: u32, height: u32, dpi: u32) -> Result<Self, PageError> {
        let img = image::GrayImage::from_pixel(width.max(1), height.max(1), image::Luma([255]));
        let mut png = Vec::new();
        img.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| PageError::Render(e.to_string()))?;
        Self::from_png(png, dpi)
    }

    /// Encoded PNG bytes.
    pub fn png(&self) -> &[u8] {
        &self.png
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Resolution the page was rendered at.
    pub fn dpi(&self) -> u32 {
        self.dpi
    }

    /// Size of the encoded image.
    pub fn byte_len(&self) -> usize {
        self.png.len()
    }
}

impl std::fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bitmap")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("dpi", &self.dpi)
            .field("bytes", &self.png.len())
            .finish()
    }
}

/// Everything a renderer needs for one page.
#[derive(Debug, Clone, Copy)]
pub struct RenderRequest<'a> {
    /// Page to render
    pub page: PageHandle<'a>,
    /// On-disk copy of the document for tools that need a path
    pub source: &'a Path,
    /// Target resolution
    pub dpi: u32,
    /// Timeout and output cap
    pub limits: ProcessLimits,
    /// Run-level cancellation
    pub cancel: &'a CancellationToken,
}

/// Renders a page to a bitmap.
#[async_trait]
pub trait Rasterizer: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Render one page.
    async fn rasterize(&self, request: RenderRequest<'_>) -> Result<Bitmap, PageError>;
}

/// Renders pages with poppler's `pdftoppm`, PNG on stdout.
#[derive(Debug, Clone)]
pub struct Pdftoppm {
    program: PathBuf,
}

impl Pdftoppm {
    /// Use `program` as the `pdftoppm` executable.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, request: &RenderRequest<'_>) -> Command {
        let page = request.page.number().to_string();
        let mut cmd = Command::new(&self.program);
        cmd.arg("-png")
            .arg("-r")
            .arg(request.dpi.to_string())
            .arg("-f")
            .arg(&page)
            .arg("-l")
            .arg(&page)
            .arg(request.source);
        cmd
    }
}

impl Default for Pdftoppm {
    fn default() -> Self {
        Self::new("pdftoppm")
    }
}

#[async_trait]
impl Rasterizer for Pdftoppm {
    fn name(&self) -> &str {
        "pdftoppm"
    }

    async fn rasterize(&self, request: RenderRequest<'_>) -> Result<Bitmap, PageError> {
        let (w, h) = request.page.media_box().pixels_at(request.dpi);
        log::debug!(
            "page {}: rendering at {} dpi (~{}x{} px)",
            request.page.number(),
            request.dpi,
            w,
            h
        );

        let png = run_tool(self.command(&request), None, request.limits, request.cancel)
            .await
            .map_err(render_error)?;
        Bitmap::from_png(png, request.dpi)
    }
}

fn render_error(err: ProcessError) -> PageError {
    match err {
        ProcessError::Timeout { timeout, .. } => PageError::RenderTimeout(timeout),
        ProcessError::OutputTooLarge { tool, limit } => PageError::OutputTooLarge { tool, limit },
        ProcessError::Cancelled { .. } => PageError::Cancelled,
        other => PageError::Render(other.to_string()),
    }
}
