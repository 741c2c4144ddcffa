//! The transform pipeline: decode, watermark, resize, thumbnail, encode.

use std::fmt;
use std::io::Cursor;

use image::codecs::gif::GifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, Frame, GenericImageView, ImageFormat};
use tracing::debug;

use super::error::TransformError;
use super::watermark;
use crate::task::{Resize, Task};

/// Thumbnail box edge, in pixels.
pub const THUMBNAIL_SIZE: u32 = 300;

/// JPEG quality used for every JPEG output.
pub const JPEG_QUALITY: u8 = 90;

const FILTER: FilterType = FilterType::Lanczos3;

/// Output container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Png,
    Jpeg,
    Gif,
}

impl OutputFormat {
    /// Maps a lower- or upper-case extension to a container.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "png" => Some(OutputFormat::Png),
            "jpg" | "jpeg" => Some(OutputFormat::Jpeg),
            "gif" => Some(OutputFormat::Gif),
            _ => None,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Png => f.write_str("png"),
            OutputFormat::Jpeg => f.write_str("jpeg"),
            OutputFormat::Gif => f.write_str("gif"),
        }
    }
}

/// What to do to an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformRequest {
    /// Target encoding name, e.g. `png`.
    pub format: String,
    /// Watermark text; empty means none.
    pub watermark: String,
    /// Resize target; `{0, 0}` means none.
    pub resize: Resize,
    /// Produce a thumbnail after the resize.
    pub mini: bool,
}

impl From<&Task> for TransformRequest {
    fn from(task: &Task) -> Self {
        Self {
            format: task.format.clone(),
            watermark: task.watermark.clone(),
            resize: task.resize,
            mini: task.mini,
        }
    }
}

/// Encoded result plus its pixel dimensions.
#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Applies the request to `source`.
///
/// Order is fixed: decode, watermark (non-empty text), resize (any
/// dimension > 0), thumbnail (`mini`), encode.
pub fn transform(source: &[u8], request: &TransformRequest) -> Result<TransformOutput, TransformError> {
    // Resolve the container first so an invalid format fails before any work.
    let format = OutputFormat::from_extension(&request.format)
        .ok_or_else(|| TransformError::UnsupportedFormat(request.format.clone()))?;

    let mut img =
        image::load_from_memory(source).map_err(|e| TransformError::Decode(e.to_string()))?;

    let (src_w, src_h) = img.dimensions();
    debug!(width = src_w, height = src_h, "Decoded source image");

    if !request.watermark.is_empty() {
        img = watermark::apply(&img, &request.watermark);
    }

    if request.resize.is_requested() {
        let (w, h) = target_dimensions(img.dimensions(), request.resize);
        img = img.resize_exact(w, h, FILTER);
    }

    if request.mini {
        img = img.resize_to_fill(THUMBNAIL_SIZE, THUMBNAIL_SIZE, FILTER);
    }

    let (width, height) = img.dimensions();
    let bytes = encode(&img, format)?;

    debug!(width, height, size = bytes.len(), %format, "Encoded output image");

    Ok(TransformOutput {
        bytes,
        width,
        height,
    })
}

/// Runs [`transform`] on the blocking thread pool.
pub async fn transform_blocking(
    source: Vec<u8>,
    request: TransformRequest,
) -> Result<TransformOutput, TransformError> {
    tokio::task::spawn_blocking(move || transform(&source, &request))
        .await
        .map_err(|e| TransformError::Aborted(e.to_string()))?
}

/// Resolves the resize target. A zero side is derived from the other one,
/// keeping the source aspect ratio.
pub fn target_dimensions((src_w, src_h): (u32, u32), resize: Resize) -> (u32, u32) {
    match (resize.width, resize.height) {
        (0, 0) => (src_w, src_h),
        (0, h) => {
            let w = (src_w as f64 * h as f64 / src_h.max(1) as f64).round() as u32;
            (w.max(1), h)
        }
        (w, 0) => {
            let h = (src_h as f64 * w as f64 / src_w.max(1) as f64).round() as u32;
            (w, h.max(1))
        }
        (w, h) => (w, h),
    }
}

fn encode(img: &DynamicImage, format: OutputFormat) -> Result<Vec<u8>, TransformError> {
    let encode_err = |e: image::ImageError| TransformError::Encode {
        format: format.to_string(),
        reason: e.to_string(),
    };

    let mut buf = Vec::new();

    match format {
        OutputFormat::Png => {
            img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
                .map_err(encode_err)?;
        }
        OutputFormat::Jpeg => {
            // JPEG has no alpha channel.
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            let encoder = JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY);
            rgb.write_with_encoder(encoder).map_err(encode_err)?;
        }
        OutputFormat::Gif => {
            let mut encoder = GifEncoder::new(&mut buf);
            encoder
                .encode_frame(Frame::new(img.to_rgba8()))
                .map_err(encode_err)?;
        }
    }

    Ok(buf)
}
