//! Image transform engine.
//!
//! A pure function from source bytes and a [`TransformRequest`] to encoded
//! output bytes. The pipeline order is fixed:
//!
//! | Step | When | Implementation |
//! |---|---|---|
//! | Decode | always | `image::load_from_memory` |
//! | Watermark | text non-empty | tiled 8x8 bitmap font, 20% white |
//! | Resize | any dimension > 0 | `resize_exact`, Lanczos3 |
//! | Thumbnail | `mini` | `resize_to_fill` 300x300, Lanczos3 |
//! | Encode | always | PNG, JPEG (quality 90), GIF |

mod engine;
mod error;
pub mod watermark;

pub use engine::{
    target_dimensions, transform, transform_blocking, OutputFormat, TransformOutput,
    TransformRequest, JPEG_QUALITY, THUMBNAIL_SIZE,
};
pub use error::TransformError;
