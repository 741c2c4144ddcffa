//! Testing utilities and mock implementations.
//!
//! # Example
//!
//! ```rust,ignore
//! use imgpipe_core::testing::{fixtures, MockTaskStore};
//!
//! let store = MockTaskStore::new();
//! store.fail_next_set_status(1);
//!
//! let png = fixtures::png_bytes(64, 48);
//! ```

mod mock_task_store;

pub use mock_task_store::MockTaskStore;

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::collections::HashSet;
    use std::io::Cursor;
    use std::time::Duration;

    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};

    use crate::broker::RetryPolicy;
    use crate::task::NewTask;

    /// The default format whitelist.
    pub fn formats() -> HashSet<String> {
        ["png", "jpg", "jpeg", "gif"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    /// A non-uniform RGBA test image.
    pub fn image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, 96, 255])
        }))
    }

    /// A PNG-encoded test image.
    pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        encode(image(width, height), ImageFormat::Png)
    }

    /// A JPEG-encoded test image.
    pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
        let rgb = DynamicImage::ImageRgb8(image(width, height).to_rgb8());
        encode(rgb, ImageFormat::Jpeg)
    }

    fn encode(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), format)
            .expect("encoding an in-memory test image");
        buf
    }

    /// Intake parameters.
    pub fn new_task(format: &str, watermark: &str, resize: &str, mini: bool) -> NewTask {
        NewTask {
            format: format.to_string(),
            watermark: watermark.to_string(),
            resize: resize.to_string(),
            mini,
        }
    }

    /// A retry policy that does not slow tests down.
    pub fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1), 2.0)
    }
}
