//! Rasterization of encoded chart markup.
//!
//! ```text
//!   data URI ──► decode job (worker thread) ──► Canvas
//!                     │
//!            caller waits ≤ timeout
//! ```
//!
//! The decode job owns everything it touches. If the caller stops waiting,
//! the job finishes on its own and its result is dropped with the channel.

use std::io::Cursor;
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Duration;

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use palette::Srgba;
use resvg::tiny_skia::{self, Pixmap, Transform};
use resvg::usvg::{self, fontdb};
use tracing::{debug, trace};

use crate::encoder::MarkupEncoder;
use crate::error::{ExportError, ExportResult};

pub const PNG_MIME: &str = "image/png";
pub const JPEG_MIME: &str = "image/jpeg";
const SVG_MIME: &str = "image/svg+xml";

// ============================================================================
// Canvas
// ============================================================================

/// A fixed-size RGBA drawing surface.
#[derive(Clone)]
pub struct Canvas {
    pixmap: Pixmap,
}

impl Canvas {
    /// Creates a transparent canvas. Both dimensions must be non-zero.
    pub fn new(width: u32, height: u32) -> ExportResult<Self> {
        Pixmap::new(width, height)
            .map(|pixmap| Self { pixmap })
            .ok_or(ExportError::InvalidCanvas { width, height })
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    /// Paints every pixel with `color`.
    pub fn fill(&mut self, color: Srgba<u8>) {
        self.pixmap.fill(tiny_skia::Color::from_rgba8(
            color.red,
            color.green,
            color.blue,
            color.alpha,
        ));
    }

    /// Draws an SVG tree at the origin without scaling.
    fn draw(&mut self, tree: &usvg::Tree) {
        resvg::render(tree, Transform::identity(), &mut self.pixmap.as_mut());
    }

    /// Copies the canvas into a straight-alpha image.
    pub fn to_rgba_image(&self) -> RgbaImage {
        let (width, height) = (self.width(), self.height());
        RgbaImage::from_fn(width, height, |x, y| {
            let pixel = self.pixmap.pixels()[(y * width + x) as usize];
            // tiny-skia stores premultiplied alpha
            let (r, g, b, a) =
                unpremultiply(pixel.red(), pixel.green(), pixel.blue(), pixel.alpha());
            Rgba([r, g, b, a])
        })
    }

    /// Encodes the canvas as `image/png` or `image/jpeg` bytes.
    pub fn encode(&self, mime: &str) -> ExportResult<Vec<u8>> {
        let image = DynamicImage::ImageRgba8(self.to_rgba_image());
        let mut bytes = Vec::new();
        match mime {
            PNG_MIME => image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?,
            JPEG_MIME => DynamicImage::ImageRgb8(image.to_rgb8())
                .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg)?,
            other => return Err(ExportError::UnsupportedMime(other.to_string())),
        }
        Ok(bytes)
    }

    /// Encodes the canvas as a base64 `data:` URI of the given type.
    pub fn to_data_uri(&self, mime: &str, encoder: &MarkupEncoder) -> ExportResult<String> {
        let bytes = self.encode(mime)?;
        Ok(format!("data:{mime};base64,{}", encoder.encode_bytes(&bytes)))
    }
}

impl std::fmt::Debug for Canvas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Canvas")
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

fn unpremultiply(r: u8, g: u8, b: u8, a: u8) -> (u8, u8, u8, u8) {
    if a == 0 {
        (0, 0, 0, 0)
    } else {
        let a_f = a as f32 / 255.0;
        (
            (r as f32 / a_f).round().min(255.0) as u8,
            (g as f32 / a_f).round().min(255.0) as u8,
            (b as f32 / a_f).round().min(255.0) as u8,
            a,
        )
    }
}

// ============================================================================
// RasterRenderer
// ============================================================================

/// Decodes SVG data URIs and draws them onto fresh canvases.
#[derive(Clone)]
pub struct RasterRenderer {
    fontdb: Arc<fontdb::Database>,
    timeout: Duration,
    background: Option<Srgba<u8>>,
}

impl RasterRenderer {
    pub fn new(fontdb: Arc<fontdb::Database>, timeout: Duration) -> Self {
        Self {
            fontdb,
            timeout,
            background: None,
        }
    }

    /// Colour the canvas is filled with before the chart is drawn.
    pub fn with_background(mut self, color: Srgba<u8>) -> Self {
        self.background = Some(color);
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Decodes `data_uri` and draws it at the origin of a
    /// `width`×`height` canvas.
    ///
    /// Fails with [`ExportError::DecodeTimedOut`] if decoding takes longer
    /// than the configured timeout.
    pub fn render(
        &self,
        data_uri: &str,
        width: u32,
        height: u32,
        encoder: &MarkupEncoder,
    ) -> ExportResult<Canvas> {
        let mut canvas = Canvas::new(width, height)?;
        if let Some(color) = self.background {
            canvas.fill(color);
        }

        let (mime, svg) = encoder.decode_data_uri(data_uri)?;
        if mime != SVG_MIME {
            return Err(ExportError::UnsupportedMime(mime));
        }

        debug!(width, height, bytes = svg.len(), "submitting decode job");
        let fontdb = Arc::clone(&self.fontdb);
        await_decode(self.timeout, move || {
            let options = usvg::Options {
                fontdb,
                ..usvg::Options::default()
            };
            let tree = usvg::Tree::from_data(&svg, &options)
                .map_err(|e| ExportError::Decode(e.to_string()))?;
            trace!(size = ?tree.size(), "decoded chart markup");
            canvas.draw(&tree);
            Ok(canvas)
        })
    }
}

impl std::fmt::Debug for RasterRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterRenderer")
            .field("faces", &self.fontdb.len())
            .field("timeout", &self.timeout)
            .field("background", &self.background)
            .finish()
    }
}

/// Runs `job` on a worker thread and waits at most `timeout` for it.
pub(crate) fn await_decode<T, F>(timeout: Duration, job: F) -> ExportResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> ExportResult<T> + Send + 'static,
{
    let (tx, rx) = mpsc::sync_channel(1);
    thread::Builder::new()
        .name("chart-export-decode".to_string())
        .spawn(move || {
            // the receiver is gone once the caller has timed out
            let _ = tx.send(job());
        })?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(ExportError::DecodeTimedOut(timeout)),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(ExportError::Decode(
            "decode worker exited without a result".to_string(),
        )),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EncoderPreference;
    use crate::markup::SvgMarkup;

    const SQUARE: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="20" height="10"><rect width="10" height="10" fill="#ff0000"/></svg>"##;

    fn encoder() -> MarkupEncoder {
        MarkupEncoder::resolve(EncoderPreference::Software, "data:image/svg+xml;base64,").unwrap()
    }

    fn renderer() -> RasterRenderer {
        RasterRenderer::new(Arc::new(fontdb::Database::new()), Duration::from_secs(5))
    }

    #[test]
    fn zero_sized_canvas_is_rejected() {
        assert!(matches!(
            Canvas::new(0, 10),
            Err(ExportError::InvalidCanvas { width: 0, height: 10 })
        ));
    }

    #[test]
    fn unpremultiply_restores_straight_alpha() {
        assert_eq!(unpremultiply(0, 0, 0, 0), (0, 0, 0, 0));
        assert_eq!(unpremultiply(128, 32, 0, 128), (255, 64, 0, 128));
        assert_eq!(unpremultiply(10, 20, 30, 255), (10, 20, 30, 255));
    }

    #[test]
    fn draws_at_origin_without_scaling() {
        let encoder = encoder();
        let uri = encoder.encode(&SvgMarkup::new(SQUARE));
        let canvas = renderer()
            .with_background(Srgba::new(255, 255, 255, 255))
            .render(&uri, 40, 20, &encoder)
            .unwrap();

        assert_eq!((canvas.width(), canvas.height()), (40, 20));
        let image = canvas.to_rgba_image();
        assert_eq!(image.get_pixel(5, 5), &Rgba([255, 0, 0, 255]));
        assert_eq!(image.get_pixel(15, 5), &Rgba([255, 255, 255, 255]));
        assert_eq!(image.get_pixel(39, 19), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn without_background_canvas_stays_transparent() {
        let encoder = encoder();
        let uri = encoder.encode(&SvgMarkup::new(SQUARE));
        let canvas = renderer().render(&uri, 40, 20, &encoder).unwrap();
        assert_eq!(canvas.to_rgba_image().get_pixel(30, 15), &Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn broken_markup_is_a_decode_error() {
        let encoder = encoder();
        let uri = encoder.encode(&SvgMarkup::new("<svg"));
        let err = renderer().render(&uri, 10, 10, &encoder).unwrap_err();
        assert!(matches!(err, ExportError::Decode(_)));
    }

    #[test]
    fn non_svg_payload_is_rejected() {
        let encoder = encoder();
        let uri = format!("data:text/plain;base64,{}", encoder.encode_bytes(b"hi"));
        let err = renderer().render(&uri, 10, 10, &encoder).unwrap_err();
        assert!(matches!(err, ExportError::UnsupportedMime(_)));
    }

    #[test]
    fn slow_decode_times_out() {
        let timeout = Duration::from_millis(20);
        let err = await_decode(timeout, || {
            thread::sleep(Duration::from_millis(500));
            Ok(())
        })
        .unwrap_err();
        assert!(matches!(err, ExportError::DecodeTimedOut(t) if t == timeout));
    }

    #[test]
    fn png_and_jpeg_data_uris() {
        let encoder = encoder();
        let mut canvas = Canvas::new(4, 3).unwrap();
        canvas.fill(Srgba::new(0, 128, 255, 255));

        let png = canvas.to_data_uri(PNG_MIME, &encoder).unwrap();
        let (mime, bytes) = encoder.decode_data_uri(&png).unwrap();
        assert_eq!(mime, PNG_MIME);
        let decoded = image::load_from_memory_with_format(&bytes, ImageFormat::Png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (4, 3));

        let jpeg = canvas.to_data_uri(JPEG_MIME, &encoder).unwrap();
        assert!(jpeg.starts_with("data:image/jpeg;base64,"));
    }

    #[test]
    fn unknown_mime_is_rejected() {
        let canvas = Canvas::new(2, 2).unwrap();
        assert!(matches!(
            canvas.encode("image/gif"),
            Err(ExportError::UnsupportedMime(m)) if m == "image/gif"
        ));
    }
}
