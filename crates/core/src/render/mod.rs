//! Encoding of canvas snapshots and captions into PNG images.

mod png;

pub use png::PngRenderer;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::canvas::{CanvasMetadata, Placer};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("cannot render a {width}x{height} image")]
    EmptyImage { width: u32, height: u32 },

    #[error("canvas has {actual} pixels, expected {width}x{height}")]
    PixelCount { width: u32, height: u32, actual: usize },

    #[error("failed to build text image: {0}")]
    Svg(String),

    #[error("failed to encode PNG: {0}")]
    Encode(String),
}

/// Produces encoded images for every rendered artifact kind.
///
/// Rendering is CPU-bound; callers run it off the async executor.
pub trait Renderer: Send + Sync {
    /// Canvas pixels coloured through the metadata palette.
    fn render_canvas(&self, metadata: &CanvasMetadata, canvas: &[u8])
        -> Result<Vec<u8>, RenderError>;

    /// Caption with the snapshot date.
    fn render_date(&self, date: DateTime<Utc>) -> Result<Vec<u8>, RenderError>;

    /// One line per top placer, in the placer's colour.
    fn render_top_placers(&self, placers: &[Placer]) -> Result<Vec<u8>, RenderError>;

    /// Map of which top placer owns each pixel.
    fn render_canvas_control(
        &self,
        width: u32,
        height: u32,
        placers: &[u32],
        top_placers: &[Placer],
    ) -> Result<Vec<u8>, RenderError>;
}

/// Date caption text, e.g. `Wed 03 Jan 2024 16:21`.
pub fn format_date(date: DateTime<Utc>) -> String {
    date.format("%a %d %b %Y %H:%M").to_string()
}

/// Top placers line, e.g. `zekiah (#42) : 1200 pixels`.
pub fn format_placer_line(placer: &Placer) -> String {
    format!(
        "{} (#{}) : {} pixels",
        placer.display_name(),
        placer.int_id,
        placer.pixels_placed
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Colour;
    use chrono::TimeZone;

    #[test]
    fn test_format_date() {
        let date = Utc.timestamp_opt(1704298864, 0).single().unwrap();
        assert_eq!(format_date(date), "Wed 03 Jan 2024 16:21");
    }

    #[test]
    fn test_format_placer_line() {
        let placer = Placer {
            int_id: 42,
            chat_name: Some("zekiah".to_string()),
            pixels_placed: 1200,
            colour: Colour::rgba(1, 2, 3, 255),
        };
        assert_eq!(format_placer_line(&placer), "zekiah (#42) : 1200 pixels");

        let anonymous = Placer {
            chat_name: None,
            ..placer
        };
        assert_eq!(format_placer_line(&anonymous), "anonymous (#42) : 1200 pixels");
    }
}
