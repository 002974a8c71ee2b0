use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use image::{ImageFormat, Rgba, RgbaImage};
use usvg::fontdb;

use super::{format_date, format_placer_line, RenderError, Renderer};
use crate::canvas::{CanvasMetadata, Colour, Placer};

const CAPTION_WIDTH: u32 = 1280;
const LINE_HEIGHT: u32 = 128;
const FONT_SIZE: u32 = 96;
const SHADOW_OFFSET: u32 = 4;

/// PNG renderer: raster images through `image`, captions through resvg.
pub struct PngRenderer {
    fontdb: Arc<fontdb::Database>,
}

impl PngRenderer {
    /// Renderer using the fonts installed on the system.
    pub fn new() -> Self {
        let mut db = fontdb::Database::new();
        db.load_system_fonts();
        Self::with_fonts(Arc::new(db))
    }

    pub fn with_fonts(fontdb: Arc<fontdb::Database>) -> Self {
        Self { fontdb }
    }

    fn encode(image: RgbaImage) -> Result<Vec<u8>, RenderError> {
        let mut buf = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .map_err(|e| RenderError::Encode(e.to_string()))?;
        Ok(buf)
    }

    fn check_size(width: u32, height: u32) -> Result<(), RenderError> {
        if width == 0 || height == 0 {
            return Err(RenderError::EmptyImage { width, height });
        }
        Ok(())
    }

    fn check_pixels(width: u32, height: u32, actual: usize) -> Result<(), RenderError> {
        Self::check_size(width, height)?;
        if (width as usize).checked_mul(height as usize) != Some(actual) {
            return Err(RenderError::PixelCount {
                width,
                height,
                actual,
            });
        }
        Ok(())
    }

    fn rasterize_svg(&self, svg: &str) -> Result<Vec<u8>, RenderError> {
        let options = usvg::Options {
            fontdb: Arc::clone(&self.fontdb),
            ..Default::default()
        };
        let tree =
            usvg::Tree::from_str(svg, &options).map_err(|e| RenderError::Svg(e.to_string()))?;

        let size = tree.size().to_int_size();
        let mut pixmap = resvg::tiny_skia::Pixmap::new(size.width(), size.height()).ok_or(
            RenderError::EmptyImage {
                width: size.width(),
                height: size.height(),
            },
        )?;
        resvg::render(
            &tree,
            resvg::tiny_skia::Transform::default(),
            &mut pixmap.as_mut(),
        );

        let mut image = RgbaImage::new(pixmap.width(), pixmap.height());
        for (dst, src) in image.pixels_mut().zip(pixmap.pixels()) {
            let colour = src.demultiply();
            *dst = Rgba([colour.red(), colour.green(), colour.blue(), colour.alpha()]);
        }
        Self::encode(image)
    }
}

impl Default for PngRenderer {
    fn default() -> Self {
        Self::new()
    }
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// A caption line with a drop shadow, baseline at `row`.
fn caption_line(row: u32, text: &str, fill: Colour) -> String {
    let baseline = row * LINE_HEIGHT + FONT_SIZE;
    let text = escape_xml(text);
    format!(
        r##"<text x="{sx}" y="{sy}" font-family="sans-serif" font-size="{size}" fill="#000000" fill-opacity="0.6">{text}</text><text x="16" y="{baseline}" font-family="sans-serif" font-size="{size}" fill="{fill}">{text}</text>"##,
        sx = 16 + SHADOW_OFFSET,
        sy = baseline + SHADOW_OFFSET,
        size = FONT_SIZE,
        fill = fill.to_hex_rgb(),
    )
}

fn caption_svg(lines: &[(String, Colour)]) -> String {
    let height = LINE_HEIGHT * lines.len().max(1) as u32;
    let mut svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{}" height="{}">"#,
        CAPTION_WIDTH, height
    );
    for (row, (text, colour)) in lines.iter().enumerate() {
        svg.push_str(&caption_line(row as u32, text, *colour));
    }
    svg.push_str("</svg>");
    svg
}

impl Renderer for PngRenderer {
    fn render_canvas(
        &self,
        metadata: &CanvasMetadata,
        canvas: &[u8],
    ) -> Result<Vec<u8>, RenderError> {
        Self::check_pixels(metadata.width, metadata.height, canvas.len())?;

        let palette = metadata.effective_palette();
        let width = metadata.width;
        let image = RgbaImage::from_fn(width, metadata.height, |x, y| {
            let index = canvas[y as usize * width as usize + x as usize] as usize;
            let colour = palette.get(index).copied().unwrap_or(palette[0]);
            Rgba(colour.channels())
        });
        Self::encode(image)
    }

    fn render_date(&self, date: DateTime<Utc>) -> Result<Vec<u8>, RenderError> {
        let white = Colour::rgba(255, 255, 255, 255);
        self.rasterize_svg(&caption_svg(&[(format_date(date), white)]))
    }

    fn render_top_placers(&self, placers: &[Placer]) -> Result<Vec<u8>, RenderError> {
        let lines: Vec<(String, Colour)> = placers
            .iter()
            .map(|placer| (format_placer_line(placer), placer.colour))
            .collect();
        self.rasterize_svg(&caption_svg(&lines))
    }

    fn render_canvas_control(
        &self,
        width: u32,
        height: u32,
        placers: &[u32],
        top_placers: &[Placer],
    ) -> Result<Vec<u8>, RenderError> {
        Self::check_pixels(width, height, placers.len())?;

        let colours: HashMap<u32, Colour> = top_placers
            .iter()
            .map(|placer| (placer.int_id, placer.colour))
            .collect();
        let image = RgbaImage::from_fn(width, height, |x, y| {
            let owner = placers[y as usize * width as usize + x as usize];
            let colour = colours.get(&owner).copied().unwrap_or(Colour::TRANSPARENT);
            Rgba(colour.channels())
        });
        Self::encode(image)
    }
}
