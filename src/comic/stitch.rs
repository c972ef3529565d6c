//! Composite 4 to 6 panels into a single comic strip
//!
//! Panels fill a two-column grid left→right, top→bottom. Four panels make a
//! 1024×1024 square; five or six make a 1024×1536 portrait (a fifth panel
//! leaves the last cell empty). Each panel is scaled to exactly its cell.

use std::io::Cursor;

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, RgbaImage};

use crate::error::AppError;

pub const MIN_PANELS: usize = 4;
pub const MAX_PANELS: usize = 6;

const COLUMNS: u32 = 2;
const CANVAS_WIDTH: u32 = 1024;
const SQUARE_HEIGHT: u32 = 1024;
const PORTRAIT_HEIGHT: u32 = 1536;

/// Canvas and cell geometry for a given panel count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridLayout {
    pub panels: usize,
    pub cols: u32,
    pub rows: u32,
    pub width: u32,
    pub height: u32,
}

impl GridLayout {
    /// # Errors
    /// `Validation` unless `panels` is within 4..=6
    pub fn for_panels(panels: usize) -> Result<Self, AppError> {
        if !(MIN_PANELS..=MAX_PANELS).contains(&panels) {
            return Err(AppError::Validation(format!(
                "Expected JSON body with 'urls' array of {MIN_PANELS} to {MAX_PANELS} image URLs"
            )));
        }

        let rows = if panels == 4 { 2 } else { 3 };
        let height = if rows == 2 { SQUARE_HEIGHT } else { PORTRAIT_HEIGHT };

        Ok(Self {
            panels,
            cols: COLUMNS,
            rows,
            width: CANVAS_WIDTH,
            height,
        })
    }

    pub fn cell_width(&self) -> u32 {
        self.width / self.cols
    }

    pub fn cell_height(&self) -> u32 {
        self.height / self.rows
    }

    /// Top-left corner of the cell for panel `idx`
    pub fn cell_origin(&self, idx: usize) -> (u32, u32) {
        let idx = idx as u32;
        let col = idx % self.cols;
        let row = idx / self.cols;
        (col * self.cell_width(), row * self.cell_height())
    }
}

/// Decode, scale and place every panel, then encode the strip as PNG.
///
/// CPU-bound; call from `spawn_blocking`.
///
/// # Errors
/// - `Validation` for a bad panel count
/// - `Image` if a panel cannot be decoded
/// - `Internal` if the canvas cannot be encoded
pub fn stitch(panels: &[Vec<u8>]) -> Result<Vec<u8>, AppError> {
    let layout = GridLayout::for_panels(panels.len())?;
    let (cell_w, cell_h) = (layout.cell_width(), layout.cell_height());
    let mut canvas = RgbaImage::new(layout.width, layout.height);

    for (idx, bytes) in panels.iter().enumerate() {
        let panel = image::load_from_memory(bytes)
            .map_err(|e| AppError::Image(format!("panel {} could not be decoded: {e}", idx + 1)))?;
        let scaled = panel.resize_exact(cell_w, cell_h, FilterType::Triangle).to_rgba8();
        let (x, y) = layout.cell_origin(idx);
        imageops::replace(&mut canvas, &scaled, i64::from(x), i64::from(y));
    }

    let mut encoded = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(canvas)
        .write_to(&mut encoded, ImageFormat::Png)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to encode strip: {e}")))?;

    Ok(encoded.into_inner())
}
