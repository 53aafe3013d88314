//! # Motion magnitude diagnostic dumps

use crate::config::SEQ_PLACEHOLDER;
use crate::frame::MotionVector;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{GrayImage, ImageEncoder, ImageResult};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

/// Writes per-macroblock motion magnitude as 8-bit greyscale PNG images.
pub struct DebugVisualizer {
    template: String,
    buf: GrayImage,
}

impl DebugVisualizer {
    /// Create a new visualizer.
    ///
    /// # Arguments
    ///
    /// * `template` - output path, `{seq}` gets replaced with the sequence number.
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            buf: GrayImage::new(0, 0),
        }
    }

    /// Get the output path of a given dump.
    pub fn path(&self, seq: u64) -> PathBuf {
        self.template
            .replace(SEQ_PLACEHOLDER, &seq.to_string())
            .into()
    }

    /// Render the magnitude map into the internal buffer.
    ///
    /// The padding column is left out, the image is `(cols - 1) x rows`.
    pub fn render(&mut self, vectors: &[MotionVector], rows: usize, cols: usize) -> &GrayImage {
        let width = cols.saturating_sub(1) as u32;

        if self.buf.dimensions() != (width, rows as u32) {
            self.buf = GrayImage::new(width, rows as u32);
        }

        for (x, y, px) in self.buf.enumerate_pixels_mut() {
            px.0[0] = vectors
                .get(y as usize * cols + x as usize)
                .map(MotionVector::magnitude_u8)
                .unwrap_or_default();
        }

        &self.buf
    }

    /// Render and write a single dump, returning the path written to.
    pub fn dump(
        &mut self,
        vectors: &[MotionVector],
        rows: usize,
        cols: usize,
        seq: u64,
    ) -> ImageResult<PathBuf> {
        let path = self.path(seq);
        let img = self.render(vectors, rows, cols);

        let out = BufWriter::new(File::create(&path)?);
        // Dumps happen every frame, speed matters more than size.
        let encoder = PngEncoder::new_with_quality(out, CompressionType::Fast, FilterType::NoFilter);
        encoder.write_image(
            img.as_raw(),
            img.width(),
            img.height(),
            image::ExtendedColorType::L8,
        )?;

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_sequence() {
        let vis = DebugVisualizer::new("/tmp/dump-{seq}.png");
        assert_eq!(vis.path(7), PathBuf::from("/tmp/dump-7.png"));

        let vis = DebugVisualizer::new("/tmp/dump.png");
        assert_eq!(vis.path(7), PathBuf::from("/tmp/dump.png"));
    }

    #[test]
    fn renders_magnitudes_without_padding() {
        let (rows, cols) = (2, 3);
        let mut vectors = vec![MotionVector::default(); rows * cols];
        vectors[0] = MotionVector::new(3, 4);
        vectors[2] = MotionVector::new(100, 100);
        vectors[4] = MotionVector::new(-6, 8);

        let mut vis = DebugVisualizer::new("unused");
        let img = vis.render(&vectors, rows, cols);

        assert_eq!(img.dimensions(), (2, 2));
        assert_eq!(img.as_raw(), &vec![5, 0, 0, 10]);
    }

    #[test]
    fn writes_numbered_png() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("mv-{seq}.png");
        let mut vis = DebugVisualizer::new(template.to_string_lossy());

        let mut vectors = vec![MotionVector::default(); 3 * 5];
        vectors[6] = MotionVector::new(0, -20);

        let path = vis.dump(&vectors, 3, 5, 3).unwrap();
        assert_eq!(path, dir.path().join("mv-3.png"));

        let img = image::open(&path).unwrap().into_luma8();
        assert_eq!(img.dimensions(), (4, 3));
        assert_eq!(img.get_pixel(1, 1).0[0], 20);
        assert_eq!(img.get_pixel(0, 0).0[0], 0);
    }

    #[test]
    fn unwritable_path_errors() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("missing").join("mv.png");
        let mut vis = DebugVisualizer::new(template.to_string_lossy());

        assert!(vis.dump(&[MotionVector::default(); 2], 1, 2, 0).is_err());
    }
}
