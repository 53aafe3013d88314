//! # Encoder motion vector frames

use crate::error::{Error, Result};
use bytemuck::{Pod, Zeroable};
use nalgebra as na;

/// Single macroblock motion vector, laid out the way the encoder emits it.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct MotionVector {
    pub dx: i8,
    pub dy: i8,
    /// Sum of absolute differences. Carried for layout only.
    _sad: u16,
}

impl MotionVector {
    pub const fn new(dx: i8, dy: i8) -> Self {
        Self { dx, dy, _sad: 0 }
    }

    /// Squared magnitude of the vector.
    pub fn magnitude_squared(&self) -> u32 {
        let (dx, dy) = (self.dx as i32, self.dy as i32);
        (dx * dx + dy * dy) as u32
    }

    /// Get the vector as a floating point displacement.
    pub fn to_vector(&self) -> na::Vector2<f32> {
        na::Vector2::new(self.dx as f32, self.dy as f32)
    }

    /// Magnitude of the vector, saturated to 8 bits.
    pub fn magnitude_u8(&self) -> u8 {
        self.to_vector().magnitude().min(u8::MAX as f32) as u8
    }
}

/// One encoded frame worth of macroblock motion vectors, in row-major order.
///
/// Each row contains `cols` entries, the last of which is the encoder's padding column.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MotionVectorFrame {
    vectors: Vec<MotionVector>,
    seq: u64,
}

impl MotionVectorFrame {
    /// Create a zero-motion frame of given grid size.
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            vectors: vec![MotionVector::default(); rows * cols],
            seq: 0,
        }
    }

    /// Copy a raw encoder buffer into an owned frame.
    ///
    /// The buffer must hold a whole number of 4-byte entries.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let entry = std::mem::size_of::<MotionVector>();

        if bytes.len() % entry != 0 {
            return Err(Error::format(format!(
                "motion vector buffer of {} bytes is not a multiple of {}",
                bytes.len(),
                entry
            )));
        }

        Ok(Self {
            vectors: bytemuck::pod_collect_to_vec(bytes),
            seq: 0,
        })
    }

    /// Get the raw encoder representation of the frame.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vectors)
    }

    pub fn as_slice(&self) -> &[MotionVector] {
        &self.vectors
    }

    pub fn as_mut_slice(&mut self) -> &mut [MotionVector] {
        &mut self.vectors
    }

    /// Submission order number, assigned when the frame is handed to an engine.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub(crate) fn set_seq(&mut self, seq: u64) {
        self.seq = seq;
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Set motion of the macroblock at `(x, y)`.
    ///
    /// # Arguments
    ///
    /// * `cols` - number of columns in the grid, including padding.
    /// * `x` - horizontal macroblock coordinate.
    /// * `y` - vertical macroblock coordinate.
    /// * `motion` - motion to set.
    pub fn set_motion(&mut self, cols: usize, x: usize, y: usize, motion: MotionVector) {
        self.vectors[y * cols + x] = motion;
    }
}

impl From<Vec<MotionVector>> for MotionVectorFrame {
    fn from(vectors: Vec<MotionVector>) -> Self {
        Self { vectors, seq: 0 }
    }
}
