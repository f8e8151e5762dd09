//! Camera frame stacks and square binning into speckle channels.
//!
//! A frame is divided into `square × square` pixel bins; the mean pixel value
//! of one bin over time becomes one channel trace. Channel ids are
//! `r{row}c{col}` in bin units.

use tracing::info;

use crate::domain::{ChannelSet, IntensityTrace};
use crate::error::AnalysisError;

/// Decoded frames, each stored row-major as `height × width` pixel values.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameStack {
    pub width: usize,
    pub height: usize,
    pub frames: Vec<Vec<f64>>,
}

impl FrameStack {
    pub fn new(width: usize, height: usize, frames: Vec<Vec<f64>>) -> Result<Self, AnalysisError> {
        if width == 0 || height == 0 {
            return Err(AnalysisError::InvalidBinning(format!(
                "frame size must be non-zero, got {width}x{height}"
            )));
        }
        if frames.is_empty() {
            return Err(AnalysisError::InsufficientData("frame stack is empty".to_string()));
        }
        let Some(pixels) = width.checked_mul(height) else {
            return Err(AnalysisError::InvalidBinning(format!(
                "frame size {width}x{height} overflows the pixel count"
            )));
        };
        if let Some(i) = frames.iter().position(|f| f.len() != pixels) {
            return Err(AnalysisError::InvalidBinning(format!(
                "frame {i} has {} pixels, expected {pixels} ({width}x{height})",
                frames[i].len()
            )));
        }
        Ok(Self { width, height, frames })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Bin every frame into squares of `square` pixels per side.
///
/// Fails with `InvalidBinning` when the frame is not evenly divisible.
pub fn bin_squares(stack: &FrameStack, square: usize, frame_interval: f64) -> Result<ChannelSet, AnalysisError> {
    if square == 0 || stack.width % square != 0 || stack.height % square != 0 {
        return Err(AnalysisError::InvalidBinning(format!(
            "{}x{} frame is not divisible into {square}x{square} squares",
            stack.width, stack.height
        )));
    }
    let cols = stack.width / square;
    let rows = stack.height / square;
    let area = (square * square) as f64;

    let mut traces: Vec<IntensityTrace> = (0..rows * cols)
        .map(|b| IntensityTrace::new(format!("r{}c{}", b / cols, b % cols), Vec::with_capacity(stack.len())))
        .collect();

    for frame in &stack.frames {
        for (b, trace) in traces.iter_mut().enumerate() {
            let (row, col) = (b / cols, b % cols);
            let mut sum = 0.0;
            for y in row * square..(row + 1) * square {
                let line = &frame[y * stack.width..(y + 1) * stack.width];
                sum += line[col * square..(col + 1) * square].iter().sum::<f64>();
            }
            trace.samples.push(sum / area);
        }
    }

    info!(
        channels = traces.len(),
        frames = stack.len(),
        square,
        "binned frames into speckle channels"
    );
    ChannelSet::new(traces, frame_interval)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bins_average_their_pixels() {
        // 4x2 frame, squares of 2: two bins side by side.
        #[rustfmt::skip]
        let frame = vec![
            1.0, 3.0, 10.0, 10.0,
            5.0, 7.0, 20.0, 40.0,
        ];
        let stack = FrameStack::new(4, 2, vec![frame.clone(), frame]).unwrap();
        let set = bin_squares(&stack, 2, 0.01).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.channels()[0].id, "r0c0");
        assert_eq!(set.channels()[1].id, "r0c1");
        assert_eq!(set.channels()[0].samples, vec![4.0, 4.0]);
        assert_eq!(set.channels()[1].samples, vec![20.0, 20.0]);
        assert_eq!(set.frame_interval(), 0.01);
    }

    #[test]
    fn indivisible_frame_is_rejected() {
        let stack = FrameStack::new(5, 4, vec![vec![0.0; 20]]).unwrap();
        assert!(matches!(
            bin_squares(&stack, 2, 1.0).unwrap_err(),
            AnalysisError::InvalidBinning(_)
        ));
        assert!(bin_squares(&stack, 0, 1.0).is_err());
    }

    #[test]
    fn oversized_frame_dimensions_are_rejected() {
        let err = FrameStack::new(usize::MAX, 2, vec![vec![0.0; 4]]).unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidBinning(_)));
    }

    #[test]
    fn ragged_frames_are_rejected() {
        let err = FrameStack::new(2, 2, vec![vec![0.0; 4], vec![0.0; 3]]).unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidBinning(_)));
    }
}
