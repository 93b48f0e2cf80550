//! # Hard stop stall detection

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::collections::VecDeque;

use util::maths;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Sliding window average of the speed of several disks.
///
/// A set of disks seeking a hard stop in the negative direction is stalled once the window of
/// every disk is full and averages to a non-negative speed. Waiting for full windows keeps a
/// single noisy sample from being taken as a stall.
#[derive(Debug, Clone)]
pub struct StallDetector {
    size: usize,
    windows: Vec<VecDeque<f64>>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl StallDetector {
    pub fn new(num_disks: usize, window_size: usize) -> Self {
        Self {
            size: window_size,
            windows: vec![VecDeque::with_capacity(window_size + 1); num_disks],
        }
    }

    /// Add one speed sample per disk, returns whether the disks are now stalled.
    pub fn push(&mut self, speeds: &[f64]) -> bool {
        for (window, speed) in self.windows.iter_mut().zip(speeds.iter()) {
            window.push_back(*speed);
            while window.len() > self.size {
                window.pop_front();
            }
        }

        self.is_stalled()
    }

    pub fn is_stalled(&self) -> bool {
        self.size > 0 && (0..self.windows.len()).all(|i| self.is_disk_stalled(i))
    }

    pub fn is_disk_stalled(&self, disk: usize) -> bool {
        match self.windows.get(disk) {
            Some(w) if w.len() >= self.size => self.average(disk).map_or(false, |a| a >= 0.0),
            _ => false,
        }
    }

    /// Average speed in the window of a disk, `None` if it has no samples.
    pub fn average(&self, disk: usize) -> Option<f64> {
        let window: Vec<f64> = self.windows.get(disk)?.iter().copied().collect();
        maths::mean(&window)
    }

    /// Indexes of the disks which are not stalled yet.
    pub fn moving(&self) -> Vec<usize> {
        (0..self.windows.len())
            .filter(|i| !self.is_disk_stalled(*i))
            .collect()
    }

    pub fn clear(&mut self) {
        for w in self.windows.iter_mut() {
            w.clear();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_needs_full_window() {
        let mut det = StallDetector::new(3, 10);

        for _ in 0..9 {
            assert!(!det.push(&[0.0, 0.0, 0.0]));
        }
        assert!(det.push(&[0.0, 0.0, 0.0]));
    }

    #[test]
    fn test_noisy_negative_sample() {
        let mut det = StallDetector::new(1, 10);
        let samples = [0.5, 0.3, 0.4, -1.0, 0.6, 0.2, 0.5, 0.4, 0.3, 0.5];

        for s in samples[..9].iter() {
            assert!(!det.push(&[*s]));
        }
        assert!(det.push(&[samples[9]]));
        assert!(det.average(0).unwrap() > 0.0);
    }

    #[test]
    fn test_single_spike_while_moving() {
        let mut det = StallDetector::new(1, 10);

        for _ in 0..20 {
            assert!(!det.push(&[-50.0]));
        }

        // One sample as fast the other way isn't enough to average out the motion
        assert!(!det.push(&[300.0]));
        for _ in 0..5 {
            assert!(!det.push(&[-50.0]));
        }
    }

    #[test]
    fn test_all_disks_required() {
        let mut det = StallDetector::new(2, 3);

        for _ in 0..5 {
            assert!(!det.push(&[0.0, -10.0]));
        }
        assert_eq!(det.moving(), vec![1]);

        assert!(!det.push(&[0.0, 0.0]));
        assert!(!det.push(&[0.0, 0.0]));
        assert!(det.push(&[0.0, 0.0]));
        assert!(det.moving().is_empty());

        det.clear();
        assert!(!det.is_stalled());
        assert_eq!(det.average(0), None);
    }
}
