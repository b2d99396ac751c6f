//! Where in the coremap a new run of frames goes.

use crate::config::PlacementPolicy;
use crate::mem::frame_table::CoreMapEntry;
use alloc::boxed::Box;
use core::ops::Range;

/// A placement algorithm for allocating frames.
pub trait PlacementAlgorithm: Send {
    /// Returns the frame numbers of a run of `frames_requested` free frames,
    /// or [`None`] if no such run exists. `frames_requested` is never zero.
    fn place(&mut self, core_map: &[CoreMapEntry], frames_requested: usize)
        -> Option<Range<usize>>;
}

pub fn for_policy(policy: PlacementPolicy) -> Box<dyn PlacementAlgorithm> {
    match policy {
        PlacementPolicy::FirstFit => Box::new(FirstFit),
        PlacementPolicy::NextFit => Box::new(NextFit::default()),
    }
}

/// Length of the free run starting at `start`, counting no further than
/// `limit` frames.
fn free_run(core_map: &[CoreMapEntry], start: usize, limit: usize) -> usize {
    core_map[start..]
        .iter()
        .take(limit)
        .take_while(|entry| !entry.is_allocated())
        .count()
}

#[derive(Default)]
pub struct NextFit {
    /// Frame number the next search starts from.
    position: usize,
}

pub struct FirstFit;

impl PlacementAlgorithm for NextFit {
    fn place(
        &mut self,
        core_map: &[CoreMapEntry],
        frames_requested: usize,
    ) -> Option<Range<usize>> {
        let total_frames = core_map.len();
        if total_frames == 0 {
            return None;
        }
        self.position %= total_frames;

        let mut start = self.position;
        let mut wrapped_around = false;

        while !(wrapped_around && start >= self.position) {
            if start + frames_requested > total_frames {
                // A second wrap would loop forever on requests that can
                // never fit.
                if wrapped_around {
                    break;
                }
                start = 0;
                wrapped_around = true;
                continue;
            }

            let run = free_run(core_map, start, frames_requested);
            if run == frames_requested {
                self.position = (start + run) % total_frames;
                return Some(start..start + run);
            }
            // Resume one past the allocated frame that ended the run.
            start += run + 1;
        }

        None
    }
}

impl PlacementAlgorithm for FirstFit {
    fn place(
        &mut self,
        core_map: &[CoreMapEntry],
        frames_requested: usize,
    ) -> Option<Range<usize>> {
        let mut start = 0;

        while start + frames_requested <= core_map.len() {
            let run = free_run(core_map, start, frames_requested);
            if run == frames_requested {
                return Some(start..start + run);
            }
            start += run + 1;
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Marks the frames in `range` as one allocated kernel run.
    fn fill_coremap_range(core_map: &mut [CoreMapEntry], range: Range<usize>) {
        let last = range.end - 1;
        for i in range {
            assert!(!core_map[i].is_allocated());
            core_map[i] = CoreMapEntry::kernel_frame(i != last);
        }
    }

    #[test]
    fn test_next_fit() {
        let mut core_map = [CoreMapEntry::FREE; 16];
        fill_coremap_range(&mut core_map, 1..4);
        fill_coremap_range(&mut core_map, 8..12);
        fill_coremap_range(&mut core_map, 14..16);

        // Frames left are 0, 4-7, 12-13 (inclusive)

        let mut algorithm = NextFit::default();
        assert_eq!(algorithm.place(&core_map, 4), Some(4..8));
        fill_coremap_range(&mut core_map, 4..8);

        // Searching resumes at 8, so frame 0 is passed over.
        assert_eq!(algorithm.place(&core_map, 1), Some(12..13));
        fill_coremap_range(&mut core_map, 12..13);

        assert_eq!(algorithm.place(&core_map, 2), None);
        assert_eq!(algorithm.place(&core_map, 1), Some(13..14));
        assert_eq!(algorithm.place(&core_map, 1), Some(0..1));
    }

    #[test]
    fn test_next_fit_wrap_around() {
        let mut core_map = [CoreMapEntry::FREE; 16];
        let mut algorithm = NextFit { position: 8 };
        fill_coremap_range(&mut core_map, 0..1);
        assert_eq!(algorithm.place(&core_map, 16), None);
        assert_eq!(algorithm.place(&core_map, 15), Some(1..16));
    }

    #[test]
    fn test_first_fit() {
        let mut core_map = [CoreMapEntry::FREE; 16];
        fill_coremap_range(&mut core_map, 2..4);
        fill_coremap_range(&mut core_map, 8..13);
        fill_coremap_range(&mut core_map, 15..16);

        // Frames left are 0-1, 4-7, 13-14 (inclusive)

        let mut algorithm = FirstFit;
        assert_eq!(algorithm.place(&core_map, 4), Some(4..8));
        fill_coremap_range(&mut core_map, 4..8);

        // If we want 2 frames, the algo should pick first fit, i.e. 0-1
        assert_eq!(algorithm.place(&core_map, 2), Some(0..2));
        fill_coremap_range(&mut core_map, 0..2);

        assert_eq!(algorithm.place(&core_map, 3), None);
    }

    #[test]
    fn empty_coremap_places_nothing() {
        assert_eq!(FirstFit.place(&[], 1), None);
        assert_eq!(NextFit::default().place(&[], 1), None);
    }
}
