use cascore::error::{CascadeError, CascadeResult};
use cascore::layout::pad::{PadLayout, Region};

/// Single positional frame.
#[derive(Clone, Debug)]
pub struct PadData {
    layout: PadLayout,
    counts: Vec<u32>,
}

impl PadData {
    pub fn new(counts: Vec<u32>, layout: PadLayout) -> CascadeResult<Self> {
        let expected = layout.pixel_count();
        if counts.len() != expected {
            return Err(CascadeError::LayoutMismatch { expected, actual: counts.len() });
        }
        Ok(PadData { layout, counts })
    }

    pub fn layout(&self) -> &PadLayout { &self.layout }
    pub fn counts(&self) -> &[u32] { &self.counts }

    /// Count at `(x, y)`, 0 outside the frame.
    pub fn value(&self, x: usize, y: usize) -> u32 {
        if x >= self.layout.image_width() || y >= self.layout.image_height() {
            return 0;
        }
        self.counts[y * self.layout.image_width() + x]
    }

    /// Total counts inside a region, the region is swapped and clamped first.
    pub fn roi_sum(&self, region: Region) -> u64 {
        let mut region = region;
        self.layout.validate_region(&mut region);
        let width = self.layout.image_width();

        (region.start_y as usize..region.end_y as usize)
            .flat_map(|y| (region.start_x as usize..region.end_x as usize).map(move |x| y * width + x))
            .map(|index| self.counts[index] as u64)
            .sum()
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().map(|&c| c as u64).sum()
    }
}
