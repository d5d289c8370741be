use std::fmt;
use std::fmt::Formatter;
use std::sync::Arc;

use cascore::data::histogram::TimeHistogram;
use cascore::error::{CascadeError, CascadeResult};
use cascore::layout::pad::Region;
use cascore::layout::tof::TofLayout;

/// Raw TOF block, `image_count` frames stored one after another, rows within a frame.
#[derive(Clone, Debug)]
pub struct TofData {
    layout: Arc<TofLayout>,
    counts: Arc<[u32]>,
}

impl TofData {
    /// Wraps decoded counts, failing if their number does not match the layout.
    ///
    /// # Examples
    ///
    /// ```
    /// use cascore::layout::tof::TofLayout;
    /// use rustcascade::data::tof::TofData;
    ///
    /// let layout = TofLayout::with_geometry(2, 2, 128);
    /// let data = TofData::new(vec![1; 2 * 2 * 128], layout.clone()).unwrap();
    /// assert_eq!(data.pixel_histogram(0, 1, 1).unwrap().sum(), 16);
    /// assert!(TofData::new(vec![1; 10], layout).is_err());
    /// ```
    pub fn new(counts: Vec<u32>, layout: TofLayout) -> CascadeResult<Self> {
        let expected = layout.sample_count();
        if counts.len() != expected {
            return Err(CascadeError::LayoutMismatch { expected, actual: counts.len() });
        }
        Ok(TofData { layout: Arc::new(layout), counts: counts.into() })
    }

    pub fn layout(&self) -> &TofLayout { &self.layout }
    pub fn counts(&self) -> &[u32] { &self.counts }

    fn frame(&self, image: usize) -> Option<&[u32]> {
        if image >= self.layout.image_count() {
            return None;
        }
        let size = self.layout.pad().pixel_count();
        Some(&self.counts[image * size..(image + 1) * size])
    }

    fn frame_sum(&self, image: usize, region: &Region) -> CascadeResult<u32> {
        let Some(frame) = self.frame(image) else {
            return Ok(0);
        };
        let width = self.layout.image_width();
        let mut sum = 0u64;
        for y in region.start_y as usize..region.end_y as usize {
            let row = &frame[y * width..(y + 1) * width];
            sum += row[region.start_x as usize..region.end_x as usize]
                .iter()
                .map(|&c| c as u64)
                .sum::<u64>();
        }
        u32::try_from(sum).map_err(|_| CascadeError::CountOverflow { image })
    }

    /// One frame of a foil, indices clamped into range.
    ///
    /// Channels whose image lies past the end of the block read as zeros.
    pub fn image(&self, foil: i32, channel: i32) -> Vec<u32> {
        let (mut foil, mut channel) = (foil, channel);
        self.layout.validate_tof_indices(None, Some(&mut foil), Some(&mut channel));

        let start = self.layout.foil_start(foil as usize).unwrap_or(0);
        match self.frame(start + channel as usize) {
            Some(frame) => frame.to_vec(),
            None => vec![0; self.layout.pad().pixel_count()],
        }
    }

    /// Time histogram of a foil summed over a region of interest.
    ///
    /// # Arguments
    ///
    /// * `foil` - foil index, clamped into range
    /// * `region` - region of interest, swapped and clamped into the frame
    ///
    /// # Returns
    ///
    /// * a histogram of `images_per_foil` channels, or `CountOverflow` if a channel's sum
    ///   does not fit a 32 bit count
    pub fn roi_histogram(&self, foil: i32, region: Region) -> CascadeResult<TimeHistogram> {
        let (mut foil, mut region) = (foil, region);
        self.layout.validate_tof_indices(Some(&mut region), Some(&mut foil), None);

        let start = self.layout.foil_start(foil as usize).unwrap_or(0);
        let counts = (0..self.layout.images_per_foil())
            .map(|channel| self.frame_sum(start + channel, &region))
            .collect::<CascadeResult<Vec<_>>>()?;
        Ok(TimeHistogram::new(counts, self.layout.clone()))
    }

    pub fn pixel_histogram(&self, foil: i32, x: i32, y: i32) -> CascadeResult<TimeHistogram> {
        self.roi_histogram(foil, Region::pixel(x, y))
    }

    /// Histogram over every image of the block, ignoring foils.
    pub fn total_histogram(&self, region: Region) -> CascadeResult<TimeHistogram> {
        let mut region = region;
        self.layout.validate_region(&mut region);
        let counts = (0..self.layout.image_count())
            .map(|image| self.frame_sum(image, &region))
            .collect::<CascadeResult<Vec<_>>>()?;
        Ok(TimeHistogram::new(counts, self.layout.clone()))
    }
}

impl fmt::Display for TofData {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "TofData({}, samples: {})", self.layout, self.counts.len())
    }
}
