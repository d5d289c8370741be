use std::fmt;
use std::fmt::Formatter;

use crate::error::{CascadeError, CascadeResult};
use crate::layout::pad::{PadLayout, Region};

/// Default foil start channels of the six-foil MIEZE setup.
pub const DEFAULT_FOIL_STARTS: [usize; 6] = [0, 16, 32, 64, 80, 96];

/// Layout of a time-of-flight (TOF) acquisition.
///
/// Embeds the frame geometry of a [`PadLayout`] and adds the foil multiplexing of the
/// time axis. Channel `c` of foil `f` lives in image `foil_start(f) + c`.
#[derive(Clone, Debug, PartialEq)]
pub struct TofLayout {
    pad: PadLayout,
    foil_starts: Vec<usize>,
    images_per_foil: usize,
    image_count: usize,
    pseudo_compression: bool,
    sum_first_and_last: bool,
    oscillation_count: f64,
}

impl Default for TofLayout {
    fn default() -> Self {
        TofLayout {
            pad: PadLayout::default(),
            foil_starts: DEFAULT_FOIL_STARTS.to_vec(),
            images_per_foil: 16,
            image_count: 128,
            pseudo_compression: false,
            sum_first_and_last: false,
            oscillation_count: 2.0,
        }
    }
}

impl TofLayout {
    /// Creates a layout with the given geometry and otherwise default settings.
    ///
    /// # Examples
    ///
    /// ```
    /// use cascore::layout::tof::TofLayout;
    ///
    /// let layout = TofLayout::with_geometry(64, 128, 196);
    /// assert_eq!(layout.sample_count(), 64 * 128 * 196);
    /// assert_eq!(layout.foil_count(), 6);
    /// ```
    pub fn with_geometry(image_width: usize, image_height: usize, image_count: usize) -> Self {
        TofLayout {
            pad: PadLayout::new(image_width, image_height),
            image_count,
            ..TofLayout::default()
        }
    }

    pub fn pad(&self) -> &PadLayout { &self.pad }
    pub fn image_width(&self) -> usize { self.pad.image_width() }
    pub fn image_height(&self) -> usize { self.pad.image_height() }
    pub fn foil_count(&self) -> usize { self.foil_starts.len() }
    pub fn foil_starts(&self) -> &[usize] { &self.foil_starts }
    pub fn images_per_foil(&self) -> usize { self.images_per_foil }
    pub fn image_count(&self) -> usize { self.image_count }
    pub fn pseudo_compression(&self) -> bool { self.pseudo_compression }
    pub fn sum_first_and_last(&self) -> bool { self.sum_first_and_last }
    pub fn oscillation_count(&self) -> f64 { self.oscillation_count }

    /// Start image of a foil, `None` if `foil` is out of range.
    pub fn foil_start(&self, foil: usize) -> Option<usize> {
        self.foil_starts.get(foil).copied()
    }

    /// Number of samples a raw TOF block with this layout holds.
    pub fn sample_count(&self) -> usize {
        self.pad.pixel_count() * self.image_count
    }

    pub fn set_image_width(&mut self, image_width: usize) { self.pad.set_image_width(image_width); }
    pub fn set_image_height(&mut self, image_height: usize) { self.pad.set_image_height(image_height); }
    pub fn set_images_per_foil(&mut self, images_per_foil: usize) { self.images_per_foil = images_per_foil; }
    pub fn set_image_count(&mut self, image_count: usize) { self.image_count = image_count; }
    pub fn set_pseudo_compression(&mut self, pseudo_compression: bool) { self.pseudo_compression = pseudo_compression; }
    pub fn set_sum_first_and_last(&mut self, sum_first_and_last: bool) { self.sum_first_and_last = sum_first_and_last; }
    pub fn set_oscillation_count(&mut self, oscillation_count: f64) { self.oscillation_count = oscillation_count; }

    /// Resizes the foil table and resets it to the built-in default starts.
    ///
    /// The default table only covers up to six foils, other counts are rejected and
    /// leave the layout untouched. Use [`TofLayout::set_foil_starts`] for those.
    ///
    /// # Arguments
    ///
    /// * `foil_count` - number of foils, `1..=6`
    ///
    /// # Examples
    ///
    /// ```
    /// use cascore::layout::tof::TofLayout;
    ///
    /// let mut layout = TofLayout::default();
    /// layout.set_foil_count(4).unwrap();
    /// assert_eq!(layout.foil_starts(), &[0, 16, 32, 64]);
    /// assert!(layout.set_foil_count(8).is_err());
    /// ```
    pub fn set_foil_count(&mut self, foil_count: usize) -> CascadeResult<()> {
        if foil_count == 0 || foil_count > DEFAULT_FOIL_STARTS.len() {
            return Err(CascadeError::UnsupportedFoilCount(foil_count));
        }
        self.foil_starts = DEFAULT_FOIL_STARTS[..foil_count].to_vec();
        Ok(())
    }

    /// Replaces the foil table, the foil count follows its length.
    pub fn set_foil_starts(&mut self, foil_starts: Vec<usize>) -> CascadeResult<()> {
        if foil_starts.is_empty() {
            return Err(CascadeError::UnsupportedFoilCount(0));
        }
        self.foil_starts = foil_starts;
        Ok(())
    }

    /// Sets the start image of one foil, out-of-range foils are ignored.
    pub fn set_foil_start(&mut self, foil: usize, start: usize) {
        if let Some(slot) = self.foil_starts.get_mut(foil) {
            *slot = start;
        }
    }

    pub fn validate_region(&self, region: &mut Region) {
        self.pad.validate_region(region);
    }

    /// Sanitizes TOF access arguments in place.
    ///
    /// The region is handled by [`PadLayout::validate_region`], the foil index is clamped to
    /// `[0, foil_count - 1]` and the channel index to `[0, images_per_foil - 1]`.
    /// Absent arguments are skipped.
    ///
    /// # Arguments
    ///
    /// * `region` - optional region of interest
    /// * `foil` - optional foil index
    /// * `channel` - optional time channel within the foil
    ///
    /// # Examples
    ///
    /// ```
    /// use cascore::layout::tof::TofLayout;
    ///
    /// let layout = TofLayout::default();
    /// let (mut foil, mut channel) = (9, -2);
    /// layout.validate_tof_indices(None, Some(&mut foil), Some(&mut channel));
    /// assert_eq!((foil, channel), (5, 0));
    /// ```
    pub fn validate_tof_indices(
        &self,
        region: Option<&mut Region>,
        foil: Option<&mut i32>,
        channel: Option<&mut i32>,
    ) {
        if let Some(region) = region {
            self.pad.validate_region(region);
        }
        if let Some(foil) = foil {
            let last = (self.foil_count() as i32 - 1).max(0);
            *foil = (*foil).clamp(0, last);
        }
        if let Some(channel) = channel {
            let last = (self.images_per_foil as i32 - 1).max(0);
            *channel = (*channel).clamp(0, last);
        }
    }
}

impl fmt::Display for TofLayout {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TofLayout({}x{}, images: {}, foils: {:?}, images per foil: {}, oscillations: {})",
            self.image_width(),
            self.image_height(),
            self.image_count,
            self.foil_starts,
            self.images_per_foil,
            self.oscillation_count
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout() {
        let layout = TofLayout::default();
        assert_eq!(layout.image_width(), 128);
        assert_eq!(layout.image_height(), 128);
        assert_eq!(layout.foil_count(), 6);
        assert_eq!(layout.foil_starts(), &DEFAULT_FOIL_STARTS);
        assert_eq!(layout.images_per_foil(), 16);
        assert_eq!(layout.image_count(), 128);
        assert!(!layout.pseudo_compression());
        assert!(!layout.sum_first_and_last());
        assert_eq!(layout.oscillation_count(), 2.0);
    }

    #[test]
    fn test_foil_start_out_of_range() {
        let layout = TofLayout::default();
        assert_eq!(layout.foil_start(3), Some(64));
        assert_eq!(layout.foil_start(6), None);
    }

    #[test]
    fn test_set_foil_count_rejects_unsupported() {
        let mut layout = TofLayout::default();
        assert!(matches!(layout.set_foil_count(0), Err(CascadeError::UnsupportedFoilCount(0))));
        assert!(matches!(layout.set_foil_count(7), Err(CascadeError::UnsupportedFoilCount(7))));
        assert_eq!(layout.foil_count(), 6);
    }

    #[test]
    fn test_set_foil_count_resets_offsets() {
        let mut layout = TofLayout::default();
        layout.set_foil_start(1, 40);
        layout.set_foil_count(2).unwrap();
        assert_eq!(layout.foil_starts(), &[0, 16]);
    }

    #[test]
    fn test_explicit_foil_starts() {
        let mut layout = TofLayout::default();
        layout.set_foil_starts(vec![0, 32, 64, 96, 128, 160, 192, 224]).unwrap();
        assert_eq!(layout.foil_count(), 8);
        layout.set_foil_start(8, 1);
        assert_eq!(layout.foil_start(7), Some(224));
        assert!(layout.set_foil_starts(Vec::new()).is_err());
    }

    #[test]
    fn test_validate_tof_indices_clamps_to_boundaries() {
        let layout = TofLayout::default();
        for raw in [-100, -1, 0, 3, 5, 6, 1000] {
            let mut foil = raw;
            let mut channel = raw;
            layout.validate_tof_indices(None, Some(&mut foil), Some(&mut channel));
            assert!((0..6).contains(&foil));
            assert!((0..16).contains(&channel));
            assert_eq!(foil, raw.clamp(0, 5));
            assert_eq!(channel, raw.clamp(0, 15));
        }
    }

    #[test]
    fn test_validate_tof_indices_delegates_region() {
        let layout = TofLayout::with_geometry(64, 128, 196);
        let mut roi = Region::new(80, 10, -4, 12);
        let mut foil = 2;
        layout.validate_tof_indices(Some(&mut roi), Some(&mut foil), None);
        assert_eq!(roi, Region::new(10, 64, 0, 12));
        assert_eq!(foil, 2);
    }

    #[test]
    fn test_validate_tof_indices_zero_images_per_foil() {
        let mut layout = TofLayout::default();
        layout.set_images_per_foil(0);
        let mut channel = 7;
        layout.validate_tof_indices(None, None, Some(&mut channel));
        assert_eq!(channel, 0);
    }
}
