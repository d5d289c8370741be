use std::fmt;
use std::fmt::Formatter;

/// Rectangular region of interest on the detector, end coordinates exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Region {
    pub start_x: i32,
    pub end_x: i32,
    pub start_y: i32,
    pub end_y: i32,
}

impl Region {
    /// Creates a new `Region`.
    ///
    /// # Arguments
    ///
    /// * `start_x` - first column
    /// * `end_x` - one past the last column
    /// * `start_y` - first row
    /// * `end_y` - one past the last row
    ///
    /// # Examples
    ///
    /// ```
    /// use cascore::layout::pad::Region;
    ///
    /// let roi = Region::new(0, 16, 0, 32);
    /// assert_eq!(roi.area(), 512);
    /// ```
    pub fn new(start_x: i32, end_x: i32, start_y: i32, end_y: i32) -> Self {
        Region { start_x, end_x, start_y, end_y }
    }

    /// Region covering exactly one pixel.
    pub fn pixel(x: i32, y: i32) -> Self {
        Region { start_x: x, end_x: x.saturating_add(1), start_y: y, end_y: y.saturating_add(1) }
    }

    pub fn width(&self) -> usize {
        (self.end_x - self.start_x).max(0) as usize
    }

    pub fn height(&self) -> usize {
        (self.end_y - self.start_y).max(0) as usize
    }

    pub fn area(&self) -> usize {
        self.width() * self.height()
    }

    pub fn is_empty(&self) -> bool {
        self.area() == 0
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Region(x: {}..{}, y: {}..{})", self.start_x, self.end_x, self.start_y, self.end_y)
    }
}

/// Geometry of a positional (PAD) detector frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PadLayout {
    pub image_width: usize,
    pub image_height: usize,
}

impl Default for PadLayout {
    fn default() -> Self {
        PadLayout { image_width: 128, image_height: 128 }
    }
}

impl PadLayout {
    pub fn new(image_width: usize, image_height: usize) -> Self {
        PadLayout { image_width, image_height }
    }

    pub fn image_width(&self) -> usize { self.image_width }
    pub fn image_height(&self) -> usize { self.image_height }

    pub fn set_image_width(&mut self, image_width: usize) { self.image_width = image_width; }
    pub fn set_image_height(&mut self, image_height: usize) { self.image_height = image_height; }

    /// Number of pixels in one frame.
    pub fn pixel_count(&self) -> usize {
        self.image_width * self.image_height
    }

    /// Sanitizes a region of interest in place.
    ///
    /// Inverted ranges are swapped first, then every coordinate is clamped to
    /// `[0, image_width]` / `[0, image_height]`. Never fails, the result may have zero area.
    ///
    /// # Arguments
    ///
    /// * `region` - the region to sanitize
    ///
    /// # Examples
    ///
    /// ```
    /// use cascore::layout::pad::{PadLayout, Region};
    ///
    /// let layout = PadLayout::new(128, 128);
    /// let mut roi = Region::new(200, -5, 10, 3);
    /// layout.validate_region(&mut roi);
    /// assert_eq!(roi, Region::new(0, 128, 3, 10));
    /// ```
    pub fn validate_region(&self, region: &mut Region) {
        if region.start_x > region.end_x {
            std::mem::swap(&mut region.start_x, &mut region.end_x);
        }
        if region.start_y > region.end_y {
            std::mem::swap(&mut region.start_y, &mut region.end_y);
        }

        let width = self.image_width as i32;
        let height = self.image_height as i32;

        region.start_x = region.start_x.clamp(0, width);
        region.end_x = region.end_x.clamp(0, width);
        region.start_y = region.start_y.clamp(0, height);
        region.end_y = region.end_y.clamp(0, height);
    }

    /// Region covering the full frame.
    pub fn full_region(&self) -> Region {
        Region::new(0, self.image_width as i32, 0, self.image_height as i32)
    }
}

impl fmt::Display for PadLayout {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "PadLayout({}x{})", self.image_width, self.image_height)
    }
}
