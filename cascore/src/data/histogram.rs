use std::f64::consts::PI;
use std::fmt;
use std::fmt::Formatter;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::algorithm::sinus_fit::{fit_sinusoid, Contrast, MinimizerSettings, SinusoidFit};
use crate::error::{CascadeError, CascadeResult};
use crate::layout::tof::TofLayout;

/// Counts per time channel of a single pixel or an aggregated region.
///
/// The count buffer is immutable and shared, cloning a histogram only bumps reference
/// counts of the buffer and the layout.
#[derive(Clone, Debug)]
pub struct TimeHistogram {
    counts: Arc<[u32]>,
    layout: Arc<TofLayout>,
}

impl TimeHistogram {
    /// Creates a new `TimeHistogram` owning `counts`.
    ///
    /// # Arguments
    ///
    /// * `counts` - counts per time channel
    /// * `layout` - layout providing the oscillation count of the signal
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use cascore::data::histogram::TimeHistogram;
    /// use cascore::layout::tof::TofLayout;
    ///
    /// let histogram = TimeHistogram::new(vec![5, 0, 9], Arc::new(TofLayout::default()));
    /// assert_eq!(histogram.width(), 3);
    /// assert_eq!(histogram.sum(), 14);
    /// ```
    pub fn new(counts: Vec<u32>, layout: Arc<TofLayout>) -> Self {
        TimeHistogram { counts: counts.into(), layout }
    }

    /// Creates a histogram viewing an already shared buffer.
    pub fn from_shared(counts: Arc<[u32]>, layout: Arc<TofLayout>) -> Self {
        TimeHistogram { counts, layout }
    }

    pub fn width(&self) -> usize { self.counts.len() }
    pub fn counts(&self) -> &[u32] { &self.counts }
    pub fn layout(&self) -> &TofLayout { &self.layout }

    /// Whether both histograms read the same count buffer.
    pub fn shares_buffer_with(&self, other: &TimeHistogram) -> bool {
        Arc::ptr_eq(&self.counts, &other.counts)
    }

    /// Count of `channel`, 0 outside `[0, width)`.
    pub fn value_at(&self, channel: usize) -> u32 {
        self.counts.get(channel).copied().unwrap_or(0)
    }

    /// Smallest count, 0 for an empty histogram.
    pub fn min_value(&self) -> u32 {
        self.counts.iter().copied().min().unwrap_or(0)
    }

    /// Largest count, 0 for an empty histogram.
    pub fn max_value(&self) -> u32 {
        self.counts.iter().copied().max().unwrap_or(0)
    }

    pub fn sum(&self) -> u64 {
        self.counts.iter().map(|&c| c as u64).sum()
    }

    pub fn is_lower_than(&self, total: u64) -> bool {
        self.sum() < total
    }

    /// Fixed fit frequency, `oscillation_count` periods across the histogram width.
    pub fn frequency(&self) -> f64 {
        self.layout.oscillation_count() * 2.0 * PI / self.width() as f64
    }

    /// Fits `offset + amplitude * sin(frequency * i + phase)` at the frequency fixed by the
    /// layout's oscillation count.
    ///
    /// # Arguments
    ///
    /// * `settings` - minimizer tuning
    ///
    /// # Returns
    ///
    /// * the fit, or `EmptyHistogram` if the histogram has no channels or no counts
    pub fn fit_sinusoid(&self, settings: &MinimizerSettings) -> CascadeResult<SinusoidFit> {
        if self.width() == 0 || self.is_lower_than(1) {
            debug!("Skipping sinusoid fit of histogram with {} channels and {} counts", self.width(), self.sum());
            return Err(CascadeError::EmptyHistogram);
        }

        fit_sinusoid(&self.counts, self.frequency(), settings).map_err(|err| {
            debug!("Sinusoid fit failed: {}", err);
            err
        })
    }

    /// Contrast and phase of the histogram's spin-echo signal.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::f64::consts::PI;
    /// use std::sync::Arc;
    /// use cascore::algorithm::sinus_fit::MinimizerSettings;
    /// use cascore::data::histogram::TimeHistogram;
    /// use cascore::layout::tof::TofLayout;
    ///
    /// let counts: Vec<u32> = (0..16)
    ///     .map(|i| (100.0 + 50.0 * (4.0 * PI * i as f64 / 16.0).sin()).round() as u32)
    ///     .collect();
    /// let histogram = TimeHistogram::new(counts, Arc::new(TofLayout::default()));
    /// let contrast = histogram.contrast(&MinimizerSettings::default()).unwrap();
    /// assert!((contrast.contrast - 0.5).abs() < 0.01);
    /// ```
    pub fn contrast(&self, settings: &MinimizerSettings) -> CascadeResult<Contrast> {
        self.fit_sinusoid(settings)?.contrast().map_err(|err| {
            debug!("{}", err);
            err
        })
    }

    /// Writes one `index<TAB>count` line per channel.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> CascadeResult<()> {
        for (index, count) in self.counts.iter().enumerate() {
            writeln!(writer, "{}\t{}", index, count)?;
        }
        Ok(())
    }

    /// Exports the histogram as text, see [`TimeHistogram::write_to`].
    pub fn save<P: AsRef<Path>>(&self, path: P) -> CascadeResult<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_to(&mut writer)?;
        writer.flush()?;
        Ok(())
    }
}

impl fmt::Display for TimeHistogram {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "TimeHistogram(channels: {}, sum: {})", self.width(), self.sum())
    }
}
