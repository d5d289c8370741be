use std::path::Path;

use cascore::config::LoaderConfig;
use cascore::error::CascadeResult;
use cascore::layout::pad::PadLayout;
use cascore::layout::tof::TofLayout;
use tracing::info;

use crate::data::pad::PadData;
use crate::data::raw::{decode_counts, read_counts};
use crate::data::tof::TofData;

/// Turns raw detector blocks into TOF or PAD data.
///
/// An explicit layout always wins. Without one the configured layout is used when its size
/// matches the block, otherwise the layout is guessed and committed into the configuration
/// so later blocks of the same size resolve directly.
pub struct DataLoader {
    config: LoaderConfig,
    first_guess: bool,
}

impl DataLoader {
    pub fn new(config: LoaderConfig) -> Self {
        DataLoader { config, first_guess: true }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    fn guess(&mut self, sample_count: usize, is_tof: bool) -> CascadeResult<()> {
        let pseudo_compressed = self.config.layout.pseudo_compression();
        let first_call = std::mem::replace(&mut self.first_guess, false);
        self.config.guess_from_size(sample_count, is_tof, pseudo_compressed, first_call)?;
        Ok(())
    }

    /// Layout of a TOF block of `sample_count` counts.
    pub fn resolve_tof_layout(&mut self, sample_count: usize) -> CascadeResult<TofLayout> {
        if self.config.layout.sample_count() != sample_count {
            self.guess(sample_count, true)?;
        }
        Ok(self.config.layout.clone())
    }

    /// Frame geometry of a PAD block of `sample_count` counts.
    pub fn resolve_pad_layout(&mut self, sample_count: usize) -> CascadeResult<PadLayout> {
        if self.config.layout.pad().pixel_count() != sample_count {
            self.guess(sample_count, false)?;
        }
        Ok(self.config.layout.pad().clone())
    }

    /// Decodes a raw TOF block.
    ///
    /// # Arguments
    ///
    /// * `bytes` - raw little-endian block
    /// * `explicit` - layout to use instead of the configured or guessed one
    ///
    /// # Examples
    ///
    /// ```
    /// use cascore::config::LoaderConfig;
    /// use rustcascade::data::loader::DataLoader;
    ///
    /// let bytes = vec![0u8; 64 * 128 * 196 * 4];
    /// let mut loader = DataLoader::new(LoaderConfig::default());
    /// let data = loader.load_tof_bytes(&bytes, None).unwrap();
    /// assert_eq!(data.layout().image_width(), 64);
    /// assert_eq!(data.layout().image_count(), 196);
    /// ```
    pub fn load_tof_bytes(&mut self, bytes: &[u8], explicit: Option<&TofLayout>) -> CascadeResult<TofData> {
        let counts = decode_counts(bytes)?;
        self.tof_from_counts(counts, explicit)
    }

    pub fn load_tof_file<P: AsRef<Path>>(&mut self, path: P, explicit: Option<&TofLayout>) -> CascadeResult<TofData> {
        info!("Loading TOF data from {}", path.as_ref().display());
        let counts = read_counts(path)?;
        self.tof_from_counts(counts, explicit)
    }

    fn tof_from_counts(&mut self, counts: Vec<u32>, explicit: Option<&TofLayout>) -> CascadeResult<TofData> {
        let layout = match explicit {
            Some(layout) => layout.clone(),
            None => self.resolve_tof_layout(counts.len())?,
        };
        TofData::new(counts, layout)
    }

    pub fn load_pad_bytes(&mut self, bytes: &[u8], explicit: Option<&PadLayout>) -> CascadeResult<PadData> {
        let counts = decode_counts(bytes)?;
        self.pad_from_counts(counts, explicit)
    }

    pub fn load_pad_file<P: AsRef<Path>>(&mut self, path: P, explicit: Option<&PadLayout>) -> CascadeResult<PadData> {
        info!("Loading PAD data from {}", path.as_ref().display());
        let counts = read_counts(path)?;
        self.pad_from_counts(counts, explicit)
    }

    fn pad_from_counts(&mut self, counts: Vec<u32>, explicit: Option<&PadLayout>) -> CascadeResult<PadData> {
        let layout = match explicit {
            Some(layout) => layout.clone(),
            None => self.resolve_pad_layout(counts.len())?,
        };
        PadData::new(counts, layout)
    }
}
