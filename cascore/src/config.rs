use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::Deserialize;

use crate::algorithm::guess::{GuessedLayout, LayoutGuesser};
use crate::algorithm::sinus_fit::MinimizerSettings;
use crate::error::CascadeResult;
use crate::layout::tof::TofLayout;

/// Configuration shared by everything reading detector data.
///
/// Built once, from defaults or a JSON file, before data is processed. Readers borrow it,
/// the only mutation after construction is committing a guessed layout.
#[derive(Clone, Debug, PartialEq)]
pub struct LoaderConfig {
    pub layout: TofLayout,
    /// Allow guessing the layout from the size of a data block.
    pub guess_config: bool,
    pub minimizer: MinimizerSettings,
    /// Pixel block `[x, y]` aggregated for phase maps.
    pub phase_block_size: [usize; 2],
    /// Pixel block `[x, y]` aggregated for contrast maps.
    pub contrast_block_size: [usize; 2],
}

impl Default for LoaderConfig {
    fn default() -> Self {
        LoaderConfig {
            layout: TofLayout::default(),
            guess_config: true,
            minimizer: MinimizerSettings::default(),
            phase_block_size: [1, 2],
            contrast_block_size: [1, 2],
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TofFileSection {
    image_width: Option<usize>,
    image_height: Option<usize>,
    image_count: Option<usize>,
    foil_count: Option<usize>,
    foil_starts: Option<Vec<usize>>,
    images_per_foil: Option<usize>,
    pseudo_compression: Option<bool>,
    sum_first_and_last: Option<bool>,
    number_of_oscillations: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GraphSection {
    phase_block_size: Option<[usize; 2]>,
    contrast_block_size: Option<[usize; 2]>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    guess_config: Option<bool>,
    tof_file: TofFileSection,
    graphs: GraphSection,
    minimizer: Option<MinimizerSettings>,
}

impl ConfigFile {
    fn into_config(self) -> CascadeResult<LoaderConfig> {
        let mut config = LoaderConfig::default();
        let tof = self.tof_file;
        let layout = &mut config.layout;

        if let Some(width) = tof.image_width { layout.set_image_width(width); }
        if let Some(height) = tof.image_height { layout.set_image_height(height); }
        if let Some(count) = tof.image_count { layout.set_image_count(count); }
        if let Some(images) = tof.images_per_foil { layout.set_images_per_foil(images); }
        if let Some(pseudo) = tof.pseudo_compression { layout.set_pseudo_compression(pseudo); }
        if let Some(sum) = tof.sum_first_and_last { layout.set_sum_first_and_last(sum); }
        if let Some(oscillations) = tof.number_of_oscillations { layout.set_oscillation_count(oscillations); }

        match (tof.foil_starts, tof.foil_count) {
            (Some(starts), _) => layout.set_foil_starts(starts)?,
            // foils without explicit starts are spaced by two foil windows
            (None, Some(count)) => {
                let spacing = layout.images_per_foil() * 2;
                layout.set_foil_starts((0..count).map(|foil| foil * spacing).collect())?
            }
            (None, None) => {}
        }

        if let Some(guess) = self.guess_config { config.guess_config = guess; }
        if let Some(minimizer) = self.minimizer { config.minimizer = minimizer; }
        if let Some(block) = self.graphs.phase_block_size { config.phase_block_size = block; }
        if let Some(block) = self.graphs.contrast_block_size { config.contrast_block_size = block; }

        Ok(config)
    }
}

impl LoaderConfig {
    /// Parses a JSON configuration, missing keys keep their defaults.
    ///
    /// # Examples
    ///
    /// ```
    /// use cascore::config::LoaderConfig;
    ///
    /// let config = LoaderConfig::from_json_str(r#"{
    ///     "guess_config": false,
    ///     "tof_file": { "image_width": 64, "foil_count": 4, "images_per_foil": 8 },
    ///     "minimizer": { "algorithm": "simplex" }
    /// }"#).unwrap();
    /// assert!(!config.guess_config);
    /// assert_eq!(config.layout.image_width(), 64);
    /// assert_eq!(config.layout.foil_starts(), &[0, 16, 32, 48]);
    /// ```
    pub fn from_json_str(json: &str) -> CascadeResult<Self> {
        let file: ConfigFile = serde_json::from_str(json)?;
        file.into_config()
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> CascadeResult<Self> {
        let reader = BufReader::new(File::open(path)?);
        let file: ConfigFile = serde_json::from_reader(reader)?;
        file.into_config()
    }

    pub fn guesser(&self) -> LayoutGuesser {
        LayoutGuesser::new(self.guess_config)
    }

    /// Guesses the layout from a block size and commits it into `self.layout`.
    ///
    /// On failure the layout is left untouched.
    ///
    /// # Arguments
    ///
    /// * `sample_count` - number of count elements in the raw block
    /// * `is_tof` - whether the block carries a time axis
    /// * `pseudo_compressed` - whether TOF data uses pseudo-compression
    /// * `first_call` - emit the introductory diagnostic
    pub fn guess_from_size(
        &mut self,
        sample_count: usize,
        is_tof: bool,
        pseudo_compressed: bool,
        first_call: bool,
    ) -> CascadeResult<GuessedLayout> {
        let guess = self.guesser().guess(sample_count, is_tof, pseudo_compressed, first_call)?;

        self.layout.set_image_width(guess.image_width);
        self.layout.set_image_height(guess.image_height);
        if let Some(count) = guess.image_count {
            self.layout.set_image_count(count);
        }
        Ok(guess)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::sinus_fit::MinimizerAlgorithm;
    use crate::error::CascadeError;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = LoaderConfig::default();
        assert!(config.guess_config);
        assert_eq!(config.phase_block_size, [1, 2]);
        assert_eq!(config.contrast_block_size, [1, 2]);
        assert_eq!(config.layout, TofLayout::default());
        assert_eq!(config.minimizer, MinimizerSettings::default());
    }

    #[test]
    fn test_empty_json_keeps_defaults() {
        let config = LoaderConfig::from_json_str("{}").unwrap();
        assert_eq!(config, LoaderConfig::default());
    }

    #[test]
    fn test_full_json() {
        let json = r#"{
            "guess_config": false,
            "tof_file": {
                "image_width": 64,
                "image_height": 128,
                "image_count": 196,
                "foil_starts": [0, 20, 40],
                "images_per_foil": 20,
                "pseudo_compression": true,
                "sum_first_and_last": true,
                "number_of_oscillations": 1.5
            },
            "graphs": { "phase_block_size": [2, 2], "contrast_block_size": [4, 4] },
            "minimizer": { "tolerance": 0.1, "max_fcn": 200, "strategy": 0, "algorithm": "Minimize" }
        }"#;
        let config = LoaderConfig::from_json_str(json).unwrap();
        let layout = &config.layout;
        assert_eq!((layout.image_width(), layout.image_height(), layout.image_count()), (64, 128, 196));
        assert_eq!(layout.foil_starts(), &[0, 20, 40]);
        assert_eq!(layout.images_per_foil(), 20);
        assert!(layout.pseudo_compression());
        assert!(layout.sum_first_and_last());
        assert_eq!(layout.oscillation_count(), 1.5);
        assert_eq!(config.phase_block_size, [2, 2]);
        assert_eq!(config.contrast_block_size, [4, 4]);
        assert_eq!(config.minimizer.max_fcn, 200);
        assert_eq!(config.minimizer.strategy, 0);
        assert_eq!(config.minimizer.algorithm, MinimizerAlgorithm::Minimize);
    }

    #[test]
    fn test_invalid_json_is_reported() {
        assert!(matches!(LoaderConfig::from_json_str("{"), Err(CascadeError::Config(_))));
        assert!(matches!(
            LoaderConfig::from_json_str(r#"{"minimizer": {"algorithm": "newton"}}"#),
            Err(CascadeError::Config(_))
        ));
        assert!(matches!(
            LoaderConfig::from_json_str(r#"{"tof_file": {"foil_count": 0}}"#),
            Err(CascadeError::UnsupportedFoilCount(0))
        ));
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"tof_file": {{"image_height": 256}}}}"#).unwrap();
        let config = LoaderConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.layout.image_height(), 256);

        assert!(matches!(
            LoaderConfig::from_json_file("/nonexistent/cascade.json"),
            Err(CascadeError::Io(_))
        ));
    }

    #[test]
    fn test_guess_commits_tof_layout() {
        let mut config = LoaderConfig::default();
        let guess = config.guess_from_size(64 * 128 * 196, true, false, true).unwrap();
        assert_eq!(guess.image_count, Some(196));
        assert_eq!(config.layout.image_width(), 64);
        assert_eq!(config.layout.image_height(), 128);
        assert_eq!(config.layout.image_count(), 196);
    }

    #[test]
    fn test_guess_commits_pad_layout() {
        let mut config = LoaderConfig::default();
        config.layout.set_image_count(77);
        config.guess_from_size(128 * 128, false, false, true).unwrap();
        assert_eq!(config.layout.image_width(), 128);
        assert_eq!(config.layout.image_height(), 128);
        assert_eq!(config.layout.image_count(), 77);
    }

    #[test]
    fn test_failed_guess_leaves_layout_unchanged() {
        let mut config = LoaderConfig::default();
        config.layout.set_image_width(32);
        let before = config.layout.clone();

        assert!(matches!(
            config.guess_from_size(1_000_003, true, false, true),
            Err(CascadeError::GuessExhausted { .. })
        ));
        assert!(config.guess_from_size(65537, false, false, false).is_err());
        assert_eq!(config.layout, before);

        config.guess_config = false;
        assert!(matches!(
            config.guess_from_size(128 * 128, false, false, true),
            Err(CascadeError::GuessDisabled)
        ));
        assert_eq!(config.layout, before);
    }
}
