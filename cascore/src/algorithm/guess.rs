use std::fmt;
use std::fmt::Formatter;
use itertools::iproduct;
use tracing::{error, warn};

use crate::error::{CascadeError, CascadeResult};

// side lengths and frame counts are searched in [2^6, 2^10)
const MIN_SHIFT: u32 = 6;
const MAX_SHIFT: u32 = 10;
const MIN_LEN: usize = 1 << MIN_SHIFT;
const MAX_LEN: usize = 1 << MAX_SHIFT;

/// Hardware configurations seen in practice, as `(width, height, image_count)`.
pub const KNOWN_CONFIGURATIONS: [(usize, usize, usize); 2] = [
    (64, 128, 196),
    (128, 128, 128),
];

/// Layout recovered from the size of a raw data block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GuessedLayout {
    pub image_width: usize,
    pub image_height: usize,
    /// Number of images, only set for TOF guesses.
    pub image_count: Option<usize>,
}

impl fmt::Display for GuessedLayout {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.image_count {
            Some(count) => write!(f, "{}x{}x{}", self.image_width, self.image_height, count),
            None => write!(f, "{}x{}", self.image_width, self.image_height),
        }
    }
}

/// Guesses the frame size of a PAD block holding `sample_count` pixels.
///
/// Tiers are tried in order and the first match wins: the known configurations, all
/// power-of-two side pairs, then every side pair in `[64, 1024)`.
///
/// # Examples
///
/// ```
/// use cascore::algorithm::guess::guess_pad_size;
///
/// assert_eq!(guess_pad_size(128 * 128), Some((128, 128)));
/// assert_eq!(guess_pad_size(256 * 64), Some((128, 128)));
/// assert_eq!(guess_pad_size(100 * 70), Some((70, 100)));
/// assert_eq!(guess_pad_size(7), None);
/// ```
pub fn guess_pad_size(sample_count: usize) -> Option<(usize, usize)> {
    let known = KNOWN_CONFIGURATIONS
        .iter()
        .find(|(width, height, _)| width * height == sample_count)
        .map(|&(width, height, _)| (width, height));
    if known.is_some() {
        return known;
    }

    let power_of_two = iproduct!(MIN_SHIFT..MAX_SHIFT, MIN_SHIFT..MAX_SHIFT)
        .map(|(i, j)| (1usize << i, 1usize << j))
        .find(|(width, height)| width * height == sample_count);
    if power_of_two.is_some() {
        return power_of_two;
    }

    // for a fixed width only one height can match, so the first width in ascending
    // order that divides the count with an in-range quotient is the answer
    (MIN_LEN..MAX_LEN)
        .filter(|width| sample_count % width == 0)
        .map(|width| (width, sample_count / width))
        .find(|(_, height)| (MIN_LEN..MAX_LEN).contains(height))
}

/// Guesses width, height and image count of an uncompressed TOF block.
///
/// Known configurations must match the full product. Otherwise image counts `2^6..2^10`
/// and then every count in `[64, 1024)` dividing `sample_count` are tried, accepting the
/// first one whose quotient has a PAD guess.
///
/// # Examples
///
/// ```
/// use cascore::algorithm::guess::guess_tof_size;
///
/// assert_eq!(guess_tof_size(64 * 128 * 196), Some((64, 128, 196)));
/// assert_eq!(guess_tof_size(128 * 128 * 256), Some((128, 512, 64)));
/// ```
pub fn guess_tof_size(sample_count: usize) -> Option<(usize, usize, usize)> {
    let known = KNOWN_CONFIGURATIONS
        .iter()
        .find(|(width, height, count)| width * height * count == sample_count)
        .copied();
    if known.is_some() {
        return known;
    }

    let search = |counts: &mut dyn Iterator<Item = usize>| {
        counts
            .filter(|&count| sample_count % count == 0)
            .find_map(|count| {
                guess_pad_size(sample_count / count).map(|(width, height)| (width, height, count))
            })
    };

    search(&mut (MIN_SHIFT..MAX_SHIFT).map(|shift| 1usize << shift))
        .or_else(|| search(&mut (MIN_LEN..MAX_LEN)))
}

/// Pure layout guess without diagnostics.
///
/// # Arguments
///
/// * `sample_count` - number of count elements in the raw block
/// * `is_tof` - whether the block carries a time axis
/// * `pseudo_compressed` - whether TOF data uses pseudo-compression
///
/// # Returns
///
/// * the guessed layout, `PseudoCompressedGuess` for pseudo-compressed TOF data or
///   `GuessExhausted` if no tier matched
pub fn guess_layout(sample_count: usize, is_tof: bool, pseudo_compressed: bool) -> CascadeResult<GuessedLayout> {
    match (is_tof, pseudo_compressed) {
        (true, true) => Err(CascadeError::PseudoCompressedGuess),
        (true, false) => guess_tof_size(sample_count)
            .map(|(image_width, image_height, count)| GuessedLayout {
                image_width,
                image_height,
                image_count: Some(count),
            })
            .ok_or(CascadeError::GuessExhausted { sample_count }),
        (false, _) => guess_pad_size(sample_count)
            .map(|(image_width, image_height)| GuessedLayout {
                image_width,
                image_height,
                image_count: None,
            })
            .ok_or(CascadeError::GuessExhausted { sample_count }),
    }
}

/// Layout guesser gated by the configuration's guessing flag, reporting every
/// attempt through `tracing`.
#[derive(Clone, Copy, Debug)]
pub struct LayoutGuesser {
    pub enabled: bool,
}

impl Default for LayoutGuesser {
    fn default() -> Self {
        LayoutGuesser { enabled: true }
    }
}

impl LayoutGuesser {
    pub fn new(enabled: bool) -> Self {
        LayoutGuesser { enabled }
    }

    /// Guesses a layout for `sample_count` elements.
    ///
    /// `first_call` only decides whether the introductory warning is emitted. The result is
    /// returned and never written anywhere, committing it is up to the caller.
    ///
    /// # Examples
    ///
    /// ```
    /// use cascore::algorithm::guess::LayoutGuesser;
    ///
    /// let guess = LayoutGuesser::default().guess(128 * 128, false, false, true).unwrap();
    /// assert_eq!((guess.image_width, guess.image_height), (128, 128));
    /// assert!(LayoutGuesser::new(false).guess(128 * 128, false, false, true).is_err());
    /// ```
    pub fn guess(
        &self,
        sample_count: usize,
        is_tof: bool,
        pseudo_compressed: bool,
        first_call: bool,
    ) -> CascadeResult<GuessedLayout> {
        if !self.enabled {
            let err = CascadeError::GuessDisabled;
            error!("{}", err);
            return Err(err);
        }

        if first_call {
            warn!(
                "Trying to guess the detector layout from a block of {} samples, please configure \
                 the loader correctly using the configuration file",
                sample_count
            );
        }

        match guess_layout(sample_count, is_tof, pseudo_compressed) {
            Ok(guess) => {
                warn!("Guessing image width: {}", guess.image_width);
                warn!("Guessing image height: {}", guess.image_height);
                if let Some(count) = guess.image_count {
                    warn!("Guessing image count: {}", count);
                }
                Ok(guess)
            }
            Err(err) => {
                error!("{}", err);
                Err(err)
            }
        }
    }
}
