use thiserror::Error;

pub type CascadeResult<T> = Result<T, CascadeError>;

/// Errors raised while resolving detector layouts and extracting contrast.
#[derive(Error, Debug)]
pub enum CascadeError {
    /// Histogram has no channels or fewer than one count in total.
    #[error("histogram is empty or holds no counts")]
    EmptyHistogram,

    #[error("sinusoid fit did not converge after {evaluations} function calls")]
    FitDidNotConverge { evaluations: usize },

    #[error("contrast is not a finite number (offset = {offset})")]
    NonFiniteContrast { offset: f64 },

    #[error(
        "layout guessing is disabled; please configure the loader correctly using \
         the configuration file or enable \"guess_config\" for testing"
    )]
    GuessDisabled,

    #[error(
        "no detector layout found for {sample_count} samples; please configure the \
         loader correctly using the configuration file"
    )]
    GuessExhausted { sample_count: usize },

    #[error("layout guessing for pseudo-compressed TOF data is not implemented")]
    PseudoCompressedGuess,

    #[error("foil count {0} has no default start table, set explicit foil starts instead")]
    UnsupportedFoilCount(usize),

    #[error("layout expects {expected} samples but data holds {actual}")]
    LayoutMismatch { expected: usize, actual: usize },

    #[error("counts of image {image} summed over the region exceed the 32 bit count range")]
    CountOverflow { image: usize },

    #[error("raw buffer of {0} bytes is not a whole number of 32 bit words")]
    MisalignedBuffer(usize),

    #[error("unknown minimizer algorithm: \"{0}\"")]
    UnknownAlgorithm(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(#[from] serde_json::Error),
}
