use std::f64::consts::PI;
use std::fmt;
use std::fmt::Formatter;
use std::str::FromStr;

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF};

use crate::error::{CascadeError, CascadeResult};

/// Minimization algorithm used by [`fit_sinusoid`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MinimizerAlgorithm {
    /// Damped Gauss-Newton descent.
    Migrad,
    /// Migrad, falling back to the simplex when it does not converge.
    Minimize,
    /// Nelder-Mead downhill simplex.
    Simplex,
}

impl MinimizerAlgorithm {
    pub fn to_str(&self) -> &str {
        match self {
            MinimizerAlgorithm::Migrad => "migrad",
            MinimizerAlgorithm::Minimize => "minimize",
            MinimizerAlgorithm::Simplex => "simplex",
        }
    }
}

impl fmt::Display for MinimizerAlgorithm {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

impl FromStr for MinimizerAlgorithm {
    type Err = CascadeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "migrad" => Ok(MinimizerAlgorithm::Migrad),
            "minimize" => Ok(MinimizerAlgorithm::Minimize),
            "simplex" => Ok(MinimizerAlgorithm::Simplex),
            _ => Err(CascadeError::UnknownAlgorithm(s.to_string())),
        }
    }
}

impl TryFrom<String> for MinimizerAlgorithm {
    type Error = CascadeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MinimizerAlgorithm> for String {
    fn from(algorithm: MinimizerAlgorithm) -> Self {
        algorithm.to_str().to_string()
    }
}

/// Tuning of the sinusoid minimizer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinimizerSettings {
    /// Convergence is reached once the estimated distance to minimum drops below
    /// `0.002 * tolerance`.
    pub tolerance: f64,
    /// Maximum number of chi-square evaluations.
    pub max_fcn: usize,
    /// 0 takes parameter errors from the linearized normal matrix, higher values from the
    /// full chi-square Hessian at the minimum.
    pub strategy: u32,
    pub algorithm: MinimizerAlgorithm,
}

impl Default for MinimizerSettings {
    fn default() -> Self {
        MinimizerSettings {
            tolerance: 0.01,
            max_fcn: 1000,
            strategy: 2,
            algorithm: MinimizerAlgorithm::Migrad,
        }
    }
}

impl MinimizerSettings {
    fn edm_limit(&self) -> f64 {
        0.002 * self.tolerance
    }
}

/// Result of a fixed-frequency fit of `offset + amplitude * sin(frequency * i + phase)`.
#[derive(Clone, Debug, PartialEq)]
pub struct SinusoidFit {
    pub frequency: f64,
    /// Phase in `[0, 2π)`.
    pub phase: f64,
    /// Amplitude, never negative.
    pub amplitude: f64,
    pub offset: f64,
    pub phase_error: f64,
    pub amplitude_error: f64,
    pub offset_error: f64,
    pub chi2: f64,
    pub ndf: usize,
    pub evaluations: usize,
}

/// Contrast and phase of a fitted spin-echo signal.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Contrast {
    pub contrast: f64,
    pub phase: f64,
    pub contrast_error: f64,
    pub phase_error: f64,
}

impl SinusoidFit {
    /// Chi-square probability of the fit, `None` without degrees of freedom.
    pub fn probability(&self) -> Option<f64> {
        if self.ndf == 0 {
            return None;
        }
        ChiSquared::new(self.ndf as f64).ok().map(|dist| dist.sf(self.chi2))
    }

    /// Contrast `amplitude / offset` with first-order error propagation, treating amplitude
    /// and offset as independent.
    ///
    /// # Examples
    ///
    /// ```
    /// use cascore::algorithm::sinus_fit::SinusoidFit;
    ///
    /// let fit = SinusoidFit {
    ///     frequency: 0.1, phase: 1.0, amplitude: 50.0, offset: 200.0,
    ///     phase_error: 0.01, amplitude_error: 2.0, offset_error: 4.0,
    ///     chi2: 10.0, ndf: 13, evaluations: 3,
    /// };
    /// let contrast = fit.contrast().unwrap();
    /// assert_eq!(contrast.contrast, 0.25);
    /// ```
    pub fn contrast(&self) -> CascadeResult<Contrast> {
        let contrast = self.amplitude / self.offset;
        if !contrast.is_finite() {
            return Err(CascadeError::NonFiniteContrast { offset: self.offset });
        }

        let d_amplitude = self.amplitude_error / self.offset;
        let d_offset = self.amplitude * self.offset_error / (self.offset * self.offset);
        let contrast_error = (d_amplitude * d_amplitude + d_offset * d_offset).sqrt();

        Ok(Contrast { contrast, phase: self.phase, contrast_error, phase_error: self.phase_error })
    }
}

impl fmt::Display for SinusoidFit {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SinusoidFit(phase: {:.4} ± {:.4}, amplitude: {:.3} ± {:.3}, offset: {:.3} ± {:.3}, chi2/ndf: {:.3}/{})",
            self.phase, self.phase_error, self.amplitude, self.amplitude_error,
            self.offset, self.offset_error, self.chi2, self.ndf
        )
    }
}

// parameter vector is (phase, amplitude, offset)
struct SinusoidProblem {
    x: Vec<f64>,
    y: Vec<f64>,
    weights: Vec<f64>,
    frequency: f64,
    evaluations: usize,
}

impl SinusoidProblem {
    fn new(counts: &[u32], frequency: f64) -> Self {
        let y: Vec<f64> = counts.iter().map(|&c| c as f64).collect();
        // Poisson variance, empty channels weighted like a single count
        let weights = y.iter().map(|&c| 1.0 / c.max(1.0)).collect();
        let x = (0..counts.len()).map(|i| i as f64).collect();
        SinusoidProblem { x, y, weights, frequency, evaluations: 0 }
    }

    fn chi2(&mut self, p: &Vector3<f64>) -> f64 {
        self.evaluations += 1;
        let mut chi2 = 0.0;
        for i in 0..self.x.len() {
            let r = self.y[i] - (p[2] + p[1] * (self.frequency * self.x[i] + p[0]).sin());
            chi2 += self.weights[i] * r * r;
        }
        chi2
    }

    /// Returns `(JᵀWJ, JᵀWr, chi2)`, with the second derivative terms of the model added to
    /// the matrix when `full_hessian` is set.
    fn normal(&mut self, p: &Vector3<f64>, full_hessian: bool) -> (Matrix3<f64>, Vector3<f64>, f64) {
        self.evaluations += 1;
        let mut alpha = Matrix3::<f64>::zeros();
        let mut beta = Vector3::<f64>::zeros();
        let mut chi2 = 0.0;

        for i in 0..self.x.len() {
            let theta = self.frequency * self.x[i] + p[0];
            let (sin, cos) = theta.sin_cos();
            let r = self.y[i] - (p[2] + p[1] * sin);
            let w = self.weights[i];
            let jac = Vector3::new(p[1] * cos, sin, 1.0);

            alpha += w * jac * jac.transpose();
            beta += w * r * jac;
            chi2 += w * r * r;

            if full_hessian {
                alpha[(0, 0)] += w * r * p[1] * sin;
                alpha[(0, 1)] -= w * r * cos;
                alpha[(1, 0)] -= w * r * cos;
            }
        }
        (alpha, beta, chi2)
    }

    /// Linear least squares on `offset + a sin(ωi) + b cos(ωi)`.
    fn start_values(&self) -> Vector3<f64> {
        let mut alpha = Matrix3::<f64>::zeros();
        let mut beta = Vector3::<f64>::zeros();
        for i in 0..self.x.len() {
            let (sin, cos) = (self.frequency * self.x[i]).sin_cos();
            let basis = Vector3::new(sin, cos, 1.0);
            alpha += self.weights[i] * basis * basis.transpose();
            beta += self.weights[i] * self.y[i] * basis;
        }

        match alpha.cholesky().map(|chol| chol.solve(&beta)) {
            Some(c) => Vector3::new(c[1].atan2(c[0]), c[0].hypot(c[1]), c[2]),
            None => {
                let max = self.y.iter().cloned().fold(f64::MIN, f64::max);
                let min = self.y.iter().cloned().fold(f64::MAX, f64::min);
                let mean = self.y.iter().sum::<f64>() / self.y.len() as f64;
                Vector3::new(0.0, 0.5 * (max - min), mean)
            }
        }
    }
}

fn estimated_distance(alpha: &Matrix3<f64>, beta: &Vector3<f64>) -> Option<f64> {
    alpha.cholesky().map(|chol| beta.dot(&chol.solve(beta)))
}

fn migrad(problem: &mut SinusoidProblem, start: Vector3<f64>, settings: &MinimizerSettings) -> CascadeResult<Vector3<f64>> {
    let mut p = start;
    let mut lambda = 1e-3;
    let (mut alpha, mut beta, mut chi2) = problem.normal(&p, false);

    loop {
        if let Some(edm) = estimated_distance(&alpha, &beta) {
            if edm < settings.edm_limit() {
                return Ok(p);
            }
        }
        if problem.evaluations >= settings.max_fcn {
            return Err(CascadeError::FitDidNotConverge { evaluations: problem.evaluations });
        }

        let mut damped = alpha;
        for k in 0..3 {
            damped[(k, k)] *= 1.0 + lambda;
        }
        let step = match damped.cholesky() {
            Some(chol) => chol.solve(&beta),
            None => {
                lambda *= 10.0;
                problem.evaluations += 1;
                continue;
            }
        };

        let trial = p + step;
        let trial_chi2 = problem.chi2(&trial);
        if trial_chi2.is_finite() && trial_chi2 <= chi2 {
            p = trial;
            lambda = (lambda * 0.1).max(1e-12);
            (alpha, beta, chi2) = problem.normal(&p, false);
        } else {
            lambda *= 10.0;
        }
    }
}

fn simplex(problem: &mut SinusoidProblem, start: Vector3<f64>, settings: &MinimizerSettings) -> CascadeResult<Vector3<f64>> {
    let steps = [0.1, (0.1 * start[1].abs()).max(1.0), (0.1 * start[2].abs()).max(1.0)];

    let mut vertices: Vec<(Vector3<f64>, f64)> = Vec::with_capacity(4);
    let chi2 = problem.chi2(&start);
    vertices.push((start, chi2));
    for (k, step) in steps.iter().enumerate() {
        let mut vertex = start;
        vertex[k] += step;
        let chi2 = problem.chi2(&vertex);
        vertices.push((vertex, chi2));
    }

    loop {
        vertices.sort_by(|a, b| a.1.total_cmp(&b.1));
        if vertices[3].1 - vertices[0].1 < settings.edm_limit() {
            return Ok(vertices[0].0);
        }
        if problem.evaluations >= settings.max_fcn {
            return Err(CascadeError::FitDidNotConverge { evaluations: problem.evaluations });
        }

        let centroid = (vertices[0].0 + vertices[1].0 + vertices[2].0) / 3.0;
        let worst = vertices[3];

        let reflected = centroid + (centroid - worst.0);
        let reflected_chi2 = problem.chi2(&reflected);

        if reflected_chi2 < vertices[0].1 {
            let expanded = centroid + 2.0 * (centroid - worst.0);
            let expanded_chi2 = problem.chi2(&expanded);
            vertices[3] = if expanded_chi2 < reflected_chi2 {
                (expanded, expanded_chi2)
            } else {
                (reflected, reflected_chi2)
            };
        } else if reflected_chi2 < vertices[2].1 {
            vertices[3] = (reflected, reflected_chi2);
        } else {
            let contracted = centroid + 0.5 * (worst.0 - centroid);
            let contracted_chi2 = problem.chi2(&contracted);
            if contracted_chi2 < worst.1 {
                vertices[3] = (contracted, contracted_chi2);
            } else {
                let best = vertices[0].0;
                for vertex in vertices.iter_mut().skip(1) {
                    let shrunk = best + 0.5 * (vertex.0 - best);
                    *vertex = (shrunk, problem.chi2(&shrunk));
                }
            }
        }
    }
}

/// Fits `offset + amplitude * sin(frequency * i + phase)` to a count histogram at a fixed
/// frequency.
///
/// Channels are weighted with their Poisson variance. Start values come from the linear
/// decomposition of the model, the chosen algorithm then minimizes chi-square.
///
/// # Arguments
///
/// * `counts` - counts per time channel
/// * `frequency` - angular frequency per channel
/// * `settings` - minimizer tuning
///
/// # Returns
///
/// * the fit, `EmptyHistogram` for an empty input or `FitDidNotConverge` if the minimizer
///   gave up or produced non-finite parameters
///
/// # Examples
///
/// ```
/// use std::f64::consts::PI;
/// use cascore::algorithm::sinus_fit::{fit_sinusoid, MinimizerSettings};
///
/// let frequency = 2.0 * PI / 16.0;
/// let counts: Vec<u32> = (0..16)
///     .map(|i| (100.0 + 40.0 * (frequency * i as f64 + 0.5).sin()).round() as u32)
///     .collect();
/// let fit = fit_sinusoid(&counts, frequency, &MinimizerSettings::default()).unwrap();
/// assert!((fit.amplitude - 40.0).abs() < 1.0);
/// assert!((fit.offset - 100.0).abs() < 1.0);
/// ```
pub fn fit_sinusoid(counts: &[u32], frequency: f64, settings: &MinimizerSettings) -> CascadeResult<SinusoidFit> {
    if counts.is_empty() {
        return Err(CascadeError::EmptyHistogram);
    }
    if counts.len() < 3 {
        return Err(CascadeError::FitDidNotConverge { evaluations: 0 });
    }

    let mut problem = SinusoidProblem::new(counts, frequency);
    let start = problem.start_values();

    let p = match settings.algorithm {
        MinimizerAlgorithm::Migrad => migrad(&mut problem, start, settings)?,
        MinimizerAlgorithm::Simplex => simplex(&mut problem, start, settings)?,
        MinimizerAlgorithm::Minimize => match migrad(&mut problem, start, settings) {
            Ok(p) => p,
            Err(_) => {
                problem.evaluations = 0;
                simplex(&mut problem, start, settings)?
            }
        },
    };

    let (approx, _, chi2) = problem.normal(&p, false);
    let covariance = if settings.strategy > 0 {
        let (full, _, _) = problem.normal(&p, true);
        full.cholesky().map(|chol| chol.inverse()).or_else(|| approx.try_inverse())
    } else {
        approx.try_inverse()
    };
    let covariance = covariance.ok_or(CascadeError::FitDidNotConverge { evaluations: problem.evaluations })?;

    let errors = Vector3::new(covariance[(0, 0)], covariance[(1, 1)], covariance[(2, 2)]).map(|v| v.abs().sqrt());
    if p.iter().chain(errors.iter()).any(|v| !v.is_finite()) {
        return Err(CascadeError::FitDidNotConverge { evaluations: problem.evaluations });
    }

    let (mut phase, mut amplitude) = (p[0], p[1]);
    if amplitude < 0.0 {
        amplitude = -amplitude;
        phase += PI;
    }

    Ok(SinusoidFit {
        frequency,
        phase: phase.rem_euclid(2.0 * PI),
        amplitude,
        offset: p[2],
        phase_error: errors[0],
        amplitude_error: errors[1],
        offset_error: errors[2],
        chi2,
        ndf: counts.len() - 3,
        evaluations: problem.evaluations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn synthetic(width: usize, oscillations: f64, offset: f64, amplitude: f64, phase: f64) -> (Vec<u32>, f64) {
        let frequency = oscillations * 2.0 * PI / width as f64;
        let counts = (0..width)
            .map(|i| (offset + amplitude * (frequency * i as f64 + phase).sin()).round() as u32)
            .collect();
        (counts, frequency)
    }

    fn phase_distance(a: f64, b: f64) -> f64 {
        let d = (a - b).rem_euclid(2.0 * PI);
        d.min(2.0 * PI - d)
    }

    #[test]
    fn test_algorithm_from_str() {
        assert_eq!("MIGRAD".parse::<MinimizerAlgorithm>().unwrap(), MinimizerAlgorithm::Migrad);
        assert_eq!("Minimize".parse::<MinimizerAlgorithm>().unwrap(), MinimizerAlgorithm::Minimize);
        assert_eq!("simplex".parse::<MinimizerAlgorithm>().unwrap(), MinimizerAlgorithm::Simplex);
        assert!(matches!(
            "fumili".parse::<MinimizerAlgorithm>(),
            Err(CascadeError::UnknownAlgorithm(_))
        ));
    }

    #[test]
    fn test_default_settings() {
        let settings = MinimizerSettings::default();
        assert_eq!(settings.tolerance, 0.01);
        assert_eq!(settings.max_fcn, 1000);
        assert_eq!(settings.strategy, 2);
        assert_eq!(settings.algorithm, MinimizerAlgorithm::Migrad);
    }

    #[test]
    fn test_fit_recovers_synthetic_signal() {
        let (counts, frequency) = synthetic(64, 2.0, 500.0, 200.0, 1.0);
        let fit = fit_sinusoid(&counts, frequency, &MinimizerSettings::default()).unwrap();

        assert_abs_diff_eq!(fit.amplitude, 200.0, epsilon = 1.0);
        assert_abs_diff_eq!(fit.offset, 500.0, epsilon = 1.0);
        assert!(phase_distance(fit.phase, 1.0) < 0.01);
        assert_eq!(fit.frequency, frequency);
        assert_eq!(fit.ndf, 61);
        assert!(fit.amplitude_error > 0.0 && fit.offset_error > 0.0 && fit.phase_error > 0.0);
        assert!(fit.probability().unwrap() > 0.99);
    }

    #[test]
    fn test_fit_normalizes_negative_amplitude() {
        // start values report the phase in (-π, π]
        let (counts, frequency) = synthetic(32, 1.0, 300.0, 120.0, 4.0);
        let fit = fit_sinusoid(&counts, frequency, &MinimizerSettings::default()).unwrap();
        assert!(fit.amplitude > 0.0);
        assert!((0.0..2.0 * PI).contains(&fit.phase));
        assert!(phase_distance(fit.phase, 4.0) < 0.02);
    }

    #[test]
    fn test_algorithms_agree() {
        let (counts, frequency) = synthetic(48, 3.0, 250.0, 80.0, 2.5);
        let migrad = fit_sinusoid(&counts, frequency, &MinimizerSettings::default()).unwrap();

        for algorithm in [MinimizerAlgorithm::Simplex, MinimizerAlgorithm::Minimize] {
            let settings = MinimizerSettings { algorithm, ..MinimizerSettings::default() };
            let fit = fit_sinusoid(&counts, frequency, &settings).unwrap();
            assert_abs_diff_eq!(fit.amplitude, migrad.amplitude, epsilon = 0.1);
            assert_abs_diff_eq!(fit.offset, migrad.offset, epsilon = 0.1);
            assert!(phase_distance(fit.phase, migrad.phase) < 0.01);
        }
    }

    #[test]
    fn test_strategy_zero_errors_close_to_full_hessian() {
        let (counts, frequency) = synthetic(64, 2.0, 1000.0, 300.0, 0.3);
        let full = fit_sinusoid(&counts, frequency, &MinimizerSettings::default()).unwrap();
        let settings = MinimizerSettings { strategy: 0, ..MinimizerSettings::default() };
        let approx = fit_sinusoid(&counts, frequency, &settings).unwrap();

        // residuals are rounding noise only, both error estimates nearly coincide
        assert_abs_diff_eq!(full.amplitude_error, approx.amplitude_error, epsilon = 0.05 * approx.amplitude_error);
        assert_abs_diff_eq!(full.offset_error, approx.offset_error, epsilon = 0.05 * approx.offset_error);
    }

    #[test]
    fn test_fit_with_noise() {
        let mut rng = StdRng::seed_from_u64(42);
        let frequency = 2.0 * 2.0 * PI / 128.0;
        let counts: Vec<u32> = (0..128)
            .map(|i| {
                let ideal = 800.0 + 250.0 * (frequency * i as f64 + 1.7).sin();
                (ideal + rng.gen_range(-20.0..20.0)).round() as u32
            })
            .collect();

        let fit = fit_sinusoid(&counts, frequency, &MinimizerSettings::default()).unwrap();
        assert_abs_diff_eq!(fit.amplitude, 250.0, epsilon = 10.0);
        assert_abs_diff_eq!(fit.offset, 800.0, epsilon = 10.0);
        assert!(phase_distance(fit.phase, 1.7) < 0.05);
    }

    #[test]
    fn test_fit_rejects_empty_and_tiny_input() {
        let settings = MinimizerSettings::default();
        assert!(matches!(fit_sinusoid(&[], 0.1, &settings), Err(CascadeError::EmptyHistogram)));
        assert!(matches!(
            fit_sinusoid(&[4, 5], 0.1, &settings),
            Err(CascadeError::FitDidNotConverge { .. })
        ));
    }

    #[test]
    fn test_fit_gives_up_without_evaluations() {
        let (counts, frequency) = synthetic(64, 2.0, 500.0, 200.0, 1.0);
        let settings = MinimizerSettings {
            algorithm: MinimizerAlgorithm::Simplex,
            max_fcn: 5,
            ..MinimizerSettings::default()
        };
        assert!(matches!(
            fit_sinusoid(&counts, frequency, &settings),
            Err(CascadeError::FitDidNotConverge { .. })
        ));
    }

    #[test]
    fn test_contrast_error_propagation() {
        let fit = SinusoidFit {
            frequency: 0.2,
            phase: 0.4,
            amplitude: 30.0,
            offset: 100.0,
            phase_error: 0.02,
            amplitude_error: 3.0,
            offset_error: 4.0,
            chi2: 12.0,
            ndf: 13,
            evaluations: 2,
        };
        let contrast = fit.contrast().unwrap();
        assert_abs_diff_eq!(contrast.contrast, 0.3, epsilon = 1e-12);
        // sqrt(0.03^2 + 0.012^2)
        assert_abs_diff_eq!(contrast.contrast_error, (0.0009f64 + 0.000144).sqrt(), epsilon = 1e-12);
        assert_eq!(contrast.phase, 0.4);
        assert_eq!(contrast.phase_error, 0.02);
    }

    #[test]
    fn test_contrast_zero_offset_fails() {
        let fit = SinusoidFit {
            frequency: 0.2,
            phase: 0.0,
            amplitude: 30.0,
            offset: 0.0,
            phase_error: 0.0,
            amplitude_error: 1.0,
            offset_error: 1.0,
            chi2: 0.0,
            ndf: 0,
            evaluations: 1,
        };
        assert!(matches!(fit.contrast(), Err(CascadeError::NonFiniteContrast { .. })));
        assert!(fit.probability().is_none());

        let flat = SinusoidFit { amplitude: 0.0, ..fit };
        assert!(matches!(flat.contrast(), Err(CascadeError::NonFiniteContrast { .. })));
    }

    #[test]
    fn test_settings_json_roundtrip() {
        let json = r#"{"tolerance": 0.1, "algorithm": "SIMPLEX"}"#;
        let settings: MinimizerSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.tolerance, 0.1);
        assert_eq!(settings.max_fcn, 1000);
        assert_eq!(settings.algorithm, MinimizerAlgorithm::Simplex);
        assert!(serde_json::from_str::<MinimizerSettings>(r#"{"algorithm": "newton"}"#).is_err());
    }
}
