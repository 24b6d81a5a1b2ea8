//! Link budget and reception probability calculations.
//!
//! Contains helpers for:
//! - Free-space path loss with a cached wavelength-dependent constant
//! - Per-path gain accumulation (interaction coefficients, obstacle penetration)
//! - Coherent multipath combination and delay spread
//! - Signal strength, SNR and reception probability as Gaussian random variables
//!
//! Units:
//! - Power: dBm, gains and losses in dB (negative gain = loss)
//! - Distance: meters
//! - Time: seconds

use rand::Rng;
use rand_distr::StandardNormal;
use statrs::distribution::{ContinuousCDF, Normal};

use super::geometry;
use super::obstacle_world::ObstacleQuery;
use super::parameters::ChannelSettings;
use super::ray_path::{RayKind, RayPath};
use super::types::Line;

/// Speed of light in m/s.
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Signal strength reported when no path connects transmitter and receiver.
pub const NO_SIGNAL_DBM: f64 = -300.0;

/// Paths weaker than the strongest one by more than this are ignored.
pub const MULTIPATH_IGNORE_DB: f64 = 30.0;

/// Smallest linear magnitude converted back to dB.
const MIN_LINEAR_MAGNITUDE: f64 = 1e-30;

/// Gaussian estimate of the received signal strength.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalEstimate {
    pub mean_dbm: f64,
    pub variance_db: f64,
}

/// Gaussian estimate of the signal to interference-plus-noise ratio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SinrEstimate {
    pub mean_db: f64,
    pub variance_db: f64,
    /// Mean received signal strength the ratio was derived from.
    pub signal_dbm: f64,
}

/// Probability of receiving a packet together with the signal strength.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReceptionEstimate {
    pub probability: f64,
    pub signal_dbm: f64,
}

/// Gain and length of one extracted path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathGain {
    pub gain_db: f64,
    pub length: f64,
}

/// Result of combining all paths of a link.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Multipath {
    /// No path reached the receiver.
    NoLink,
    Combined {
        gain_db: f64,
        /// Largest excess delay among significant paths (s).
        delay_spread: f64,
        /// Amplitude-weighted RMS excess delay among significant paths (s).
        rms_delay_spread: f64,
    },
}

/// One path's contribution as seen by the combiner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalComponent {
    pub gain_db: f64,
    /// Path length difference to the strongest path (m).
    pub excess_length: f64,
    /// Phase relative to the strongest path, in units of π.
    pub phase_pi: f64,
    /// True if the component was too weak to take part.
    pub ignored: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MultipathCombination {
    pub result: Multipath,
    pub components: Vec<SignalComponent>,
}

/// Distance-independent part of the free-space path loss.
///
/// # Formula
///
/// ```text
/// C(λ) = 20 × log₁₀(λ) − 20 × log₁₀(4π)
/// ```
pub fn fspl_constant(wavelength: f64) -> f64 {
    20.0 * wavelength.log10() - 20.0 * (4.0 * std::f64::consts::PI).log10()
}

/// Free-space path loss as a (non-positive) gain in dB.
///
/// # Formula
///
/// ```text
/// FSPL(d) = min(0, C(λ) − 20 × log₁₀(d))
/// ```
///
/// # Parameters
///
/// - `distance`: Path length in meters
/// - `fspl_constant`: Value of [`fspl_constant`] for the configured wavelength
///
/// # Returns
///
/// Gain in dB, never positive. Distances inside the near field yield 0.
pub fn free_space_path_loss(distance: f64, fspl_constant: f64) -> f64 {
    (fspl_constant - 20.0 * distance.log10()).min(0.0)
}

/// Convert a gain in dB to a linear power ratio.
pub fn db_to_power_ratio(db: f64) -> f64 {
    10f64.powf(db / 10.0)
}

/// Convert a linear power ratio to dB.
pub fn power_ratio_to_db(ratio: f64) -> f64 {
    10.0 * ratio.log10()
}

/// Length of the part of `sub_path` running through the first obstacle found
/// at its start point.
fn penetration_length(sub_path: &Line, obstacles: &dyn ObstacleQuery) -> f64 {
    obstacles
        .obstacles_near(&sub_path.p1)
        .iter()
        .find_map(|obstacle| geometry::intersection_line(sub_path, obstacle))
        .map(|inside| inside.length())
        .unwrap_or(0.0)
}

/// Accumulates the gain of a single path.
///
/// Every interaction adds its coefficient; a refraction additionally adds
/// `obstacle_attenuation × penetration length`. Free-space loss is applied
/// either once on the total length or per straight run between reflections
/// and diffractions.
pub fn path_gain(path: &RayPath, settings: &ChannelSettings, obstacles: &dyn ObstacleQuery) -> PathGain {
    let mut gain = 0.0;
    let mut length = 0.0;
    let mut straight_length = 0.0;
    let per_ray_fspl = !settings.fspl_on_total_length;

    for (sub_path, kind) in path.sub_paths() {
        match kind {
            RayKind::Refraction => {
                gain += settings.refraction_coefficient;
            }
            RayKind::Reflection | RayKind::Diffraction => {
                gain += if kind == RayKind::Reflection { settings.reflection_coefficient } else { settings.diffraction_coefficient };
                if per_ray_fspl && straight_length > 0.0 {
                    gain += free_space_path_loss(straight_length, settings.fspl_constant);
                }
                straight_length = 0.0;
            }
            RayKind::Origin | RayKind::Destination => {}
        }

        let sub_length = sub_path.length();
        straight_length += sub_length;

        if kind == RayKind::Refraction {
            gain += settings.obstacle_attenuation * penetration_length(&sub_path, obstacles);
        }
        length += sub_length;
    }

    if per_ray_fspl && straight_length > 0.0 {
        gain += free_space_path_loss(straight_length, settings.fspl_constant);
    }
    if settings.fspl_on_total_length {
        gain += free_space_path_loss(length, settings.fspl_constant);
    }

    PathGain { gain_db: gain, length }
}

/// Coherently combines path contributions.
///
/// The strongest path is the phase reference. Paths more than
/// [`MULTIPATH_IGNORE_DB`] below it are ignored; the others are summed as
/// `10^(g/10) · cos(2π · (Δl mod λ) / λ)`.
///
/// # Returns
///
/// [`Multipath::NoLink`] when `paths` is empty, otherwise the combined gain
/// and delay spreads, together with a report of every component.
pub fn combine_paths(paths: &[PathGain], wavelength: f64) -> MultipathCombination {
    let best = paths.iter().fold(None::<&PathGain>, |best, path| match best {
        Some(b) if path.gain_db <= b.gain_db => Some(b),
        _ => Some(path),
    });
    let Some(best) = best else {
        return MultipathCombination {
            result: Multipath::NoLink,
            components: Vec::new(),
        };
    };

    let mut total_linear = 0.0;
    let mut max_excess: f64 = 0.0;
    let mut weighted_delay_sq = 0.0;
    let mut total_weight = 0.0;
    let mut components = Vec::with_capacity(paths.len());

    for path in paths {
        let excess = (path.length - best.length).abs();
        let significant = path.gain_db > best.gain_db - MULTIPATH_IGNORE_DB;
        let modded = if significant { excess % wavelength } else { (path.length - best.length) % wavelength };

        if significant {
            max_excess = max_excess.max(excess);
            let power = db_to_power_ratio(path.gain_db);
            let delay = excess / SPEED_OF_LIGHT;
            weighted_delay_sq += power * delay * delay;
            total_weight += power;
            total_linear += power * (2.0 * std::f64::consts::PI * modded / wavelength).cos();
        }

        components.push(SignalComponent {
            gain_db: path.gain_db,
            excess_length: excess,
            phase_pi: 2.0 * modded / wavelength,
            ignored: !significant,
        });
    }

    let rms_delay_spread = if total_weight > 0.0 { (weighted_delay_sq / total_weight).sqrt() } else { 0.0 };

    MultipathCombination {
        result: Multipath::Combined {
            gain_db: power_ratio_to_db(total_linear.abs().max(MIN_LINEAR_MAGNITUDE)),
            delay_spread: max_excess / SPEED_OF_LIGHT,
            rms_delay_spread,
        },
        components,
    }
}

/// Sample of a zero-mean Gaussian with the given variance.
fn sample_gaussian<R: Rng + ?Sized>(rng: &mut R, variance: f64) -> f64 {
    let unit: f64 = rng.sample(StandardNormal);
    variance.max(0.0).sqrt() * unit
}

/// Received signal strength for a combined link.
///
/// `receivedPower = outputPower + systemGain + txAntennaGain + pathGain`.
/// With `apply_random` the system gain is drawn from its distribution and the
/// variance collapses to zero; otherwise the variance is carried along.
pub fn received_signal_strength<R: Rng + ?Sized>(settings: &ChannelSettings, multipath: &Multipath, tx_power_override: Option<f64>, rng: &mut R) -> SignalEstimate {
    let Multipath::Combined { gain_db, .. } = multipath else {
        return SignalEstimate {
            mean_dbm: NO_SIGNAL_DBM,
            variance_db: 0.0,
        };
    };

    let output_power = tx_power_override.unwrap_or(settings.output_power);
    let mut variance = 0.0;
    let mut system_gain = settings.system_gain_mean;
    if settings.apply_random {
        system_gain += sample_gaussian(rng, settings.system_gain_var);
    } else {
        variance += settings.system_gain_var;
    }

    SignalEstimate {
        mean_dbm: output_power + system_gain + settings.tx_antenna_gain + gain_db,
        variance_db: variance,
    }
}

/// SNR of a received signal against background noise or, if stronger, the
/// given interference level.
pub fn sinr<R: Rng + ?Sized>(settings: &ChannelSettings, signal: &SignalEstimate, interference_dbm: f64, rng: &mut R) -> SinrEstimate {
    let mut noise_mean = settings.bg_noise_mean.max(interference_dbm);
    let mut noise_variance = settings.bg_noise_var;
    if settings.apply_random {
        noise_mean += sample_gaussian(rng, noise_variance);
        noise_variance = 0.0;
    }

    SinrEstimate {
        mean_db: signal.mean_dbm + settings.rx_antenna_gain - noise_mean,
        variance_db: signal.variance_db + noise_variance,
        signal_dbm: signal.mean_dbm,
    }
}

/// Decision threshold on the SNR, raised when the receiver sensitivity
/// would otherwise be violated at the mean signal.
pub fn effective_threshold(settings: &ChannelSettings, sinr: &SinrEstimate) -> f64 {
    let noise_level = sinr.signal_dbm - sinr.mean_db;
    let sensitivity_threshold = settings.rx_sensitivity - noise_level;
    if settings.rx_sensitivity > noise_level && settings.snr_threshold < sensitivity_threshold {
        log::trace!("Weak signal ({:.2} dBm), raising SNR threshold to {:.2} dB", sinr.signal_dbm, sensitivity_threshold);
        sensitivity_threshold
    } else {
        settings.snr_threshold
    }
}

/// Probability that the SNR exceeds the decision threshold.
///
/// # Formula
///
/// ```text
/// P = 1 − Φ((threshold − μ) / σ)
/// ```
///
/// With zero variance the result is a hard step: exactly 0 or exactly 1.
pub fn reception_probability(settings: &ChannelSettings, sinr: &SinrEstimate) -> f64 {
    let threshold = effective_threshold(settings, sinr);
    let step = if threshold - sinr.mean_db > 0.0 { 0.0 } else { 1.0 };

    if sinr.variance_db == 0.0 {
        return step;
    }

    match Normal::new(sinr.mean_db, sinr.variance_db.sqrt()) {
        Ok(distribution) => (1.0 - distribution.cdf(threshold)).clamp(0.0, 1.0),
        Err(e) => {
            log::warn!("Invalid SNR distribution (mean {}, variance {}): {}", sinr.mean_db, sinr.variance_db, e);
            step
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::obstacle_world::ObstacleWorld;
    use crate::simulation::parameters::{Parameter, ParameterStore};
    use crate::simulation::types::{Point, Rect};
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn default_settings() -> ChannelSettings {
        ParameterStore::new().settings().unwrap()
    }

    fn straight_path(points: &[(f64, f64, RayKind)]) -> RayPath {
        let mut path = RayPath::new();
        for &(x, y, kind) in points.iter().rev() {
            path.push_front(Point::new(x, y), kind);
        }
        path
    }

    #[test]
    fn fspl_constant_for_default_wavelength() {
        // 20·log10(0.346) − 20·log10(4π) ≈ −31.20 dB
        assert!((fspl_constant(0.346) - (-31.20)).abs() < 0.01);
    }

    #[test]
    fn fspl_is_clamped_to_zero_at_short_range() {
        let c = fspl_constant(0.346);
        assert_eq!(free_space_path_loss(0.001, c), 0.0);
        assert_eq!(free_space_path_loss(0.0, c), 0.0);
        assert!(free_space_path_loss(10.0, c) < 0.0);
    }

    proptest! {
        #[test]
        fn fspl_never_increases_with_distance(d2 in 0.001f64..10_000.0, extra in 0.0f64..10_000.0) {
            let c = fspl_constant(0.346);
            let d1 = d2 + extra;
            prop_assert!(free_space_path_loss(d1, c) <= free_space_path_loss(d2, c));
        }
    }

    #[test]
    fn empty_path_set_is_no_link() {
        let combination = combine_paths(&[], 0.346);
        assert_eq!(combination.result, Multipath::NoLink);
        assert!(combination.components.is_empty());

        let mut rng = StdRng::seed_from_u64(1);
        let settings = default_settings();
        let signal = received_signal_strength(&settings, &combination.result, None, &mut rng);
        assert_eq!(signal.mean_dbm, NO_SIGNAL_DBM);
        assert_eq!(signal.variance_db, 0.0);
    }

    #[test]
    fn equal_paths_one_wavelength_apart_add_up() {
        let wavelength = 0.346;
        let paths = [
            PathGain { gain_db: -60.0, length: 10.0 },
            PathGain {
                gain_db: -60.0,
                length: 10.0 + wavelength,
            },
        ];
        let Multipath::Combined { gain_db, delay_spread, .. } = combine_paths(&paths, wavelength).result else {
            panic!("expected a link");
        };
        assert!(gain_db >= -60.0);
        assert!((gain_db - (-60.0 + 10.0 * 2f64.log10())).abs() < 1e-6);
        assert!((delay_spread - wavelength / SPEED_OF_LIGHT).abs() < 1e-15);
    }

    #[test]
    fn equal_paths_half_wavelength_apart_cancel() {
        let wavelength = 0.346;
        let paths = [
            PathGain { gain_db: -60.0, length: 10.0 },
            PathGain {
                gain_db: -60.0,
                length: 10.0 + wavelength / 2.0,
            },
        ];
        let Multipath::Combined { gain_db, .. } = combine_paths(&paths, wavelength).result else {
            panic!("expected a link");
        };
        assert!(gain_db <= -60.0);
        assert!(gain_db < -100.0);
    }

    #[test]
    fn weak_components_are_ignored() {
        let paths = [PathGain { gain_db: -50.0, length: 10.0 }, PathGain { gain_db: -90.0, length: 10.1 }];
        let combination = combine_paths(&paths, 0.346);
        assert!(!combination.components[0].ignored);
        assert!(combination.components[1].ignored);
        let Multipath::Combined { gain_db, delay_spread, rms_delay_spread } = combination.result else {
            panic!("expected a link");
        };
        assert!((gain_db - (-50.0)).abs() < 1e-9);
        assert_eq!(delay_spread, 0.0);
        assert_eq!(rms_delay_spread, 0.0);
    }

    #[test]
    fn refraction_adds_coefficient_and_penetration_loss() {
        let mut world = ObstacleWorld::new();
        world.add_obstacle(Rect::new(5.0, -5.0, 2.0, 10.0), false);
        let settings = default_settings();
        let path = straight_path(&[(0.0, 0.0, RayKind::Origin), (5.0, 0.0, RayKind::Refraction), (10.0, 0.0, RayKind::Destination)]);

        let gain = path_gain(&path, &settings, &world);
        let expected = settings.refraction_coefficient + settings.obstacle_attenuation * 2.0 + free_space_path_loss(10.0, settings.fspl_constant);
        assert!((gain.length - 10.0).abs() < 1e-12);
        assert!((gain.gain_db - expected).abs() < 1e-9);
    }

    #[test]
    fn per_ray_fspl_splits_at_reflections() {
        let mut store = ParameterStore::new();
        store.set(Parameter::RtFsplOnTotalLength, false.into()).unwrap();
        let settings = store.settings().unwrap();
        let world = ObstacleWorld::new();
        let path = straight_path(&[(0.0, 0.0, RayKind::Origin), (3.0, 4.0, RayKind::Reflection), (6.0, 0.0, RayKind::Destination)]);

        let gain = path_gain(&path, &settings, &world);
        let expected = settings.reflection_coefficient + 2.0 * free_space_path_loss(5.0, settings.fspl_constant);
        assert!((gain.gain_db - expected).abs() < 1e-9);
        assert!((gain.length - 10.0).abs() < 1e-12);
    }

    #[test]
    fn zero_variance_probability_is_a_step() {
        let settings = default_settings();
        let strong = SinrEstimate {
            mean_db: 20.0,
            variance_db: 0.0,
            signal_dbm: -80.0,
        };
        let weak = SinrEstimate {
            mean_db: 2.0,
            variance_db: 0.0,
            signal_dbm: -98.0,
        };
        assert_eq!(reception_probability(&settings, &strong), 1.0);
        assert_eq!(reception_probability(&settings, &weak), 0.0);
    }

    #[test]
    fn probability_with_variance_is_gaussian_tail() {
        let settings = default_settings();
        let at_threshold = SinrEstimate {
            mean_db: settings.snr_threshold,
            variance_db: 4.0,
            signal_dbm: -50.0,
        };
        assert!((reception_probability(&settings, &at_threshold) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn sensitivity_raises_threshold() {
        let settings = default_settings();
        // Noise at -150 dBm, signal -110 dBm: SNR 40 dB but below -100 dBm sensitivity
        let below_sensitivity = SinrEstimate {
            mean_db: 40.0,
            variance_db: 0.0,
            signal_dbm: -110.0,
        };
        assert_eq!(effective_threshold(&settings, &below_sensitivity), 50.0);
        assert_eq!(reception_probability(&settings, &below_sensitivity), 0.0);
    }

    #[test]
    fn random_draws_collapse_variance_and_replay_from_seed() {
        let mut store = ParameterStore::new();
        store.set(Parameter::ApplyRandom, true.into()).unwrap();
        let settings = store.settings().unwrap();
        let link = Multipath::Combined {
            gain_db: -60.0,
            delay_spread: 0.0,
            rms_delay_spread: 0.0,
        };

        let mut rng_a = StdRng::seed_from_u64(7);
        let mut rng_b = StdRng::seed_from_u64(7);
        let a = received_signal_strength(&settings, &link, None, &mut rng_a);
        let b = received_signal_strength(&settings, &link, None, &mut rng_b);
        assert_eq!(a, b);
        assert_eq!(a.variance_db, 0.0);

        let snr = sinr(&settings, &a, f64::MIN, &mut rng_a);
        assert_eq!(snr.variance_db, 0.0);
    }

    #[test]
    fn interference_above_noise_replaces_it() {
        let settings = default_settings();
        let mut rng = StdRng::seed_from_u64(3);
        let signal = SignalEstimate {
            mean_dbm: -70.0,
            variance_db: 4.0,
        };
        let quiet = sinr(&settings, &signal, -200.0, &mut rng);
        let noisy = sinr(&settings, &signal, -80.0, &mut rng);
        assert!((quiet.mean_db - 80.0).abs() < 1e-12);
        assert!((noisy.mean_db - 10.0).abs() < 1e-12);
        assert!((noisy.variance_db - 5.0).abs() < 1e-12);
    }
}
