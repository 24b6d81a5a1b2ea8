//! Channel model: the query facade of the radio medium.
//!
//! Ties together the parameter store, the obstacle store, the visibility cache
//! and the ray tracer. A query runs:
//!
//! 1. ray tree construction from the transmitter
//! 2. path extraction towards the receiver
//! 3. per-path gain and coherent multipath combination
//! 4. signal strength, SNR and reception probability
//!
//! Randomized draws (when `apply_random` is set) come from the caller's
//! generator so runs can be replayed from a seed.

use std::fmt;

use rand::Rng;

use super::error::ChannelError;
use super::obstacle_world::ObstacleWorld;
use super::parameters::{ChannelSettings, Parameter, ParameterStore, ParameterValue};
use super::ray_path::RayPath;
use super::ray_tree::{PathOptions, RayTracer};
use super::signal_calculations::{
    self, Multipath, MultipathCombination, NO_SIGNAL_DBM, PathGain, ReceptionEstimate, SignalEstimate, SinrEstimate, SPEED_OF_LIGHT,
};
use super::types::{Line, PersistedConfig, PersistedObstacle, PersistedParameter, Point, Rect};
use super::visibility::VisibilityResolver;

/// Interference level meaning "no interference".
pub const NO_INTERFERENCE_DBM: f64 = f64::MIN;

/// What changed when observers are notified.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SettingsChange {
    Parameter(Parameter),
    Obstacles,
    ConfigLoaded,
    /// Requested through [`ChannelModel::notify_settings_changed`].
    Explicit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Everything reported for one transmitter/receiver pair. All values come
/// from a single ray trace and a single set of random draws.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkReport {
    pub signal: SignalEstimate,
    pub sinr: SinrEstimate,
    pub reception: ReceptionEstimate,
    pub multipath: Multipath,
    pub path_count: usize,
}

impl LinkReport {
    /// Amplitude-weighted RMS delay spread (s), zero without any path.
    pub fn rms_delay_spread(&self) -> f64 {
        match self.multipath {
            Multipath::Combined { rms_delay_spread, .. } => rms_delay_spread,
            Multipath::NoLink => 0.0,
        }
    }

    /// Largest excess delay among significant paths (s), zero without any path.
    pub fn delay_spread(&self) -> f64 {
        match self.multipath {
            Multipath::Combined { delay_spread, .. } => delay_spread,
            Multipath::NoLink => 0.0,
        }
    }
}

/// Rays and human-readable report of one traced transmission.
#[derive(Debug, Clone)]
pub struct TransmissionTrace {
    pub report: LinkReport,
    pub rays: Vec<Line>,
    pub log: String,
}

/// Paths and their combination for one transmitter/receiver pair.
struct LinkBudget {
    settings: ChannelSettings,
    paths: Vec<RayPath>,
    gains: Vec<PathGain>,
    combination: MultipathCombination,
}

type Observer = Box<dyn FnMut(SettingsChange)>;

pub struct ChannelModel {
    parameters: ParameterStore,
    obstacles: ObstacleWorld,
    visibility: VisibilityResolver,
    observers: Vec<(ObserverId, Observer)>,
    next_observer_id: u64,
}

impl Default for ChannelModel {
    fn default() -> Self {
        Self::new()
    }
}

fn validated_rect(index: usize, x: f64, y: f64, width: f64, height: f64) -> Result<Rect, ChannelError> {
    let reason = if ![x, y, width, height].iter().all(|v| v.is_finite()) {
        Some("coordinates must be finite")
    } else if width <= 0.0 || height <= 0.0 {
        Some("width and height must be positive")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(ChannelError::InvalidObstacle {
            index,
            reason: reason.to_string(),
        }),
        None => Ok(Rect::new(x, y, width, height)),
    }
}

impl LinkBudget {
    /// Signal, SINR and reception probability with one draw per random term.
    fn report<R: Rng + ?Sized>(&self, rng: &mut R, tx_power_override: Option<f64>, interference_dbm: f64) -> LinkReport {
        let multipath = self.combination.result;
        let signal = signal_calculations::received_signal_strength(&self.settings, &multipath, tx_power_override, rng);
        let sinr = signal_calculations::sinr(&self.settings, &signal, interference_dbm, rng);
        let reception = match multipath {
            Multipath::NoLink => ReceptionEstimate {
                probability: 0.0,
                signal_dbm: NO_SIGNAL_DBM,
            },
            Multipath::Combined { .. } => ReceptionEstimate {
                probability: signal_calculations::reception_probability(&self.settings, &sinr),
                signal_dbm: sinr.signal_dbm,
            },
        };

        LinkReport {
            signal,
            sinr,
            reception,
            multipath,
            path_count: self.paths.len(),
        }
    }
}

fn write_trace(out: &mut impl fmt::Write, source: Point, dest: Point, link: &LinkBudget, report: &LinkReport) -> fmt::Result {
    writeln!(out, "Transmission {} -> {}: {} paths", source, dest, link.paths.len())?;
    for (path, gain) in link.paths.iter().zip(&link.gains) {
        writeln!(out, "  {} (length {:.3} m, gain {:.3} dB)", path, gain.length, gain.gain_db)?;
    }

    for component in &link.combination.components {
        if component.ignored {
            writeln!(out, "  Ignoring component: {:.3} dB", component.gain_db)?;
        } else {
            writeln!(out, "  Signal component: {:.3} dB, phase {:.3} pi, excess {:.3} m", component.gain_db, component.phase_pi, component.excess_length)?;
        }
    }

    match report.multipath {
        Multipath::NoLink => writeln!(out, "  No link")?,
        Multipath::Combined {
            gain_db,
            delay_spread,
            rms_delay_spread,
        } => {
            writeln!(out, "  Total path gain: {:.3} dB", gain_db)?;
            writeln!(out, "  Delay spread: {:.3e} s ({:.3} m), RMS {:.3e} s", delay_spread, delay_spread * SPEED_OF_LIGHT, rms_delay_spread)?;
            writeln!(out, "  SNR: {:.3} dB (variance {:.3})", report.sinr.mean_db, report.sinr.variance_db)?;
        }
    }
    writeln!(out, "  Received signal strength: {:.3} dBm", report.reception.signal_dbm)?;
    writeln!(out, "  Reception probability: {:.4}", report.reception.probability)
}

impl ChannelModel {
    /// Model with default parameters and no obstacles.
    pub fn new() -> Self {
        Self {
            parameters: ParameterStore::new(),
            obstacles: ObstacleWorld::new(),
            visibility: VisibilityResolver::new(),
            observers: Vec::new(),
            next_observer_id: 0,
        }
    }

    // ---- Observers ----

    pub fn add_settings_observer(&mut self, observer: impl FnMut(SettingsChange) + 'static) -> ObserverId {
        let id = ObserverId(self.next_observer_id);
        self.next_observer_id += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    /// Returns false if the observer was not registered.
    pub fn remove_settings_observer(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(observer_id, _)| *observer_id != id);
        self.observers.len() != before
    }

    pub fn notify_settings_changed(&mut self) {
        self.notify(SettingsChange::Explicit);
    }

    fn notify(&mut self, change: SettingsChange) {
        log::debug!("Channel settings changed: {:?}", change);
        for (_, observer) in self.observers.iter_mut() {
            observer(change);
        }
    }

    // ---- Parameters ----

    pub fn parameters(&self) -> &ParameterStore {
        &self.parameters
    }

    pub fn set_parameter_value(&mut self, parameter: Parameter, value: ParameterValue) -> Result<(), ChannelError> {
        self.parameters.set(parameter, value)?;
        self.notify(SettingsChange::Parameter(parameter));
        Ok(())
    }

    pub fn set_parameter_by_id(&mut self, id: &str, value: ParameterValue) -> Result<(), ChannelError> {
        let parameter = self.parameters.set_by_id(id, value)?;
        self.notify(SettingsChange::Parameter(parameter));
        Ok(())
    }

    // ---- Obstacles ----

    /// Adds a rectangle obstacle, merging it with adjacent ones.
    pub fn add_rect_obstacle(&mut self, x: f64, y: f64, width: f64, height: f64, notify: bool) -> Result<Rect, ChannelError> {
        let stored = self.store_obstacle(self.obstacles.len(), x, y, width, height, true)?;
        if notify {
            self.notify(SettingsChange::Obstacles);
        }
        Ok(stored)
    }

    /// Validates and stores one rectangle. Sizes are checked again after the
    /// store rounds to millimetres, so nothing degenerate is ever kept.
    fn store_obstacle(&mut self, index: usize, x: f64, y: f64, width: f64, height: f64, merge: bool) -> Result<Rect, ChannelError> {
        let rect = validated_rect(index, x, y, width, height)?;
        self.obstacles.add_obstacle(rect, merge).ok_or_else(|| ChannelError::InvalidObstacle {
            index,
            reason: "width and height must be at least 1 mm".to_string(),
        })
    }

    pub fn remove_all_obstacles(&mut self) {
        self.obstacles.remove_all();
        self.notify(SettingsChange::Obstacles);
    }

    pub fn obstacle_count(&self) -> usize {
        self.obstacles.len()
    }

    pub fn obstacle(&self, index: usize) -> Option<Rect> {
        self.obstacles.get(index)
    }

    pub fn obstacles(&self) -> &ObstacleWorld {
        &self.obstacles
    }

    // ---- Queries ----

    fn link_budget(&mut self, source: Point, dest: Point) -> Result<LinkBudget, ChannelError> {
        let settings = self.parameters.settings()?;
        let options = PathOptions {
            disallow_direct_path: settings.disallow_direct_path,
            ignore_non_direct: settings.ignore_non_direct,
        };

        let mut tracer = RayTracer::new(&self.obstacles, &mut self.visibility);
        let tree = tracer.build_tree(source, settings.budget);
        let paths = tracer.connecting_paths(&source, &dest, &tree, options);

        let gains: Vec<PathGain> = paths.iter().map(|path| signal_calculations::path_gain(path, &settings, &self.obstacles)).collect();
        let combination = signal_calculations::combine_paths(&gains, settings.wavelength);
        log::trace!("Link {} -> {}: {} nodes, {} paths, {:?}", source, dest, tree.len(), paths.len(), combination.result);

        Ok(LinkBudget {
            settings,
            paths,
            gains,
            combination,
        })
    }

    /// True if nothing obstructs the straight line from `source` to `dest`, as seen from `source`.
    pub fn is_direct_path(&mut self, source: Point, dest: Point) -> bool {
        RayTracer::new(&self.obstacles, &mut self.visibility).is_direct_path(&source, &dest)
    }

    /// Every admissible path from `source` to `dest`.
    pub fn ray_paths(&mut self, source: Point, dest: Point) -> Result<Vec<RayPath>, ChannelError> {
        Ok(self.link_budget(source, dest)?.paths)
    }

    /// Signal, SINR, reception probability and delay spreads of one link,
    /// all derived from the same paths and the same random draws.
    pub fn evaluate_link<R: Rng + ?Sized>(&mut self, rng: &mut R, source: Point, dest: Point, tx_power_override: Option<f64>, interference_dbm: f64) -> Result<LinkReport, ChannelError> {
        let link = self.link_budget(source, dest)?;
        let report = link.report(rng, tx_power_override, interference_dbm);
        if report.multipath == Multipath::NoLink {
            log::debug!("No path from {} to {}", source, dest);
        }
        Ok(report)
    }

    /// Received signal strength at `dest`. Without any path the result is
    /// [`NO_SIGNAL_DBM`] with zero variance.
    pub fn received_signal_strength<R: Rng + ?Sized>(&mut self, rng: &mut R, source: Point, dest: Point, tx_power_override: Option<f64>) -> Result<SignalEstimate, ChannelError> {
        let link = self.link_budget(source, dest)?;
        Ok(signal_calculations::received_signal_strength(&link.settings, &link.combination.result, tx_power_override, rng))
    }

    pub fn sinr<R: Rng + ?Sized>(&mut self, rng: &mut R, source: Point, dest: Point, interference_dbm: f64) -> Result<SinrEstimate, ChannelError> {
        self.sinr_with_output_power(rng, source, dest, None, interference_dbm)
    }

    pub fn sinr_with_output_power<R: Rng + ?Sized>(&mut self, rng: &mut R, source: Point, dest: Point, tx_power_override: Option<f64>, interference_dbm: f64) -> Result<SinrEstimate, ChannelError> {
        Ok(self.evaluate_link(rng, source, dest, tx_power_override, interference_dbm)?.sinr)
    }

    /// Probability that a packet sent from `source` is received at `dest`.
    pub fn probability<R: Rng + ?Sized>(&mut self, rng: &mut R, source: Point, dest: Point, interference_dbm: f64) -> Result<ReceptionEstimate, ChannelError> {
        self.probability_with_output_power(rng, source, dest, None, interference_dbm)
    }

    pub fn probability_with_output_power<R: Rng + ?Sized>(&mut self, rng: &mut R, source: Point, dest: Point, tx_power_override: Option<f64>, interference_dbm: f64) -> Result<ReceptionEstimate, ChannelError> {
        Ok(self.evaluate_link(rng, source, dest, tx_power_override, interference_dbm)?.reception)
    }

    /// Amplitude-weighted RMS delay spread (s), zero without any path.
    pub fn rms_delay_spread(&mut self, source: Point, dest: Point) -> Result<f64, ChannelError> {
        Ok(match self.link_budget(source, dest)?.combination.result {
            Multipath::Combined { rms_delay_spread, .. } => rms_delay_spread,
            Multipath::NoLink => 0.0,
        })
    }

    /// Largest excess delay among significant paths (s), zero without any path.
    pub fn delay_spread(&mut self, source: Point, dest: Point) -> Result<f64, ChannelError> {
        Ok(match self.link_budget(source, dest)?.combination.result {
            Multipath::Combined { delay_spread, .. } => delay_spread,
            Multipath::NoLink => 0.0,
        })
    }

    /// Runs a full transmission query with no interference and records every
    /// ray and intermediate value.
    pub fn trace_transmission<R: Rng + ?Sized>(&mut self, rng: &mut R, source: Point, dest: Point) -> Result<TransmissionTrace, ChannelError> {
        self.trace_link(rng, source, dest, None, NO_INTERFERENCE_DBM)
    }

    /// [`ChannelModel::evaluate_link`] plus the rays and a readable log of
    /// the same evaluation.
    pub fn trace_link<R: Rng + ?Sized>(&mut self, rng: &mut R, source: Point, dest: Point, tx_power_override: Option<f64>, interference_dbm: f64) -> Result<TransmissionTrace, ChannelError> {
        let link = self.link_budget(source, dest)?;
        let report = link.report(rng, tx_power_override, interference_dbm);

        let mut log = String::new();
        write_trace(&mut log, source, dest, &link, &report).map_err(|_| ChannelError::TraceFormat)?;

        Ok(TransmissionTrace {
            report,
            rays: link.paths.iter().flat_map(|path| path.sub_paths().map(|(line, _)| line)).collect(),
            log,
        })
    }

    // ---- Persistence ----

    /// Every parameter in canonical order, followed by the obstacles.
    pub fn save_config(&self) -> PersistedConfig {
        PersistedConfig {
            parameters: self
                .parameters
                .iter()
                .map(|(parameter, value)| PersistedParameter {
                    id: parameter.id().to_string(),
                    value: value.to_string(),
                })
                .collect(),
            obstacles: self.obstacles.iter().map(PersistedObstacle::from).collect(),
        }
    }

    /// Applies a persisted configuration field by field and replaces the
    /// obstacle set. Fields that cannot be applied are skipped and returned.
    pub fn load_config(&mut self, config: &PersistedConfig) -> Vec<ChannelError> {
        let mut errors = Vec::new();

        for field in &config.parameters {
            if let Err(e) = self.load_parameter(field) {
                log::warn!("Skipping persisted parameter {}: {}", field.id, e);
                errors.push(e);
            }
        }

        self.obstacles.remove_all();
        for (index, obstacle) in config.obstacles.iter().enumerate() {
            if let Err(e) = self.store_obstacle(index, obstacle.x, obstacle.y, obstacle.width, obstacle.height, false) {
                log::warn!("Skipping persisted obstacle: {}", e);
                errors.push(e);
            }
        }

        log::info!("Loaded channel configuration: {} parameters, {} obstacles", config.parameters.len(), self.obstacles.len());
        self.notify(SettingsChange::ConfigLoaded);
        errors
    }

    fn load_parameter(&mut self, field: &PersistedParameter) -> Result<(), ChannelError> {
        match field.id.as_str() {
            "frequency" => {
                let mhz = field.value.trim().parse::<f64>().ok().filter(|mhz| mhz.is_finite() && *mhz > 0.0).ok_or_else(|| ChannelError::InvalidParameterValue {
                    parameter: field.id.clone(),
                    value: field.value.clone(),
                })?;
                let wavelength = SPEED_OF_LIGHT / (mhz * 1e6);
                log::warn!("Converting legacy frequency {} MHz to wavelength {} m", mhz, wavelength);
                self.parameters.set(Parameter::Wavelength, wavelength.into())
            }
            "tx_with_gain" | "rx_with_gain" => {
                log::warn!("Ignoring legacy parameter {}", field.id);
                Ok(())
            }
            id if id.starts_with("captureEffect") => {
                log::warn!("Ignoring legacy parameter {}", id);
                Ok(())
            }
            id => self.parameters.set_from_text(id, &field.value).map(|_| ()),
        }
    }
}
