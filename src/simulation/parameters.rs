//! Named, typed and described configuration values of the channel model.
//!
//! Every parameter has a stable string identifier (used in persisted
//! configurations), a value kind, a default and a human-readable description.
//! The store keeps a cached [`ChannelSettings`] snapshot with the derived
//! constants (free-space loss constant, output power); any mutation drops the
//! snapshot so it is rebuilt on the next query.

use std::collections::BTreeMap;
use std::str::FromStr;

use super::error::ChannelError;
use super::signal_calculations;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Parameter {
    ApplyRandom,
    SnrThreshold,
    BgNoiseMean,
    BgNoiseVar,
    SystemGainMean,
    SystemGainVar,
    Wavelength,
    TxPower,
    TxAntennaGain,
    RxSensitivity,
    RxAntennaGain,
    RtDisallowDirectPath,
    RtIgnoreNonDirect,
    RtFsplOnTotalLength,
    RtMaxRays,
    RtMaxRefractions,
    RtMaxReflections,
    RtMaxDiffractions,
    RtRefracCoefficient,
    RtReflecCoefficient,
    RtDiffrCoefficient,
    ObstacleAttenuation,
}

/// Grouping used when presenting parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterGroup {
    General,
    Transmitter,
    Receiver,
    RayTracer,
    Shadowing,
}

impl ParameterGroup {
    pub const ALL: [ParameterGroup; 5] = [
        ParameterGroup::General,
        ParameterGroup::Transmitter,
        ParameterGroup::Receiver,
        ParameterGroup::RayTracer,
        ParameterGroup::Shadowing,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ParameterGroup::General => "General",
            ParameterGroup::Transmitter => "Transmitter",
            ParameterGroup::Receiver => "Receiver",
            ParameterGroup::RayTracer => "Ray tracer",
            ParameterGroup::Shadowing => "Shadowing",
        }
    }

    /// Members of the group in canonical order.
    pub fn parameters(self) -> impl Iterator<Item = Parameter> {
        Parameter::ALL.into_iter().filter(move |p| p.group() == self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    Double,
    Integer,
    Boolean,
}

impl ParameterKind {
    pub fn name(self) -> &'static str {
        match self {
            ParameterKind::Double => "double",
            ParameterKind::Integer => "integer",
            ParameterKind::Boolean => "boolean",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParameterValue {
    Double(f64),
    Integer(i32),
    Boolean(bool),
}

impl ParameterValue {
    pub fn kind(&self) -> ParameterKind {
        match self {
            ParameterValue::Double(_) => ParameterKind::Double,
            ParameterValue::Integer(_) => ParameterKind::Integer,
            ParameterValue::Boolean(_) => ParameterKind::Boolean,
        }
    }

    /// Parses `text` as a value of `kind`. Surrounding whitespace is ignored.
    pub fn parse(kind: ParameterKind, text: &str) -> Option<ParameterValue> {
        let text = text.trim();
        match kind {
            ParameterKind::Double => text.parse().ok().map(ParameterValue::Double),
            ParameterKind::Integer => text.parse().ok().map(ParameterValue::Integer),
            ParameterKind::Boolean => text.parse().ok().map(ParameterValue::Boolean),
        }
    }
}

impl std::fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // f64 Display prints the shortest text that parses back to the same value
            ParameterValue::Double(v) => write!(f, "{}", v),
            ParameterValue::Integer(v) => write!(f, "{}", v),
            ParameterValue::Boolean(v) => write!(f, "{}", v),
        }
    }
}

impl From<f64> for ParameterValue {
    fn from(value: f64) -> Self {
        ParameterValue::Double(value)
    }
}

impl From<i32> for ParameterValue {
    fn from(value: i32) -> Self {
        ParameterValue::Integer(value)
    }
}

impl From<bool> for ParameterValue {
    fn from(value: bool) -> Self {
        ParameterValue::Boolean(value)
    }
}

impl Parameter {
    /// Every parameter in canonical (persisted) order.
    pub const ALL: [Parameter; 22] = [
        Parameter::ApplyRandom,
        Parameter::SnrThreshold,
        Parameter::BgNoiseMean,
        Parameter::BgNoiseVar,
        Parameter::SystemGainMean,
        Parameter::SystemGainVar,
        Parameter::Wavelength,
        Parameter::TxPower,
        Parameter::TxAntennaGain,
        Parameter::RxSensitivity,
        Parameter::RxAntennaGain,
        Parameter::RtDisallowDirectPath,
        Parameter::RtIgnoreNonDirect,
        Parameter::RtFsplOnTotalLength,
        Parameter::RtMaxRays,
        Parameter::RtMaxRefractions,
        Parameter::RtMaxReflections,
        Parameter::RtMaxDiffractions,
        Parameter::RtRefracCoefficient,
        Parameter::RtReflecCoefficient,
        Parameter::RtDiffrCoefficient,
        Parameter::ObstacleAttenuation,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Parameter::ApplyRandom => "apply_random",
            Parameter::SnrThreshold => "snr_threshold",
            Parameter::BgNoiseMean => "bg_noise_mean",
            Parameter::BgNoiseVar => "bg_noise_var",
            Parameter::SystemGainMean => "system_gain_mean",
            Parameter::SystemGainVar => "system_gain_var",
            Parameter::Wavelength => "wavelength",
            Parameter::TxPower => "tx_power",
            Parameter::TxAntennaGain => "tx_antenna_gain",
            Parameter::RxSensitivity => "rx_sensitivity",
            Parameter::RxAntennaGain => "rx_antenna_gain",
            Parameter::RtDisallowDirectPath => "rt_disallow_direct_path",
            Parameter::RtIgnoreNonDirect => "rt_ignore_non_direct",
            Parameter::RtFsplOnTotalLength => "rt_fspl_on_total_length",
            Parameter::RtMaxRays => "rt_max_rays",
            Parameter::RtMaxRefractions => "rt_max_refractions",
            Parameter::RtMaxReflections => "rt_max_reflections",
            Parameter::RtMaxDiffractions => "rt_max_diffractions",
            Parameter::RtRefracCoefficient => "rt_refrac_coefficient",
            Parameter::RtReflecCoefficient => "rt_reflec_coefficient",
            Parameter::RtDiffrCoefficient => "rt_diffr_coefficient",
            Parameter::ObstacleAttenuation => "obstacle_attenuation",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Parameter::ApplyRandom => "Apply random values immediately",
            Parameter::SnrThreshold => "SNR reception threshold (dB)",
            Parameter::BgNoiseMean => "Background noise mean (dBm)",
            Parameter::BgNoiseVar => "Background noise variance (dB)",
            Parameter::SystemGainMean => "Extra system gain mean (dB)",
            Parameter::SystemGainVar => "Extra system gain variance (dB)",
            Parameter::Wavelength => "Wavelength w (m)",
            Parameter::TxPower => "Transmitter output power (dBm)",
            Parameter::TxAntennaGain => "Transmitter antenna gain (dB)",
            Parameter::RxSensitivity => "Receiver sensitivity (dBm)",
            Parameter::RxAntennaGain => "Receiver antenna gain (dB)",
            Parameter::RtDisallowDirectPath => "Disallow direct path",
            Parameter::RtIgnoreNonDirect => "If existing, only use direct path",
            Parameter::RtFsplOnTotalLength => "Use FSPL on total path lengths only",
            Parameter::RtMaxRays => "Max path rays",
            Parameter::RtMaxRefractions => "Max refractions",
            Parameter::RtMaxReflections => "Max reflections",
            Parameter::RtMaxDiffractions => "Max diffractions",
            Parameter::RtRefracCoefficient => "Refraction coefficient (dB)",
            Parameter::RtReflecCoefficient => "Reflection coefficient (dB)",
            Parameter::RtDiffrCoefficient => "Diffraction coefficient (dB)",
            Parameter::ObstacleAttenuation => "Obstacle attenuation (dB/m)",
        }
    }

    pub fn default_value(self) -> ParameterValue {
        match self {
            Parameter::ApplyRandom => false.into(),
            Parameter::SnrThreshold => 6.0.into(),
            Parameter::BgNoiseMean => (-150.0).into(),
            Parameter::BgNoiseVar => 1.0.into(),
            Parameter::SystemGainMean => 0.0.into(),
            Parameter::SystemGainVar => 4.0.into(),
            // ~868 MHz
            Parameter::Wavelength => 0.346.into(),
            Parameter::TxPower => 1.5.into(),
            Parameter::TxAntennaGain => 0.0.into(),
            Parameter::RxSensitivity => (-100.0).into(),
            Parameter::RxAntennaGain => 0.0.into(),
            Parameter::RtDisallowDirectPath => false.into(),
            Parameter::RtIgnoreNonDirect => false.into(),
            Parameter::RtFsplOnTotalLength => true.into(),
            Parameter::RtMaxRays => 1.into(),
            Parameter::RtMaxRefractions => 1.into(),
            Parameter::RtMaxReflections => 1.into(),
            Parameter::RtMaxDiffractions => 0.into(),
            Parameter::RtRefracCoefficient => (-3.0).into(),
            Parameter::RtReflecCoefficient => (-5.0).into(),
            Parameter::RtDiffrCoefficient => (-10.0).into(),
            Parameter::ObstacleAttenuation => (-3.0).into(),
        }
    }

    pub fn kind(self) -> ParameterKind {
        self.default_value().kind()
    }

    pub fn group(self) -> ParameterGroup {
        match self {
            Parameter::ApplyRandom
            | Parameter::SnrThreshold
            | Parameter::BgNoiseMean
            | Parameter::BgNoiseVar
            | Parameter::SystemGainMean
            | Parameter::SystemGainVar
            | Parameter::Wavelength => ParameterGroup::General,
            Parameter::TxPower | Parameter::TxAntennaGain => ParameterGroup::Transmitter,
            Parameter::RxSensitivity | Parameter::RxAntennaGain => ParameterGroup::Receiver,
            Parameter::ObstacleAttenuation => ParameterGroup::Shadowing,
            _ => ParameterGroup::RayTracer,
        }
    }
}

impl FromStr for Parameter {
    type Err = ChannelError;

    fn from_str(id: &str) -> Result<Self, Self::Err> {
        Parameter::ALL.into_iter().find(|p| p.id() == id).ok_or_else(|| ChannelError::UnknownParameter(id.to_string()))
    }
}

impl std::fmt::Display for Parameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// Ray budgets handed to the root of a ray tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RayBudget {
    pub total_rays: i32,
    pub refractions: i32,
    pub reflections: i32,
    pub diffractions: i32,
}

/// Typed snapshot of every parameter plus the derived constants, taken once
/// per query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelSettings {
    pub apply_random: bool,
    pub snr_threshold: f64,
    pub bg_noise_mean: f64,
    pub bg_noise_var: f64,
    pub system_gain_mean: f64,
    pub system_gain_var: f64,
    pub wavelength: f64,
    pub tx_power: f64,
    pub tx_antenna_gain: f64,
    pub rx_sensitivity: f64,
    pub rx_antenna_gain: f64,
    pub disallow_direct_path: bool,
    pub ignore_non_direct: bool,
    pub fspl_on_total_length: bool,
    pub budget: RayBudget,
    pub refraction_coefficient: f64,
    pub reflection_coefficient: f64,
    pub diffraction_coefficient: f64,
    pub obstacle_attenuation: f64,
    /// `20·log10(λ) − 20·log10(4π)`, the distance-independent part of FSPL.
    pub fspl_constant: f64,
    /// Configured transmitter output power (dBm).
    pub output_power: f64,
}

/// Store of parameter values keyed by [`Parameter`].
#[derive(Debug, Clone)]
pub struct ParameterStore {
    values: BTreeMap<Parameter, ParameterValue>,
    cached_settings: Option<ChannelSettings>,
}

impl Default for ParameterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ParameterStore {
    /// Store holding every parameter at its default value.
    pub fn new() -> Self {
        Self {
            values: Parameter::ALL.into_iter().map(|p| (p, p.default_value())).collect(),
            cached_settings: None,
        }
    }

    pub fn value(&self, parameter: Parameter) -> ParameterValue {
        self.values.get(&parameter).copied().unwrap_or_else(|| parameter.default_value())
    }

    pub fn value_by_id(&self, id: &str) -> Result<ParameterValue, ChannelError> {
        Ok(self.value(id.parse()?))
    }

    pub fn description_by_id(&self, id: &str) -> Result<&'static str, ChannelError> {
        Ok(id.parse::<Parameter>()?.description())
    }

    pub fn double(&self, parameter: Parameter) -> Result<f64, ChannelError> {
        match self.value(parameter) {
            ParameterValue::Double(v) => Ok(v),
            other => Err(mismatch(parameter, ParameterKind::Double, other.kind())),
        }
    }

    pub fn integer(&self, parameter: Parameter) -> Result<i32, ChannelError> {
        match self.value(parameter) {
            ParameterValue::Integer(v) => Ok(v),
            other => Err(mismatch(parameter, ParameterKind::Integer, other.kind())),
        }
    }

    pub fn boolean(&self, parameter: Parameter) -> Result<bool, ChannelError> {
        match self.value(parameter) {
            ParameterValue::Boolean(v) => Ok(v),
            other => Err(mismatch(parameter, ParameterKind::Boolean, other.kind())),
        }
    }

    /// Sets a parameter. The value must be of the parameter's kind.
    pub fn set(&mut self, parameter: Parameter, value: ParameterValue) -> Result<(), ChannelError> {
        if value.kind() != parameter.kind() {
            return Err(mismatch(parameter, parameter.kind(), value.kind()));
        }
        // Wavelength feeds log10 in the FSPL constant
        if let (Parameter::Wavelength, ParameterValue::Double(wavelength)) = (parameter, value) {
            if !(wavelength.is_finite() && wavelength > 0.0) {
                return Err(ChannelError::InvalidParameterValue {
                    parameter: parameter.id().to_string(),
                    value: value.to_string(),
                });
            }
        }
        self.values.insert(parameter, value);
        self.cached_settings = None;
        Ok(())
    }

    pub fn set_by_id(&mut self, id: &str, value: ParameterValue) -> Result<Parameter, ChannelError> {
        let parameter: Parameter = id.parse()?;
        self.set(parameter, value)?;
        Ok(parameter)
    }

    /// Parses `text` according to the parameter's kind and stores it.
    pub fn set_from_text(&mut self, id: &str, text: &str) -> Result<Parameter, ChannelError> {
        let parameter: Parameter = id.parse()?;
        let value = ParameterValue::parse(parameter.kind(), text).ok_or_else(|| ChannelError::InvalidParameterValue {
            parameter: id.to_string(),
            value: text.to_string(),
        })?;
        self.set(parameter, value)?;
        Ok(parameter)
    }

    /// Typed snapshot of all parameters, rebuilt after any change.
    pub fn settings(&mut self) -> Result<ChannelSettings, ChannelError> {
        if let Some(settings) = self.cached_settings {
            return Ok(settings);
        }

        let wavelength = self.double(Parameter::Wavelength)?;
        let tx_power = self.double(Parameter::TxPower)?;
        let settings = ChannelSettings {
            apply_random: self.boolean(Parameter::ApplyRandom)?,
            snr_threshold: self.double(Parameter::SnrThreshold)?,
            bg_noise_mean: self.double(Parameter::BgNoiseMean)?,
            bg_noise_var: self.double(Parameter::BgNoiseVar)?,
            system_gain_mean: self.double(Parameter::SystemGainMean)?,
            system_gain_var: self.double(Parameter::SystemGainVar)?,
            wavelength,
            tx_power,
            tx_antenna_gain: self.double(Parameter::TxAntennaGain)?,
            rx_sensitivity: self.double(Parameter::RxSensitivity)?,
            rx_antenna_gain: self.double(Parameter::RxAntennaGain)?,
            disallow_direct_path: self.boolean(Parameter::RtDisallowDirectPath)?,
            ignore_non_direct: self.boolean(Parameter::RtIgnoreNonDirect)?,
            fspl_on_total_length: self.boolean(Parameter::RtFsplOnTotalLength)?,
            budget: RayBudget {
                total_rays: self.integer(Parameter::RtMaxRays)?,
                refractions: self.integer(Parameter::RtMaxRefractions)?,
                reflections: self.integer(Parameter::RtMaxReflections)?,
                diffractions: self.integer(Parameter::RtMaxDiffractions)?,
            },
            refraction_coefficient: self.double(Parameter::RtRefracCoefficient)?,
            reflection_coefficient: self.double(Parameter::RtReflecCoefficient)?,
            diffraction_coefficient: self.double(Parameter::RtDiffrCoefficient)?,
            obstacle_attenuation: self.double(Parameter::ObstacleAttenuation)?,
            fspl_constant: signal_calculations::fspl_constant(wavelength),
            output_power: tx_power,
        };
        log::debug!("Recalculated channel settings: wavelength={} m, FSPL constant={:.3} dB", wavelength, settings.fspl_constant);
        self.cached_settings = Some(settings);
        Ok(settings)
    }

    /// All parameters with their current values, in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (Parameter, ParameterValue)> + '_ {
        Parameter::ALL.into_iter().map(|p| (p, self.value(p)))
    }
}

fn mismatch(parameter: Parameter, expected: ParameterKind, found: ParameterKind) -> ChannelError {
    ChannelError::ParameterTypeMismatch {
        parameter: parameter.id().to_string(),
        expected: expected.name(),
        found: found.name(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_parse_back() {
        for parameter in Parameter::ALL {
            assert_eq!(parameter.id().parse::<Parameter>().unwrap(), parameter);
            assert!(!parameter.description().is_empty());
        }
    }

    #[test]
    fn unknown_identifier_is_typed_error() {
        let store = ParameterStore::new();
        assert_eq!(store.value_by_id("no_such_param"), Err(ChannelError::UnknownParameter("no_such_param".to_string())));
    }

    #[test]
    fn defaults_match_table() {
        let store = ParameterStore::new();
        assert_eq!(store.double(Parameter::Wavelength).unwrap(), 0.346);
        assert_eq!(store.integer(Parameter::RtMaxDiffractions).unwrap(), 0);
        assert!(store.boolean(Parameter::RtFsplOnTotalLength).unwrap());
        assert_eq!(Parameter::ObstacleAttenuation.group(), ParameterGroup::Shadowing);
        assert_eq!(Parameter::RtMaxRays.group(), ParameterGroup::RayTracer);
    }

    #[test]
    fn wrong_kind_is_rejected() {
        let mut store = ParameterStore::new();
        let err = store.set(Parameter::RtMaxRays, ParameterValue::Double(2.0)).unwrap_err();
        assert!(matches!(err, ChannelError::ParameterTypeMismatch { expected: "integer", found: "double", .. }));
        assert_eq!(store.integer(Parameter::RtMaxRays).unwrap(), 1);
        assert!(store.double(Parameter::RtMaxRays).is_err());
    }

    #[test]
    fn text_values_parse_by_kind() {
        let mut store = ParameterStore::new();
        store.set_from_text("rt_max_reflections", "3").unwrap();
        store.set_from_text("apply_random", "true").unwrap();
        store.set_from_text("tx_power", " 0.1 ").unwrap();
        assert_eq!(store.integer(Parameter::RtMaxReflections).unwrap(), 3);
        assert!(store.boolean(Parameter::ApplyRandom).unwrap());
        assert_eq!(store.double(Parameter::TxPower).unwrap(), 0.1);
        assert!(matches!(store.set_from_text("rt_max_rays", "many"), Err(ChannelError::InvalidParameterValue { .. })));
    }

    #[test]
    fn settings_snapshot_is_rebuilt_after_change() {
        let mut store = ParameterStore::new();
        let before = store.settings().unwrap();
        store.set(Parameter::Wavelength, 0.125.into()).unwrap();
        let after = store.settings().unwrap();
        assert_eq!(after.wavelength, 0.125);
        assert!(after.fspl_constant < before.fspl_constant);
    }

    #[test]
    fn descriptions_by_id() {
        let store = ParameterStore::new();
        assert_eq!(store.description_by_id("wavelength").unwrap(), Parameter::Wavelength.description());
        assert_eq!(store.description_by_id("rt_max_diffractions").unwrap(), "Max diffractions");
        assert_eq!(store.description_by_id("frequency"), Err(ChannelError::UnknownParameter("frequency".to_string())));
    }

    #[test]
    fn groups_partition_parameters() {
        let grouped: Vec<Parameter> = ParameterGroup::ALL.into_iter().flat_map(ParameterGroup::parameters).collect();
        assert_eq!(grouped.len(), Parameter::ALL.len());
        for parameter in Parameter::ALL {
            assert!(grouped.contains(&parameter));
        }
        assert_eq!(ParameterGroup::Transmitter.parameters().collect::<Vec<_>>(), vec![Parameter::TxPower, Parameter::TxAntennaGain]);
        assert_eq!(ParameterGroup::RayTracer.name(), "Ray tracer");
    }

    #[test]
    fn wavelength_must_be_positive_and_finite() {
        let mut store = ParameterStore::new();
        let before = store.settings().unwrap();
        for bad in [0.0, -0.5, f64::NAN, f64::INFINITY] {
            assert!(matches!(store.set(Parameter::Wavelength, bad.into()), Err(ChannelError::InvalidParameterValue { .. })), "wavelength {bad}");
        }
        assert!(store.set_from_text("wavelength", "-1").is_err());
        assert_eq!(store.double(Parameter::Wavelength).unwrap(), 0.346);
        assert_eq!(store.settings().unwrap(), before);
        assert!(before.fspl_constant.is_finite());
    }

    #[test]
    fn double_text_round_trips_exactly() {
        let value = ParameterValue::Double(0.1 + 0.2);
        let parsed = ParameterValue::parse(ParameterKind::Double, &value.to_string()).unwrap();
        assert_eq!(parsed, value);
    }
}
