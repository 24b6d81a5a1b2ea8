//! Scene loading, parsing, and validation logic.
//!
//! A scene bundles a persisted channel configuration (parameters and
//! obstacles) with the list of links to evaluate.

use anyhow::Context;
use serde::Deserialize;
use std::fs;

use crate::simulation::types::{PersistedConfig, Point};

/// Error type for scene loading failures.
#[derive(Debug)]
pub enum SceneLoadError {
    FileReadError(String),
    ParseError(String),
    ValidationError(String),
}

impl std::fmt::Display for SceneLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SceneLoadError::FileReadError(msg) => write!(f, "Failed to read file: {}", msg),
            SceneLoadError::ParseError(msg) => write!(f, "Failed to parse JSON: {}", msg),
            SceneLoadError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for SceneLoadError {}

/// One transmitter/receiver pair to evaluate.
#[derive(Debug, Deserialize, Clone)]
pub struct LinkSpec {
    pub source: Point,
    pub destination: Point,
    /// Overrides the configured transmitter output power (dBm).
    #[serde(default)]
    pub tx_power_dbm: Option<f64>,
    /// External interference level at the receiver (dBm).
    #[serde(default)]
    pub interference_dbm: Option<f64>,
}

/// Root structure representing the entire scene.
#[derive(Debug, Deserialize, Clone)]
pub struct Scene {
    /// Channel parameters and obstacles.
    #[serde(default)]
    pub channel: PersistedConfig,
    /// Links to evaluate, in output order.
    pub links: Vec<LinkSpec>,
}

/// Load and parse a scene from a file.
///
/// # Parameters
///
/// * `path` - Path to the scene JSON file
///
/// # Returns
///
/// Parsed and validated Scene or an error.
pub fn load_scene(path: &str) -> Result<Scene, SceneLoadError> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path))
        .map_err(|e| SceneLoadError::FileReadError(e.to_string()))?;

    parse_scene(&data)
}

/// Parse and validate a scene from its JSON text.
pub fn parse_scene(data: &str) -> Result<Scene, SceneLoadError> {
    let scene: Scene = serde_json::from_str(data)
        .context("Invalid JSON format")
        .map_err(|e| SceneLoadError::ParseError(e.to_string()))?;

    validate_scene(&scene).map_err(SceneLoadError::ValidationError)?;

    Ok(scene)
}

fn is_finite_point(point: &Point) -> bool {
    point.x.is_finite() && point.y.is_finite()
}

/// Validate scene contents.
///
/// # Returns
///
/// `Ok(())` if validation passes, `Err(String)` with error description otherwise.
pub fn validate_scene(scene: &Scene) -> Result<(), String> {
    if scene.links.is_empty() {
        return Err("Scene must contain at least one link".to_string());
    }

    for (idx, link) in scene.links.iter().enumerate() {
        if !is_finite_point(&link.source) || !is_finite_point(&link.destination) {
            return Err(format!("Link {} has non-finite coordinates", idx));
        }
        if let Some(power) = link.tx_power_dbm {
            if !power.is_finite() {
                return Err(format!("Link {} has invalid tx_power_dbm {}", idx, power));
            }
        }
        if let Some(interference) = link.interference_dbm {
            if interference.is_nan() {
                return Err(format!("Link {} has invalid interference_dbm", idx));
            }
        }
    }

    for (idx, obstacle) in scene.channel.obstacles.iter().enumerate() {
        if ![obstacle.x, obstacle.y, obstacle.width, obstacle.height].iter().all(|v| v.is_finite()) {
            return Err(format!("Obstacle {} has non-finite coordinates", idx));
        }
        if obstacle.width <= 0.0 || obstacle.height <= 0.0 {
            return Err(format!(
                "Obstacle {} has invalid size {}x{}, width and height must be positive",
                idx, obstacle.width, obstacle.height
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_scene() {
        let scene = parse_scene(r#"{ "links": [ { "source": { "x": 0, "y": 0 }, "destination": { "x": 10, "y": 0 } } ] }"#).unwrap();
        assert_eq!(scene.links.len(), 1);
        assert!(scene.channel.parameters.is_empty());
        assert_eq!(scene.links[0].tx_power_dbm, None);
    }

    #[test]
    fn parses_channel_section() {
        let scene = parse_scene(
            r#"{
                "channel": {
                    "parameters": [ { "id": "wavelength", "value": "0.125" } ],
                    "obstacles": [ { "x": 5, "y": -5, "width": 1, "height": 10 } ]
                },
                "links": [ { "source": { "x": 0, "y": 0 }, "destination": { "x": 10, "y": 0 }, "tx_power_dbm": 10.0 } ]
            }"#,
        )
        .unwrap();
        assert_eq!(scene.channel.parameters[0].id, "wavelength");
        assert_eq!(scene.channel.obstacles.len(), 1);
        assert_eq!(scene.links[0].tx_power_dbm, Some(10.0));
    }

    #[test]
    fn rejects_scene_without_links() {
        assert!(matches!(parse_scene(r#"{ "links": [] }"#), Err(SceneLoadError::ValidationError(_))));
    }

    #[test]
    fn rejects_flat_obstacle() {
        let result = parse_scene(
            r#"{
                "channel": { "parameters": [], "obstacles": [ { "x": 0, "y": 0, "width": 0, "height": 10 } ] },
                "links": [ { "source": { "x": 0, "y": 0 }, "destination": { "x": 10, "y": 0 } } ]
            }"#,
        );
        assert!(matches!(result, Err(SceneLoadError::ValidationError(_))));
    }

    #[test]
    fn reports_malformed_json() {
        assert!(matches!(parse_scene("{ links: "), Err(SceneLoadError::ParseError(_))));
        assert!(matches!(load_scene("/nonexistent/scene.json"), Err(SceneLoadError::FileReadError(_))));
    }
}
