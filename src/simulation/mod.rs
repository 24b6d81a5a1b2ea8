//! Radio propagation core.
//!
//! This module provides the geometry and physics of the radio medium. It
//! integrates:
//! - Interval and circular angle-interval algebra
//! - Obstacle storage and visibility resolution with shadow casting
//! - Ray tree construction and path extraction
//! - Link budget, multipath combination and reception probability
//!
//! ## Module Organization
//!
//! - `types`: Core geometric types and persisted records
//! - `geometry`: Segment and rectangle intersection logic
//! - `interval` / `angle_interval`: Range algebra on the line and the circle
//! - `obstacle_world`: Obstacle store and its query contract
//! - `visibility`: Visible obstacle edges from a viewpoint, with cache
//! - `ray_tree` / `ray_path`: Ray tree arena and extracted paths
//! - `signal_calculations`: Path loss, gains and probability math
//! - `parameters`: Typed configuration values
//! - `channel_model`: Query facade, observers and persistence
//!
//! ## Public API
//!
//! The main entry point is [`ChannelModel`].

pub mod angle_interval;
pub mod channel_model;
pub mod error;
pub mod geometry;
pub mod interval;
pub mod obstacle_world;
pub mod parameters;
pub mod ray_path;
pub mod ray_tree;
pub mod signal_calculations;
pub mod types;
pub mod visibility;

// Re-export commonly used types
pub use channel_model::{ChannelModel, LinkReport, NO_INTERFERENCE_DBM, SettingsChange, TransmissionTrace};
pub use error::ChannelError;
pub use parameters::{Parameter, ParameterGroup, ParameterValue};
pub use types::{Line, Point, Rect};
