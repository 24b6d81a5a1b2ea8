//! Radio medium propagation engine.
//!
//! Decides whether a simulated packet transmission between two points is
//! received, and at what signal strength, by tracing direct, refracted,
//! reflected and diffracted paths through a field of rectangular obstacles.

pub mod common;
pub mod simulation;
