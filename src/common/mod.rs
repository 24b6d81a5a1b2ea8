//! Scene files and run configuration shared by the command-line driver.

pub mod config;
pub mod scene;
