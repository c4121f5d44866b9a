//! Droplet erosion library
//!
//! Re-exports modules for use by binaries and tools.

pub mod config;
pub mod erosion;
pub mod export;
pub mod heightmap;
pub mod seeds;
pub mod tilemap;
