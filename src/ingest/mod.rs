//! Upstream data sources.
//!
//! - `airnow`: AirNow current observations by lat/long

pub mod airnow;
