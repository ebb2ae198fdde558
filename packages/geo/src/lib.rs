#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geographic primitives for the hazard map.
//!
//! [`math`] holds pure great-circle and grid helpers. [`partition`] maps a
//! location to the coarse partition key reports are sharded by, and produces
//! the fallback search order used when a partition comes back empty.
//!
//! Nothing in this crate blocks or performs I/O.

pub mod math;
pub mod partition;

pub use math::{EARTH_RADIUS_KM, distance_km, round_to_grid};
pub use partition::{key_for, neighbor_keys};
