//! Pose landmark frame delivery: a single-flight detection loop with a
//! latest-result cache, adaptive confidence and display smoothing.

pub mod config;
pub mod pipeline;
pub mod types;
