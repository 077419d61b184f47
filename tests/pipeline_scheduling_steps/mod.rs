//! Step definitions for pipeline scheduling scenarios.

pub mod given;
pub mod then;
pub mod when;
pub mod world;
