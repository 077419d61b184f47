//! Adapter implementations for pipeline ports.

pub mod memory;
pub mod postgres;
