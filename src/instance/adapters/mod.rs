//! Adapter implementations for instance ports.

pub mod memory;
pub mod mysql;
pub mod postgres;
