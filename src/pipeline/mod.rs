//! Rollout pipelines and the task scheduler.
//!
//! A pipeline is an ordered list of stages; a stage holds tasks that each
//! target one instance or database. Stages run strictly in order, tasks in a
//! stage run concurrently except where they share a target. Task outcomes
//! land in two append-only ledgers: migration history for applied schema
//! changes and activities for the audit trail.
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - The scheduler service in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
