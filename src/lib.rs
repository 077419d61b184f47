//! Schemaflow: schema change execution core for database fleets.
//!
//! The crate runs pipelines of database tasks (create, migrate, back up,
//! restore) against registered instances, keeps a cached copy of each
//! instance's schema, and records an append-only migration history and
//! activity ledger.
//!
//! # Architecture
//!
//! Schemaflow follows hexagonal architecture principles:
//!
//! - **Domain**: Pure business logic with no infrastructure dependencies
//! - **Ports**: Abstract trait interfaces for external interactions
//! - **Adapters**: Concrete implementations of ports (`PostgreSQL`, `MySQL`,
//!   in-memory)
//!
//! # Modules
//!
//! - [`pipeline`]: Pipeline/stage/task graph, scheduler, history and
//!   activities
//! - [`instance`]: Instances, databases, cached schema metadata and drivers
//! - [`executor`]: Per-task-type executors and their registry
//! - [`script`]: Migration script interpreter
//! - [`backup`]: Backup artifact storage
//! - [`runtime`]: Dispatch, schema sync and backup loops

pub mod backup;
pub mod config;
pub mod executor;
pub mod instance;
pub mod pg;
pub mod pipeline;
pub mod runtime;
pub mod script;
pub mod telemetry;
