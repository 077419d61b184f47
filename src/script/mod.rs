//! Migration script replay.
//!
//! Dump and export tools emit scripts whose compound statements (triggers,
//! stored procedures) are bracketed by `DELIMITER ;;` / `DELIMITER ;`
//! directives. [`replay_script`] walks such a script line by line and sends
//! each complete statement to a [`ScriptConnection`], so semicolons inside a
//! procedure body are never mistaken for statement boundaries.

mod error;
mod interpreter;

pub use error::{ScriptError, StatementError};
pub use interpreter::{ReplayReport, ScriptConnection, replay_lines, replay_script};

#[cfg(test)]
pub use interpreter::MockScriptConnection;
