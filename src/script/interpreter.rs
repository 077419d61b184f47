//! Line-oriented statement splitter and executor.

use super::{ScriptError, StatementError};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const COMMENT_PREFIX: &str = "--";
const CUSTOM_DELIMITER_START: &str = "DELIMITER ;;";
const CUSTOM_DELIMITER_END: &str = "DELIMITER ;";

/// One live connection able to execute a single SQL statement.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ScriptConnection: Send {
    /// Executes one statement exactly as given.
    ///
    /// # Errors
    ///
    /// Returns [`StatementError`] when the server rejects the statement or
    /// the connection drops.
    async fn execute(&mut self, statement: &str) -> Result<(), StatementError>;
}

/// Summary of a completed replay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Number of statements sent to the connection.
    pub statements_executed: usize,
    /// Text left in the buffer at end of input without a terminator.
    ///
    /// The leftover is never executed and does not fail the replay.
    pub unterminated: Option<String>,
}

/// Replays an in-memory script.
///
/// # Errors
///
/// See [`replay_lines`].
pub async fn replay_script<C>(
    script: &str,
    connection: &mut C,
    cancel: &CancellationToken,
) -> Result<ReplayReport, ScriptError>
where
    C: ScriptConnection + ?Sized,
{
    let lines = script.lines().map(str::to_owned).map(Ok);
    replay_lines(lines, connection, cancel).await
}

/// Replays a script supplied as a sequence of lines.
///
/// Lines are accumulated until a statement is complete:
///
/// - an empty line is skipped while nothing is buffered;
/// - a line starting with `--` is skipped;
/// - `DELIMITER ;;` switches to the custom delimiter;
/// - `DELIMITER ;` ends the custom delimiter and executes the buffer;
/// - a line ending in `;` completes the statement unless the custom
///   delimiter is active.
///
/// Statements are executed in order and the replay stops at the first
/// failure; earlier statements stay applied.
///
/// # Errors
///
/// Returns [`ScriptError::Statement`] with the failing statement text,
/// [`ScriptError::Read`] when a line cannot be read, or
/// [`ScriptError::Canceled`] when `cancel` fires between statements.
pub async fn replay_lines<I, C>(
    lines: I,
    connection: &mut C,
    cancel: &CancellationToken,
) -> Result<ReplayReport, ScriptError>
where
    I: IntoIterator<Item = std::io::Result<String>>,
    C: ScriptConnection + ?Sized,
{
    let mut buffer = String::new();
    let mut custom_delimiter = false;
    let mut executed = 0_usize;

    for next_line in lines {
        let line = next_line?;
        let execute = match line.as_str() {
            "" if buffer.is_empty() => continue,
            text if text.starts_with(COMMENT_PREFIX) => continue,
            CUSTOM_DELIMITER_START => {
                custom_delimiter = true;
                continue;
            }
            CUSTOM_DELIMITER_END if custom_delimiter => {
                custom_delimiter = false;
                true
            }
            text if text.ends_with(';') => {
                push_line(&mut buffer, text);
                !custom_delimiter
            }
            text => {
                push_line(&mut buffer, text);
                continue;
            }
        };

        if execute {
            if cancel.is_cancelled() {
                return Err(ScriptError::Canceled { executed });
            }
            if let Err(source) = connection.execute(&buffer).await {
                return Err(ScriptError::Statement {
                    statement: buffer,
                    source,
                });
            }
            executed += 1;
            debug!(executed, "statement applied");
            buffer.clear();
        }
    }

    let unterminated = (!buffer.is_empty()).then_some(buffer);
    if let Some(leftover) = unterminated.as_deref() {
        warn!(
            bytes = leftover.len(),
            "script ended with an unterminated statement; it was not executed"
        );
    }

    Ok(ReplayReport {
        statements_executed: executed,
        unterminated,
    })
}

fn push_line(buffer: &mut String, line: &str) {
    buffer.push_str(line);
    buffer.push('\n');
}
