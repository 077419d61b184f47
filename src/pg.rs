//! Shared `PostgreSQL` pool type and blocking helpers for Diesel adapters.
//!
//! Diesel connections are synchronous, so every adapter call is moved onto
//! the blocking thread pool instead of stalling async worker threads.

use diesel::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool, PoolError};

/// `PostgreSQL` connection pool type used by all Diesel adapters.
pub type PgPool = Pool<ConnectionManager<PgConnection>>;

/// Builds a pool for the given connection URL.
///
/// # Errors
///
/// Returns [`PoolError`] when the pool cannot open its initial connections.
pub fn build_pool(database_url: &str, max_size: u32) -> Result<PgPool, PoolError> {
    Pool::builder()
        .max_size(max_size)
        .build(ConnectionManager::<PgConnection>::new(database_url))
}

/// Checks out a connection and runs `f` on the blocking thread pool.
///
/// Pool checkout failures go through `pool_err`, join failures through
/// `join_err`.
pub(crate) async fn run_blocking<F, T, E>(
    pool: &PgPool,
    pool_err: fn(PoolError) -> E,
    join_err: fn(tokio::task::JoinError) -> E,
    f: F,
) -> Result<T, E>
where
    F: FnOnce(&mut PgConnection) -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    let pool_handle = pool.clone();
    tokio::task::spawn_blocking(move || {
        let mut connection = pool_handle.get().map_err(pool_err)?;
        f(&mut connection)
    })
    .await
    .map_err(join_err)?
}
