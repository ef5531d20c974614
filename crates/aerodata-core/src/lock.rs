use std::time::Duration;

use sqlx::PgConnection;
use tracing::debug;

use crate::tables::TargetTable;

/// Pause between attempts while another ingestion holds the table.
pub const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Takes the transaction-scoped advisory lock serialising merges into one table.
///
/// Must run inside an open transaction: commit or rollback releases the lock,
/// and so does the session closing. The lock is polled rather than awaited on the
/// server, so a caller cancelled mid-wait never leaves a lock request queued.
/// Ingestions into different tables take different keys and never wait on each other.
pub async fn lock_table(conn: &mut PgConnection, table: TargetTable) -> Result<(), sqlx::Error> {
    let key = table.lock_key();
    let mut attempts: u32 = 0;
    loop {
        let acquired: bool = sqlx::query_scalar("SELECT pg_try_advisory_xact_lock($1)")
            .bind(key)
            .fetch_one(&mut *conn)
            .await?;
        if acquired {
            debug!(table = %table, key, attempts, "acquired table lock");
            return Ok(());
        }
        if attempts == 0 {
            debug!(table = %table, key, "waiting for concurrent ingestion to finish");
        }
        attempts += 1;
        tokio::time::sleep(LOCK_POLL_INTERVAL).await;
    }
}
