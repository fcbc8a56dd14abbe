//! Partition provisioning and retention jobs.
//!
//! Design reference: SPEC_FULL.md §4.1 ("Provisioning contract", "Retention
//! contract") and §4.6 ("Partition provisioning", "Retention"). Both run
//! daily and share the same background-task spawning pattern as the rollup
//! jobs in [`crate::rollup`].

use std::time::{Duration, Instant};

use chrono::{Datelike, Utc};
use sqlx::{PgPool, Row};

const PROVISION_AND_RETENTION_INTERVAL: Duration = Duration::from_secs(24 * 3600);

/// Start the daily partition-provisioning and retention background task.
/// A single daily tick drives both: provisioning runs first so a retention
/// pass never races ahead of a freshly created partition.
pub fn spawn_retention_task(pool: PgPool, retention_months: i64) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PROVISION_AND_RETENTION_INTERVAL);
        interval.tick().await;
        loop {
            interval.tick().await;
            run_provisioning_cycle(&pool).await;
            run_retention_cycle(&pool, retention_months).await;
        }
    })
}

/// Ensure the current and next calendar month's partitions exist for both
/// reading tables, creating them idempotently if missing. Also checks the
/// default partitions for stray rows, which would indicate a provisioning
/// lapse.
#[tracing::instrument(skip(pool))]
async fn run_provisioning_cycle(pool: &PgPool) {
    let start = Instant::now();
    match provision_upcoming_partitions(pool).await {
        Ok(created) => {
            tracing::info!(
                elapsed_ms = start.elapsed().as_millis() as u64,
                created,
                "partition provisioning cycle completed"
            );
        }
        Err(e) => {
            tracing::warn!(error = %e, "partition provisioning cycle failed, will retry next tick");
        }
    }
    warn_if_default_partitions_nonempty(pool).await;
}

async fn provision_upcoming_partitions(pool: &PgPool) -> sqlx::Result<u32> {
    let today = Utc::now().date_naive();
    let mut created = 0u32;

    for months_ahead in 0..=1 {
        let (year, month) = add_months(today.year(), today.month(), months_ahead);
        let (next_year, next_month) = add_months(year, month, 1);

        let month_start = format!("{year:04}-{month:02}-01");
        let month_end = format!("{next_year:04}-{next_month:02}-01");
        let suffix = format!("{year:04}_{month:02}");

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS vehicle_readings_{suffix} \
             PARTITION OF vehicle_readings FOR VALUES FROM ('{month_start}') TO ('{month_end}')"
        ))
        .execute(pool)
        .await?;

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS meter_readings_{suffix} \
             PARTITION OF meter_readings FOR VALUES FROM ('{month_start}') TO ('{month_end}')"
        ))
        .execute(pool)
        .await?;

        created += 2;
    }

    Ok(created)
}

fn add_months(year: i32, month: u32, delta: i32) -> (i32, u32) {
    let zero_based = (month as i32 - 1) + delta;
    let year = year + zero_based.div_euclid(12);
    let month = zero_based.rem_euclid(12) as u32 + 1;
    (year, month)
}

async fn warn_if_default_partitions_nonempty(pool: &PgPool) {
    for (table, default_table) in [
        ("vehicle_readings", "vehicle_readings_default"),
        ("meter_readings", "meter_readings_default"),
    ] {
        let count: Result<i64, _> = sqlx::query_scalar(&format!("SELECT count(*) FROM {default_table}"))
            .fetch_one(pool)
            .await;
        match count {
            Ok(n) if n > 0 => {
                tracing::warn!(table, rows = n, "default partition is non-empty — provisioning lapse");
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, table, "failed to check default partition"),
        }
    }
}

/// Detach and drop reading-table partitions whose entire range is older
/// than the retention horizon. Constant-time: no row-by-row delete.
#[tracing::instrument(skip(pool))]
async fn run_retention_cycle(pool: &PgPool, retention_months: i64) {
    let start = Instant::now();
    match drop_expired_partitions(pool, retention_months).await {
        Ok(dropped) => {
            tracing::info!(
                elapsed_ms = start.elapsed().as_millis() as u64,
                dropped,
                "retention cycle completed"
            );
        }
        Err(e) => {
            tracing::warn!(error = %e, "retention cycle failed, will retry next tick");
        }
    }
}

async fn drop_expired_partitions(pool: &PgPool, retention_months: i64) -> sqlx::Result<u32> {
    let cutoff = Utc::now().date_naive() - chrono::Months::new(retention_months.max(0) as u32);
    let mut dropped = 0u32;

    for parent in ["vehicle_readings", "meter_readings"] {
        let partitions = sqlx::query(
            "SELECT child.relname AS name \
             FROM pg_inherits \
             JOIN pg_class parent ON pg_inherits.inhparent = parent.oid \
             JOIN pg_class child ON pg_inherits.inhrelid = child.oid \
             WHERE parent.relname = $1",
        )
        .bind(parent)
        .fetch_all(pool)
        .await?;

        for row in partitions {
            let name: String = row.try_get("name")?;
            let Some(suffix) = name.strip_prefix(&format!("{parent}_")) else {
                continue;
            };
            let Some((year, month)) = parse_partition_suffix(suffix) else {
                continue;
            };
            let Some(partition_start) = chrono::NaiveDate::from_ymd_opt(year, month, 1) else {
                continue;
            };
            let partition_end = partition_start + chrono::Months::new(1);
            if partition_end > cutoff {
                continue;
            }

            sqlx::query(&format!(
                "ALTER TABLE {parent} DETACH PARTITION {name} CONCURRENTLY"
            ))
            .execute(pool)
            .await?;
            sqlx::query(&format!("DROP TABLE {name}")).execute(pool).await?;
            dropped += 1;
        }
    }

    Ok(dropped)
}

fn parse_partition_suffix(suffix: &str) -> Option<(i32, u32)> {
    let (year_str, month_str) = suffix.split_once('_')?;
    let year: i32 = year_str.parse().ok()?;
    let month: u32 = month_str.parse().ok()?;
    Some((year, month))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_months_rolls_over_year_boundary() {
        assert_eq!(add_months(2026, 12, 1), (2027, 1));
        assert_eq!(add_months(2026, 1, -1), (2025, 12));
        assert_eq!(add_months(2026, 6, 0), (2026, 6));
    }

    #[test]
    fn parse_partition_suffix_roundtrips() {
        assert_eq!(parse_partition_suffix("2026_07"), Some((2026, 7)));
        assert_eq!(parse_partition_suffix("default"), None);
    }

    #[sqlx::test]
    async fn provisioning_is_idempotent(pool: PgPool) -> sqlx::Result<()> {
        let first = provision_upcoming_partitions(&pool).await?;
        let second = provision_upcoming_partitions(&pool).await?;
        assert_eq!(first, second);
        Ok(())
    }
}
