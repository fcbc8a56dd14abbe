//! Hourly rollup and performance-summary refresh jobs.
//!
//! Design reference: SPEC_FULL.md §4.6 ("Hourly rollup job",
//! "Performance summary refresh"). Both follow the single background-task
//! spawning pattern shared by every job in this module group: a
//! `tokio::spawn`'d loop around `tokio::time::interval`, first tick consumed
//! immediately, each cycle `#[tracing::instrument]`-wrapped and logging
//! duration plus row counts on completion, errors logged and swallowed.

use std::time::{Duration, Instant};

use sqlx::PgPool;

const ROLLUP_INTERVAL: Duration = Duration::from_secs(3600);
const SUMMARY_REFRESH_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Start the hourly rollup background task.
pub fn spawn_rollup_task(pool: PgPool) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(ROLLUP_INTERVAL);
        interval.tick().await;
        loop {
            interval.tick().await;
            run_rollup_cycle(&pool).await;
        }
    })
}

/// Start the 15-minute performance-summary refresh background task.
pub fn spawn_summary_refresh_task(pool: PgPool) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SUMMARY_REFRESH_INTERVAL);
        interval.tick().await;
        loop {
            interval.tick().await;
            run_summary_refresh_cycle(&pool).await;
        }
    })
}

/// Aggregate the previous hour's cold-store rows per device into the hourly
/// stats tables. Errors are logged and swallowed: a missed cycle runs again
/// next tick and does not crash the process.
#[tracing::instrument(skip(pool))]
async fn run_rollup_cycle(pool: &PgPool) {
    let start = Instant::now();
    match rollup_previous_hour(pool).await {
        Ok((vehicle_rows, meter_rows)) => {
            tracing::info!(
                elapsed_ms = start.elapsed().as_millis() as u64,
                vehicle_rows,
                meter_rows,
                "hourly rollup cycle completed"
            );
        }
        Err(e) => {
            tracing::warn!(error = %e, "hourly rollup cycle failed, will retry next tick");
        }
    }
}

/// Roll up the most recently completed hour bucket for both device classes.
async fn rollup_previous_hour(pool: &PgPool) -> sqlx::Result<(u64, u64)> {
    let vehicle_result = sqlx::query(
        "INSERT INTO vehicle_hourly_stats \
            (vehicle_id, hour_bucket, sample_count, avg_dc_kwh, min_dc_kwh, max_dc_kwh) \
         SELECT \
            vehicle_id, \
            date_trunc('hour', recorded_at) AS hour_bucket, \
            count(*), \
            avg(kwh_delivered_dc), \
            min(kwh_delivered_dc), \
            max(kwh_delivered_dc) \
         FROM vehicle_readings \
         WHERE recorded_at >= date_trunc('hour', now() - INTERVAL '1 hour') \
           AND recorded_at < date_trunc('hour', now()) \
         GROUP BY vehicle_id, date_trunc('hour', recorded_at) \
         ON CONFLICT (vehicle_id, hour_bucket) DO UPDATE SET \
            sample_count = EXCLUDED.sample_count, \
            avg_dc_kwh = EXCLUDED.avg_dc_kwh, \
            min_dc_kwh = EXCLUDED.min_dc_kwh, \
            max_dc_kwh = EXCLUDED.max_dc_kwh",
    )
    .execute(pool)
    .await?;

    let meter_result = sqlx::query(
        "INSERT INTO meter_hourly_stats \
            (meter_id, hour_bucket, sample_count, avg_ac_kwh, min_ac_kwh, max_ac_kwh) \
         SELECT \
            meter_id, \
            date_trunc('hour', recorded_at) AS hour_bucket, \
            count(*), \
            avg(kwh_consumed_ac), \
            min(kwh_consumed_ac), \
            max(kwh_consumed_ac) \
         FROM meter_readings \
         WHERE recorded_at >= date_trunc('hour', now() - INTERVAL '1 hour') \
           AND recorded_at < date_trunc('hour', now()) \
         GROUP BY meter_id, date_trunc('hour', recorded_at) \
         ON CONFLICT (meter_id, hour_bucket) DO UPDATE SET \
            sample_count = EXCLUDED.sample_count, \
            avg_ac_kwh = EXCLUDED.avg_ac_kwh, \
            min_ac_kwh = EXCLUDED.min_ac_kwh, \
            max_ac_kwh = EXCLUDED.max_ac_kwh",
    )
    .execute(pool)
    .await?;

    Ok((vehicle_result.rows_affected(), meter_result.rows_affected()))
}

/// Recompute `vehicle_performance_summary` for every linked vehicle from the
/// last 24h of cold-store data.
#[tracing::instrument(skip(pool))]
async fn run_summary_refresh_cycle(pool: &PgPool) {
    let start = Instant::now();
    match refresh_performance_summaries(pool).await {
        Ok(rows) => {
            tracing::info!(
                elapsed_ms = start.elapsed().as_millis() as u64,
                rows,
                "performance summary refresh completed"
            );
        }
        Err(e) => {
            tracing::warn!(error = %e, "performance summary refresh failed, will retry next tick");
        }
    }
}

async fn refresh_performance_summaries(pool: &PgPool) -> sqlx::Result<u64> {
    let result = sqlx::query(
        "INSERT INTO vehicle_performance_summary \
            (vehicle_id, meter_id, total_dc_delivered, total_ac_consumed, efficiency_pct, refreshed_at) \
         SELECT \
            link.vehicle_id, \
            link.meter_id, \
            coalesce(dc.total, 0), \
            coalesce(ac.total, 0), \
            CASE WHEN coalesce(ac.total, 0) = 0 THEN 0 \
                 ELSE round(100 * coalesce(dc.total, 0) / ac.total, 2) \
            END, \
            now() \
         FROM vehicle_meter_link link \
         LEFT JOIN ( \
            SELECT vehicle_id, sum(kwh_delivered_dc) AS total \
            FROM vehicle_readings \
            WHERE recorded_at >= now() - INTERVAL '24 hours' \
            GROUP BY vehicle_id \
         ) dc ON dc.vehicle_id = link.vehicle_id \
         LEFT JOIN ( \
            SELECT meter_id, sum(kwh_consumed_ac) AS total \
            FROM meter_readings \
            WHERE recorded_at >= now() - INTERVAL '24 hours' \
            GROUP BY meter_id \
         ) ac ON ac.meter_id = link.meter_id \
         ON CONFLICT (vehicle_id) DO UPDATE SET \
            meter_id = EXCLUDED.meter_id, \
            total_dc_delivered = EXCLUDED.total_dc_delivered, \
            total_ac_consumed = EXCLUDED.total_ac_consumed, \
            efficiency_pct = EXCLUDED.efficiency_pct, \
            refreshed_at = EXCLUDED.refreshed_at",
    )
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike, Utc};
    use rust_decimal_macros::dec;

    #[sqlx::test]
    async fn rollup_aggregates_previous_hour(pool: PgPool) -> sqlx::Result<()> {
        let hour_ago = Utc::now() - chrono::Duration::hours(1);
        let bucket = hour_ago.date_naive().and_hms_opt(hour_ago.hour(), 0, 0).unwrap();
        let recorded_at = Utc.from_utc_datetime(&bucket);

        sqlx::query(
            "INSERT INTO vehicle_readings (vehicle_id, soc, kwh_delivered_dc, battery_temp, recorded_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind("v-1")
        .bind(dec!(50.0))
        .bind(dec!(2.0))
        .bind(dec!(25.0))
        .bind(recorded_at)
        .execute(&pool)
        .await?;

        let (vehicle_rows, _) = rollup_previous_hour(&pool).await?;
        assert_eq!(vehicle_rows, 1);

        let count: i64 = sqlx::query_scalar("SELECT count(*) FROM vehicle_hourly_stats")
            .fetch_one(&pool)
            .await?;
        assert_eq!(count, 1);
        Ok(())
    }

    #[sqlx::test]
    async fn summary_refresh_yields_zero_efficiency_with_no_readings(pool: PgPool) -> sqlx::Result<()> {
        sqlx::query(
            "INSERT INTO vehicle_current (vehicle_id, soc, kwh_delivered_dc, battery_temp, last_seen_at) \
             VALUES ('v-1', 50, 0, 25, now())",
        )
        .execute(&pool)
        .await?;
        sqlx::query(
            "INSERT INTO meter_current (meter_id, kwh_consumed_ac, voltage, last_seen_at) \
             VALUES ('m-1', 0, 230, now())",
        )
        .execute(&pool)
        .await?;
        sqlx::query("INSERT INTO vehicle_meter_link (vehicle_id, meter_id) VALUES ('v-1', 'm-1')")
            .execute(&pool)
            .await?;

        refresh_performance_summaries(&pool).await?;

        let efficiency: rust_decimal::Decimal = sqlx::query_scalar(
            "SELECT efficiency_pct FROM vehicle_performance_summary WHERE vehicle_id = 'v-1'",
        )
        .fetch_one(&pool)
        .await?;
        assert_eq!(efficiency, dec!(0));
        Ok(())
    }
}
