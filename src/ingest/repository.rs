//! Two-phase transactional writes for buffered batches.
//!
//! Design reference: SPEC_FULL.md §4.2 (Dual-write Persistence).
//!
//! Each flush writes a batch in a single transaction: a multi-row append-only
//! insert into the partitioned history table, followed by a multi-row upsert
//! into the hot "current" table guarded against out-of-order arrival by
//! [`Invariant 3`] — a row only overwrites the current state if its
//! `recorded_at` is newer than what's already there.
//!
//! Runtime-checked queries (`sqlx::query`/`QueryBuilder`) are used throughout
//! rather than the compile-time `query!` macros: batch width is dynamic and
//! the partitioned tables are provisioned at migration time, not known to an
//! offline sqlx query cache.

use std::collections::HashMap;

use chrono::Utc;
use sqlx::{PgPool, QueryBuilder};

use crate::model::{MeterReadingInput, VehicleReadingInput};

/// Collapse a batch down to the latest row per device id, keeping only the
/// reading with the greatest `recorded_at` for each key.
///
/// `ON CONFLICT ... DO UPDATE` raises `cardinality_violation` if the same
/// conflict target appears twice in one multi-row `INSERT`, so the current-
/// table upsert must never see intra-batch duplicates (SPEC_FULL.md §4.2,
/// §8). The history insert has no such constraint and keeps every row.
fn dedup_latest_by_id<'a, T>(
    batch: &'a [T],
    id: impl Fn(&T) -> &str,
    recorded_at: impl Fn(&T) -> chrono::DateTime<Utc>,
) -> Vec<&'a T> {
    let mut latest: HashMap<&str, &T> = HashMap::new();
    for row in batch {
        latest
            .entry(id(row))
            .and_modify(|existing| {
                if recorded_at(row) > recorded_at(existing) {
                    *existing = row;
                }
            })
            .or_insert(row);
    }
    latest.into_values().collect()
}

/// Write a batch of vehicle readings: append to `vehicle_readings`, then
/// upsert `vehicle_current` with the staleness guard. Both writes happen in
/// one transaction — a partial batch is never visible.
pub async fn write_vehicle_batch(pool: &PgPool, batch: &[VehicleReadingInput]) -> sqlx::Result<()> {
    if batch.is_empty() {
        return Ok(());
    }
    let mut tx = pool.begin().await?;

    let mut insert: QueryBuilder<'_, sqlx::Postgres> = QueryBuilder::new(
        "INSERT INTO vehicle_readings (vehicle_id, soc, kwh_delivered_dc, battery_temp, recorded_at) ",
    );
    insert.push_values(batch, |mut b, r| {
        b.push_bind(&r.vehicle_id)
            .push_bind(r.soc)
            .push_bind(r.kwh_delivered_dc)
            .push_bind(r.battery_temp)
            .push_bind(r.recorded_at);
    });
    insert.build().execute(&mut *tx).await?;

    let deduped = dedup_latest_by_id(batch, |r| r.vehicle_id.as_str(), |r| r.recorded_at);
    let now = Utc::now();

    let mut upsert: QueryBuilder<'_, sqlx::Postgres> = QueryBuilder::new(
        "INSERT INTO vehicle_current (vehicle_id, soc, kwh_delivered_dc, battery_temp, last_seen_at, updated_at) ",
    );
    upsert.push_values(deduped, |mut b, r| {
        b.push_bind(&r.vehicle_id)
            .push_bind(r.soc)
            .push_bind(r.kwh_delivered_dc)
            .push_bind(r.battery_temp)
            .push_bind(r.recorded_at)
            .push_bind(now);
    });
    upsert.push(
        " ON CONFLICT (vehicle_id) DO UPDATE SET \
          soc = EXCLUDED.soc, \
          kwh_delivered_dc = EXCLUDED.kwh_delivered_dc, \
          battery_temp = EXCLUDED.battery_temp, \
          last_seen_at = EXCLUDED.last_seen_at, \
          updated_at = EXCLUDED.updated_at \
          WHERE vehicle_current.last_seen_at < EXCLUDED.last_seen_at",
    );
    upsert.build().execute(&mut *tx).await?;

    tx.commit().await
}

/// Write a batch of meter readings. Mirrors [`write_vehicle_batch`] against
/// `meter_readings` / `meter_current`.
pub async fn write_meter_batch(pool: &PgPool, batch: &[MeterReadingInput]) -> sqlx::Result<()> {
    if batch.is_empty() {
        return Ok(());
    }
    let mut tx = pool.begin().await?;

    let mut insert: QueryBuilder<'_, sqlx::Postgres> = QueryBuilder::new(
        "INSERT INTO meter_readings (meter_id, kwh_consumed_ac, voltage, recorded_at) ",
    );
    insert.push_values(batch, |mut b, r| {
        b.push_bind(&r.meter_id)
            .push_bind(r.kwh_consumed_ac)
            .push_bind(r.voltage)
            .push_bind(r.recorded_at);
    });
    insert.build().execute(&mut *tx).await?;

    let deduped = dedup_latest_by_id(batch, |r| r.meter_id.as_str(), |r| r.recorded_at);
    let now = Utc::now();

    let mut upsert: QueryBuilder<'_, sqlx::Postgres> = QueryBuilder::new(
        "INSERT INTO meter_current (meter_id, kwh_consumed_ac, voltage, last_seen_at, updated_at) ",
    );
    upsert.push_values(deduped, |mut b, r| {
        b.push_bind(&r.meter_id)
            .push_bind(r.kwh_consumed_ac)
            .push_bind(r.voltage)
            .push_bind(r.recorded_at)
            .push_bind(now);
    });
    upsert.push(
        " ON CONFLICT (meter_id) DO UPDATE SET \
          kwh_consumed_ac = EXCLUDED.kwh_consumed_ac, \
          voltage = EXCLUDED.voltage, \
          last_seen_at = EXCLUDED.last_seen_at, \
          updated_at = EXCLUDED.updated_at \
          WHERE meter_current.last_seen_at < EXCLUDED.last_seen_at",
    );
    upsert.build().execute(&mut *tx).await?;

    tx.commit().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn vehicle_reading(vehicle_id: &str, hour: u32) -> VehicleReadingInput {
        VehicleReadingInput {
            vehicle_id: vehicle_id.to_string(),
            soc: dec!(50.0),
            kwh_delivered_dc: dec!(1.0),
            battery_temp: dec!(25.0),
            recorded_at: Utc.with_ymd_and_hms(2026, 7, 26, hour, 0, 0).unwrap(),
        }
    }

    #[sqlx::test]
    async fn writes_batch_to_history_and_current(pool: PgPool) -> sqlx::Result<()> {
        let batch = vec![vehicle_reading("v-1", 10), vehicle_reading("v-2", 11)];
        write_vehicle_batch(&pool, &batch).await?;

        let history: i64 = sqlx::query_scalar("SELECT count(*) FROM vehicle_readings")
            .fetch_one(&pool)
            .await?;
        assert_eq!(history, 2);

        let current: i64 = sqlx::query_scalar("SELECT count(*) FROM vehicle_current")
            .fetch_one(&pool)
            .await?;
        assert_eq!(current, 2);
        Ok(())
    }

    #[sqlx::test]
    async fn intra_batch_duplicates_resolve_to_latest_recorded_at(pool: PgPool) -> sqlx::Result<()> {
        let batch = vec![
            vehicle_reading("v-1", 9),
            vehicle_reading("v-1", 14),
            vehicle_reading("v-1", 11),
        ];
        write_vehicle_batch(&pool, &batch).await?;

        let history: i64 = sqlx::query_scalar("SELECT count(*) FROM vehicle_readings")
            .fetch_one(&pool)
            .await?;
        assert_eq!(history, 3, "every history row survives, duplicates and all");

        let hour: i32 = sqlx::query_scalar(
            "SELECT EXTRACT(HOUR FROM last_seen_at)::int FROM vehicle_current WHERE vehicle_id = 'v-1'",
        )
        .fetch_one(&pool)
        .await?;
        assert_eq!(hour, 14, "the surviving current row is the one with the greatest recorded_at");

        let current: i64 = sqlx::query_scalar("SELECT count(*) FROM vehicle_current")
            .fetch_one(&pool)
            .await?;
        assert_eq!(current, 1);
        Ok(())
    }

    #[sqlx::test]
    async fn updated_at_reflects_server_write_time_not_recorded_at(pool: PgPool) -> sqlx::Result<()> {
        let before = Utc::now();
        write_vehicle_batch(&pool, &[vehicle_reading("v-1", 9)]).await?;
        let after = Utc::now();

        let updated_at: chrono::DateTime<Utc> =
            sqlx::query_scalar("SELECT updated_at FROM vehicle_current WHERE vehicle_id = 'v-1'")
                .fetch_one(&pool)
                .await?;
        assert!(
            updated_at >= before && updated_at <= after,
            "updated_at must be the server write instant, not the device recorded_at"
        );
        Ok(())
    }

    #[sqlx::test]
    async fn staleness_guard_rejects_older_reading(pool: PgPool) -> sqlx::Result<()> {
        write_vehicle_batch(&pool, &[vehicle_reading("v-1", 12)]).await?;
        write_vehicle_batch(&pool, &[vehicle_reading("v-1", 9)]).await?;

        let hour: i32 = sqlx::query_scalar(
            "SELECT EXTRACT(HOUR FROM last_seen_at)::int FROM vehicle_current WHERE vehicle_id = 'v-1'",
        )
        .fetch_one(&pool)
        .await?;
        assert_eq!(hour, 12, "a stale reading must not overwrite a newer one");
        Ok(())
    }

    #[sqlx::test]
    async fn newer_reading_overwrites_current(pool: PgPool) -> sqlx::Result<()> {
        write_vehicle_batch(&pool, &[vehicle_reading("v-1", 9)]).await?;
        write_vehicle_batch(&pool, &[vehicle_reading("v-1", 12)]).await?;

        let hour: i32 = sqlx::query_scalar(
            "SELECT EXTRACT(HOUR FROM last_seen_at)::int FROM vehicle_current WHERE vehicle_id = 'v-1'",
        )
        .fetch_one(&pool)
        .await?;
        assert_eq!(hour, 12);
        Ok(())
    }

    #[sqlx::test]
    async fn empty_batch_is_a_no_op(pool: PgPool) -> sqlx::Result<()> {
        write_vehicle_batch(&pool, &[]).await?;
        let history: i64 = sqlx::query_scalar("SELECT count(*) FROM vehicle_readings")
            .fetch_one(&pool)
            .await?;
        assert_eq!(history, 0);
        Ok(())
    }
}
