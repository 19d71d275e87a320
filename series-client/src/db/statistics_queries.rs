use anyhow::Result;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use time::OffsetDateTime;

use crate::domain::{SeriesId, StatisticPoint};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SequenceViolation {
    pub series_id: String,
    pub ts: OffsetDateTime,
    pub kind: String,
}

/// Most recent committed point of a series, if any.
pub async fn last_point(pool: &PgPool, series: &SeriesId) -> Result<Option<StatisticPoint>> {
    let row = sqlx::query_as::<_, StatisticPoint>(
        r#"
        SELECT ts, state_kwh, sum_kwh, estimated
        FROM statistics
        WHERE series_id = $1
        ORDER BY ts DESC
        LIMIT 1
        "#,
    )
    .bind(series.as_str())
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Insert points with a single multi-row statement on the given connection.
///
/// Callers run this inside a transaction; the `(series_id, ts)` primary key
/// makes a repeated hour fail the whole statement.
pub async fn insert_points(
    conn: &mut PgConnection,
    series: &SeriesId,
    points: &[StatisticPoint],
) -> Result<u64> {
    if points.is_empty() {
        return Ok(0);
    }

    let mut builder = QueryBuilder::<Postgres>::new(
        "INSERT INTO statistics (series_id, ts, state_kwh, sum_kwh, estimated) ",
    );
    builder.push_values(points, |mut b, p| {
        b.push_bind(series.as_str())
            .push_bind(p.ts)
            .push_bind(p.state)
            .push_bind(p.sum)
            .push_bind(p.estimated);
    });

    let result = builder.build().execute(conn).await?;
    Ok(result.rows_affected())
}

/// Fetch a time-ordered slice of a series.
pub async fn load_series(
    pool: &PgPool,
    series: &SeriesId,
    start: OffsetDateTime,
    end: OffsetDateTime,
) -> Result<Vec<StatisticPoint>> {
    let rows = sqlx::query_as::<_, StatisticPoint>(
        r#"
        SELECT ts, state_kwh, sum_kwh, estimated
        FROM statistics
        WHERE series_id = $1
          AND ts >= $2
          AND ts <  $3
        ORDER BY ts
        "#,
    )
    .bind(series.as_str())
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Scan every stored series for points that break the cumulative-sum rules.
///
/// `tolerance` is the relative slack allowed between a sum and the previous
/// sum plus the state.
pub async fn sequence_violations(pool: &PgPool, tolerance: f64) -> Result<Vec<SequenceViolation>> {
    let rows = sqlx::query_as::<_, SequenceViolation>(
        r#"
        SELECT series_id, ts, kind
        FROM (
            SELECT
                series_id,
                ts,
                CASE
                    WHEN date_trunc('hour', ts AT TIME ZONE 'UTC') <> ts AT TIME ZONE 'UTC' THEN 'not_hour_aligned'
                    WHEN state_kwh < 0 THEN 'negative_state'
                    WHEN prev_sum IS NOT NULL
                         AND ABS(prev_sum + state_kwh - sum_kwh) > $1 * GREATEST(ABS(prev_sum + state_kwh), 1.0)
                         THEN 'sum_mismatch'
                    ELSE NULL
                END AS kind
            FROM (
                SELECT
                    series_id,
                    ts,
                    state_kwh,
                    sum_kwh,
                    LAG(sum_kwh) OVER (PARTITION BY series_id ORDER BY ts) AS prev_sum
                FROM statistics
            ) ordered
        ) checked
        WHERE kind IS NOT NULL
        ORDER BY series_id, ts
        "#,
    )
    .bind(tolerance)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
