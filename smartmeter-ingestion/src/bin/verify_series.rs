use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use series_client::{db::statistics_queries, domain::SUM_RELATIVE_TOLERANCE};
use smartmeter_ingestion::{
    config::{AppConfig, StoreKind},
    observability,
};
use sqlx::postgres::PgPoolOptions;

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;
    if cfg.store.kind != StoreKind::Postgres {
        bail!("verify_series only checks the postgres store");
    }
    let uri = cfg.store.uri.as_deref().context("store.uri is required for the postgres store")?;

    let pool = PgPoolOptions::new()
        .max_connections(cfg.store.max_connections)
        .connect(uri)
        .await?;

    // Schema is expected to be applied out-of-band via `sql/schema/*.sql`.
    let violations = statistics_queries::sequence_violations(&pool, SUM_RELATIVE_TOLERANCE).await?;

    let mut per_series: BTreeMap<&str, usize> = BTreeMap::new();
    for v in &violations {
        tracing::warn!(series = %v.series_id, ts = %v.ts, kind = %v.kind, "sequence violation");
        *per_series.entry(v.series_id.as_str()).or_default() += 1;
    }

    for (series, count) in &per_series {
        tracing::error!(series, count, "series breaks the cumulative-sum rules");
    }

    tracing::info!(
        violations = violations.len(),
        series = per_series.len(),
        tolerance = SUM_RELATIVE_TOLERANCE,
        "statistics verified"
    );

    if !violations.is_empty() {
        bail!("{} violations across {} series", violations.len(), per_series.len());
    }

    Ok(())
}
