//! The ETL run: six extract→transform→load steps in fixed order.
//!
//! Steps run strictly one after another. The first error aborts the run and
//! is returned as-is; tables loaded by earlier steps stay replaced. The date
//! dimension is built from the transformed orders rather than extracted.
//!
//! A run is not safe against a concurrent run of itself. Keeping one run
//! active at a time is the scheduler's job.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::EtlConfig;
use crate::entity::Entity;
use crate::error::{EtlError, EtlResult};
use crate::extract::{Source, extract};
use crate::frame::Frame;
use crate::load::{Destination, DryRunDestination, PgDestination};
use crate::mssql::SqlServerSource;
use crate::transform::{
    build_date_dimension, transform_customer, transform_orders, transform_person,
    transform_product, transform_territory,
};

/// Outcome of one step.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub entity: Entity,
    pub table: String,
    pub rows: u64,
    pub elapsed_ms: u64,
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub steps: Vec<StepReport>,
    pub elapsed_ms: u64,
}

impl RunReport {
    /// Total rows written across all tables.
    pub fn total_rows(&self) -> u64 {
        self.steps.iter().map(|s| s.rows).sum()
    }
}

/// Run all six steps against an open source and destination.
pub async fn run_pipeline<S, D>(source: &mut S, destination: &mut D) -> EtlResult<RunReport>
where
    S: Source,
    D: Destination,
{
    let run_id = Uuid::new_v4();
    let started_at = Utc::now();
    let clock = Instant::now();
    info!(%run_id, "ETL run started");

    let mut steps = Vec::with_capacity(Entity::ALL.len());
    let mut orders: Option<Frame> = None;

    for entity in Entity::ALL {
        let step_clock = Instant::now();
        let frame = match step_frame(source, entity, orders.as_ref()).await {
            Ok(frame) => frame,
            Err(e) => {
                error!(%run_id, %entity, error = %e, "step failed");
                return Err(e);
            }
        };

        let rows = match destination.replace_table(entity.table(), &frame).await {
            Ok(rows) => rows,
            Err(e) => {
                error!(%run_id, %entity, error = %e, "load failed");
                return Err(e);
            }
        };

        steps.push(StepReport {
            entity,
            table: entity.table().to_string(),
            rows,
            elapsed_ms: step_clock.elapsed().as_millis() as u64,
        });

        if entity == Entity::Orders {
            orders = Some(frame);
        }
    }

    let report = RunReport {
        run_id,
        started_at,
        steps,
        elapsed_ms: clock.elapsed().as_millis() as u64,
    };
    info!(%run_id, rows = report.total_rows(), elapsed_ms = report.elapsed_ms, "ETL run complete");
    Ok(report)
}

/// Extract and transform one entity. The date step reuses `orders`.
async fn step_frame<S: Source>(source: &mut S, entity: Entity, orders: Option<&Frame>) -> EtlResult<Frame> {
    match entity {
        Entity::Person => transform_person(extract(source, entity).await?),
        Entity::Customer => transform_customer(extract(source, entity).await?),
        Entity::Product => transform_product(extract(source, entity).await?),
        Entity::Territory => transform_territory(extract(source, entity).await?),
        Entity::Orders => transform_orders(extract(source, entity).await?),
        Entity::Date => match orders {
            Some(orders) => build_date_dimension(orders),
            None => Err(EtlError::Query(format!(
                "{} step ran before {}; it is built from the loaded orders",
                entity,
                Entity::Orders
            ))),
        },
    }
}

/// Connect to both databases, run the pipeline, and close both connections
/// whatever the outcome.
pub async fn execute(config: &EtlConfig) -> EtlResult<RunReport> {
    let params = config.source.resolve()?;
    let mut source = SqlServerSource::connect(&params).await?;

    let mut destination = match PgDestination::connect(&config.destination, config.load).await {
        Ok(destination) => destination,
        Err(e) => {
            close_source(source).await;
            return Err(e);
        }
    };

    let result = run_pipeline(&mut source, &mut destination).await;

    close_source(source).await;
    if let Err(e) = destination.close().await {
        warn!(error = %e, "failed to close destination connection");
    }
    result
}

/// Extract and transform everything, write nothing.
pub async fn execute_dry_run(config: &EtlConfig) -> EtlResult<RunReport> {
    let params = config.source.resolve()?;
    let mut source = SqlServerSource::connect(&params).await?;
    let mut destination = DryRunDestination::default();

    let result = run_pipeline(&mut source, &mut destination).await;
    close_source(source).await;
    result
}

/// The scheduler's entry point: load config from the environment and the
/// default locations, then run once.
pub async fn run() -> EtlResult<RunReport> {
    let config = EtlConfig::from_env()?;
    execute(&config).await
}

async fn close_source(source: SqlServerSource) {
    if let Err(e) = source.close().await {
        warn!(error = %e, "failed to close source connection");
    }
}
