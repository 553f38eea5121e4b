// src/steps/publication.rs

//! Database publication step (`grapher://channel/namespace/version/name`).
//!
//! Pushes every column of the matching data step's tables into the
//! configured [`Datastore`](crate::publish::Datastore).

use rayon::prelude::*;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::DirtyCache;
use crate::catalog::{Dataset, Table};
use crate::context::Context;
use crate::errors::{EtlError, Result};
use crate::pool::bounded_pool;
use crate::publish::{ColumnData, ColumnId, DatasetRecord, RERUN_SENTINEL};
use crate::steps::data::DataStep;
use crate::steps::uri::{Scheme, step_attributes};
use crate::steps::{Step, StepOps};

/// Column upserts logged individually before going quiet.
const VERBOSE_UPSERTS: usize = 20;

#[derive(Debug, Clone)]
pub struct PublicationStep {
    path: String,
    dependencies: Vec<Step>,
}

impl PublicationStep {
    /// A publication step wraps exactly one data step with the same path.
    pub fn new(path: impl Into<String>, dependencies: Vec<Step>) -> Result<Self> {
        let path = path.into();
        let uri = format!("{}://{}", Scheme::Grapher, path);
        let fail = |reason: String| EtlError::Construction {
            step: uri.clone(),
            reason,
        };

        match dependencies.as_slice() {
            [Step::Data(data)] if data.path() == path => {}
            [Step::Data(data)] => {
                return Err(fail(format!(
                    "dependency {} does not match the step path",
                    data.uri()
                )));
            }
            [other] => {
                return Err(fail(format!("dependency {other} is not a data step")));
            }
            deps => {
                return Err(fail(format!(
                    "expected exactly one data step dependency, found {}",
                    deps.len()
                )));
            }
        }

        Ok(Self { path, dependencies })
    }

    pub fn data_step(&self) -> Result<&DataStep> {
        match self.dependencies.first() {
            Some(Step::Data(data)) => Ok(data),
            _ => Err(EtlError::Construction {
                step: self.uri(),
                reason: "missing data step dependency".to_string(),
            }),
        }
    }

    fn record(&self, dataset: &Dataset) -> Result<DatasetRecord> {
        let attrs = step_attributes(&self.uri())?;
        let index = dataset.index_or_default()?;
        Ok(DatasetRecord {
            catalog_path: self.path.clone(),
            namespace: attrs.namespace,
            version: attrs.version,
            short_name: attrs.name,
            is_public: index.is_public,
        })
    }

    /// One `(catalog_path, data)` job per published column.
    fn column_jobs(&self, tables: &[Table], filter: Option<&Regex>) -> Result<Vec<(String, ColumnData)>> {
        let mut jobs = Vec::new();
        for table in tables {
            if table.is_empty() {
                return Err(EtlError::Other(anyhow::anyhow!(
                    "table {} is empty",
                    table.short_name
                )));
            }

            for (column, values) in table.value_columns() {
                if let Some(re) = filter {
                    if !re.is_match(column) {
                        continue;
                    }
                }
                let catalog_path = format!("{}/{}#{}", self.path, table.short_name, column);
                jobs.push((catalog_path, column_data(table, values)));
            }
        }
        Ok(jobs)
    }
}

/// Pair every non-null value with its index key.
fn column_data(table: &Table, values: &[Value]) -> ColumnData {
    let rows = values
        .iter()
        .enumerate()
        .filter(|(_, v)| !v.is_null())
        .map(|(i, v)| {
            let key = table
                .index
                .iter()
                .map(|name| {
                    table
                        .columns
                        .get(name)
                        .and_then(|c| c.get(i))
                        .cloned()
                        .unwrap_or(Value::Null)
                })
                .collect();
            (key, v.clone())
        })
        .collect();

    ColumnData {
        index: table.index.clone(),
        rows,
    }
}

impl StepOps for PublicationStep {
    fn scheme(&self) -> Scheme {
        Scheme::Grapher
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn dependencies(&self) -> &[Step] {
        &self.dependencies
    }

    fn run(&self, ctx: &Context) -> Result<()> {
        let cfg = ctx.config();
        let data_step = self.data_step()?;
        let dataset = Dataset::new(data_step.dest_dir(cfg));

        let dataset_id = ctx.datastore.upsert_dataset(&self.record(&dataset)?)?;

        let filter = cfg.run.publish_filter.as_deref().map(Regex::new).transpose()?;
        let jobs = self.column_jobs(&dataset.tables()?, filter.as_ref())?;

        let pool = bounded_pool(cfg.run.publish_workers, "publish")?;
        let upserted: Vec<ColumnId> = pool.install(|| {
            jobs.par_iter()
                .enumerate()
                .map(|(i, (catalog_path, data))| {
                    if i < VERBOSE_UPSERTS {
                        debug!(column = %catalog_path, rows = data.rows.len(), "upserting column");
                    }
                    ctx.datastore.upsert_column(dataset_id, catalog_path, data)
                })
                .collect::<anyhow::Result<Vec<_>>>()
        })?;
        ctx.datastore.flush()?;

        info!(step = %self.uri(), columns = upserted.len(), "published dataset");

        if cfg.run.publish_filter.is_some() || cfg.run.subset.is_some() {
            return Ok(());
        }

        // Ghost columns still referenced elsewhere survive this run; the
        // sentinel makes the next run publish again and retry the cleanup.
        let checksum = match ctx.datastore.cleanup_ghost_columns(dataset_id, &upserted) {
            Ok(true) => data_step.checksum_input(ctx)?,
            Ok(false) => {
                warn!(step = %self.uri(), "ghost columns could not be removed, will rerun");
                RERUN_SENTINEL.to_string()
            }
            Err(e) => {
                warn!(step = %self.uri(), error = %e, "ghost column cleanup failed, will rerun");
                RERUN_SENTINEL.to_string()
            }
        };

        ctx.datastore.set_checksum(dataset_id, &checksum)?;
        Ok(())
    }

    fn is_dirty(&self, ctx: &Context, cache: &DirtyCache) -> Result<bool> {
        let Some(dep) = self.dependencies.first() else {
            return Ok(true);
        };
        if dep.is_dirty(ctx, cache)? {
            return Ok(true);
        }

        let recorded = ctx.datastore.fetch_checksum(&self.path)?;
        let expected = self.data_step()?.checksum_input(ctx)?;
        Ok(recorded.as_deref() != Some(expected.as_str()))
    }

    fn checksum_input(&self, ctx: &Context) -> Result<String> {
        self.data_step()?.checksum_input(ctx)
    }

    fn checksum_output(&self, _ctx: &Context) -> Result<String> {
        Err(EtlError::NotImplemented(format!(
            "{} should not be used as an input",
            self.uri()
        )))
    }
}
