//! Comparison orchestrator - coordinates fetches, reconciliation and reference analysis.

mod pool;

pub use pool::{JobSlot, JobState, PoolOutput, WorkerPool};

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinError;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::compare::{
    attach_references, reconcile, reconcile_foreign_key, referenced_criteria, ComparisonResult,
    ForeignKeyResult, MatchCriteria, ResolvedCriteria,
};
use crate::config::{CompareConfig, Config};
use crate::core::{DataAccess, ForeignKey, RowSet, TableSchema};
use crate::error::{CompareError, Result, Side};
use crate::postgres::PgDatabase;
use crate::references::{
    self, compare_reference_values, discover_row_candidates, probe_candidate, union_constraints,
    ReferenceAnalysisReport, ReferenceMatch, ReferenceReport, ReferencingTable,
};
use crate::uuid_decode::UuidDecoder;

/// Comparison orchestrator over two database sides.
pub struct Orchestrator {
    db1: Arc<dyn DataAccess>,
    db2: Arc<dyn DataAccess>,
    config: CompareConfig,
    decoder: UuidDecoder,
}

/// Rows from both sides plus DB1's schema of the table.
#[derive(Debug, Clone)]
pub struct FetchedTable {
    pub schema: TableSchema,
    pub rows_db1: RowSet,
    pub rows_db2: RowSet,
}

/// Connectivity of both sides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub db1_type: String,
    pub db2_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub db1_error: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub db2_error: Option<String>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.db1_error.is_none() && self.db2_error.is_none()
    }
}

impl Orchestrator {
    /// Create an orchestrator over two already-open sides.
    pub fn new(db1: Arc<dyn DataAccess>, db2: Arc<dyn DataAccess>, config: CompareConfig) -> Self {
        let decoder = UuidDecoder::new(config.decode_uuids);
        Self {
            db1,
            db2,
            config,
            decoder,
        }
    }

    /// Open PostgreSQL pools for both configured databases.
    pub async fn connect(config: &Config) -> Result<Self> {
        let (db1, db2) = tokio::try_join!(
            PgDatabase::connect(&config.database1, Side::Db1),
            PgDatabase::connect(&config.database2, Side::Db2),
        )?;
        Ok(Self::new(
            Arc::new(db1),
            Arc::new(db2),
            config.compare.clone(),
        ))
    }

    pub fn config(&self) -> &CompareConfig {
        &self.config
    }

    fn side(&self, side: Side) -> &Arc<dyn DataAccess> {
        match side {
            Side::Db1 => &self.db1,
            Side::Db2 => &self.db2,
        }
    }

    /// Ping both sides concurrently.
    pub async fn health_check(&self) -> HealthReport {
        let (r1, r2) = tokio::join!(self.db1.ping(), self.db2.ping());
        HealthReport {
            db1_type: self.db1.db_type().to_string(),
            db2_type: self.db2.db_type().to_string(),
            db1_error: r1.err().map(|e| e.to_string()),
            db2_error: r2.err().map(|e| e.to_string()),
        }
    }

    /// Fetch DB1 rows, DB2 rows and DB1's schema as three concurrent tasks.
    ///
    /// All three run to completion or until the fetch timeout. Every failure
    /// is logged; a single failure is returned as-is, several are merged.
    pub async fn parallel_fetch(&self, schema: &str, table: &str) -> Result<FetchedTable> {
        let limit = self.config.fetch_timeout();

        let spawn_rows = |db: Arc<dyn DataAccess>| {
            let (schema, table) = (schema.to_string(), table.to_string());
            tokio::spawn(async move { db.get_all_rows(&schema, &table).await })
        };
        let rows1 = spawn_rows(self.db1.clone());
        let rows2 = spawn_rows(self.db2.clone());
        let meta = {
            let db = self.db1.clone();
            let (schema, table) = (schema.to_string(), table.to_string());
            tokio::spawn(async move { db.get_schema(&schema, &table).await })
        };
        let aborts = [
            rows1.abort_handle(),
            rows2.abort_handle(),
            meta.abort_handle(),
        ];

        let joined = tokio::time::timeout(limit, async { tokio::join!(rows1, rows2, meta) }).await;
        let (rows1, rows2, meta) = match joined {
            Ok(results) => results,
            Err(_) => {
                for handle in &aborts {
                    handle.abort();
                }
                warn!("Fetching {}.{} exceeded {:?}", schema, table, limit);
                return Err(CompareError::timeout("data fetch", limit));
            }
        };

        let mut errors = Vec::new();
        let rows_db1 = flatten(rows1, Side::Db1, "rows", &mut errors);
        let rows_db2 = flatten(rows2, Side::Db2, "rows", &mut errors);
        let table_schema = flatten(meta, Side::Db1, "schema", &mut errors);

        match (rows_db1, rows_db2, table_schema) {
            (Some(rows_db1), Some(rows_db2), Some(schema)) => Ok(FetchedTable {
                schema,
                rows_db1,
                rows_db2,
            }),
            _ => Err(merge_errors(errors)),
        }
    }

    /// Compare one table across both sides.
    ///
    /// Without `criteria` the defaults apply. Unless an include list is given
    /// or primary keys are kept, the table's declared primary key columns are
    /// excluded from matching and diffing.
    pub async fn compare_table(
        &self,
        schema: &str,
        table: &str,
        criteria: Option<MatchCriteria>,
    ) -> Result<ComparisonResult> {
        let full_name = format!("{}.{}", schema, table);
        info!("Comparing {}", full_name);

        let (exists1, exists2) = tokio::join!(
            self.db1.table_exists(schema, table),
            self.db2.table_exists(schema, table),
        );
        if !exists1? {
            return Err(CompareError::TableNotFound {
                table: full_name,
                side: Side::Db1,
            });
        }
        if !exists2? {
            return Err(CompareError::TableNotFound {
                table: full_name,
                side: Side::Db2,
            });
        }

        info!("Phase 1: Fetching rows and schema");
        let fetched = self.parallel_fetch(schema, table).await?;
        info!(
            "Fetched {} rows from DB1 and {} rows from DB2",
            fetched.rows_db1.len(),
            fetched.rows_db2.len()
        );

        let criteria = criteria
            .unwrap_or_default()
            .resolve()
            .with_primary_key(&fetched.schema);
        debug!("Excluded columns: {:?}", criteria.exclusions.sorted());

        info!("Phase 2: Matching rows");
        let foreign_keys = fetched.schema.foreign_keys.clone();
        let mut result = reconcile(
            schema,
            table,
            &fetched.rows_db1,
            &fetched.rows_db2,
            &criteria,
            &foreign_keys,
            self.config.duplicate_policy,
        )
        .result;
        info!(
            "{}: {} matched, {} only in DB1, {} only in DB2, {} with differences",
            full_name,
            result.matched_rows,
            result.only_in_db1.len(),
            result.only_in_db2.len(),
            result.differences.len()
        );

        if !foreign_keys.is_empty() {
            info!(
                "Phase 3: Reconciling {} foreign keys with up to {} workers",
                foreign_keys.len(),
                self.config.max_workers
            );
            let referenced = futures::future::join_all(
                foreign_keys
                    .iter()
                    .map(|fk| referenced_criteria(self.db1.as_ref(), fk, &criteria)),
            )
            .await;

            let by_column: HashMap<String, ResolvedCriteria> = foreign_keys
                .iter()
                .zip(&referenced)
                .map(|(fk, c)| (fk.column_name.clone(), c.clone()))
                .collect();
            for diff in &mut result.differences {
                attach_references(
                    diff,
                    self.db1.as_ref(),
                    self.db2.as_ref(),
                    &foreign_keys,
                    &by_column,
                )
                .await;
            }

            let rows_a = Arc::new(fetched.rows_db1);
            let rows_b = Arc::new(fetched.rows_db2);
            let (fk_results, errors) = self
                .reconcile_foreign_keys(&foreign_keys, referenced, rows_a, rows_b)
                .await;
            result.foreign_key_results = fk_results;
            result.errors.extend(errors);
        }

        self.decoder.process_comparison(&mut result);
        info!("Comparison of {} complete", full_name);
        Ok(result)
    }

    /// Run one pool job per foreign key. Results keep declaration order.
    async fn reconcile_foreign_keys(
        &self,
        foreign_keys: &[ForeignKey],
        criteria: Vec<ResolvedCriteria>,
        rows_a: Arc<RowSet>,
        rows_b: Arc<RowSet>,
    ) -> (Vec<ForeignKeyResult>, Vec<String>) {
        let policy = self.config.duplicate_policy;
        let jobs: Vec<_> = foreign_keys
            .iter()
            .cloned()
            .zip(criteria)
            .map(|(fk, criteria)| {
                let (db1, db2) = (self.db1.clone(), self.db2.clone());
                let (rows_a, rows_b) = (rows_a.clone(), rows_b.clone());
                move || async move {
                    let result = reconcile_foreign_key(
                        &fk,
                        &rows_a,
                        &rows_b,
                        db1.as_ref(),
                        db2.as_ref(),
                        &criteria,
                        policy,
                    )
                    .await;
                    Ok::<_, CompareError>(result)
                }
            })
            .collect();

        let total_timeout = self.config.fk_total_timeout();
        let pool = WorkerPool::new(
            self.config.max_workers,
            self.config.fk_job_timeout(),
            total_timeout,
        );
        let output = pool.run(jobs).await;

        let mut errors = Vec::new();
        if output.timed_out {
            errors.push(CompareError::timeout("FK analysis", total_timeout).to_string());
        }

        let results = output
            .slots
            .into_iter()
            .zip(foreign_keys)
            .map(|(slot, fk)| match slot {
                JobSlot::Done(result) => result,
                JobSlot::Failed(message) => ForeignKeyResult::failed(fk.clone(), message),
                JobSlot::TimedOut(after) => {
                    warn!("{}: job timed out after {:?}", fk.constraint_name, after);
                    ForeignKeyResult::failed(
                        fk.clone(),
                        format!("job timed out after {}s", after.as_secs()),
                    )
                }
                JobSlot::Pending => ForeignKeyResult::failed(fk.clone(), "FK analysis timeout"),
            })
            .collect();

        (results, errors)
    }

    /// Compare the values held in every column referencing `schema.table.column`.
    pub async fn find_references(
        &self,
        schema: &str,
        table: &str,
        column: &str,
    ) -> Result<ReferenceReport> {
        info!("Finding references to {}.{}.{}", schema, table, column);
        let (found1, found2) = tokio::join!(
            self.db1.get_referencing_constraints(schema, table, column),
            self.db2.get_referencing_constraints(schema, table, column),
        );

        let mut errors = Vec::new();
        let constraints = match (found1, found2) {
            (Err(e1), Err(e2)) => {
                warn!("Constraint discovery failed on both sides: DB2: {}", e2);
                return Err(e1);
            }
            (found1, found2) => {
                let side1 = found1.unwrap_or_else(|e| {
                    warn!("DB1 constraint discovery failed: {}", e);
                    errors.push(format!("DB1: {}", e));
                    Vec::new()
                });
                let side2 = found2.unwrap_or_else(|e| {
                    warn!("DB2 constraint discovery failed: {}", e);
                    errors.push(format!("DB2: {}", e));
                    Vec::new()
                });
                union_constraints(side1, side2)
            }
        };
        info!("Found {} referencing columns", constraints.len());

        let total = constraints.len();
        let semaphore = Arc::new(Semaphore::new(self.config.max_workers.max(1)));
        let (tx, mut rx) = mpsc::channel::<(usize, ReferenceMatch)>(total.max(1));
        let mut handles = Vec::with_capacity(total);

        for (idx, constraint) in constraints.iter().cloned().enumerate() {
            let semaphore = semaphore.clone();
            let tx = tx.clone();
            let (db1, db2) = (self.db1.clone(), self.db2.clone());
            handles.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                debug!("Comparing values of {}", constraint.full_name());
                let matched =
                    compare_reference_values(&constraint, db1.as_ref(), db2.as_ref()).await;
                let _ = tx.send((idx, matched)).await;
            }));
        }
        drop(tx);

        let limit = self.config.reference_timeout();
        let deadline = Instant::now() + limit;
        let mut slots: Vec<Option<ReferenceMatch>> = vec![None; total];
        let mut received = 0;
        let mut timed_out = false;
        while received < total {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some((idx, matched))) => {
                    slots[idx] = Some(matched);
                    received += 1;
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        "Reference analysis timeout after {:?}: {}/{} complete",
                        limit, received, total
                    );
                    errors.push(CompareError::timeout("reference analysis", limit).to_string());
                    timed_out = true;
                    break;
                }
            }
        }
        for handle in &handles {
            handle.abort();
        }

        let references = slots
            .into_iter()
            .zip(&constraints)
            .map(|(slot, constraint)| {
                slot.unwrap_or_else(|| {
                    let message = if timed_out {
                        "reference analysis timeout"
                    } else {
                        "reference task failed"
                    };
                    warn!("{}: {}", constraint.full_name(), message);
                    ReferenceMatch::failed(constraint, message)
                })
            })
            .collect();

        let mut report = ReferenceReport::new(schema, table, column).with_references(references);
        report.errors = errors;
        self.decoder.process_reference_report(&mut report);
        info!(
            "{} referencing tables, {} references",
            report.referencing_tables, report.total_references
        );
        Ok(report)
    }

    /// Find every column on either side that holds `row_id` and points at `schema.table`.
    pub async fn analyze_references_to_row(
        &self,
        schema: &str,
        table: &str,
        row_id: &str,
    ) -> Result<ReferenceAnalysisReport> {
        info!("Analyzing references to {}.{} id={}", schema, table, row_id);
        let candidates = discover_row_candidates(self.db1.as_ref(), schema, table).await?;
        info!("Probing {} candidate columns", candidates.len());

        let mut report = ReferenceAnalysisReport::new(schema, table, row_id);
        report.total_constraints = candidates.len();

        let total = candidates.len();
        let sample_limit = self.config.sample_limit;
        let semaphore = Arc::new(Semaphore::new(self.config.max_workers.max(1)));
        let (tx, mut rx) = mpsc::channel::<(usize, Option<ReferencingTable>)>(total.max(1));
        let mut handles = Vec::with_capacity(total);

        for (idx, candidate) in candidates.into_iter().enumerate() {
            let semaphore = semaphore.clone();
            let tx = tx.clone();
            let (db1, db2) = (self.db1.clone(), self.db2.clone());
            let row_id = row_id.to_string();
            handles.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                let found =
                    probe_candidate(&candidate, &row_id, sample_limit, db1.as_ref(), db2.as_ref())
                        .await;
                let _ = tx.send((idx, found)).await;
            }));
        }
        drop(tx);

        let limit = self.config.reference_timeout();
        let deadline = Instant::now() + limit;
        let mut slots: Vec<Option<ReferencingTable>> = vec![None; total];
        let mut received = 0;
        while received < total {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some((idx, found))) => {
                    slots[idx] = found;
                    received += 1;
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        "Row reference analysis timeout after {:?}: {}/{} complete",
                        limit, received, total
                    );
                    report
                        .errors
                        .push(CompareError::timeout("reference analysis", limit).to_string());
                    break;
                }
            }
        }
        for handle in &handles {
            handle.abort();
        }

        report.referencing_tables = slots
            .into_iter()
            .flatten()
            .filter(|t| t.matches_db1 > 0 || t.matches_db2 > 0)
            .collect();
        info!(
            "{} of {} candidates reference id {}",
            report.referencing_tables.len(),
            report.total_constraints,
            row_id
        );
        Ok(report)
    }

    /// Script repointing references from `old_id` to `new_id`, built from `source`'s catalog.
    pub async fn generate_corrective_script(
        &self,
        schema: &str,
        table: &str,
        old_id: &str,
        new_id: &str,
        source: Side,
    ) -> Result<String> {
        info!(
            "Generating corrective script for {}.{} from {}",
            schema, table, source
        );
        references::generate_corrective_script(
            self.side(source).as_ref(),
            schema,
            table,
            old_id,
            new_id,
        )
        .await
    }
}

fn flatten<T>(
    joined: std::result::Result<Result<T>, JoinError>,
    side: Side,
    what: &str,
    errors: &mut Vec<CompareError>,
) -> Option<T> {
    match joined {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            warn!("{} {} fetch failed: {}", side, what, e);
            errors.push(e);
            None
        }
        Err(e) => {
            warn!("{} {} task failed: {}", side, what, e);
            errors.push(CompareError::fetch(side, format!("{} task failed: {}", what, e)));
            None
        }
    }
}

fn merge_errors(mut errors: Vec<CompareError>) -> CompareError {
    if errors.len() == 1 {
        return errors.remove(0);
    }
    let side = match errors.first() {
        Some(CompareError::Fetch { side, .. }) => *side,
        Some(CompareError::TableNotFound { side, .. }) => *side,
        _ => Side::Db1,
    };
    let message = errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ");
    CompareError::fetch(side, message)
}
