// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job table operations.
//!
//! Stage workers never hold row locks: each claim and publish is a single
//! `UPDATE ... WHERE id = ? AND dv = ?` whose affected-row count decides the
//! race. `find_and_advance` is the stage-pickup primitive; everything else
//! is bookkeeping around it.

use crate::error::{is_unique_violation, StoreError};
use crate::schema::JOB_COLUMNS;
use crate::Store;
use cellcc_core::{Clock, Job, JobDesc, JobFilter, JobState, JobUpdate, UpdateCtx};
use sqlx::any::AnyRow;
use sqlx::Row;

/// Request to create one sync (or delete) job.
#[derive(Debug, Clone)]
pub struct CreateJob {
    pub src_cell: String,
    pub dst_cell: String,
    pub volname: String,
    pub qname: String,
    /// Create a deletion job (`DELETE_NEW`) instead of a sync (`NEW`).
    pub delete: bool,
}

/// One bound SQL value; the store only ever binds integers and strings.
#[derive(Debug, Clone)]
enum Bind {
    I64(Option<i64>),
    Str(Option<String>),
}

impl Bind {
    fn int(v: i64) -> Self {
        Bind::I64(Some(v))
    }

    fn text(v: impl Into<String>) -> Self {
        Bind::Str(Some(v.into()))
    }
}

type AnyQuery<'q> = sqlx::query::Query<'q, sqlx::Any, sqlx::any::AnyArguments<'q>>;

fn bind_all<'q>(mut q: AnyQuery<'q>, binds: &'q [Bind]) -> AnyQuery<'q> {
    for b in binds {
        q = match b {
            Bind::I64(v) => q.bind(*v),
            Bind::Str(v) => q.bind(v.as_deref()),
        };
    }
    q
}

/// WHERE fragments + binds for a [`JobFilter`].
fn filter_sql(filter: &JobFilter) -> (Vec<String>, Vec<Bind>) {
    let mut wheres = Vec::new();
    let mut binds = Vec::new();
    if let Some(jobid) = filter.jobid {
        wheres.push("id = ?".to_string());
        binds.push(Bind::int(jobid));
    }
    if let Some(src) = &filter.src_cell {
        wheres.push("src_cell = ?".to_string());
        binds.push(Bind::text(src.clone()));
    }
    if let Some(dsts) = &filter.dst_cells {
        if dsts.is_empty() {
            wheres.push("1 = 0".to_string());
        } else {
            wheres.push(in_list("dst_cell", dsts.len()));
            binds.extend(dsts.iter().map(|d| Bind::text(d.clone())));
        }
    }
    if let Some(vol) = &filter.volname {
        wheres.push("volname = ?".to_string());
        binds.push(Bind::text(vol.clone()));
    }
    if let Some(qname) = &filter.qname {
        wheres.push("qname = ?".to_string());
        binds.push(Bind::text(qname.clone()));
    }
    if let Some(states) = &filter.states {
        if states.is_empty() {
            wheres.push("1 = 0".to_string());
        } else {
            wheres.push(in_list("state", states.len()));
            binds.extend(states.iter().map(|s| Bind::text(s.as_str())));
        }
    }
    (wheres, binds)
}

fn in_list(col: &str, n: usize) -> String {
    let marks = vec!["?"; n].join(", ");
    format!("{col} IN ({marks})")
}

fn where_clause(wheres: &[String]) -> String {
    if wheres.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", wheres.join(" AND "))
    }
}

/// Decode one row into a [`Job`].
fn job_from_row(row: &AnyRow) -> Result<Job, StoreError> {
    let jobid: i64 = row.try_get("id")?;
    let corrupt = |message: String| StoreError::Corrupt { jobid, message };

    let state: Option<String> = row.try_get("state")?;
    let state = state
        .ok_or_else(|| corrupt("null state".to_string()))?
        .parse::<JobState>()
        .map_err(|e| corrupt(e.to_string()))?;
    let last_good_state: Option<String> = row.try_get("last_good_state")?;
    let last_good_state = last_good_state
        .map(|s| s.parse::<JobState>())
        .transpose()
        .map_err(|e| corrupt(e.to_string()))?;

    Ok(Job {
        jobid,
        src_cell: row.try_get("src_cell")?,
        dst_cell: row.try_get("dst_cell")?,
        volname: row.try_get("volname")?,
        qname: row.try_get("qname")?,
        state,
        last_good_state,
        dv: row.try_get::<i64, _>("dv")? as u64,
        errors: row.try_get::<i64, _>("errors")? as u32,
        errorlimit_mtime: row.try_get("errorlimit_mtime")?,
        dump_fqdn: row.try_get("dump_fqdn")?,
        dump_method: row.try_get("dump_method")?,
        dump_port: row.try_get("dump_port")?,
        dump_filename: row.try_get("dump_filename")?,
        dump_checksum: row.try_get("dump_checksum")?,
        dump_filesize: row.try_get("dump_filesize")?,
        vol_lastupdate: row.try_get("vol_lastupdate")?,
        restore_filename: row.try_get("restore_filename")?,
        ctime: row.try_get("ctime")?,
        mtime: row.try_get("mtime")?,
        timeout: row.try_get("timeout")?,
        status_fqdn: row.try_get("status_fqdn")?,
        description: row.try_get("description")?,
    })
}

/// SET fragments + binds for a [`JobUpdate`].
fn update_sql(update: &JobUpdate) -> (Vec<&'static str>, Vec<Bind>) {
    let mut sets = Vec::new();
    let mut binds = Vec::new();
    if let Some(state) = update.state {
        sets.push("state = ?");
        binds.push(Bind::text(state.as_str()));
    }
    if let Some(lgs) = &update.last_good_state {
        sets.push("last_good_state = ?");
        binds.push(Bind::Str(lgs.map(|s| s.as_str().to_string())));
    }
    if let Some(errors) = update.errors {
        sets.push("errors = ?");
        binds.push(Bind::int(errors as i64));
    }
    if let Some(at) = &update.errorlimit_mtime {
        sets.push("errorlimit_mtime = ?");
        binds.push(Bind::I64(*at));
    }
    if let Some(v) = &update.dump_fqdn {
        sets.push("dump_fqdn = ?");
        binds.push(Bind::Str(v.clone()));
    }
    if let Some(v) = &update.dump_method {
        sets.push("dump_method = ?");
        binds.push(Bind::Str(v.clone()));
    }
    if let Some(v) = &update.dump_port {
        sets.push("dump_port = ?");
        binds.push(Bind::I64(*v));
    }
    if let Some(v) = &update.dump_filename {
        sets.push("dump_filename = ?");
        binds.push(Bind::Str(v.clone()));
    }
    if let Some(v) = &update.dump_checksum {
        sets.push("dump_checksum = ?");
        binds.push(Bind::Str(v.clone()));
    }
    if let Some(v) = &update.dump_filesize {
        sets.push("dump_filesize = ?");
        binds.push(Bind::I64(*v));
    }
    if let Some(v) = update.vol_lastupdate {
        sets.push("vol_lastupdate = ?");
        binds.push(Bind::int(v));
    }
    if let Some(v) = &update.restore_filename {
        sets.push("restore_filename = ?");
        binds.push(Bind::Str(v.clone()));
    }
    if let Some(v) = &update.timeout {
        sets.push("timeout = ?");
        binds.push(Bind::I64(*v));
    }
    if let Some(v) = &update.description {
        sets.push("description = ?");
        binds.push(Bind::text(v.clone()));
    }
    (sets, binds)
}

impl<C: Clock> Store<C> {
    /// Create one job in `NEW` (or `DELETE_NEW`) and return the stored row.
    ///
    /// At most one in-flight job may exist per `(dst_cell, volname)`; a
    /// second request is a [`StoreError::DuplicateJob`].
    pub async fn create_job(&self, req: &CreateJob) -> Result<Job, StoreError> {
        let now = self.now();
        let fqdn = self.fqdn().to_string();
        self.run_txn(|tx| {
            let req = req.clone();
            let fqdn = fqdn.clone();
            Box::pin(async move {
                let (state, description) = if req.delete {
                    (JobState::DeleteNew, "waiting for site deletion")
                } else {
                    (JobState::New, "waiting to be dumped")
                };
                let insert = sqlx::query(
                    "INSERT INTO jobs (src_cell, dst_cell, volname, qname, vol_lastupdate, \
                     dv, errors, state, ctime, mtime, status_fqdn, description) \
                     VALUES (?, ?, ?, ?, 0, 1, 0, ?, ?, ?, ?, ?)",
                )
                .bind(&req.src_cell)
                .bind(&req.dst_cell)
                .bind(&req.volname)
                .bind(&req.qname)
                .bind(state.as_str())
                .bind(now)
                .bind(now)
                .bind(&fqdn)
                .bind(description)
                .execute(&mut **tx)
                .await;
                if let Err(err) = insert {
                    if is_unique_violation(&err) {
                        return Err(StoreError::DuplicateJob {
                            volname: req.volname.clone(),
                            dst_cell: req.dst_cell.clone(),
                        });
                    }
                    return Err(err.into());
                }

                let row = sqlx::query(&format!(
                    "SELECT {JOB_COLUMNS} FROM jobs WHERE dst_cell = ? AND volname = ?"
                ))
                .bind(&req.dst_cell)
                .bind(&req.volname)
                .fetch_one(&mut **tx)
                .await?;
                job_from_row(&row)
            })
        })
        .await
    }

    /// Fetch jobs matching `filter`, oldest `mtime` first.
    pub async fn find_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>, StoreError> {
        let (wheres, binds) = filter_sql(filter);
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM jobs{} ORDER BY mtime ASC, id ASC",
            where_clause(&wheres)
        );
        let rows = bind_all(sqlx::query(&sql), &binds)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(job_from_row).collect()
    }

    /// Fetch a single job by id.
    pub async fn find_job(&self, jobid: i64) -> Result<Job, StoreError> {
        self.find_jobs(&JobFilter::jobid(jobid))
            .await?
            .into_iter()
            .next()
            .ok_or(StoreError::NotFound(jobid))
    }

    /// Read-only view with the computed staleness/age/deadline fields.
    pub async fn describe_jobs(&self, filter: &JobFilter) -> Result<Vec<JobDesc>, StoreError> {
        let now = self.now();
        let jobs = self.find_jobs(filter).await?;
        Ok(jobs
            .into_iter()
            .map(|j| JobDesc::from_job(j, now))
            .collect())
    }

    /// Apply one optimistic update.
    ///
    /// The update succeeds only if the row's `dv` still matches `ctx.dv`
    /// (and, when given, its state matches `from_state`); on success
    /// `ctx.dv` is bumped to the row's new version.
    pub async fn update_job(
        &self,
        ctx: &mut UpdateCtx,
        update: &JobUpdate,
        from_state: Option<JobState>,
    ) -> Result<(), StoreError> {
        let (sets, binds) = update_sql(update);
        let mut sql = String::from("UPDATE jobs SET dv = dv + 1, mtime = ?, status_fqdn = ?");
        for set in &sets {
            sql.push_str(", ");
            sql.push_str(set);
        }
        sql.push_str(" WHERE id = ? AND dv = ?");
        if from_state.is_some() {
            sql.push_str(" AND state = ?");
        }

        let mut all = vec![Bind::int(self.now()), Bind::text(self.fqdn())];
        all.extend(binds);
        all.push(Bind::int(ctx.jobid));
        all.push(Bind::int(ctx.dv as i64));
        if let Some(state) = from_state {
            all.push(Bind::text(state.as_str()));
        }

        let result = self
            .run_txn(|tx| {
                let sql = sql.clone();
                let all = all.clone();
                Box::pin(async move {
                    let res = bind_all(sqlx::query(&sql), &all).execute(&mut **tx).await?;
                    Ok(res.rows_affected())
                })
            })
            .await?;
        if result != 1 {
            return Err(StoreError::JobConflict {
                jobid: ctx.jobid,
                dv: ctx.dv,
            });
        }
        ctx.dv += 1;
        Ok(())
    }

    /// The stage-pickup primitive.
    ///
    /// In one transaction: advance every matching row in `from` to `to`
    /// (stamping the caller's default `timeout` and `description`), then
    /// return all rows now in `to` for the same filter, which may include
    /// rows another worker advanced. Races on individual rows are settled
    /// by the dv guard and skipped silently.
    pub async fn find_and_advance(
        &self,
        from: JobState,
        to: JobState,
        filter: &JobFilter,
        timeout: Option<i64>,
        description: &str,
    ) -> Result<Vec<Job>, StoreError> {
        let (wheres, binds) = filter_sql(filter);
        let now = self.now();
        let fqdn = self.fqdn().to_string();
        let where_sql = where_clause(&wheres);
        self.run_txn(|tx| {
            let binds = binds.clone();
            let fqdn = fqdn.clone();
            let where_sql = where_sql.clone();
            let description = description.to_string();
            Box::pin(async move {
                let select = format!(
                    "SELECT id, dv FROM jobs{} AND state = ? ORDER BY mtime ASC, id ASC",
                    if where_sql.is_empty() {
                        " WHERE 1 = 1".to_string()
                    } else {
                        where_sql.clone()
                    }
                );
                let mut select_binds = binds.clone();
                select_binds.push(Bind::text(from.as_str()));
                let rows = bind_all(sqlx::query(&select), &select_binds)
                    .fetch_all(&mut **tx)
                    .await?;

                for row in &rows {
                    let id: i64 = row.try_get("id")?;
                    let dv: i64 = row.try_get("dv")?;
                    let res = sqlx::query(
                        "UPDATE jobs SET dv = dv + 1, mtime = ?, status_fqdn = ?, state = ?, \
                         timeout = ?, description = ? WHERE id = ? AND dv = ? AND state = ?",
                    )
                    .bind(now)
                    .bind(&fqdn)
                    .bind(to.as_str())
                    .bind(timeout)
                    .bind(&description)
                    .bind(id)
                    .bind(dv)
                    .bind(from.as_str())
                    .execute(&mut **tx)
                    .await?;
                    if res.rows_affected() != 1 {
                        tracing::debug!(jobid = id, dv, "lost claim race, skipping row");
                    }
                }

                let fetch = format!(
                    "SELECT {JOB_COLUMNS} FROM jobs{} AND state = ? ORDER BY mtime ASC, id ASC",
                    if where_sql.is_empty() {
                        " WHERE 1 = 1".to_string()
                    } else {
                        where_sql.clone()
                    }
                );
                let mut fetch_binds = binds.clone();
                fetch_binds.push(Bind::text(to.as_str()));
                let rows = bind_all(sqlx::query(&fetch), &fetch_binds)
                    .fetch_all(&mut **tx)
                    .await?;
                rows.iter().map(job_from_row).collect()
            })
        })
        .await
    }

    /// Copy a finished job to `jobshist`, then delete the live row.
    pub async fn archive_job(&self, jobid: i64) -> Result<(), StoreError> {
        self.run_txn(|tx| {
            Box::pin(async move {
                let copied = sqlx::query(&format!(
                    "INSERT INTO jobshist ({JOB_COLUMNS}) \
                     SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?"
                ))
                .bind(jobid)
                .execute(&mut **tx)
                .await?;
                if copied.rows_affected() == 0 {
                    return Err(StoreError::NotFound(jobid));
                }
                sqlx::query("DELETE FROM jobs WHERE id = ?")
                    .bind(jobid)
                    .execute(&mut **tx)
                    .await?;
                Ok(())
            })
        })
        .await
    }

    /// Delete a live row outright, bypassing the state machine.
    pub async fn kill_job(&self, jobid: i64) -> Result<(), StoreError> {
        let res = sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(jobid)
            .execute(&self.pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound(jobid));
        }
        Ok(())
    }

    /// Record a stage failure: `ERROR`, `errors + 1`, prior state preserved,
    /// timeout cleared.
    ///
    /// Best-effort: this runs on error paths, so database trouble is
    /// logged and swallowed. A dv conflict means the check engine already
    /// took the job back; that is also only logged.
    pub async fn job_error(&self, ctx: &mut UpdateCtx, message: &str) {
        let jobid = ctx.jobid;
        let outcome = self.job_error_inner(ctx, message).await;
        match outcome {
            Ok(()) => {}
            Err(StoreError::JobConflict { dv, .. }) => {
                tracing::info!(jobid, dv, "job changed hands before the failure was recorded");
            }
            Err(err) => {
                tracing::error!(jobid, error = %err, message, "failed to record job error");
            }
        }
    }

    async fn job_error_inner(
        &self,
        ctx: &mut UpdateCtx,
        message: &str,
    ) -> Result<(), StoreError> {
        let job = self.find_job(ctx.jobid).await?;
        if job.dv != ctx.dv {
            return Err(StoreError::JobConflict {
                jobid: ctx.jobid,
                dv: ctx.dv,
            });
        }
        let update = JobUpdate {
            state: Some(JobState::Error),
            last_good_state: Some(Some(job.state)),
            errors: Some(job.errors + 1),
            timeout: Some(None),
            description: Some(message.to_string()),
            ..JobUpdate::default()
        };
        self.update_job(ctx, &update, None).await
    }

    /// Operator retry: clear the error count and return the job to the
    /// state derived from `last_good_state`.
    pub async fn job_reset(&self, jobid: i64) -> Result<JobState, StoreError> {
        let job = self.find_job(jobid).await?;
        if job.state != JobState::Error {
            return Err(StoreError::NotInError {
                jobid,
                state: job.state,
            });
        }
        let target = job
            .last_good_state
            .map(|s| s.retry_target())
            .unwrap_or(JobState::New);
        let update = JobUpdate {
            state: Some(target),
            last_good_state: Some(None),
            errors: Some(0),
            errorlimit_mtime: Some(None),
            timeout: Some(None),
            description: Some("reset by operator".to_string()),
            ..JobUpdate::default()
        };
        let mut ctx = job.update_ctx();
        self.update_job(&mut ctx, &update, Some(JobState::Error))
            .await?;
        Ok(target)
    }
}

/// Synthetic jobs for exercising alert formatting without a database.
pub fn describe_dummy_jobs(n: usize, now: i64) -> Vec<JobDesc> {
    let states = [
        JobState::New,
        JobState::DumpWork,
        JobState::XferWork,
        JobState::RestoreWork,
        JobState::Error,
    ];
    (0..n)
        .map(|i| {
            let job = Job {
                jobid: (i + 1) as i64,
                src_cell: "src.example".to_string(),
                dst_cell: "dst.example".to_string(),
                volname: format!("dummy.vol.{i}"),
                qname: "default".to_string(),
                state: states[i % states.len()],
                last_good_state: None,
                dv: 1,
                errors: 0,
                errorlimit_mtime: None,
                dump_fqdn: None,
                dump_method: None,
                dump_port: None,
                dump_filename: None,
                dump_checksum: None,
                dump_filesize: None,
                vol_lastupdate: 0,
                restore_filename: None,
                ctime: now - 60,
                mtime: now - 30,
                timeout: None,
                status_fqdn: None,
                description: "dummy job".to_string(),
            };
            JobDesc::from_job(job, now)
        })
        .collect()
}

#[cfg(test)]
#[path = "jobs_tests.rs"]
mod tests;
