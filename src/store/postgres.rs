//! # PostgreSQL Store
//!
//! sqlx-backed implementation of [`JobStore`] and [`CredentialStore`]. Line
//! snapshots and batch results are stored as JSONB; the retry queue is a table
//! keyed by `(session_id, batch_index)` and drained with `FOR UPDATE SKIP LOCKED`
//! so several orchestrator instances can share one database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tracing::{debug, info, instrument};

use super::errors::{StoreError, StoreResult};
use super::traits::{CredentialStore, JobStore};
use crate::models::{BatchTask, Credential, Job, RetryEntry, SubtitleLine, TranslatedLine};
use crate::state_machine::{BatchTaskState, JobState};

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        info!(max_connections, "Connected to PostgreSQL");
        Ok(Self::new(pool))
    }

    /// Apply the embedded schema migrations
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        debug!("Database migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn to_u32(value: i32, field: &str) -> StoreResult<u32> {
    u32::try_from(value).map_err(|_| StoreError::Serialization(format!("negative {field}: {value}")))
}

fn to_u64(value: i64, field: &str) -> StoreResult<u64> {
    u64::try_from(value).map_err(|_| StoreError::Serialization(format!("negative {field}: {value}")))
}

fn to_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[derive(Debug, FromRow)]
struct JobRow {
    session_id: String,
    user_id: Option<String>,
    status: String,
    total_lines: i32,
    completed_lines: i32,
    progress: f64,
    model: String,
    prompt: String,
    system_instruction: String,
    target_language: String,
    thinking_budget: Option<i64>,
    callback_url: Option<String>,
    original_lines: Json<Vec<SubtitleLine>>,
    results: Option<Json<Vec<TranslatedLine>>>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<JobRow> for Job {
    type Error = StoreError;

    fn try_from(row: JobRow) -> StoreResult<Self> {
        Ok(Job {
            status: row
                .status
                .parse::<JobState>()
                .map_err(StoreError::Serialization)?,
            total_lines: to_u32(row.total_lines, "total_lines")?,
            completed_lines: to_u32(row.completed_lines, "completed_lines")?,
            session_id: row.session_id,
            user_id: row.user_id,
            progress: row.progress,
            model: row.model,
            prompt: row.prompt,
            system_instruction: row.system_instruction,
            target_language: row.target_language,
            thinking_budget: row.thinking_budget,
            callback_url: row.callback_url,
            original_lines: row.original_lines.0,
            results: row.results.map(|json| json.0),
            error_message: row.error_message,
            created_at: row.created_at,
            updated_at: row.updated_at,
            completed_at: row.completed_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct BatchTaskRow {
    session_id: String,
    batch_index: i32,
    start_line_index: i32,
    line_count: i32,
    worker_id: Option<String>,
    status: String,
    retry_count: i32,
    results: Option<Json<Vec<TranslatedLine>>>,
    error_message: Option<String>,
    sent_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<BatchTaskRow> for BatchTask {
    type Error = StoreError;

    fn try_from(row: BatchTaskRow) -> StoreResult<Self> {
        Ok(BatchTask {
            status: row
                .status
                .parse::<BatchTaskState>()
                .map_err(StoreError::Serialization)?,
            batch_index: to_u32(row.batch_index, "batch_index")?,
            start_line_index: to_u32(row.start_line_index, "start_line_index")?,
            line_count: to_u32(row.line_count, "line_count")?,
            retry_count: to_u32(row.retry_count, "retry_count")?,
            session_id: row.session_id,
            worker_id: row.worker_id,
            results: row.results.map(|json| json.0),
            error_message: row.error_message,
            sent_at: row.sent_at,
            completed_at: row.completed_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct RetryRow {
    session_id: String,
    batch_index: i32,
    attempts: i32,
    exclude_worker_id: Option<String>,
    enqueued_at: DateTime<Utc>,
}

impl TryFrom<RetryRow> for RetryEntry {
    type Error = StoreError;

    fn try_from(row: RetryRow) -> StoreResult<Self> {
        Ok(RetryEntry {
            batch_index: to_u32(row.batch_index, "batch_index")?,
            attempts: to_u32(row.attempts, "attempts")?,
            session_id: row.session_id,
            exclude_worker_id: row.exclude_worker_id,
            enqueued_at: row.enqueued_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct CredentialRow {
    id: i64,
    secret: String,
    cooldown_until: Option<DateTime<Utc>>,
    success_count: i64,
    failure_count: i64,
    consecutive_failures: i32,
}

impl TryFrom<CredentialRow> for Credential {
    type Error = StoreError;

    fn try_from(row: CredentialRow) -> StoreResult<Self> {
        Ok(Credential {
            id: row.id,
            secret: row.secret,
            cooldown_until: row.cooldown_until,
            success_count: to_u64(row.success_count, "success_count")?,
            failure_count: to_u64(row.failure_count, "failure_count")?,
            consecutive_failures: to_u32(row.consecutive_failures, "consecutive_failures")?,
        })
    }
}

const JOB_COLUMNS: &str = r#"
    session_id, user_id, status, total_lines, completed_lines, progress, model, prompt,
    system_instruction, target_language, thinking_budget, callback_url, original_lines,
    results, error_message, created_at, updated_at, completed_at
"#;

const TASK_COLUMNS: &str = r#"
    session_id, batch_index, start_line_index, line_count, worker_id, status,
    retry_count, results, error_message, sent_at, completed_at
"#;

#[async_trait]
impl JobStore for PgStore {
    #[instrument(skip(self, job, tasks), fields(session_id = %job.session_id, tasks = tasks.len()))]
    async fn create_job(&self, job: &Job, tasks: &[BatchTask]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let query = format!(
            "INSERT INTO translation_jobs ({JOB_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18) \
             ON CONFLICT (session_id) DO NOTHING"
        );
        let result = sqlx::query(&query)
            .bind(&job.session_id)
            .bind(&job.user_id)
            .bind(job.status.as_str())
            .bind(to_i32(job.total_lines))
            .bind(to_i32(job.completed_lines))
            .bind(job.progress)
            .bind(&job.model)
            .bind(&job.prompt)
            .bind(&job.system_instruction)
            .bind(&job.target_language)
            .bind(job.thinking_budget)
            .bind(&job.callback_url)
            .bind(Json(&job.original_lines))
            .bind(job.results.as_ref().map(Json))
            .bind(&job.error_message)
            .bind(job.created_at)
            .bind(job.updated_at)
            .bind(job.completed_at)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::duplicate("job", &job.session_id));
        }

        let query = format!(
            "INSERT INTO translation_batch_tasks ({TASK_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             ON CONFLICT (session_id, batch_index) DO NOTHING"
        );
        for task in tasks {
            let result = sqlx::query(&query)
                .bind(&task.session_id)
                .bind(to_i32(task.batch_index))
                .bind(to_i32(task.start_line_index))
                .bind(to_i32(task.line_count))
                .bind(&task.worker_id)
                .bind(task.status.as_str())
                .bind(to_i32(task.retry_count))
                .bind(task.results.as_ref().map(Json))
                .bind(&task.error_message)
                .bind(task.sent_at)
                .bind(task.completed_at)
                .execute(&mut *tx)
                .await?;
            if result.rows_affected() == 0 {
                return Err(StoreError::duplicate("batch task", task.key().to_string()));
            }
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_job(&self, session_id: &str) -> StoreResult<Option<Job>> {
        let query = format!("SELECT {JOB_COLUMNS} FROM translation_jobs WHERE session_id = $1");
        let row = sqlx::query_as::<_, JobRow>(&query)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Job::try_from).transpose()
    }

    async fn save_job(&self, job: &Job) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE translation_jobs
            SET status = $2, completed_lines = $3, progress = $4, results = $5,
                error_message = $6, updated_at = $7, completed_at = $8
            WHERE session_id = $1
            "#,
        )
        .bind(&job.session_id)
        .bind(job.status.as_str())
        .bind(to_i32(job.completed_lines))
        .bind(job.progress)
        .bind(job.results.as_ref().map(Json))
        .bind(&job.error_message)
        .bind(job.updated_at)
        .bind(job.completed_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("job", &job.session_id));
        }
        Ok(())
    }

    async fn list_active_jobs(&self) -> StoreResult<Vec<Job>> {
        let query = format!(
            "SELECT {JOB_COLUMNS} FROM translation_jobs \
             WHERE status NOT IN ('completed', 'partialcompleted', 'failed') \
             ORDER BY created_at"
        );
        sqlx::query_as::<_, JobRow>(&query)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Job::try_from)
            .collect()
    }

    async fn get_task(&self, session_id: &str, batch_index: u32) -> StoreResult<Option<BatchTask>> {
        let query = format!(
            "SELECT {TASK_COLUMNS} FROM translation_batch_tasks \
             WHERE session_id = $1 AND batch_index = $2"
        );
        let row = sqlx::query_as::<_, BatchTaskRow>(&query)
            .bind(session_id)
            .bind(to_i32(batch_index))
            .fetch_optional(&self.pool)
            .await?;
        row.map(BatchTask::try_from).transpose()
    }

    async fn save_task(&self, task: &BatchTask) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE translation_batch_tasks
            SET worker_id = $3, status = $4, retry_count = $5, results = $6,
                error_message = $7, sent_at = $8, completed_at = $9
            WHERE session_id = $1 AND batch_index = $2
            "#,
        )
        .bind(&task.session_id)
        .bind(to_i32(task.batch_index))
        .bind(&task.worker_id)
        .bind(task.status.as_str())
        .bind(to_i32(task.retry_count))
        .bind(task.results.as_ref().map(Json))
        .bind(&task.error_message)
        .bind(task.sent_at)
        .bind(task.completed_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("batch task", task.key().to_string()));
        }
        Ok(())
    }

    async fn list_tasks(&self, session_id: &str) -> StoreResult<Vec<BatchTask>> {
        let query = format!(
            "SELECT {TASK_COLUMNS} FROM translation_batch_tasks \
             WHERE session_id = $1 ORDER BY batch_index"
        );
        sqlx::query_as::<_, BatchTaskRow>(&query)
            .bind(session_id)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(BatchTask::try_from)
            .collect()
    }

    async fn enqueue_retry(&self, entry: &RetryEntry) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO translation_retry_queue
                (session_id, batch_index, attempts, exclude_worker_id, enqueued_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (session_id, batch_index) DO UPDATE
            SET attempts = EXCLUDED.attempts,
                exclude_worker_id = EXCLUDED.exclude_worker_id,
                enqueued_at = EXCLUDED.enqueued_at
            "#,
        )
        .bind(&entry.session_id)
        .bind(to_i32(entry.batch_index))
        .bind(to_i32(entry.attempts))
        .bind(&entry.exclude_worker_id)
        .bind(entry.enqueued_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn dequeue_retry(&self, session_id: &str) -> StoreResult<Option<RetryEntry>> {
        let row = sqlx::query_as::<_, RetryRow>(
            r#"
            DELETE FROM translation_retry_queue
            WHERE (session_id, batch_index) = (
                SELECT session_id, batch_index FROM translation_retry_queue
                WHERE session_id = $1
                ORDER BY enqueued_at, batch_index
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING session_id, batch_index, attempts, exclude_worker_id, enqueued_at
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(RetryEntry::try_from).transpose()
    }

    async fn sessions_with_pending_retries(&self) -> StoreResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT session_id FROM translation_retry_queue ORDER BY session_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|row| row.0).collect())
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn list_credentials(&self) -> StoreResult<Vec<Credential>> {
        sqlx::query_as::<_, CredentialRow>(
            r#"
            SELECT id, secret, cooldown_until, success_count, failure_count, consecutive_failures
            FROM translation_credentials ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Credential::try_from)
        .collect()
    }

    async fn save_credential(&self, credential: &Credential) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE translation_credentials
            SET cooldown_until = $2, success_count = $3, failure_count = $4,
                consecutive_failures = $5
            WHERE id = $1
            "#,
        )
        .bind(credential.id)
        .bind(credential.cooldown_until)
        .bind(to_i64(credential.success_count))
        .bind(to_i64(credential.failure_count))
        .bind(to_i32(credential.consecutive_failures))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("credential", credential.id.to_string()));
        }
        Ok(())
    }

    async fn add_credential(&self, secret: &str) -> StoreResult<Credential> {
        let row = sqlx::query_as::<_, CredentialRow>(
            r#"
            INSERT INTO translation_credentials (secret) VALUES ($1)
            ON CONFLICT (secret) DO UPDATE SET secret = EXCLUDED.secret
            RETURNING id, secret, cooldown_until, success_count, failure_count, consecutive_failures
            "#,
        )
        .bind(secret)
        .fetch_one(&self.pool)
        .await?;
        Credential::try_from(row)
    }
}
