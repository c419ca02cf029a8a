//! HTTP fetch utilities, raw page archive and the persistence boundary for jobfeed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobfeed_core::{
    slugify, CanonicalJob, Company, DedupKey, JobCategory, JobLocation, NewCompany, PersistedJob,
};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

pub const CRATE_NAME: &str = "jobfeed-storage";

#[derive(Debug, Clone)]
pub struct ArchivedPage {
    pub content_hash: String,
    pub relative_path: PathBuf,
    pub absolute_path: PathBuf,
    pub byte_size: usize,
    pub deduplicated: bool,
}

/// Hash-addressed archive of fetched job pages, kept for manual reconciliation.
#[derive(Debug, Clone)]
pub struct PageArchive {
    root: PathBuf,
}

impl PageArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sha256_hex(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    pub fn page_relative_path(
        &self,
        fetched_at: DateTime<Utc>,
        platform: &str,
        content_hash: &str,
    ) -> PathBuf {
        let stamp = fetched_at.format("%Y%m%d_%H%M%S").to_string();
        let platform = match slugify(platform) {
            slug if slug.is_empty() => "unknown".to_string(),
            slug => slug,
        };
        PathBuf::from(stamp)
            .join(platform)
            .join(format!("{content_hash}.html"))
    }

    /// Writes `html` once per content hash using a temp file and atomic rename.
    pub async fn archive_html(
        &self,
        fetched_at: DateTime<Utc>,
        platform: &str,
        html: &str,
    ) -> anyhow::Result<ArchivedPage> {
        let bytes = html.as_bytes();
        let content_hash = Self::sha256_hex(bytes);
        let relative_path = self.page_relative_path(fetched_at, platform, &content_hash);
        let absolute_path = self.root.join(&relative_path);
        let parent = absolute_path
            .parent()
            .ok_or_else(|| anyhow!("archive path {} has no parent", absolute_path.display()))?
            .to_path_buf();

        fs::create_dir_all(&parent)
            .await
            .with_context(|| format!("creating archive directory {}", parent.display()))?;

        let archived = |deduplicated| ArchivedPage {
            content_hash: content_hash.clone(),
            relative_path: relative_path.clone(),
            absolute_path: absolute_path.clone(),
            byte_size: bytes.len(),
            deduplicated,
        };

        if fs::try_exists(&absolute_path)
            .await
            .with_context(|| format!("checking archive path {}", absolute_path.display()))?
        {
            return Ok(archived(true));
        }

        let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| format!("opening temp archive file {}", temp_path.display()))?;
        file.write_all(bytes)
            .await
            .with_context(|| format!("writing temp archive file {}", temp_path.display()))?;
        file.flush()
            .await
            .with_context(|| format!("flushing temp archive file {}", temp_path.display()))?;
        drop(file);

        match fs::rename(&temp_path, &absolute_path).await {
            Ok(()) => Ok(archived(false)),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                let _ = fs::remove_file(&temp_path).await;
                Ok(archived(true))
            }
            Err(err) => {
                let _ = fs::remove_file(&temp_path).await;
                Err(err).with_context(|| {
                    format!(
                        "atomically renaming temp archive {} -> {}",
                        temp_path.display(),
                        absolute_path.display()
                    )
                })
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retryable,
    NonRetryable,
}

pub fn classify_status(status: StatusCode) -> RetryDisposition {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

pub fn classify_reqwest_error(err: &reqwest::Error) -> RetryDisposition {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for_attempt(&self, attempt_index: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt_index as u32).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor);
        delay.min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub global_concurrency: usize,
    pub per_scope_concurrency: usize,
    pub backoff: BackoffPolicy,
    pub token_bucket: Option<TokenBucketConfig>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            user_agent: None,
            global_concurrency: 16,
            per_scope_concurrency: 4,
            backoff: BackoffPolicy::default(),
            token_bucket: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TokenBucketConfig {
    pub capacity: u32,
    pub refill_every: Duration,
}

#[derive(Debug)]
pub struct SimpleTokenBucket {
    capacity: u32,
    refill_every: Duration,
    state: Mutex<TokenBucketState>,
}

#[derive(Debug, Clone, Copy)]
struct TokenBucketState {
    tokens: u32,
    last_refill: Instant,
}

impl SimpleTokenBucket {
    pub fn new(capacity: u32, refill_every: Duration) -> Self {
        Self {
            capacity,
            refill_every,
            state: Mutex::new(TokenBucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    pub async fn take(&self) {
        loop {
            let mut state = self.state.lock().await;
            let elapsed = state.last_refill.elapsed();
            if self.refill_every.is_zero() {
                // Zero interval means unpaced.
                state.tokens = self.capacity.max(1);
            } else if elapsed >= self.refill_every {
                let refills = elapsed.as_nanos() / self.refill_every.as_nanos();
                let refills = u32::try_from(refills).unwrap_or(u32::MAX);
                state.tokens = (state.tokens.saturating_add(refills)).min(self.capacity);
                state.last_refill = Instant::now();
            }

            if state.tokens > 0 {
                state.tokens -= 1;
                return;
            }

            let sleep_for = self.refill_every;
            drop(state);
            tokio::time::sleep(sleep_for).await;
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: StatusCode,
    pub final_url: String,
    pub body: Vec<u8>,
}

impl FetchedResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed after retries: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("invalid JSON from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("fetch limiter closed")]
    LimiterClosed,
}

/// Shared HTTP client with global and per-scope concurrency limits, optional
/// token-bucket pacing and retry with exponential backoff.
///
/// A scope is any key that should be throttled together, usually the source id or
/// the target host.
#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    global_limit: Arc<Semaphore>,
    per_scope_limit: usize,
    per_scope: Mutex<HashMap<String, Arc<Semaphore>>>,
    token_bucket: Option<Arc<SimpleTokenBucket>>,
    backoff: BackoffPolicy,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        let token_bucket = config
            .token_bucket
            .map(|c| Arc::new(SimpleTokenBucket::new(c.capacity, c.refill_every)));

        Ok(Self {
            client,
            global_limit: Arc::new(Semaphore::new(config.global_concurrency.max(1))),
            per_scope_limit: config.per_scope_concurrency.max(1),
            per_scope: Mutex::new(HashMap::new()),
            token_bucket,
            backoff: config.backoff,
        })
    }

    async fn scope_semaphore(&self, scope: &str) -> Arc<Semaphore> {
        let mut map = self.per_scope.lock().await;
        map.entry(scope.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.per_scope_limit)))
            .clone()
    }

    pub async fn fetch(&self, scope: &str, url: &str) -> Result<FetchedResponse, FetchError> {
        self.send_with_retry(scope, url, &[], &[]).await
    }

    pub async fn fetch_json<T: DeserializeOwned>(
        &self,
        scope: &str,
        url: &str,
        query: &[(&str, &str)],
        headers: &[(&str, &str)],
    ) -> Result<T, FetchError> {
        let response = self.send_with_retry(scope, url, query, headers).await?;
        serde_json::from_slice(&response.body).map_err(|source| FetchError::Decode {
            url: response.final_url,
            source,
        })
    }

    async fn send_with_retry(
        &self,
        scope: &str,
        url: &str,
        query: &[(&str, &str)],
        headers: &[(&str, &str)],
    ) -> Result<FetchedResponse, FetchError> {
        let _global = self
            .global_limit
            .acquire()
            .await
            .map_err(|_| FetchError::LimiterClosed)?;
        let per_scope = self.scope_semaphore(scope).await;
        let _scope = per_scope
            .acquire()
            .await
            .map_err(|_| FetchError::LimiterClosed)?;

        if let Some(bucket) = &self.token_bucket {
            bucket.take().await;
        }

        let span = info_span!("http_fetch", scope, url);
        async {
            let mut attempt = 0;
            loop {
                let mut request = self.client.get(url).query(query);
                for (name, value) in headers {
                    request = request.header(*name, *value);
                }

                match request.send().await {
                    Ok(resp) => {
                        let status = resp.status();
                        let final_url = resp.url().to_string();

                        if status.is_success() {
                            let body = resp.bytes().await?.to_vec();
                            return Ok(FetchedResponse {
                                status,
                                final_url,
                                body,
                            });
                        }

                        if classify_status(status) == RetryDisposition::Retryable
                            && attempt < self.backoff.max_retries
                        {
                            debug!(attempt, status = status.as_u16(), "retrying fetch");
                            tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                            attempt += 1;
                            continue;
                        }

                        return Err(FetchError::HttpStatus {
                            status: status.as_u16(),
                            url: final_url,
                        });
                    }
                    Err(err) => {
                        if classify_reqwest_error(&err) == RetryDisposition::Retryable
                            && attempt < self.backoff.max_retries
                        {
                            debug!(attempt, error = %err, "retrying fetch");
                            tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                            attempt += 1;
                            continue;
                        }
                        return Err(FetchError::Request(err));
                    }
                }
            }
        }
        .instrument(span)
        .await
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// The row already exists; callers treat this as "already exists", not a failure.
    #[error("unique constraint `{constraint}` violated")]
    UniqueViolation { constraint: String },
    #[error("company {0} does not exist")]
    UnknownCompany(Uuid),
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                return StoreError::UniqueViolation {
                    constraint: db.constraint().unwrap_or("unknown").to_string(),
                };
            }
        }
        StoreError::Database(err)
    }
}

/// Persistence boundary used by the ingestion core.
///
/// Lookups return `None` for expected absence. `create_*` fail with
/// [`StoreError::UniqueViolation`] when a concurrent writer got there first.
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn find_company_by_platform(&self, platform: &str)
        -> Result<Option<Company>, StoreError>;

    async fn create_company(&self, company: &NewCompany) -> Result<Company, StoreError>;

    async fn find_job_by_apply_link(&self, link: &str) -> Result<Option<PersistedJob>, StoreError>;

    async fn find_job_by_source_id(
        &self,
        publisher: &str,
        external_id: &str,
    ) -> Result<Option<PersistedJob>, StoreError>;

    async fn create_job(
        &self,
        company_id: Uuid,
        job: &CanonicalJob,
    ) -> Result<PersistedJob, StoreError>;

    async fn find_job_by_key(&self, key: &DedupKey) -> Result<Option<PersistedJob>, StoreError> {
        match key {
            DedupKey::ApplyLink(link) => self.find_job_by_apply_link(link).await,
            DedupKey::SourceId {
                publisher,
                external_id,
            } => self.find_job_by_source_id(publisher, external_id).await,
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    companies: Vec<Company>,
    jobs: Vec<PersistedJob>,
}

/// In-process store enforcing the same unique constraints as the Postgres schema.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn companies(&self) -> Vec<Company> {
        self.state.lock().await.companies.clone()
    }

    pub async fn jobs(&self) -> Vec<PersistedJob> {
        self.state.lock().await.jobs.clone()
    }
}

#[async_trait]
impl JobRepository for MemoryStore {
    async fn find_company_by_platform(
        &self,
        platform: &str,
    ) -> Result<Option<Company>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .companies
            .iter()
            .find(|c| c.platform == platform)
            .cloned())
    }

    async fn create_company(&self, company: &NewCompany) -> Result<Company, StoreError> {
        let mut state = self.state.lock().await;
        if state.companies.iter().any(|c| c.platform == company.platform) {
            return Err(StoreError::UniqueViolation {
                constraint: "companies_platform_key".to_string(),
            });
        }
        let created = Company {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            company_name: company.company_name.clone(),
            platform: company.platform.clone(),
            company_description: company.company_description.clone(),
            company_logo: company.company_logo.clone(),
            company_website: company.company_website.clone(),
        };
        state.companies.push(created.clone());
        Ok(created)
    }

    async fn find_job_by_apply_link(&self, link: &str) -> Result<Option<PersistedJob>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .jobs
            .iter()
            .find(|j| j.job.job_apply_link == link)
            .cloned())
    }

    async fn find_job_by_source_id(
        &self,
        publisher: &str,
        external_id: &str,
    ) -> Result<Option<PersistedJob>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .jobs
            .iter()
            .find(|j| {
                j.job.job_publisher == publisher
                    && j.job.job_id_from_source.as_deref() == Some(external_id)
            })
            .cloned())
    }

    async fn create_job(
        &self,
        company_id: Uuid,
        job: &CanonicalJob,
    ) -> Result<PersistedJob, StoreError> {
        let mut state = self.state.lock().await;
        if !state.companies.iter().any(|c| c.id == company_id) {
            return Err(StoreError::UnknownCompany(company_id));
        }
        if state
            .jobs
            .iter()
            .any(|j| j.job.job_apply_link == job.job_apply_link)
        {
            return Err(StoreError::UniqueViolation {
                constraint: "jobs_job_apply_link_key".to_string(),
            });
        }
        if let Some(external_id) = &job.job_id_from_source {
            if state.jobs.iter().any(|j| {
                j.job.job_publisher == job.job_publisher
                    && j.job.job_id_from_source.as_ref() == Some(external_id)
            }) {
                return Err(StoreError::UniqueViolation {
                    constraint: "jobs_source_identity_key".to_string(),
                });
            }
        }
        let persisted = PersistedJob {
            id: Uuid::new_v4(),
            company_id,
            created_at: Utc::now(),
            job: job.clone(),
        };
        state.jobs.push(persisted.clone());
        Ok(persisted)
    }
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

const JOB_COLUMNS: &str = "id, company_id, created_at, job_publisher, job_id_from_source, \
     job_title, job_description, job_qualifications, job_responsibilities, job_benefits, \
     job_category, job_tags, job_employment_types, job_salary, job_is_remote, job_location, \
     job_apply_link, job_posted_at_timestamp, is_active";

const COMPANY_COLUMNS: &str = "id, created_at, company_name, platform, company_description, \
     company_logo, company_website";

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn company_from_row(row: &PgRow) -> Result<Company, sqlx::Error> {
    Ok(Company {
        id: row.try_get("id")?,
        created_at: row.try_get("created_at")?,
        company_name: row.try_get("company_name")?,
        platform: row.try_get("platform")?,
        company_description: row.try_get("company_description")?,
        company_logo: row.try_get("company_logo")?,
        company_website: row.try_get("company_website")?,
    })
}

fn job_from_row(row: &PgRow) -> Result<PersistedJob, sqlx::Error> {
    let category: Option<String> = row.try_get("job_category")?;
    let list = |column: &str| -> Result<Vec<String>, sqlx::Error> {
        Ok(row.try_get::<Json<Vec<String>>, _>(column)?.0)
    };
    Ok(PersistedJob {
        id: row.try_get("id")?,
        company_id: row.try_get("company_id")?,
        created_at: row.try_get("created_at")?,
        job: CanonicalJob {
            job_publisher: row.try_get("job_publisher")?,
            job_id_from_source: row.try_get("job_id_from_source")?,
            job_title: row.try_get("job_title")?,
            job_description: row.try_get("job_description")?,
            job_qualifications: list("job_qualifications")?,
            job_responsibilities: list("job_responsibilities")?,
            job_benefits: list("job_benefits")?,
            job_category: category.as_deref().and_then(JobCategory::parse),
            job_tags: list("job_tags")?,
            job_employment_types: list("job_employment_types")?,
            job_salary: row.try_get("job_salary")?,
            job_is_remote: row.try_get("job_is_remote")?,
            job_location: row.try_get::<Json<JobLocation>, _>("job_location")?.0,
            job_apply_link: row.try_get("job_apply_link")?,
            job_posted_at_timestamp: row.try_get("job_posted_at_timestamp")?,
            is_active: row.try_get("is_active")?,
        },
    })
}

const INSERT_JOB_SQL: &str = "INSERT INTO jobs (id, company_id, created_at, job_publisher, \
     job_id_from_source, job_title, job_description, job_qualifications, job_responsibilities, \
     job_benefits, job_category, job_tags, job_employment_types, job_salary, job_is_remote, \
     job_location, job_apply_link, job_posted_at_timestamp, is_active) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)";

#[async_trait]
impl JobRepository for PgStore {
    async fn find_company_by_platform(
        &self,
        platform: &str,
    ) -> Result<Option<Company>, StoreError> {
        let sql = format!("SELECT {COMPANY_COLUMNS} FROM companies WHERE platform = $1");
        let row = sqlx::query(&sql)
            .bind(platform)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(company_from_row).transpose()?)
    }

    async fn create_company(&self, company: &NewCompany) -> Result<Company, StoreError> {
        let created = Company {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            company_name: company.company_name.clone(),
            platform: company.platform.clone(),
            company_description: company.company_description.clone(),
            company_logo: company.company_logo.clone(),
            company_website: company.company_website.clone(),
        };
        sqlx::query(
            "INSERT INTO companies (id, created_at, company_name, platform, company_description, \
             company_logo, company_website) VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(created.id)
        .bind(created.created_at)
        .bind(&created.company_name)
        .bind(&created.platform)
        .bind(&created.company_description)
        .bind(&created.company_logo)
        .bind(&created.company_website)
        .execute(&self.pool)
        .await?;
        Ok(created)
    }

    async fn find_job_by_apply_link(&self, link: &str) -> Result<Option<PersistedJob>, StoreError> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE job_apply_link = $1");
        let row = sqlx::query(&sql)
            .bind(link)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(job_from_row).transpose()?)
    }

    async fn find_job_by_source_id(
        &self,
        publisher: &str,
        external_id: &str,
    ) -> Result<Option<PersistedJob>, StoreError> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE job_publisher = $1 AND job_id_from_source = $2"
        );
        let row = sqlx::query(&sql)
            .bind(publisher)
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(job_from_row).transpose()?)
    }

    async fn create_job(
        &self,
        company_id: Uuid,
        job: &CanonicalJob,
    ) -> Result<PersistedJob, StoreError> {
        let persisted = PersistedJob {
            id: Uuid::new_v4(),
            company_id,
            created_at: Utc::now(),
            job: job.clone(),
        };
        sqlx::query(INSERT_JOB_SQL)
        .bind(persisted.id)
        .bind(company_id)
        .bind(persisted.created_at)
        .bind(&job.job_publisher)
        .bind(&job.job_id_from_source)
        .bind(&job.job_title)
        .bind(&job.job_description)
        .bind(Json(&job.job_qualifications))
        .bind(Json(&job.job_responsibilities))
        .bind(Json(&job.job_benefits))
        .bind(job.job_category.map(|c| c.label()))
        .bind(Json(&job.job_tags))
        .bind(Json(&job.job_employment_types))
        .bind(&job.job_salary)
        .bind(job.job_is_remote)
        .bind(Json(&job.job_location))
        .bind(&job.job_apply_link)
        .bind(&job.job_posted_at_timestamp)
        .bind(job.is_active)
        .execute(&self.pool)
        .await?;
        Ok(persisted)
    }
}
