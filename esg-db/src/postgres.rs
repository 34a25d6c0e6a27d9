//! PostgreSQL store. Queries are runtime-bound; the analysis graph lives
//! in a JSONB document column with the indexed fields denormalized.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres, Row};
use std::time::Duration;

use esg_core::{
    ActivityRecord, Analysis, AnalysisId, AnalysisStore, BenchmarkAggregate, CompanyProfile,
    EsgError, EsgResult, Framework, User, UserId,
};

use crate::benchmark::aggregate_from_latest;
use crate::schema::DatabaseSchema;

const RETRY_BACKOFF_MS: [u64; 3] = [100, 500, 1500];
const STATEMENT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct PostgresStore {
    pool: Pool<Postgres>,
}

fn db_error(operation: &str, err: sqlx::Error) -> EsgError {
    EsgError::Database {
        operation: operation.to_string(),
        reason: err.to_string(),
    }
}

/// Transient failures worth a retry: connection-level IO errors, pool
/// exhaustion, and the serialization/deadlock and connection SQLSTATE
/// classes.
fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db) => db
            .code()
            .map(|code| code.starts_with("08") || code.starts_with("40"))
            .unwrap_or(false),
        _ => false,
    }
}

/// Runs `attempt` up to three times with 100ms/500ms/1500ms backoff on
/// transient errors. Non-transient errors surface immediately.
async fn with_retry<T>(
    operation: &'static str,
    mut attempt: impl FnMut() -> BoxFuture<'static, Result<T, sqlx::Error>>,
) -> EsgResult<T> {
    // Initial try plus three retries at 100ms/500ms/1500ms.
    let attempts = RETRY_BACKOFF_MS.len() + 1;
    for try_index in 0..attempts {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(err) if is_transient(&err) && try_index + 1 < attempts => {
                tracing::warn!(operation, attempt = try_index + 1, error = %err, "transient database error, retrying");
                tokio::time::sleep(Duration::from_millis(RETRY_BACKOFF_MS[try_index])).await;
            }
            Err(err) => return Err(db_error(operation, err)),
        }
    }
    unreachable!("retry loop returns on the final attempt")
}

impl PostgresStore {
    pub async fn connect(uri: &str, pool_min: u32, pool_max: u32) -> EsgResult<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(pool_min)
            .max_connections(pool_max)
            .acquire_timeout(STATEMENT_TIMEOUT)
            .connect(uri)
            .await
            .map_err(|e| db_error("connect", e))?;
        Ok(Self { pool })
    }

    pub async fn initialize(&self) -> EsgResult<()> {
        DatabaseSchema::create_all_tables(&self.pool).await?;
        DatabaseSchema::record_schema_version(&self.pool, "1.0.0", "Initial schema").await?;
        Ok(())
    }

    fn decode_analysis(row: &sqlx::postgres::PgRow, operation: &str) -> EsgResult<Analysis> {
        let document: serde_json::Value = row.try_get("document").map_err(|e| EsgError::Database {
            operation: operation.to_string(),
            reason: e.to_string(),
        })?;
        serde_json::from_value(document).map_err(|e| EsgError::Database {
            operation: operation.to_string(),
            reason: format!("stored analysis undecodable: {}", e),
        })
    }
}

#[async_trait]
impl AnalysisStore for PostgresStore {
    async fn create_user(&self, user: User) -> EsgResult<User> {
        let pool = self.pool.clone();
        let insert = user.clone();
        let row = with_retry("create_user", move || {
            let pool = pool.clone();
            let user = insert.clone();
            Box::pin(async move {
                sqlx::query(
                    r#"
                    INSERT INTO users (id, email, tier, credits, created_at, last_seen_at, payment_customer_id)
                    VALUES ($1, $2, $3, $4, $5, $6, $7)
                    ON CONFLICT (id) DO UPDATE SET last_seen_at = EXCLUDED.last_seen_at
                    RETURNING id, email, tier, credits, created_at, last_seen_at, payment_customer_id;
                    "#,
                )
                .bind(&user.id.0)
                .bind(&user.email)
                .bind(user.tier.as_str())
                .bind(user.credits)
                .bind(user.created_at)
                .bind(user.last_seen_at)
                .bind(&user.payment_customer_id)
                .fetch_one(&pool)
                .await
            })
        })
        .await?;

        row_to_user(&row)
    }

    async fn get_user(&self, id: &UserId) -> EsgResult<Option<User>> {
        let pool = self.pool.clone();
        let user_id = id.0.clone();
        let row = with_retry("get_user", move || {
            let pool = pool.clone();
            let user_id = user_id.clone();
            Box::pin(async move {
                sqlx::query(
                    "SELECT id, email, tier, credits, created_at, last_seen_at, payment_customer_id FROM users WHERE id = $1",
                )
                .bind(user_id)
                .fetch_optional(&pool)
                .await
            })
        })
        .await?;

        row.map(|r| row_to_user(&r)).transpose()
    }

    async fn touch_user(&self, id: &UserId) -> EsgResult<()> {
        let pool = self.pool.clone();
        let user_id = id.0.clone();
        with_retry("touch_user", move || {
            let pool = pool.clone();
            let user_id = user_id.clone();
            Box::pin(async move {
                sqlx::query("UPDATE users SET last_seen_at = NOW() WHERE id = $1")
                    .bind(user_id)
                    .execute(&pool)
                    .await
                    .map(|_| ())
            })
        })
        .await
    }

    async fn update_user_credits(&self, id: &UserId, delta: i64) -> EsgResult<i64> {
        // Single conditional UPDATE: the check and the decrement are one
        // atomic statement, so two racing debits of the last credit
        // cannot both pass.
        let pool = self.pool.clone();
        let user_id = id.0.clone();
        let updated = with_retry("update_user_credits", move || {
            let pool = pool.clone();
            let user_id = user_id.clone();
            Box::pin(async move {
                sqlx::query(
                    r#"
                    UPDATE users SET credits = credits + $2
                    WHERE id = $1 AND credits + $2 >= 0
                    RETURNING credits;
                    "#,
                )
                .bind(user_id)
                .bind(delta)
                .fetch_optional(&pool)
                .await
            })
        })
        .await?;

        if let Some(row) = updated {
            return row
                .try_get::<i64, _>("credits")
                .map_err(|e| db_error("update_user_credits", e));
        }

        match self.get_user(id).await? {
            Some(user) => Err(EsgError::InsufficientCredits {
                required: -delta,
                available: user.credits,
            }),
            None => Err(EsgError::not_found("user")),
        }
    }

    async fn insert_analysis(&self, analysis: &Analysis) -> EsgResult<()> {
        let document = serde_json::to_value(analysis)?;
        let pool = self.pool.clone();
        let analysis = analysis.clone();
        with_retry("insert_analysis", move || {
            let pool = pool.clone();
            let analysis = analysis.clone();
            let document = document.clone();
            Box::pin(async move {
                sqlx::query(
                    r#"
                    INSERT INTO analyses (
                        id, user_id, company_name, industry_sector, reporting_period,
                        kind, environmental, social, governance, overall_score,
                        created_at, document
                    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12);
                    "#,
                )
                .bind(analysis.id.0)
                .bind(&analysis.user_id.0)
                .bind(&analysis.company_name)
                .bind(&analysis.industry_sector)
                .bind(&analysis.reporting_period)
                .bind(analysis.kind.as_str())
                .bind(analysis.scores.environmental)
                .bind(analysis.scores.social)
                .bind(analysis.scores.governance)
                .bind(analysis.scores.overall)
                .bind(analysis.created_at)
                .bind(document)
                .execute(&pool)
                .await
                .map(|_| ())
            })
        })
        .await
    }

    async fn get_analysis(&self, user: &UserId, id: &AnalysisId) -> EsgResult<Analysis> {
        let pool = self.pool.clone();
        let user_id = user.0.clone();
        let analysis_id = id.0;
        let row = with_retry("get_analysis", move || {
            let pool = pool.clone();
            let user_id = user_id.clone();
            Box::pin(async move {
                sqlx::query("SELECT document FROM analyses WHERE id = $1 AND user_id = $2")
                    .bind(analysis_id)
                    .bind(user_id)
                    .fetch_optional(&pool)
                    .await
            })
        })
        .await?;

        match row {
            Some(row) => Self::decode_analysis(&row, "get_analysis"),
            None => Err(EsgError::not_found("analysis")),
        }
    }

    async fn list_analyses_by_user(
        &self,
        user: &UserId,
        page: u32,
        size: u32,
    ) -> EsgResult<Vec<Analysis>> {
        let pool = self.pool.clone();
        let user_id = user.0.clone();
        let rows = with_retry("list_analyses_by_user", move || {
            let pool = pool.clone();
            let user_id = user_id.clone();
            Box::pin(async move {
                sqlx::query(
                    r#"
                    SELECT document FROM analyses
                    WHERE user_id = $1
                    ORDER BY created_at DESC
                    OFFSET $2 LIMIT $3;
                    "#,
                )
                .bind(user_id)
                .bind((page as i64) * size as i64)
                .bind(size as i64)
                .fetch_all(&pool)
                .await
            })
        })
        .await?;

        rows.iter()
            .map(|r| Self::decode_analysis(r, "list_analyses_by_user"))
            .collect()
    }

    async fn list_by_company(&self, name: &str, since: DateTime<Utc>) -> EsgResult<Vec<Analysis>> {
        let pool = self.pool.clone();
        let company = name.to_string();
        let rows = with_retry("list_by_company", move || {
            let pool = pool.clone();
            let company = company.clone();
            Box::pin(async move {
                sqlx::query(
                    r#"
                    SELECT document FROM analyses
                    WHERE LOWER(company_name) = LOWER($1) AND created_at >= $2
                    ORDER BY created_at ASC;
                    "#,
                )
                .bind(company)
                .bind(since)
                .fetch_all(&pool)
                .await
            })
        })
        .await?;

        rows.iter()
            .map(|r| Self::decode_analysis(r, "list_by_company"))
            .collect()
    }

    async fn latest_by_company(&self, name: &str, count: u32) -> EsgResult<Vec<Analysis>> {
        let pool = self.pool.clone();
        let company = name.to_string();
        let rows = with_retry("latest_by_company", move || {
            let pool = pool.clone();
            let company = company.clone();
            Box::pin(async move {
                sqlx::query(
                    r#"
                    SELECT document FROM analyses
                    WHERE LOWER(company_name) = LOWER($1)
                    ORDER BY created_at DESC
                    LIMIT $2;
                    "#,
                )
                .bind(company)
                .bind(count as i64)
                .fetch_all(&pool)
                .await
            })
        })
        .await?;

        rows.iter()
            .map(|r| Self::decode_analysis(r, "latest_by_company"))
            .collect()
    }

    async fn aggregate_benchmark(
        &self,
        frameworks: &[Framework],
        sector: Option<&str>,
    ) -> EsgResult<BenchmarkAggregate> {
        let latest = self.latest_per_company(sector).await?;
        Ok(aggregate_from_latest(&latest, frameworks, sector))
    }

    async fn upsert_company(&self, profile: &CompanyProfile) -> EsgResult<()> {
        let pool = self.pool.clone();
        let profile = profile.clone();
        with_retry("upsert_company", move || {
            let pool = pool.clone();
            let profile = profile.clone();
            Box::pin(async move {
                sqlx::query(
                    r#"
                    INSERT INTO companies (name, sector, latest_analysis_id, latest_overall, updated_at)
                    VALUES (LOWER($1), $2, $3, $4, $5)
                    ON CONFLICT (name) DO UPDATE SET
                        sector = EXCLUDED.sector,
                        latest_analysis_id = EXCLUDED.latest_analysis_id,
                        latest_overall = EXCLUDED.latest_overall,
                        updated_at = EXCLUDED.updated_at;
                    "#,
                )
                .bind(&profile.name)
                .bind(&profile.sector)
                .bind(profile.latest_analysis_id.map(|id| id.0))
                .bind(profile.latest_overall)
                .bind(profile.updated_at)
                .execute(&pool)
                .await
                .map(|_| ())
            })
        })
        .await
    }

    async fn get_company(&self, name: &str) -> EsgResult<Option<CompanyProfile>> {
        let pool = self.pool.clone();
        let company = name.to_string();
        let row = with_retry("get_company", move || {
            let pool = pool.clone();
            let company = company.clone();
            Box::pin(async move {
                sqlx::query(
                    "SELECT name, sector, latest_analysis_id, latest_overall, updated_at FROM companies WHERE name = LOWER($1)",
                )
                .bind(company)
                .fetch_optional(&pool)
                .await
            })
        })
        .await?;

        row.map(|r| {
            Ok(CompanyProfile {
                name: r.try_get("name").map_err(|e| db_error("get_company", e))?,
                sector: r.try_get("sector").map_err(|e| db_error("get_company", e))?,
                latest_analysis_id: r
                    .try_get::<Option<uuid::Uuid>, _>("latest_analysis_id")
                    .map_err(|e| db_error("get_company", e))?
                    .map(AnalysisId),
                latest_overall: r
                    .try_get("latest_overall")
                    .map_err(|e| db_error("get_company", e))?,
                updated_at: r
                    .try_get("updated_at")
                    .map_err(|e| db_error("get_company", e))?,
            })
        })
        .transpose()
    }

    async fn record_activity(&self, record: ActivityRecord) -> EsgResult<()> {
        let payload = record.payload.clone();
        let pool = self.pool.clone();
        with_retry("record_activity", move || {
            let pool = pool.clone();
            let record_id = record.id;
            let user_id = record.user_id.0.clone();
            let event = record.kind.as_str();
            let at = record.at;
            let payload = payload.clone();
            Box::pin(async move {
                sqlx::query(
                    "INSERT INTO activity (id, user_id, event, ts, payload) VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(record_id)
                .bind(user_id)
                .bind(event)
                .bind(at)
                .bind(payload)
                .execute(&pool)
                .await
                .map(|_| ())
            })
        })
        .await
    }

    async fn list_activity(&self, user: &UserId, limit: u32) -> EsgResult<Vec<ActivityRecord>> {
        let pool = self.pool.clone();
        let user_id = user.0.clone();
        let rows = with_retry("list_activity", move || {
            let pool = pool.clone();
            let user_id = user_id.clone();
            Box::pin(async move {
                sqlx::query(
                    r#"
                    SELECT id, user_id, event, ts, payload FROM activity
                    WHERE user_id = $1
                    ORDER BY ts DESC
                    LIMIT $2;
                    "#,
                )
                .bind(user_id)
                .bind(limit as i64)
                .fetch_all(&pool)
                .await
            })
        })
        .await?;

        rows.iter()
            .map(|r| {
                let kind_raw: String = r.try_get("event").map_err(|e| db_error("list_activity", e))?;
                let kind = serde_json::from_value(serde_json::Value::String(kind_raw.clone()))
                    .map_err(|_| EsgError::Database {
                        operation: "list_activity".to_string(),
                        reason: format!("unknown activity kind: {}", kind_raw),
                    })?;
                Ok(ActivityRecord {
                    id: r.try_get("id").map_err(|e| db_error("list_activity", e))?,
                    user_id: UserId(r.try_get("user_id").map_err(|e| db_error("list_activity", e))?),
                    kind,
                    at: r.try_get("ts").map_err(|e| db_error("list_activity", e))?,
                    payload: r.try_get("payload").map_err(|e| db_error("list_activity", e))?,
                })
            })
            .collect()
    }

    async fn sector_overall_scores(&self, sector: Option<&str>) -> EsgResult<Vec<f64>> {
        Ok(self
            .latest_per_company(sector)
            .await?
            .iter()
            .map(|a| a.scores.overall)
            .collect())
    }

    async fn ping(&self) -> EsgResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| db_error("ping", e))
    }
}

impl PostgresStore {
    /// Latest analysis per company, optionally filtered to one sector.
    async fn latest_per_company(&self, sector: Option<&str>) -> EsgResult<Vec<Analysis>> {
        let pool = self.pool.clone();
        let sector_filter = sector.map(|s| s.to_lowercase());
        let rows = with_retry("latest_per_company", move || {
            let pool = pool.clone();
            let sector_filter = sector_filter.clone();
            Box::pin(async move {
                match sector_filter {
                    Some(sector) => {
                        sqlx::query(
                            r#"
                            SELECT DISTINCT ON (LOWER(company_name)) document FROM analyses
                            WHERE company_name IS NOT NULL AND LOWER(industry_sector) = $1
                            ORDER BY LOWER(company_name), created_at DESC;
                            "#,
                        )
                        .bind(sector)
                        .fetch_all(&pool)
                        .await
                    }
                    None => {
                        sqlx::query(
                            r#"
                            SELECT DISTINCT ON (LOWER(company_name)) document FROM analyses
                            WHERE company_name IS NOT NULL
                            ORDER BY LOWER(company_name), created_at DESC;
                            "#,
                        )
                        .fetch_all(&pool)
                        .await
                    }
                }
            })
        })
        .await?;

        rows.iter()
            .map(|r| Self::decode_analysis(r, "latest_per_company"))
            .collect()
    }
}

fn row_to_user(row: &sqlx::postgres::PgRow) -> EsgResult<User> {
    let tier_raw: String = row.try_get("tier").map_err(|e| db_error("decode_user", e))?;
    Ok(User {
        id: UserId(row.try_get("id").map_err(|e| db_error("decode_user", e))?),
        email: row.try_get("email").map_err(|e| db_error("decode_user", e))?,
        tier: esg_core::Tier::parse(&tier_raw)?,
        credits: row.try_get("credits").map_err(|e| db_error("decode_user", e))?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| db_error("decode_user", e))?,
        last_seen_at: row
            .try_get("last_seen_at")
            .map_err(|e| db_error("decode_user", e))?,
        payment_customer_id: row
            .try_get("payment_customer_id")
            .map_err(|e| db_error("decode_user", e))?,
    })
}
