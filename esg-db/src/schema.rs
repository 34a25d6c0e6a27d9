//! PostgreSQL schema. Analyses persist the full result graph as a JSONB
//! document next to the columns the required indexes cover.

use sqlx::{Pool, Postgres};

use esg_core::{EsgError, EsgResult};

pub struct DatabaseSchema;

impl DatabaseSchema {
    pub async fn create_all_tables(pool: &Pool<Postgres>) -> EsgResult<()> {
        let statements: &[&str] = &[
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                version TEXT PRIMARY KEY,
                description TEXT NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                tier TEXT NOT NULL,
                credits BIGINT NOT NULL CHECK (credits >= 0),
                created_at TIMESTAMPTZ NOT NULL,
                last_seen_at TIMESTAMPTZ NOT NULL,
                payment_customer_id TEXT
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS analyses (
                id UUID PRIMARY KEY,
                user_id TEXT NOT NULL,
                company_name TEXT,
                industry_sector TEXT,
                reporting_period TEXT,
                kind TEXT NOT NULL,
                environmental DOUBLE PRECISION NOT NULL,
                social DOUBLE PRECISION NOT NULL,
                governance DOUBLE PRECISION NOT NULL,
                overall_score DOUBLE PRECISION NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                document JSONB NOT NULL
            );
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS idx_analyses_user
                ON analyses (user_id, created_at DESC);
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS idx_analyses_company
                ON analyses (company_name, created_at DESC);
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS idx_analyses_sector
                ON analyses (industry_sector, overall_score DESC);
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS companies (
                name TEXT PRIMARY KEY,
                sector TEXT,
                latest_analysis_id UUID,
                latest_overall DOUBLE PRECISION NOT NULL DEFAULT 0,
                updated_at TIMESTAMPTZ NOT NULL
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS activity (
                id UUID PRIMARY KEY,
                user_id TEXT NOT NULL,
                event TEXT NOT NULL,
                ts TIMESTAMPTZ NOT NULL,
                payload JSONB NOT NULL
            );
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS idx_activity_user_event
                ON activity (user_id, event, ts);
            "#,
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(pool)
                .await
                .map_err(|e| EsgError::Database {
                    operation: "create_schema".to_string(),
                    reason: e.to_string(),
                })?;
        }
        Ok(())
    }

    pub async fn record_schema_version(
        pool: &Pool<Postgres>,
        version: &str,
        description: &str,
    ) -> EsgResult<()> {
        sqlx::query(
            r#"
            INSERT INTO schema_version (version, description)
            VALUES ($1, $2)
            ON CONFLICT (version) DO NOTHING;
            "#,
        )
        .bind(version)
        .bind(description)
        .execute(pool)
        .await
        .map_err(|e| EsgError::Database {
            operation: "record_schema_version".to_string(),
            reason: e.to_string(),
        })?;
        Ok(())
    }
}
