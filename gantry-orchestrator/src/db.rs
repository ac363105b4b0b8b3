use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Pipelines are written by the platform; `seq` belongs to the execution store.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pipelines (
            id UUID PRIMARY KEY,
            repo_id UUID NOT NULL,
            identifier VARCHAR(255) NOT NULL,
            default_branch VARCHAR(255) NOT NULL DEFAULT 'main',
            config_path TEXT NOT NULL,
            seq BIGINT NOT NULL DEFAULT 0,
            trigger_events TEXT[] NOT NULL DEFAULT '{}',
            trigger_branches TEXT[] NOT NULL DEFAULT '{}',
            cancel_superseded BOOLEAN NOT NULL DEFAULT FALSE,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL,
            UNIQUE (repo_id, identifier)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS executions (
            id UUID PRIMARY KEY,
            pipeline_id UUID NOT NULL REFERENCES pipelines(id) ON DELETE CASCADE,
            repo_id UUID NOT NULL,
            number BIGINT NOT NULL,
            parent BIGINT,
            created_by VARCHAR(255) NOT NULL,
            trigger_kind VARCHAR(32) NOT NULL,
            status VARCHAR(32) NOT NULL,
            error TEXT,
            action VARCHAR(64) NOT NULL DEFAULT '',
            git_ref TEXT NOT NULL DEFAULT '',
            before_sha VARCHAR(64) NOT NULL DEFAULT '',
            after_sha VARCHAR(64) NOT NULL DEFAULT '',
            fork BOOLEAN NOT NULL DEFAULT FALSE,
            source TEXT NOT NULL DEFAULT '',
            target TEXT NOT NULL DEFAULT '',
            author_login TEXT NOT NULL DEFAULT '',
            author_name TEXT NOT NULL DEFAULT '',
            author_email TEXT NOT NULL DEFAULT '',
            author_avatar TEXT NOT NULL DEFAULT '',
            sender TEXT NOT NULL DEFAULT '',
            title TEXT NOT NULL DEFAULT '',
            message TEXT NOT NULL DEFAULT '',
            link TEXT NOT NULL DEFAULT '',
            event_timestamp TIMESTAMPTZ,
            params JSONB NOT NULL DEFAULT '{}',
            cron VARCHAR(255),
            deploy VARCHAR(255),
            deploy_id UUID,
            debug BOOLEAN NOT NULL DEFAULT FALSE,
            event_key TEXT,
            started TIMESTAMPTZ,
            finished TIMESTAMPTZ,
            created TIMESTAMPTZ NOT NULL,
            updated TIMESTAMPTZ NOT NULL,
            version BIGINT NOT NULL,
            CHECK ((finished IS NULL) = (status IN ('pending', 'running')))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS executions_pipeline_number ON executions(pipeline_id, number)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS executions_pipeline_event_key
        ON executions(pipeline_id, event_key)
        WHERE event_key IS NOT NULL
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_executions_status ON executions(pipeline_id, status)")
        .execute(pool)
        .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
