use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use db_query_mapper::config::Config;
use db_query_mapper::models::{
    Aggregate, AggregateFunction, Condition, DatabaseType, Entity, Join, OrderBy, Query, SourceRef,
};
use db_query_mapper::services::database::{create_provider, Provider, SqliteProvider};
use db_query_mapper::services::{
    ConnectionPoolManager, FieldMapper, FindOptions, Repository, SourceDirectory, SourceRegistry,
};

const DEMO_SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS app_users (
        id INTEGER PRIMARY KEY,
        user_name TEXT NOT NULL,
        email TEXT
    );
    CREATE TABLE IF NOT EXISTS shop_orders (
        id INTEGER PRIMARY KEY,
        user_id INTEGER NOT NULL REFERENCES app_users(id),
        total_cents INTEGER NOT NULL,
        status TEXT NOT NULL
    );
"#;

fn entity(value: serde_json::Value) -> Entity {
    match value {
        serde_json::Value::Object(map) => map,
        _ => Entity::new(),
    }
}

async fn open_provider(config: &Config) -> anyhow::Result<Arc<dyn Provider>> {
    let database_type = config.database_type()?;
    let provider: Arc<dyn Provider> = match database_type {
        DatabaseType::SQLite => {
            let sqlite = SqliteProvider::from_url(&config.database.url)?.with_timeout(config.statement_timeout());
            sqlite.execute_batch(DEMO_SCHEMA).await?;
            Arc::new(sqlite)
        }
        other => {
            let pool_manager = Arc::new(ConnectionPoolManager::with_settings(config.pool.clone()));
            create_provider(other, &config.database.url, pool_manager, config.statement_timeout()).await?
        }
    };

    provider.test_connection().await?;
    Ok(provider)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    // Initialize logging; RUST_LOG already overrides logging.level
    let filter = tracing_subscriber::EnvFilter::try_new(&config.logging.level);
    let invalid_filter = filter.is_err();
    tracing_subscriber::fmt()
        .with_env_filter(filter.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")))
        .init();
    if invalid_filter {
        warn!("Invalid log filter '{}', using 'info'", config.logging.level);
    }

    info!(
        "Using {} at {}",
        config.database.dialect,
        ConnectionPoolManager::mask_credentials(&config.database.url)
    );

    let provider = open_provider(&config).await?;

    let mut registry = SourceRegistry::new();
    registry.register("users", "app_users", FieldMapper::snake_case(["id", "userName", "email"])?)?;
    registry.register(
        "orders",
        "shop_orders",
        FieldMapper::new([("id", "id"), ("userId", "user_id"), ("total", "total_cents"), ("status", "status")])?,
    )?;
    let directory: Arc<dyn SourceDirectory> = Arc::new(registry);

    let users = Repository::new("users", directory.clone(), provider.clone())?.with_settings(&config.query);
    let orders = Repository::new("orders", directory, provider)?.with_settings(&config.query);

    users
        .insert_many(vec![
            entity(json!({"id": 1, "userName": "john smith", "email": "john@example.com"})),
            entity(json!({"id": 2, "userName": "jane doe", "email": "jane@example.com"})),
        ])
        .await?;
    orders
        .insert_many(vec![
            entity(json!({"userId": 1, "total": 1500, "status": "paid"})),
            entity(json!({"userId": 2, "total": 2500, "status": "paid"})),
            entity(json!({"userId": 2, "total": 700, "status": "open"})),
        ])
        .await?;

    // Both users looked up concurrently
    let found = futures::future::try_join_all((1..=2).map(|id| users.find_by_id(id))).await?;
    info!("Users by id: {}", serde_json::to_string(&found)?);

    let paid = users
        .find(
            FindOptions::new()
                .fields(["userName", "orders.total"])
                .join(Join::inner(
                    SourceRef::Source("orders".into()),
                    Condition::eq("id", "orders.userId"),
                ))
                .filter(Condition::eq("orders.status", "paid"))
                .order_by(OrderBy::desc("orders.total")),
        )
        .await?;
    info!("Paid orders: {}", serde_json::to_string_pretty(&paid)?);

    let spend = orders
        .find(
            FindOptions::new()
                .fields(["userId"])
                .aggregate(Aggregate::new(AggregateFunction::Sum, "total").with_alias("spent"))
                .group_by(["userId"]),
        )
        .await?;
    info!("Spend per user: {}", serde_json::to_string(&spend)?);
    info!(
        "Orders: {} (total {})",
        orders.count(None).await?,
        orders.sum("total", None).await?
    );

    // Dry run: `id` exists in both sources, so a conflict warning is logged
    let compiled = users.compile(
        &Query::select(SourceRef::Source("users".into()))
            .fields(["id", "orders.id"])
            .join(Join::left(
                SourceRef::Source("orders".into()),
                Condition::eq("id", "orders.userId"),
            )),
    )?;
    info!(
        "Compiled: {} ({} warning(s))",
        compiled.statement.sql,
        compiled.warnings.len()
    );

    Ok(())
}
