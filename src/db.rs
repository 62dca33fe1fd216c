use crate::config::AppConfig;
use crate::entities::{inventory_record, order, order_item, stock_movement};
use sea_orm::sea_query::Index;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, EntityName, Schema,
};
use std::time::Duration;
use tracing::{debug, info};

/// Type alias for a database connection pool
pub type DbPool = DatabaseConnection;

/// Configuration for database connection
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Database connection URL
    pub url: String,
    /// Maximum number of connections
    pub max_connections: u32,
    /// Minimum number of connections
    pub min_connections: u32,
    /// Connection timeout duration
    pub connect_timeout: Duration,
    /// Idle timeout duration
    pub idle_timeout: Duration,
    /// Acquire connection timeout
    pub acquire_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            acquire_timeout: Duration::from_secs(8),
        }
    }
}

/// Establishes a connection pool to the database.
pub async fn establish_connection(database_url: &str) -> Result<DbPool, DbErr> {
    let config = DbConfig {
        url: database_url.to_string(),
        ..Default::default()
    };

    establish_connection_with_config(&config).await
}

/// Establishes a connection pool with custom pool settings.
pub async fn establish_connection_with_config(config: &DbConfig) -> Result<DbPool, DbErr> {
    debug!("Configuring database connection with: {:?}", config);

    let mut opt = ConnectOptions::new(config.url.clone());
    opt.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(config.connect_timeout)
        .idle_timeout(config.idle_timeout)
        .acquire_timeout(config.acquire_timeout)
        .sqlx_logging(false);

    let pool = Database::connect(opt).await?;
    info!("Database connection established");
    Ok(pool)
}

/// Establishes a connection pool using application configuration.
pub async fn establish_connection_from_app_config(cfg: &AppConfig) -> Result<DbPool, DbErr> {
    let config = DbConfig {
        url: cfg.database_url.clone(),
        max_connections: cfg.db_max_connections,
        min_connections: cfg.db_min_connections,
        ..Default::default()
    };

    let pool = establish_connection_with_config(&config).await?;
    if cfg.auto_migrate {
        ensure_schema(&pool).await?;
    }
    Ok(pool)
}

/// Creates any missing tables from the entity definitions.
///
/// Intended for embedded (SQLite) databases and the test harness; managed
/// deployments own their schema externally.
pub async fn ensure_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    let mut statements = vec![
        schema.create_table_from_entity(inventory_record::Entity),
        schema.create_table_from_entity(stock_movement::Entity),
        schema.create_table_from_entity(order::Entity),
        schema.create_table_from_entity(order_item::Entity),
    ];

    for statement in &mut statements {
        statement.if_not_exists();
        db.execute(backend.build(&*statement)).await?;
    }

    // One stock position per (product, variant-or-none) pair.
    let unique_key = Index::create()
        .name("idx_inventory_records_product_variant")
        .table(inventory_record::Entity.table_ref())
        .col(inventory_record::Column::ProductId)
        .col(inventory_record::Column::VariantId)
        .unique()
        .if_not_exists()
        .to_owned();
    db.execute(backend.build(&unique_key)).await?;

    debug!("Schema ensured for inventory, ledger and order tables");

    Ok(())
}
