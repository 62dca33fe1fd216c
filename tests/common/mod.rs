//! Shared harness for integration tests: an in-memory SQLite database with
//! the schema created from the entity definitions.

#![allow(dead_code)]

use backoffice_api::db;
use backoffice_api::entities::inventory_record;
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, EntityTrait, Set};
use uuid::Uuid;

/// Connects to a fresh in-memory SQLite database.
///
/// The pool is capped at one connection so every session sees the same
/// memory database; concurrent transactions serialize on the pool, which is
/// exactly the contention the coordinator's transaction boundary is
/// designed around.
pub async fn setup_db() -> DatabaseConnection {
    let mut options = ConnectOptions::new("sqlite::memory:".to_owned());
    options.max_connections(1).sqlx_logging(false);

    let pool = Database::connect(options)
        .await
        .expect("connect to sqlite memory db");
    db::ensure_schema(&pool).await.expect("create schema");
    pool
}

/// Seeds one inventory record with nothing reserved.
pub async fn seed_inventory(
    db: &DatabaseConnection,
    product_id: Uuid,
    variant_id: Option<Uuid>,
    quantity: i32,
) -> inventory_record::Model {
    seed_inventory_with_reorder_point(db, product_id, variant_id, quantity, None).await
}

pub async fn seed_inventory_with_reorder_point(
    db: &DatabaseConnection,
    product_id: Uuid,
    variant_id: Option<Uuid>,
    quantity: i32,
    reorder_point: Option<i32>,
) -> inventory_record::Model {
    inventory_record::ActiveModel {
        product_id: Set(product_id),
        variant_id: Set(variant_id),
        quantity: Set(quantity),
        reserved_quantity: Set(0),
        available_quantity: Set(quantity),
        reorder_point: Set(reorder_point),
        location: Set(Some("MAIN".to_string())),
        version: Set(1),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("seed inventory record")
}

/// Reloads an inventory record and asserts the stored quantities still obey
/// `quantity >= reserved >= 0` and `available == quantity - reserved`.
pub async fn fetch_checked(
    db: &DatabaseConnection,
    inventory_id: Uuid,
) -> inventory_record::Model {
    let record = inventory_record::Entity::find_by_id(inventory_id)
        .one(db)
        .await
        .expect("query inventory record")
        .expect("inventory record exists");

    assert!(
        record.reserved_quantity >= 0,
        "reserved went negative: {:?}",
        record
    );
    assert!(
        record.quantity >= record.reserved_quantity,
        "reserved exceeds on-hand: {:?}",
        record
    );
    assert_eq!(
        record.available_quantity,
        record.quantity - record.reserved_quantity,
        "available drifted from quantity - reserved: {:?}",
        record
    );

    record
}
