use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Select, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Variant identity for inventory lookups.
///
/// "No variant" is an explicit variant rather than a bare nullable id, so a
/// lookup for a variant-less product can never match a row that carries a
/// variant id (or vice versa).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariantKey {
    NoVariant,
    Variant(Uuid),
}

impl VariantKey {
    pub fn from_column(value: Option<Uuid>) -> Self {
        match value {
            Some(id) => VariantKey::Variant(id),
            None => VariantKey::NoVariant,
        }
    }

    pub fn as_column(&self) -> Option<Uuid> {
        match self {
            VariantKey::Variant(id) => Some(*id),
            VariantKey::NoVariant => None,
        }
    }
}

/// One row per (product, variant-or-none); the live stock position.
///
/// `available_quantity` is stored but must always equal
/// `quantity - reserved_quantity`; the reservation engine recomputes it on
/// every write. `version` is the optimistic-lock counter those writes CAS on.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inventory_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub quantity: i32,
    pub reserved_quantity: i32,
    pub available_quantity: i32,
    pub reorder_point: Option<i32>,
    pub location: Option<String>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Model {
    pub fn variant_key(&self) -> VariantKey {
        VariantKey::from_column(self.variant_id)
    }
}

impl Entity {
    /// Looks up the record owning a product/variant pair. A `NoVariant` key
    /// only matches rows whose variant column is NULL.
    pub fn find_by_key(product_id: Uuid, key: VariantKey) -> Select<Entity> {
        let query = Self::find().filter(Column::ProductId.eq(product_id));
        match key {
            VariantKey::NoVariant => query.filter(Column::VariantId.is_null()),
            VariantKey::Variant(id) => query.filter(Column::VariantId.eq(id)),
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        let now = Utc::now();

        if insert {
            if let ActiveValue::NotSet = active_model.id {
                active_model.id = Set(Uuid::new_v4());
            }
            if let ActiveValue::NotSet = active_model.created_at {
                active_model.created_at = Set(now);
            }
        }

        if let ActiveValue::NotSet = active_model.updated_at {
            active_model.updated_at = Set(Some(now));
        }

        Ok(active_model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_key_round_trips_through_column() {
        let id = Uuid::new_v4();
        assert_eq!(
            VariantKey::from_column(Some(id)),
            VariantKey::Variant(id)
        );
        assert_eq!(VariantKey::from_column(None), VariantKey::NoVariant);
        assert_eq!(VariantKey::Variant(id).as_column(), Some(id));
        assert_eq!(VariantKey::NoVariant.as_column(), None);
    }
}
