//! ORM entity for the `hash_records` table.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "hash_records")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub hash_btree: String,
    pub hash_hash: String,
    pub hash_noindex: String,
    pub created_at: DateTimeWithTimeZone,
    pub status: i32,
    #[sea_orm(column_type = "JsonBinary")]
    pub metadata: Json,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
