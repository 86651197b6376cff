//! SeaORM entity model used by the database catalog backend.
//!
//! Maps to the `channels` table created by `database_catalog`.

use sea_orm::entity::prelude::*;

/// Channels table entity model.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "channels")]
pub struct Model {
    /// Auto-increment row id, exposed as the source id
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Display name
    pub name: String,
    /// Location code derived from the raw group title (e.g. "FR", "WW")
    pub location_code: Option<String>,
    /// Cleaned group title
    pub group_title: Option<String>,
    pub tvg_id: Option<String>,
    pub tvg_logo: Option<String>,
    /// Remote source address, unique across the catalog
    #[sea_orm(unique)]
    pub url: String,
    /// RFC3339 import timestamp
    pub parsed_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
