//! SeaORM entities for database tables

use sea_orm::entity::prelude::*;

/// One flattened setting at one location
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "settings_entries")]
pub struct Model {
    /// Location partition, e.g. `user/myorg/myapp` (part of composite primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub location: String,

    /// Flattened key (part of composite primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub setting_key: String,

    pub setting_value: String,

    /// Last update timestamp
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
