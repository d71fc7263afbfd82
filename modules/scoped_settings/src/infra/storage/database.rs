//! SeaORM database format backend
//!
//! All locations share one table; the location string partitions it.

use super::entity;
use super::migrations::Migrator;
use crate::contract::{Format, Location, ScopeDescriptor};
use crate::domain::{Access, BackendError, BackendHandle, FlatKey, FormatBackend, GroupPath};
use anyhow::Result;
use async_trait::async_trait;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, Database, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder,
};
use sea_orm_migration::MigratorTrait;
use std::sync::Arc;

pub struct DatabaseBackend {
    db: Arc<DatabaseConnection>,
}

impl DatabaseBackend {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Connect to `url` (any URL SeaORM accepts) and apply migrations
    pub async fn connect(url: &str) -> Result<Self> {
        let db = Database::connect(url).await?;
        let backend = Self::new(Arc::new(db));
        backend.migrate().await?;
        Ok(backend)
    }

    pub async fn migrate(&self) -> Result<()> {
        Migrator::up(&*self.db, None).await?;
        tracing::info!("Settings database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl FormatBackend for DatabaseBackend {
    fn format(&self) -> Format {
        Format::Database
    }

    fn locate(&self, scope: &ScopeDescriptor) -> Location {
        Location::new(super::scope_path(scope))
    }

    async fn open(
        &self,
        location: &Location,
        access: Access,
    ) -> Result<Box<dyn BackendHandle>, BackendError> {
        self.db
            .ping()
            .await
            .map_err(|e| BackendError::Unavailable {
                location: location.clone(),
                reason: e.to_string(),
            })?;

        Ok(Box::new(DatabaseHandle {
            db: self.db.clone(),
            location: location.clone(),
            access,
        }))
    }
}

struct DatabaseHandle {
    db: Arc<DatabaseConnection>,
    location: Location,
    access: Access,
}

impl DatabaseHandle {
    fn storage_error(&self, err: DbErr) -> BackendError {
        BackendError::Storage {
            location: self.location.clone(),
            source: err.into(),
        }
    }
}

#[async_trait]
impl BackendHandle for DatabaseHandle {
    fn location(&self) -> &Location {
        &self.location
    }

    fn access(&self) -> Access {
        self.access
    }

    async fn get(&mut self, key: &FlatKey) -> Result<Option<String>, BackendError> {
        let row = entity::Entity::find_by_id((self.location.to_string(), key.to_string()))
            .one(&*self.db)
            .await
            .map_err(|e| self.storage_error(e))?;

        Ok(row.map(|row| row.setting_value))
    }

    async fn set(&mut self, key: &FlatKey, value: &str) -> Result<(), BackendError> {
        self.ensure_writable()?;

        let active = entity::ActiveModel {
            location: Set(self.location.to_string()),
            setting_key: Set(key.to_string()),
            setting_value: Set(value.to_string()),
            updated_at: Set(chrono::Utc::now()),
        };
        entity::Entity::insert(active)
            .on_conflict(
                OnConflict::columns([entity::Column::Location, entity::Column::SettingKey])
                    .update_columns([entity::Column::SettingValue, entity::Column::UpdatedAt])
                    .to_owned(),
            )
            .exec_without_returning(&*self.db)
            .await
            .map_err(|e| self.storage_error(e))?;

        Ok(())
    }

    async fn remove(&mut self, key: &FlatKey) -> Result<(), BackendError> {
        self.ensure_writable()?;

        entity::Entity::delete_by_id((self.location.to_string(), key.to_string()))
            .exec(&*self.db)
            .await
            .map_err(|e| self.storage_error(e))?;

        Ok(())
    }

    async fn enumerate(&mut self, prefix: &GroupPath) -> Result<Vec<FlatKey>, BackendError> {
        let rows = entity::Entity::find()
            .filter(entity::Column::Location.eq(self.location.as_str()))
            .order_by_asc(entity::Column::SettingKey)
            .all(&*self.db)
            .await
            .map_err(|e| self.storage_error(e))?;

        let mut keys = Vec::with_capacity(rows.len());
        for row in rows {
            let key = FlatKey::unflatten(&row.setting_key).map_err(|e| BackendError::Malformed {
                location: self.location.clone(),
                message: e.to_string(),
            })?;
            if key.is_under(prefix) {
                keys.push(key);
            }
        }
        Ok(keys)
    }

    async fn flush(&mut self) -> Result<(), BackendError> {
        // Writes are not buffered
        Ok(())
    }
}
