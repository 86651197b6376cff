use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, error, info};
use sea_orm::sea_query::{Index, OnConflict};
use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::{
    ColumnTrait, Condition, ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Schema, TransactionTrait,
};

use crate::catalog::catalog_trait::{validate_filter, Catalog};
use crate::catalog::db_entities as channels;
use crate::catalog::types::{
    Channel, ChannelFilter, ChannelPage, NewChannel, Pagination, ReplaceSummary, SourceId,
};
use crate::error_handling::types::CatalogError;

/// Rows per INSERT statement; keeps the bound parameter count below SQLite's limit.
const INSERT_CHUNK: usize = 1000;

fn read_failed(e: DbErr) -> CatalogError {
    error!("Catalog read failed: {}", e);
    CatalogError::ReadFailed(e.to_string())
}

fn write_failed(e: DbErr) -> CatalogError {
    error!("Catalog write failed: {}", e);
    CatalogError::WriteFailed(e.to_string())
}

impl From<channels::Model> for Channel {
    fn from(model: channels::Model) -> Self {
        Channel {
            id: SourceId(model.id),
            name: model.name,
            location_code: model.location_code,
            group_title: model.group_title,
            tvg_id: model.tvg_id,
            tvg_logo: model.tvg_logo,
            url: model.url,
        }
    }
}

/// SQLite-backed catalog using SeaORM.
pub struct DatabaseCatalog {
    db: DatabaseConnection,
}

impl DatabaseCatalog {
    /// Opens (creating if missing) the database at `path` and ensures the schema exists.
    pub async fn new_file<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let path_ref = path.as_ref();
        if let Some(parent) = path_ref.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    error!("Failed to create catalog directory {}: {}", parent.display(), e);
                    CatalogError::ConnectionFailed(e.to_string())
                })?;
            }
        }

        let url = format!("sqlite://{}?mode=rwc", path_ref.display());
        let mut options = ConnectOptions::new(url);
        options.max_connections(5).sqlx_logging(false);

        let db = Database::connect(options).await.map_err(|e| {
            error!("Failed to open catalog at {}: {}", path_ref.display(), e);
            CatalogError::ConnectionFailed(e.to_string())
        })?;
        Self::ensure_schema(&db).await?;

        info!("DatabaseCatalog opened at {}", path_ref.display());
        Ok(Self { db })
    }

    async fn ensure_schema(db: &DatabaseConnection) -> Result<(), CatalogError> {
        let backend = db.get_database_backend();
        let schema = Schema::new(backend);

        let mut table = schema.create_table_from_entity(channels::Entity);
        table.if_not_exists();
        db.execute(backend.build(&table)).await.map_err(write_failed)?;

        let indexes = [
            ("idx_channels_group_title", channels::Column::GroupTitle),
            ("idx_channels_name", channels::Column::Name),
        ];
        for (name, column) in indexes {
            let index = Index::create()
                .if_not_exists()
                .name(name)
                .table(channels::Entity)
                .col(column)
                .to_owned();
            db.execute(backend.build(&index)).await.map_err(write_failed)?;
        }

        debug!("Catalog schema ready");
        Ok(())
    }
}

#[async_trait]
impl Catalog for DatabaseCatalog {
    async fn get_channel(&self, id: SourceId) -> Result<Option<Channel>, CatalogError> {
        let model = channels::Entity::find_by_id(id.0)
            .one(&self.db)
            .await
            .map_err(read_failed)?;
        debug!(
            "Catalog lookup for {}: {}",
            id,
            if model.is_some() { "found" } else { "not found" }
        );
        Ok(model.map(Channel::from))
    }

    async fn list_channels(&self, filter: &ChannelFilter) -> Result<ChannelPage, CatalogError> {
        validate_filter(filter)?;

        let mut condition = Condition::all();
        if let Some(group) = &filter.group {
            condition = condition.add(channels::Column::GroupTitle.eq(group.clone()));
        }
        if let Some(search) = &filter.search {
            // LIKE is case-insensitive for ASCII in SQLite
            condition = condition.add(channels::Column::Name.contains(search.as_str()));
        }
        if !filter.location_codes.is_empty() {
            condition =
                condition.add(channels::Column::LocationCode.is_in(filter.location_codes.clone()));
        }

        let paginator = channels::Entity::find()
            .filter(condition)
            .order_by_asc(channels::Column::Name)
            .paginate(&self.db, filter.limit);
        let total_items = paginator.num_items().await.map_err(read_failed)?;
        let rows = paginator
            .fetch_page(filter.page - 1)
            .await
            .map_err(read_failed)?;

        Ok(ChannelPage {
            data: rows.into_iter().map(Channel::from).collect(),
            pagination: Pagination::new(total_items, filter.page, filter.limit),
        })
    }

    async fn list_groups(&self) -> Result<Vec<String>, CatalogError> {
        let groups: Vec<Option<String>> = channels::Entity::find()
            .select_only()
            .column(channels::Column::GroupTitle)
            .distinct()
            .order_by_asc(channels::Column::GroupTitle)
            .into_tuple()
            .all(&self.db)
            .await
            .map_err(read_failed)?;
        Ok(groups
            .into_iter()
            .flatten()
            .filter(|g| !g.is_empty())
            .collect())
    }

    async fn replace_channels(
        &self,
        entries: Vec<NewChannel>,
    ) -> Result<ReplaceSummary, CatalogError> {
        let txn = self.db.begin().await.map_err(write_failed)?;

        let cleared = channels::Entity::delete_many()
            .exec(&txn)
            .await
            .map_err(write_failed)?;
        info!("Cleared {} existing catalog entries", cleared.rows_affected);

        let parsed_at = Utc::now().to_rfc3339();
        let mut summary = ReplaceSummary::default();
        for (index, chunk) in entries.chunks(INSERT_CHUNK).enumerate() {
            let models = chunk.iter().map(|entry| channels::ActiveModel {
                id: NotSet,
                name: Set(entry.name.clone()),
                location_code: Set(entry.location_code.clone()),
                group_title: Set(entry.group_title.clone()),
                tvg_id: Set(entry.tvg_id.clone()),
                tvg_logo: Set(entry.tvg_logo.clone()),
                url: Set(entry.url.clone()),
                parsed_at: Set(parsed_at.clone()),
            });
            let inserted = channels::Entity::insert_many(models)
                .on_conflict(
                    OnConflict::column(channels::Column::Url)
                        .do_nothing()
                        .to_owned(),
                )
                .exec_without_returning(&txn)
                .await
                .map_err(write_failed)?;
            debug!(
                "Inserted chunk {} ({} rows, {} new)",
                index + 1,
                chunk.len(),
                inserted
            );
            summary.inserted += inserted;
            summary.duplicates += chunk.len() as u64 - inserted;
        }

        txn.commit().await.map_err(write_failed)?;
        info!(
            "Catalog replaced: {} inserted, {} duplicate urls skipped",
            summary.inserted, summary.duplicates
        );
        Ok(summary)
    }
}
