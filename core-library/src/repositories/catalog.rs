//! Catalog repository trait and implementation

use crate::error::{LibraryError, Result};
use crate::models::{AttachmentMetadata, CatalogItem, ItemId, NewCatalogItem};
use crate::repositories::{IdPage, QueryBounds};
use async_trait::async_trait;
use sqlx::{query, query_as, SqlitePool};
use tracing::debug;

/// Restricts which catalog items a query returns
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ItemFilter {
    #[default]
    All,
    /// Only items whose mime type is `image/*`
    ImagesOnly,
}

impl ItemFilter {
    fn where_clause(&self) -> &'static str {
        match self {
            ItemFilter::All => "",
            ItemFilter::ImagesOnly => "WHERE mime_type LIKE 'image/%'",
        }
    }
}

/// Catalog repository interface
///
/// Enumerates items for batch runs and reads/writes their metadata
/// documents.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Ids of matching items in catalog order (ascending id), bounded by
    /// `bounds`, plus the unbounded match count
    ///
    /// # Errors
    /// Returns `InvalidInput` if `bounds` combines `offset` and `page`.
    async fn query_ids(&self, bounds: QueryBounds, filter: ItemFilter) -> Result<IdPage>;

    /// Find an item by id
    async fn find_by_id(&self, id: ItemId) -> Result<Option<CatalogItem>>;

    /// Read the metadata document of an item
    ///
    /// # Returns
    /// - `Ok(None)` if the item has no metadata yet
    /// - `Err(NotFound)` if the item does not exist
    async fn get_metadata(&self, id: ItemId) -> Result<Option<AttachmentMetadata>>;

    /// Replace the metadata document of an item
    async fn update_metadata(&self, id: ItemId, metadata: &AttachmentMetadata) -> Result<()>;

    /// Metadata of the first item whose public URL ends with `suffix`
    async fn find_by_path_suffix(&self, suffix: &str) -> Result<Option<AttachmentMetadata>>;

    /// Insert a new item, optionally with its metadata document
    async fn insert(
        &self,
        item: &NewCatalogItem,
        metadata: Option<&AttachmentMetadata>,
    ) -> Result<ItemId>;

    /// Count matching items
    async fn count(&self, filter: ItemFilter) -> Result<u64>;
}

/// SQLite implementation of CatalogRepository
pub struct SqliteCatalogRepository {
    pool: SqlitePool,
}

impl SqliteCatalogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn parse_metadata(id: ItemId, raw: Option<String>) -> Result<Option<AttachmentMetadata>> {
        raw.map(|json| {
            serde_json::from_str(&json).map_err(|source| LibraryError::CorruptMetadata {
                id: id.to_string(),
                source,
            })
        })
        .transpose()
    }
}

/// Escape `LIKE` wildcards so file names containing `_` or `%` match literally
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[async_trait]
impl CatalogRepository for SqliteCatalogRepository {
    async fn query_ids(&self, bounds: QueryBounds, filter: ItemFilter) -> Result<IdPage> {
        bounds.validate()?;

        let total = self.count(filter).await?;

        let sql = format!(
            "SELECT id FROM attachments {} ORDER BY id ASC LIMIT ? OFFSET ?",
            filter.where_clause()
        );
        let rows: Vec<(ItemId,)> = query_as(&sql)
            .bind(bounds.sql_limit())
            .bind(i64::from(bounds.resolved_offset()))
            .fetch_all(&self.pool)
            .await?;

        debug!(
            returned = rows.len(),
            total,
            limit = ?bounds.limit,
            offset = bounds.resolved_offset(),
            "Queried catalog ids"
        );

        Ok(IdPage {
            ids: rows.into_iter().map(|(id,)| id).collect(),
            total,
        })
    }

    async fn find_by_id(&self, id: ItemId) -> Result<Option<CatalogItem>> {
        let item = query_as::<_, CatalogItem>(
            "SELECT id, attached_file, mime_type, guid FROM attachments WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(item)
    }

    async fn get_metadata(&self, id: ItemId) -> Result<Option<AttachmentMetadata>> {
        let row: Option<(Option<String>,)> =
            query_as("SELECT metadata FROM attachments WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some((raw,)) => Self::parse_metadata(id, raw),
            None => Err(LibraryError::NotFound {
                entity_type: "CatalogItem".to_string(),
                id: id.to_string(),
            }),
        }
    }

    async fn update_metadata(&self, id: ItemId, metadata: &AttachmentMetadata) -> Result<()> {
        let json = serde_json::to_string(metadata)?;

        let result = query("UPDATE attachments SET metadata = ? WHERE id = ?")
            .bind(json)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(LibraryError::NotFound {
                entity_type: "CatalogItem".to_string(),
                id: id.to_string(),
            });
        }

        debug!(item_id = %id, "Updated item metadata");
        Ok(())
    }

    async fn find_by_path_suffix(&self, suffix: &str) -> Result<Option<AttachmentMetadata>> {
        if suffix.is_empty() {
            return Ok(None);
        }

        let row: Option<(ItemId, Option<String>)> = query_as(
            r#"
            SELECT id, metadata FROM attachments
            WHERE guid LIKE ? ESCAPE '\' AND metadata IS NOT NULL
            ORDER BY id ASC
            LIMIT 1
            "#,
        )
        .bind(format!("%{}", escape_like(suffix)))
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((id, raw)) => Self::parse_metadata(id, raw),
            None => Ok(None),
        }
    }

    async fn insert(
        &self,
        item: &NewCatalogItem,
        metadata: Option<&AttachmentMetadata>,
    ) -> Result<ItemId> {
        item.validate().map_err(|message| LibraryError::InvalidInput {
            field: "CatalogItem".to_string(),
            message,
        })?;

        let json = metadata.map(serde_json::to_string).transpose()?;

        let result = query(
            r#"
            INSERT INTO attachments (attached_file, mime_type, guid, metadata)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&item.attached_file)
        .bind(&item.mime_type)
        .bind(&item.guid)
        .bind(json)
        .execute(&self.pool)
        .await?;

        Ok(ItemId(result.last_insert_rowid()))
    }

    async fn count(&self, filter: ItemFilter) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM attachments {}", filter.where_clause());
        let (count,): (i64,) = query_as(&sql).fetch_one(&self.pool).await?;

        Ok(count.max(0) as u64)
    }
}
