//! `SQLite` table holding embedded question records.
//!
//! Embeddings are stored as little-endian `f32` blobs and ranked with the
//! sqlite-vec `vec_distance_*` scalar functions, so the extension must be
//! registered (see [`init_sqlite_vec_extension`]) before the connection opens.
//!
//! [`init_sqlite_vec_extension`]: crate::catalog::storage::init_sqlite_vec_extension

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::OptionalExtension;
use tokio_rusqlite::Connection;
use tracing::info;

use crate::catalog::core::config::{CollectionConfig, DistanceMetric, StorageConfig};
use crate::catalog::core::errors::{CatalogError, CatalogResult};
use crate::catalog::core::item::{PendingRecord, QueryMatch, RecordMetadata, StoredRecord};

/// A record paired with its embedding, ready to be written.
#[derive(Clone, Debug)]
pub struct EmbeddedRecord {
    /// Record to write.
    pub record: PendingRecord,
    /// Its embedding.
    pub embedding: Vec<f32>,
}

/// What a committed write changed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Rows written.
    pub written: usize,
    /// Rows deleted by a per-source replacement.
    pub removed: usize,
    /// Ids that already existed and were overwritten.
    pub overwritten: Vec<String>,
}

/// SQLite-backed collection.
pub struct SqliteCollection {
    conn: Connection,
    table: String,
    distance: DistanceMetric,
}

struct InsertRow {
    id: String,
    source_id: Option<String>,
    document: String,
    metadata_json: String,
    embedding: Vec<u8>,
    dims: usize,
}

struct RawRecord {
    id: String,
    document: String,
    metadata_json: String,
    embedding: Vec<u8>,
    created_at: i64,
}

struct RawMatch {
    id: String,
    document: String,
    metadata_json: String,
    distance: Option<f64>,
}

impl SqliteCollection {
    /// Open the database file and prepare the collection.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or the table cannot be created.
    pub async fn open(storage: &StorageConfig, collection: &CollectionConfig) -> CatalogResult<Self> {
        if let Some(parent) = storage.sqlite_path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let conn = Connection::open(&storage.sqlite_path).await?;
        Self::with_connection(conn, collection).await
    }

    /// Prepare the collection on an existing connection.
    ///
    /// Creates the table if absent. With `reset_on_start` the table is dropped
    /// and recreated first, discarding any earlier records.
    ///
    /// # Errors
    /// Returns an error if the table cannot be created.
    pub async fn with_connection(
        conn: Connection,
        collection: &CollectionConfig,
    ) -> CatalogResult<Self> {
        let this = Self {
            conn,
            table: collection.name.clone(),
            distance: collection.distance,
        };

        if collection.reset_on_start {
            this.reset().await?;
            info!("Collection {} recreated on start", this.table);
        } else {
            this.create_if_missing().await?;
            info!("Collection {} opened", this.table);
        }

        Ok(this)
    }

    /// Collection (table) name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.table
    }

    async fn create_if_missing(&self) -> CatalogResult<()> {
        let schema = schema_sql(&self.table);
        self.conn
            .call(move |conn| {
                conn.execute_batch(&schema)?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Drop and recreate the table.
    ///
    /// # Errors
    /// Returns an error if the statements fail; the old table is kept in that case.
    pub async fn reset(&self) -> CatalogResult<()> {
        let table = quote_ident(&self.table);
        let schema = schema_sql(&self.table);
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute_batch(&format!("DROP TABLE IF EXISTS {table}"))?;
                tx.execute_batch(&schema)?;
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Write records in one transaction.
    ///
    /// With `replace_source`, every existing row of that source is deleted
    /// first inside the same transaction. Nothing is committed if any vector's
    /// dimensionality differs from the rows already stored.
    ///
    /// # Errors
    /// Returns an error on dimension mismatch or storage failure.
    pub async fn write(
        &self,
        records: Vec<EmbeddedRecord>,
        replace_source: Option<String>,
    ) -> CatalogResult<WriteOutcome> {
        let mut rows = Vec::with_capacity(records.len());
        for entry in records {
            let metadata_json = serde_json::to_string(&entry.record.metadata)?;
            rows.push(InsertRow {
                source_id: entry
                    .record
                    .metadata
                    .source_id()
                    .map(ToString::to_string),
                id: entry.record.id,
                document: entry.record.document,
                metadata_json,
                dims: entry.embedding.len(),
                embedding: to_blob(&entry.embedding),
            });
        }

        let table = quote_ident(&self.table);
        let created_at = Utc::now().timestamp_millis();
        let result = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let removed = match &replace_source {
                    Some(source_id) => tx.execute(
                        &format!("DELETE FROM {table} WHERE source_id = ?1"),
                        rusqlite::params![source_id],
                    )?,
                    None => 0,
                };

                let mut expected = stored_dims(&tx, &table)?;
                let mut overwritten = Vec::new();
                {
                    let mut exists = tx.prepare(&format!("SELECT 1 FROM {table} WHERE id = ?1"))?;
                    let mut insert = tx.prepare(&format!(
                        "INSERT OR REPLACE INTO {table}
                            (id, source_id, document, metadata_json, embedding, created_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
                    ))?;
                    for row in &rows {
                        let current = expected;
                        match current {
                            Some(dims) if dims != row.dims => {
                                return Ok(Err((dims, row.dims)));
                            }
                            None => expected = Some(row.dims),
                            Some(_) => {}
                        }
                        if exists.exists(rusqlite::params![row.id])? {
                            overwritten.push(row.id.clone());
                        }
                        insert.execute(rusqlite::params![
                            row.id,
                            row.source_id,
                            row.document,
                            row.metadata_json,
                            row.embedding,
                            created_at,
                        ])?;
                    }
                }
                tx.commit()?;

                Ok(Ok(WriteOutcome {
                    written: rows.len(),
                    removed,
                    overwritten,
                }))
            })
            .await?;

        result.map_err(|(expected, actual)| CatalogError::DimensionMismatch { expected, actual })
    }

    /// Up to `k` records closest to `query`, closest first; ties ordered by id.
    ///
    /// # Errors
    /// Returns an error on dimension mismatch or storage failure.
    pub async fn nearest(&self, query: &[f32], k: usize) -> CatalogResult<Vec<QueryMatch>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let table = quote_ident(&self.table);
        let function = self.distance.sql_function();
        let dims = query.len();
        let blob = to_blob(query);
        let limit = i64::try_from(k).unwrap_or(i64::MAX);

        let result = self
            .conn
            .call(move |conn| {
                match stored_dims(conn, &table)? {
                    None => return Ok(Ok(Vec::new())),
                    Some(expected) if expected != dims => return Ok(Err((expected, dims))),
                    Some(_) => {}
                }

                let mut stmt = conn.prepare(&format!(
                    "SELECT id, document, metadata_json, {function}(embedding, ?1) AS distance
                     FROM {table}
                     ORDER BY distance IS NULL, distance ASC, id ASC
                     LIMIT ?2"
                ))?;
                let rows = stmt
                    .query_map(rusqlite::params![blob, limit], |row| {
                        Ok(RawMatch {
                            id: row.get(0)?,
                            document: row.get(1)?,
                            metadata_json: row.get(2)?,
                            distance: row.get(3)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                Ok(Ok(rows))
            })
            .await?;

        let raw = result
            .map_err(|(expected, actual)| CatalogError::DimensionMismatch { expected, actual })?;

        raw.into_iter()
            .map(|row| {
                let metadata: RecordMetadata = serde_json::from_str(&row.metadata_json)?;
                Ok(QueryMatch {
                    id: row.id,
                    document: row.document,
                    metadata,
                    distance: row.distance.unwrap_or(f64::INFINITY),
                })
            })
            .collect()
    }

    /// Every record in insertion order.
    ///
    /// # Errors
    /// Returns an error if the table cannot be read.
    pub async fn all(&self) -> CatalogResult<Vec<StoredRecord>> {
        let table = quote_ident(&self.table);
        let raw = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT id, document, metadata_json, embedding, created_at
                     FROM {table} ORDER BY rowid"
                ))?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok(RawRecord {
                            id: row.get(0)?,
                            document: row.get(1)?,
                            metadata_json: row.get(2)?,
                            embedding: row.get(3)?,
                            created_at: row.get(4)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                Ok(rows)
            })
            .await?;

        raw.into_iter().map(RawRecord::into_record).collect()
    }

    /// Number of stored records.
    ///
    /// # Errors
    /// Returns an error if the table cannot be read.
    pub async fn count(&self) -> CatalogResult<usize> {
        let table = quote_ident(&self.table);
        let count = self
            .conn
            .call(move |conn| {
                let count: i64 =
                    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                        row.get(0)
                    })?;
                Ok(count)
            })
            .await?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

impl RawRecord {
    fn into_record(self) -> CatalogResult<StoredRecord> {
        let metadata: RecordMetadata = serde_json::from_str(&self.metadata_json)?;
        let created_at: DateTime<Utc> = Utc
            .timestamp_millis_opt(self.created_at)
            .single()
            .ok_or(CatalogError::Sqlite(rusqlite::Error::IntegralValueOutOfRange(
                4,
                self.created_at,
            )))?;
        Ok(StoredRecord {
            id: self.id,
            document: self.document,
            metadata,
            embedding: from_blob(&self.embedding),
            created_at,
        })
    }
}

/// Double-quoted SQL identifier.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn schema_sql(name: &str) -> String {
    let table = quote_ident(name);
    let index = quote_ident(&format!("{name}_source_idx"));
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            id TEXT PRIMARY KEY,
            source_id TEXT,
            document TEXT NOT NULL,
            metadata_json TEXT NOT NULL,
            embedding BLOB NOT NULL,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS {index} ON {table} (source_id);"
    )
}

/// Dimensionality of the vectors already stored, if any.
fn stored_dims(conn: &rusqlite::Connection, table: &str) -> rusqlite::Result<Option<usize>> {
    let bytes: Option<i64> = conn
        .query_row(
            &format!("SELECT length(embedding) FROM {table} LIMIT 1"),
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(bytes.and_then(|b| usize::try_from(b).ok()).map(|b| b / 4))
}

fn to_blob(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn from_blob(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}


#[cfg(test)]
mod tests {
    use super::test_support::memory_collection;
    use super::*;
    use crate::catalog::core::ids::SourceId;
    use crate::catalog::core::item::Item;
    use crate::catalog::storage::init_sqlite_vec_extension;

    fn row(source: &str, ordinal: usize, text: &str, embedding: Vec<f32>) -> EmbeddedRecord {
        let source = SourceId::new(source).unwrap();
        let item = Item::new(format!("intro {text}"), format!("talk {text}"), text).unwrap();
        EmbeddedRecord {
            record: PendingRecord {
                id: source.record_id(ordinal),
                document: item.full_text.clone(),
                metadata: item.metadata(&source),
            },
            embedding,
        }
    }

    #[tokio::test]
    async fn test_write_then_read_back() {
        let collection = memory_collection(true).await;
        let outcome = collection
            .write(
                vec![
                    row("vid1", 0, "a", vec![1.0, 0.0, 0.0]),
                    row("vid1", 1, "b", vec![0.0, 1.0, 0.0]),
                ],
                None,
            )
            .await
            .unwrap();
        assert_eq!(outcome.written, 2);
        assert!(outcome.overwritten.is_empty());

        let all = collection.all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, "vid1_0");
        assert_eq!(all[1].embedding, vec![0.0, 1.0, 0.0]);
        assert_eq!(all[1].metadata.question(), Some("b"));
        assert_eq!(collection.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_nearest_orders_by_distance_and_saturates() {
        let collection = memory_collection(true).await;
        collection
            .write(
                vec![
                    row("vid1", 0, "far", vec![0.0, 1.0]),
                    row("vid1", 1, "near", vec![1.0, 0.1]),
                    row("vid1", 2, "exact", vec![1.0, 0.0]),
                ],
                None,
            )
            .await
            .unwrap();

        let matches = collection.nearest(&[1.0, 0.0], 10).await.unwrap();
        let ids: Vec<&str> = matches.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["vid1_2", "vid1_1", "vid1_0"]);
        assert!(matches.windows(2).all(|w| w[0].distance <= w[1].distance));
        assert!(matches[0].distance.abs() < 1e-6);

        let top = collection.nearest(&[1.0, 0.0], 1).await.unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].id, "vid1_2");

        assert!(collection.nearest(&[1.0, 0.0], 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_nearest_on_empty_collection() {
        let collection = memory_collection(true).await;
        assert!(collection.nearest(&[1.0, 0.0], 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_l2_metric() {
        init_sqlite_vec_extension();
        let conn = Connection::open_in_memory().await.unwrap();
        let config = CollectionConfig {
            distance: DistanceMetric::L2,
            ..CollectionConfig::default()
        };
        let collection = SqliteCollection::with_connection(conn, &config).await.unwrap();
        collection
            .write(
                vec![
                    row("vid1", 0, "a", vec![3.0, 4.0]),
                    row("vid1", 1, "b", vec![0.0, 1.0]),
                ],
                None,
            )
            .await
            .unwrap();
        let matches = collection.nearest(&[0.0, 0.0], 2).await.unwrap();
        assert_eq!(matches[0].id, "vid1_1");
        assert!((matches[1].distance - 5.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_replace_source_removes_stale_records() {
        let collection = memory_collection(true).await;
        collection
            .write(
                (0..3)
                    .map(|i| row("vid1", i, &format!("old {i}"), vec![1.0, 0.0]))
                    .chain(std::iter::once(row("vid2", 0, "other", vec![0.0, 1.0])))
                    .collect(),
                None,
            )
            .await
            .unwrap();

        let outcome = collection
            .write(
                vec![row("vid1", 0, "new", vec![1.0, 1.0])],
                Some("vid1".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(outcome.removed, 3);
        assert!(outcome.overwritten.is_empty());

        let ids: Vec<String> = collection
            .all()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"vid1_0".to_string()));
        assert!(ids.contains(&"vid2_0".to_string()));
    }

    #[tokio::test]
    async fn test_existing_id_is_reported_as_overwritten() {
        let collection = memory_collection(true).await;
        collection
            .write(vec![row("vid1", 0, "a", vec![1.0, 0.0])], None)
            .await
            .unwrap();
        let outcome = collection
            .write(vec![row("vid1", 0, "b", vec![0.0, 1.0])], None)
            .await
            .unwrap();
        assert_eq!(outcome.overwritten, vec!["vid1_0".to_string()]);
        assert_eq!(collection.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rolls_back() {
        let collection = memory_collection(true).await;
        collection
            .write(vec![row("vid1", 0, "a", vec![1.0, 0.0])], None)
            .await
            .unwrap();

        let err = collection
            .write(
                vec![
                    row("vid2", 0, "ok", vec![0.5, 0.5]),
                    row("vid2", 1, "bad", vec![1.0, 0.0, 0.0]),
                ],
                None,
            )
            .await;
        assert!(matches!(
            err,
            Err(CatalogError::DimensionMismatch {
                expected: 2,
                actual: 3
            })
        ));
        assert_eq!(collection.count().await.unwrap(), 1);

        let err = collection.nearest(&[1.0, 0.0, 0.0], 1).await;
        assert!(matches!(err, Err(CatalogError::DimensionMismatch { .. })));
    }

    #[tokio::test]
    async fn test_reset_on_start_controls_persistence() {
        init_sqlite_vec_extension();
        let conn = Connection::open_in_memory().await.unwrap();
        let keep = CollectionConfig {
            reset_on_start: false,
            ..CollectionConfig::default()
        };
        let first = SqliteCollection::with_connection(conn.clone(), &keep)
            .await
            .unwrap();
        first
            .write(vec![row("vid1", 0, "a", vec![1.0, 0.0])], None)
            .await
            .unwrap();

        let reopened = SqliteCollection::with_connection(conn.clone(), &keep)
            .await
            .unwrap();
        assert_eq!(reopened.count().await.unwrap(), 1);

        let fresh = SqliteCollection::with_connection(conn, &CollectionConfig::default())
            .await
            .unwrap();
        assert_eq!(fresh.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_keyword_collection_name() {
        init_sqlite_vec_extension();
        let conn = Connection::open_in_memory().await.unwrap();
        let config = CollectionConfig {
            name: "order".to_string(),
            ..CollectionConfig::default()
        };
        let collection = SqliteCollection::with_connection(conn, &config).await.unwrap();
        collection
            .write(vec![row("vid1", 0, "a", vec![1.0, 0.0])], Some("vid1".to_string()))
            .await
            .unwrap();
        assert_eq!(collection.nearest(&[1.0, 0.0], 1).await.unwrap()[0].id, "vid1_0");
        assert_eq!(collection.all().await.unwrap().len(), 1);
        collection.reset().await.unwrap();
        assert_eq!(collection.count().await.unwrap(), 0);
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("order"), "\"order\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_blob_layout() {
        let vector = vec![1.5_f32, -2.0, 0.0];
        let blob = to_blob(&vector);
        assert_eq!(blob.len(), 12);
        assert_eq!(from_blob(&blob), vector);
    }
}
