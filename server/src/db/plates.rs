use sqlx::SqlitePool;
use time::PrimitiveDateTime;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub(crate) struct Plate {
    pub id: Uuid,
    pub created_at: PrimitiveDateTime,
    pub description: Option<String>,
    pub owner: String,
    pub version: i64,
}

#[derive(Debug)]
pub(crate) enum PlateStoreError {
    NotFound,
    Conflict,
    Database(String),
}

#[derive(sqlx::FromRow)]
struct PlateRow {
    id: String,
    created_at: PrimitiveDateTime,
    description: Option<String>,
    owner: String,
    version: i64,
}

const PLATE_COLUMNS: &str = "id, created_at, description, owner, version";

#[derive(Clone)]
pub(crate) struct PlateStore {
    pool: SqlitePool,
}

impl PlateStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, plate: &Plate) -> Result<(), PlateStoreError> {
        sqlx::query(
            "INSERT INTO plates (id, created_at, description, owner, version) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(plate.id.to_string())
        .bind(plate.created_at)
        .bind(&plate.description)
        .bind(&plate.owner)
        .bind(plate.version)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<Plate, PlateStoreError> {
        let row: Option<PlateRow> =
            sqlx::query_as(&format!("SELECT {PLATE_COLUMNS} FROM plates WHERE id = ?1"))
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;
        match row {
            Some(row) => plate_from_row(row),
            None => Err(PlateStoreError::NotFound),
        }
    }

    pub async fn list(&self) -> Result<Vec<Plate>, PlateStoreError> {
        let rows: Vec<PlateRow> = sqlx::query_as(&format!(
            "SELECT {PLATE_COLUMNS} FROM plates ORDER BY created_at DESC, id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        rows.into_iter().map(plate_from_row).collect()
    }

    /// User edit path. Patches only the description, guarded by the
    /// optimistic version token; the token is bumped on success.
    pub async fn update_details(
        &self,
        id: Uuid,
        description: Option<&str>,
        version: i64,
    ) -> Result<(), PlateStoreError> {
        let result = sqlx::query(
            "UPDATE plates SET description = ?1, version = version + 1 \
             WHERE id = ?2 AND version = ?3",
        )
        .bind(description)
        .bind(id.to_string())
        .bind(version)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        if result.rows_affected() > 0 {
            return Ok(());
        }
        if self.exists(id).await? {
            Err(PlateStoreError::Conflict)
        } else {
            Err(PlateStoreError::NotFound)
        }
    }

    /// Worker write-back path. Patches only the capture timestamp, so a
    /// concurrent description edit is never overwritten.
    pub async fn apply_capture_time(
        &self,
        id: Uuid,
        captured_at: PrimitiveDateTime,
    ) -> Result<(), PlateStoreError> {
        let result = sqlx::query("UPDATE plates SET created_at = ?1 WHERE id = ?2")
            .bind(captured_at)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(PlateStoreError::NotFound);
        }
        Ok(())
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), PlateStoreError> {
        let result = sqlx::query("DELETE FROM plates WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(PlateStoreError::NotFound);
        }
        Ok(())
    }

    async fn exists(&self, id: Uuid) -> Result<bool, PlateStoreError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM plates WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(row.is_some())
    }
}

fn plate_from_row(row: PlateRow) -> Result<Plate, PlateStoreError> {
    let id = Uuid::parse_str(&row.id).map_err(|err| PlateStoreError::Database(err.to_string()))?;
    Ok(Plate {
        id,
        created_at: row.created_at,
        description: row.description,
        owner: row.owner,
        version: row.version,
    })
}

fn db_error(err: sqlx::Error) -> PlateStoreError {
    PlateStoreError::Database(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{open_pool, run_migrations};
    use time::macros::datetime;

    async fn test_store() -> (PlateStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let pool = open_pool(&dir.path().join("plates.db")).await.unwrap();
        run_migrations(&pool).await.unwrap();
        (PlateStore::new(pool), dir)
    }

    fn sample_plate() -> Plate {
        Plate {
            id: Uuid::new_v4(),
            created_at: datetime!(2024-03-01 12:00:00),
            description: Some("lunch".to_string()),
            owner: "alice".to_string(),
            version: 0,
        }
    }

    #[tokio::test]
    async fn insert_then_get_roundtrip() {
        let (store, _dir) = test_store().await;
        let plate = sample_plate();
        store.insert(&plate).await.unwrap();

        let loaded = store.get(plate.id).await.unwrap();
        assert_eq!(loaded.id, plate.id);
        assert_eq!(loaded.created_at, plate.created_at);
        assert_eq!(loaded.description.as_deref(), Some("lunch"));
        assert_eq!(loaded.owner, "alice");
        assert_eq!(loaded.version, 0);
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let (store, _dir) = test_store().await;
        let result = store.get(Uuid::new_v4()).await;
        assert!(matches!(result, Err(PlateStoreError::NotFound)));
    }

    #[tokio::test]
    async fn stale_version_is_a_conflict() {
        let (store, _dir) = test_store().await;
        let plate = sample_plate();
        store.insert(&plate).await.unwrap();

        store
            .update_details(plate.id, Some("dinner"), 0)
            .await
            .unwrap();
        let updated = store.get(plate.id).await.unwrap();
        assert_eq!(updated.description.as_deref(), Some("dinner"));
        assert_eq!(updated.version, 1);

        let stale = store.update_details(plate.id, Some("late edit"), 0).await;
        assert!(matches!(stale, Err(PlateStoreError::Conflict)));
        let unchanged = store.get(plate.id).await.unwrap();
        assert_eq!(unchanged.description.as_deref(), Some("dinner"));
    }

    #[tokio::test]
    async fn update_details_missing_is_not_found() {
        let (store, _dir) = test_store().await;
        let result = store.update_details(Uuid::new_v4(), None, 0).await;
        assert!(matches!(result, Err(PlateStoreError::NotFound)));
    }

    #[tokio::test]
    async fn apply_capture_time_leaves_other_fields_alone() {
        let (store, _dir) = test_store().await;
        let plate = sample_plate();
        store.insert(&plate).await.unwrap();
        store
            .update_details(plate.id, Some("edited"), 0)
            .await
            .unwrap();

        let captured = datetime!(2021-06-15 10:30:00);
        store.apply_capture_time(plate.id, captured).await.unwrap();

        let loaded = store.get(plate.id).await.unwrap();
        assert_eq!(loaded.created_at, captured);
        assert_eq!(loaded.description.as_deref(), Some("edited"));
        assert_eq!(loaded.version, 1);
    }

    #[tokio::test]
    async fn apply_capture_time_missing_is_not_found() {
        let (store, _dir) = test_store().await;
        let result = store
            .apply_capture_time(Uuid::new_v4(), datetime!(2021-06-15 10:30:00))
            .await;
        assert!(matches!(result, Err(PlateStoreError::NotFound)));
    }

    #[tokio::test]
    async fn list_returns_newest_first() {
        let (store, _dir) = test_store().await;
        let mut older = sample_plate();
        older.created_at = datetime!(2024-03-01 08:00:00);
        let mut newer = sample_plate();
        newer.created_at = datetime!(2024-03-02 08:00:00);
        store.insert(&older).await.unwrap();
        store.insert(&newer).await.unwrap();

        let plates = store.list().await.unwrap();
        assert_eq!(plates.len(), 2);
        assert_eq!(plates[0].id, newer.id);
        assert_eq!(plates[1].id, older.id);
    }

    #[tokio::test]
    async fn delete_removes_the_record() {
        let (store, _dir) = test_store().await;
        let plate = sample_plate();
        store.insert(&plate).await.unwrap();

        store.delete(plate.id).await.unwrap();
        assert!(matches!(
            store.get(plate.id).await,
            Err(PlateStoreError::NotFound)
        ));
        assert!(matches!(
            store.delete(plate.id).await,
            Err(PlateStoreError::NotFound)
        ));
    }
}
