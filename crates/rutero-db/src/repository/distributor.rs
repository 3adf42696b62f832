//! # Distributor Repository
//!
//! Database operations for the distributor registry.
//!
//! Distributors are slowly-changing rows: created once per registered
//! identity owner, after which only the last-known coordinates move (sign-in
//! events, delivery completions). The assignment engine reads them through
//! [`DistributorRepository::list_with_coordinates`], which returns rows in
//! ascending-id order so nearest-match ties always break the same way.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use rutero_core::Distributor;

const DISTRIBUTOR_COLUMNS: &str =
    "id, name, contact, vehicle, capacity, latitude, longitude, owner_id, created_at";

// =============================================================================
// New Distributor
// =============================================================================

/// Input for inserting a distributor.
#[derive(Debug, Clone)]
pub struct NewDistributor {
    pub name: String,
    pub contact: String,
    pub vehicle: String,
    pub capacity: i64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Identity owner this distributor belongs to, when created from a
    /// registration event.
    pub owner_id: Option<String>,
}

// =============================================================================
// Distributor Repository
// =============================================================================

/// Repository for distributor database operations.
#[derive(Debug, Clone)]
pub struct DistributorRepository {
    pool: SqlitePool,
}

impl DistributorRepository {
    /// Creates a new DistributorRepository.
    pub fn new(pool: SqlitePool) -> Self {
        DistributorRepository { pool }
    }

    /// Gets a distributor by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Distributor>> {
        let distributor = sqlx::query_as::<_, Distributor>(&format!(
            "SELECT {DISTRIBUTOR_COLUMNS} FROM distributors WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(distributor)
    }

    /// Gets the distributor linked to an identity owner.
    pub async fn get_by_owner(&self, owner_id: &str) -> DbResult<Option<Distributor>> {
        let distributor = sqlx::query_as::<_, Distributor>(&format!(
            "SELECT {DISTRIBUTOR_COLUMNS} FROM distributors WHERE owner_id = ?"
        ))
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(distributor)
    }

    /// Inserts a distributor and returns the stored row.
    pub async fn insert(&self, new: NewDistributor) -> DbResult<Distributor> {
        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now();

        debug!(id = %id, name = %new.name, "Inserting distributor");

        sqlx::query(
            r#"
            INSERT INTO distributors (
                id, name, contact, vehicle, capacity, latitude, longitude,
                owner_id, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&new.name)
        .bind(&new.contact)
        .bind(&new.vehicle)
        .bind(new.capacity)
        .bind(new.latitude)
        .bind(new.longitude)
        .bind(&new.owner_id)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(Distributor {
            id,
            name: new.name,
            contact: new.contact,
            vehicle: new.vehicle,
            capacity: new.capacity,
            latitude: new.latitude,
            longitude: new.longitude,
            owner_id: new.owner_id,
            created_at,
        })
    }

    /// All distributors.
    pub async fn list_all(&self) -> DbResult<Vec<Distributor>> {
        let distributors = sqlx::query_as::<_, Distributor>(&format!(
            "SELECT {DISTRIBUTOR_COLUMNS} FROM distributors ORDER BY id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(distributors)
    }

    /// Distributors whose last-known position is on record, in ascending-id
    /// order. The deterministic ordering is what makes nearest-match ties
    /// reproducible: the first minimal-distance row wins.
    pub async fn list_with_coordinates(&self) -> DbResult<Vec<Distributor>> {
        let distributors = sqlx::query_as::<_, Distributor>(&format!(
            "SELECT {DISTRIBUTOR_COLUMNS} FROM distributors \
             WHERE latitude IS NOT NULL AND longitude IS NOT NULL \
             ORDER BY id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(distributors)
    }

    /// Updates a distributor's last-known coordinates.
    ///
    /// Returns `false` when the distributor doesn't exist.
    pub async fn update_coordinates(&self, id: &str, lat: f64, lon: f64) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE distributors SET latitude = ?, longitude = ? WHERE id = ?",
        )
        .bind(lat)
        .bind(lon)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Exact-name search.
    pub async fn search_by_name(&self, name: &str) -> DbResult<Vec<Distributor>> {
        let distributors = sqlx::query_as::<_, Distributor>(&format!(
            "SELECT {DISTRIBUTOR_COLUMNS} FROM distributors WHERE name = ? ORDER BY id ASC"
        ))
        .bind(name)
        .fetch_all(&self.pool)
        .await?;

        Ok(distributors)
    }

    /// Distributors whose nominal capacity is at least `min`.
    pub async fn list_with_min_capacity(&self, min: i64) -> DbResult<Vec<Distributor>> {
        let distributors = sqlx::query_as::<_, Distributor>(&format!(
            "SELECT {DISTRIBUTOR_COLUMNS} FROM distributors WHERE capacity >= ? ORDER BY id ASC"
        ))
        .bind(min)
        .fetch_all(&self.pool)
        .await?;

        Ok(distributors)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn distributor_input(name: &str, coords: Option<(f64, f64)>) -> NewDistributor {
        NewDistributor {
            name: name.to_string(),
            contact: "777-00000".to_string(),
            vehicle: "moto".to_string(),
            capacity: 10,
            latitude: coords.map(|c| c.0),
            longitude: coords.map(|c| c.1),
            owner_id: None,
        }
    }

    #[tokio::test]
    async fn test_list_with_coordinates_excludes_unknown_positions() {
        let db = test_db().await;
        let repo = db.distributors();

        repo.insert(distributor_input("Carlos", Some((-17.79, -63.19))))
            .await
            .unwrap();
        repo.insert(distributor_input("Lucia", None)).await.unwrap();

        let with_coords = repo.list_with_coordinates().await.unwrap();
        assert_eq!(with_coords.len(), 1);
        assert_eq!(with_coords[0].name, "Carlos");
        assert!(with_coords[0].position().is_some());

        assert_eq!(repo.list_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_update_coordinates() {
        let db = test_db().await;
        let repo = db.distributors();

        let dist = repo
            .insert(distributor_input("Carlos", None))
            .await
            .unwrap();
        assert!(dist.position().is_none());

        assert!(repo.update_coordinates(&dist.id, -17.8, -63.2).await.unwrap());
        let reloaded = repo.get_by_id(&dist.id).await.unwrap().unwrap();
        assert_eq!(reloaded.latitude, Some(-17.8));

        assert!(!repo.update_coordinates("missing", 0.0, 0.0).await.unwrap());
    }

    #[tokio::test]
    async fn test_owner_lookup_and_uniqueness() {
        let db = test_db().await;
        let repo = db.distributors();

        let mut input = distributor_input("Carlos", None);
        input.owner_id = Some("user-1".to_string());
        repo.insert(input.clone()).await.unwrap();

        let found = repo.get_by_owner("user-1").await.unwrap();
        assert!(found.is_some());

        // A second distributor for the same owner violates the unique index.
        input.name = "Carlos II".to_string();
        assert!(repo.insert(input).await.is_err());
    }

    #[tokio::test]
    async fn test_capacity_filter() {
        let db = test_db().await;
        let repo = db.distributors();

        let mut small = distributor_input("Moto", None);
        small.capacity = 5;
        repo.insert(small).await.unwrap();

        let mut big = distributor_input("Camion", None);
        big.capacity = 50;
        repo.insert(big).await.unwrap();

        let heavy = repo.list_with_min_capacity(20).await.unwrap();
        assert_eq!(heavy.len(), 1);
        assert_eq!(heavy[0].name, "Camion");
    }
}
