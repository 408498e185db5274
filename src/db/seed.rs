//! Pre-seed data for initial database setup.
//!
//! Runs after migrations to insert residence place reference rows. Uses
//! INSERT OR IGNORE so re-runs are idempotent (existing rows are preserved).

use sqlx::SqlitePool;
use tracing::{info, warn};

/// Result of running seed operations.
#[derive(Debug, Default)]
pub struct SeedResult {
    pub tables_seeded: Vec<String>,
    pub errors: Vec<String>,
}

/// Seed default residence places users can point their profiles at.
async fn seed_residence_places(pool: &SqlitePool) -> Result<u64, sqlx::Error> {
    struct PlaceRow {
        name: &'static str,
        country: &'static str,
    }

    let rows: &[PlaceRow] = &[
        PlaceRow { name: "Amsterdam", country: "Netherlands" },
        PlaceRow { name: "Barcelona", country: "Spain" },
        PlaceRow { name: "Berlin", country: "Germany" },
        PlaceRow { name: "Chicago", country: "United States" },
        PlaceRow { name: "Kyiv", country: "Ukraine" },
        PlaceRow { name: "Lisbon", country: "Portugal" },
        PlaceRow { name: "London", country: "United Kingdom" },
        PlaceRow { name: "Melbourne", country: "Australia" },
        PlaceRow { name: "New York", country: "United States" },
        PlaceRow { name: "Oslo", country: "Norway" },
        PlaceRow { name: "Paris", country: "France" },
        PlaceRow { name: "Prague", country: "Czechia" },
        PlaceRow { name: "Tokyo", country: "Japan" },
        PlaceRow { name: "Toronto", country: "Canada" },
        PlaceRow { name: "Warsaw", country: "Poland" },
    ];

    let mut inserted = 0;
    for row in rows {
        let result =
            sqlx::query("INSERT OR IGNORE INTO residence_places (name, country) VALUES (?, ?)")
                .bind(row.name)
                .bind(row.country)
                .execute(pool)
                .await?;
        inserted += result.rows_affected();
    }
    Ok(inserted)
}

/// Run all seed operations. Safe to call on every startup.
pub async fn run_seeds(pool: &SqlitePool) -> SeedResult {
    let mut result = SeedResult::default();

    match seed_residence_places(pool).await {
        Ok(inserted) => {
            if inserted > 0 {
                info!("Seeded {} residence places", inserted);
            }
            result.tables_seeded.push("residence_places".to_string());
        }
        Err(e) => {
            let msg = format!("Failed to seed residence_places: {}", e);
            warn!("{}", msg);
            result.errors.push(msg);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn seeding_is_idempotent() {
        let db = test_pool().await;

        let first = run_seeds(db.pool()).await;
        assert!(first.errors.is_empty());
        let count = db.residence_places().list_all().await.unwrap().len();
        assert!(count > 0);

        let second = run_seeds(db.pool()).await;
        assert!(second.errors.is_empty());
        assert_eq!(db.residence_places().list_all().await.unwrap().len(), count);
    }
}
