//! Residence place reference data

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::Pool;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResidencePlaceRecord {
    pub id: i64,
    pub name: String,
    pub country: String,
}

pub struct ResidencePlacesRepository {
    pool: Pool,
}

impl ResidencePlacesRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<ResidencePlaceRecord>> {
        let row = sqlx::query_as::<_, (i64, String, String)>(
            "SELECT id, name, country FROM residence_places WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| ResidencePlaceRecord {
            id: r.0,
            name: r.1,
            country: r.2,
        }))
    }

    pub async fn list_all(&self) -> Result<Vec<ResidencePlaceRecord>> {
        let rows = sqlx::query_as::<_, (i64, String, String)>(
            "SELECT id, name, country FROM residence_places ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| ResidencePlaceRecord {
                id: r.0,
                name: r.1,
                country: r.2,
            })
            .collect())
    }
}
