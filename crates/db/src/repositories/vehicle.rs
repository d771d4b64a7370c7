use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::info;

use workshop_core::domain::customer::CustomerId;
use workshop_core::domain::vehicle::{Vehicle, VehicleDraft, VehicleId};
use workshop_core::errors::DomainError;

use super::{
    decode_err, get_timestamp, get_u32, like_pattern, timestamp, Page, PageRequest, RepositoryError,
};
use crate::DbPool;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VehicleFilter {
    pub owner: Option<CustomerId>,
    /// Matches plate, VIN, brand or model.
    pub search: Option<String>,
}

#[derive(Clone)]
pub struct SqlVehicleRepository {
    pool: DbPool,
}

const COLUMNS: &str =
    "id, owner_id, plate, vin, brand, model, year, color, mileage_km, created_at, updated_at";

fn row_to_vehicle(row: &SqliteRow) -> Result<Vehicle, RepositoryError> {
    Ok(Vehicle {
        id: VehicleId(row.try_get("id").map_err(decode_err)?),
        owner: CustomerId(row.try_get("owner_id").map_err(decode_err)?),
        plate: row.try_get("plate").map_err(decode_err)?,
        vin: row.try_get("vin").map_err(decode_err)?,
        brand: row.try_get("brand").map_err(decode_err)?,
        model: row.try_get("model").map_err(decode_err)?,
        year: get_u32(row, "year")?,
        color: row.try_get("color").map_err(decode_err)?,
        mileage_km: get_u32(row, "mileage_km")?,
        created_at: get_timestamp(row, "created_at")?,
        updated_at: get_timestamp(row, "updated_at")?,
    })
}

fn push_filters(builder: &mut QueryBuilder<'_, Sqlite>, filter: &VehicleFilter) {
    builder.push(" WHERE 1=1");
    if let Some(owner) = filter.owner {
        builder.push(" AND owner_id = ");
        builder.push_bind(owner.0);
    }
    if let Some(term) = filter.search.as_deref().filter(|term| !term.trim().is_empty()) {
        let pattern = like_pattern(term);
        builder.push(" AND (");
        let mut separated = builder.separated(" OR ");
        for column in ["plate", "vin", "brand", "model"] {
            separated.push(format!("{column} LIKE "));
            separated.push_bind_unseparated(pattern.clone());
            separated.push_unseparated(" ESCAPE '\\'");
        }
        builder.push(")");
    }
}

impl SqlVehicleRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn list(
        &self,
        filter: &VehicleFilter,
        page: PageRequest,
    ) -> Result<Page<Vehicle>, RepositoryError> {
        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM vehicle");
        push_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Sqlite>::new(format!("SELECT {COLUMNS} FROM vehicle"));
        push_filters(&mut select, filter);
        select.push(" ORDER BY plate ASC LIMIT ");
        select.push_bind(page.limit());
        select.push(" OFFSET ");
        select.push_bind(page.offset());
        let rows = select.build().fetch_all(&self.pool).await?;

        Ok(Page {
            count: total,
            page: page.page,
            page_size: page.page_size,
            results: rows.iter().map(row_to_vehicle).collect::<Result<Vec<_>, _>>()?,
        })
    }

    pub async fn find_by_id(&self, id: VehicleId) -> Result<Option<Vehicle>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM vehicle WHERE id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_vehicle).transpose()
    }

    pub async fn get(&self, id: VehicleId) -> Result<Vehicle, RepositoryError> {
        self.find_by_id(id).await?.ok_or_else(|| RepositoryError::not_found("vehicle", id.0))
    }

    pub async fn create(&self, draft: VehicleDraft) -> Result<Vehicle, RepositoryError> {
        let draft = draft.normalize();
        draft.validate()?;
        self.ensure_owner_exists(draft.owner).await?;
        let now = timestamp(Utc::now());

        let result = sqlx::query(
            "INSERT INTO vehicle (owner_id, plate, vin, brand, model, year, color, mileage_km,
                                  created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(draft.owner.0)
        .bind(&draft.plate)
        .bind(&draft.vin)
        .bind(draft.brand.trim())
        .bind(draft.model.trim())
        .bind(i64::from(draft.year))
        .bind(&draft.color)
        .bind(i64::from(draft.mileage_km))
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::classify)?;

        let id = VehicleId(result.last_insert_rowid());
        info!(event_name = "vehicle.created", vehicle_id = id.0, plate = %draft.plate, "vehicle created");
        self.get(id).await
    }

    pub async fn update(&self, id: VehicleId, draft: VehicleDraft) -> Result<Vehicle, RepositoryError> {
        let draft = draft.normalize();
        draft.validate()?;
        self.ensure_owner_exists(draft.owner).await?;

        let result = sqlx::query(
            "UPDATE vehicle SET owner_id = ?, plate = ?, vin = ?, brand = ?, model = ?, year = ?,
                                color = ?, mileage_km = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(draft.owner.0)
        .bind(&draft.plate)
        .bind(&draft.vin)
        .bind(draft.brand.trim())
        .bind(draft.model.trim())
        .bind(i64::from(draft.year))
        .bind(&draft.color)
        .bind(i64::from(draft.mileage_km))
        .bind(timestamp(Utc::now()))
        .bind(id.0)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::classify)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("vehicle", id.0));
        }
        self.get(id).await
    }

    pub async fn delete(&self, id: VehicleId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM vehicle WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(RepositoryError::classify_delete)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("vehicle", id.0));
        }
        info!(event_name = "vehicle.deleted", vehicle_id = id.0, "vehicle deleted");
        Ok(())
    }

    async fn ensure_owner_exists(&self, owner: CustomerId) -> Result<(), RepositoryError> {
        let found: Option<i64> = sqlx::query_scalar("SELECT id FROM customer WHERE id = ?")
            .bind(owner.0)
            .fetch_optional(&self.pool)
            .await?;
        if found.is_none() {
            return Err(DomainError::validation(
                "owner",
                format!("invalid pk \"{}\" - object does not exist", owner.0),
            )
            .into());
        }
        Ok(())
    }
}
