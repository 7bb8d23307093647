use chrono::Utc;
use sqlx::Row;

use tendero_core::domain::product::{Product, ProductId};

use super::{
    decode_error, matches_any_term, parse_decimal, timestamp_to_text, CatalogRepository,
    RepositoryError,
};
use crate::DbPool;

pub struct SqlCatalogRepository {
    pool: DbPool,
}

impl SqlCatalogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const PRODUCT_COLUMNS: &str = "id, name, description, price, stock, category, active";

fn row_to_product(row: &sqlx::sqlite::SqliteRow) -> Result<Product, RepositoryError> {
    let id: i64 = row.try_get("id").map_err(decode_error)?;
    let name: String = row.try_get("name").map_err(decode_error)?;
    let description: String = row.try_get("description").map_err(decode_error)?;
    let price: String = row.try_get("price").map_err(decode_error)?;
    let stock: i64 = row.try_get("stock").map_err(decode_error)?;
    let category: Option<String> = row.try_get("category").map_err(decode_error)?;
    let active: bool = row.try_get("active").map_err(decode_error)?;

    Ok(Product {
        id: ProductId(id),
        name,
        description,
        price: parse_decimal(&price)?,
        stock,
        category,
        active,
    })
}

#[async_trait::async_trait]
impl CatalogRepository for SqlCatalogRepository {
    async fn list_active_products(&self) -> Result<Vec<Product>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM product WHERE active = 1 ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_product).collect()
    }

    async fn find_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM product WHERE id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_product).transpose()
    }

    async fn search_by_terms(
        &self,
        terms: &[String],
        limit: usize,
    ) -> Result<Vec<Product>, RepositoryError> {
        if terms.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        // Accent folding happens in Rust; SQLite's LIKE only folds ASCII case.
        let products = self.list_active_products().await?;
        Ok(products
            .into_iter()
            .filter(|product| matches_any_term(product, terms))
            .take(limit)
            .collect())
    }

    async fn save(&self, product: Product) -> Result<(), RepositoryError> {
        let now = timestamp_to_text(&Utc::now());
        sqlx::query(
            "INSERT INTO product
                (id, name, description, price, stock, category, active, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                price = excluded.price,
                stock = excluded.stock,
                category = excluded.category,
                active = excluded.active,
                updated_at = excluded.updated_at",
        )
        .bind(product.id.0)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price.to_string())
        .bind(product.stock)
        .bind(&product.category)
        .bind(product.active)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
