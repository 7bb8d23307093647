use rust_decimal::Decimal;
use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::{parse_decimal, RepositoryError};

/// Products the demo catalog must contain after loading, in id order.
const DEMO_PRODUCTS: &[DemoProductContract] = &[
    DemoProductContract { id: 1, name: "Fire Extinguisher ABC 10 lb", price: 85_000, active: true },
    DemoProductContract { id: 2, name: "Fire Extinguisher ABC 20 lb", price: 140_000, active: true },
    DemoProductContract { id: 3, name: "Fire Extinguisher CO2 5 lb", price: 160_000, active: true },
    DemoProductContract { id: 4, name: "Safety Helmet White", price: 45_000, active: true },
    DemoProductContract { id: 5, name: "Safety Helmet Yellow", price: 45_000, active: true },
    DemoProductContract { id: 6, name: "Nitrile Gloves", price: 12_000, active: true },
    DemoProductContract { id: 7, name: "Safety Goggles Clear", price: 18_500, active: true },
    DemoProductContract { id: 8, name: "Reflective Vest Orange", price: 22_000, active: true },
    DemoProductContract { id: 9, name: "First Aid Kit Basic", price: 60_000, active: true },
    DemoProductContract { id: 10, name: "Emergency Exit Sign", price: 15_000, active: true },
    DemoProductContract { id: 11, name: "Traffic Cone Orange", price: 38_000, active: true },
    DemoProductContract { id: 12, name: "Respirator Half Mask", price: 95_000, active: false },
];

/// Deterministic safety-store catalog for local runs, demos and integration tests.
pub struct DemoCatalog;

impl DemoCatalog {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_catalog.sql");

    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        tracing::info!(
            event_name = "fixtures.demo_catalog.loaded",
            products = DEMO_PRODUCTS.len(),
            "demo catalog loaded"
        );

        Ok(SeedResult {
            products_seeded: DEMO_PRODUCTS.len(),
            active_products: DEMO_PRODUCTS.iter().filter(|product| product.active).count(),
        })
    }

    /// Checks that every demo product exists with its expected name, price and active flag.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::with_capacity(DEMO_PRODUCTS.len());

        for contract in DEMO_PRODUCTS {
            let row = sqlx::query_as::<_, (String, String, bool)>(
                "SELECT name, price, active FROM product WHERE id = ?1",
            )
            .bind(contract.id)
            .fetch_optional(pool)
            .await?;

            let matches = match row {
                Some((name, price, active)) => {
                    name == contract.name
                        && parse_decimal(&price)? == Decimal::from(contract.price)
                        && active == contract.active
                }
                None => false,
            };
            checks.push((contract.name, matches));
        }

        let all_present = checks.iter().all(|(_, present)| *present);
        Ok(VerificationResult { all_present, checks })
    }

    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let ids = DEMO_PRODUCTS.iter().map(|product| product.id.to_string()).collect::<Vec<_>>();
        sqlx::query(&format!("DELETE FROM product WHERE id IN ({})", ids.join(",")))
            .execute(pool)
            .await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct DemoProductContract {
    id: i64,
    name: &'static str,
    price: i64,
    active: bool,
}

#[derive(Debug)]
pub struct SeedResult {
    pub products_seeded: usize,
    pub active_products: usize,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
