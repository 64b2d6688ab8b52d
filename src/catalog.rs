// src/catalog.rs
//! Car catalog: an opaque datastore of makes and models, seeded lazily on first read.

use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarMake {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BodyType {
    Sedan,
    Suv,
    Wagon,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarModel {
    pub name: String,
    /// Name of the owning `CarMake`.
    pub make: String,
    pub body_type: BodyType,
    pub year: u16,
}

/// Flattened row returned to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CarListing {
    #[serde(rename = "CarModel")]
    pub model: String,
    #[serde(rename = "CarMake")]
    pub make: String,
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn count_makes(&self) -> usize;
    async fn bulk_insert(&self, makes: Vec<CarMake>, models: Vec<CarModel>);
    async fn models(&self) -> Vec<CarModel>;
}

#[derive(Default)]
pub struct InMemoryCatalogStore {
    rows: RwLock<(Vec<CarMake>, Vec<CarModel>)>,
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn count_makes(&self) -> usize {
        self.rows.read().await.0.len()
    }

    async fn bulk_insert(&self, makes: Vec<CarMake>, models: Vec<CarModel>) {
        let mut rows = self.rows.write().await;
        rows.0.extend(makes);
        rows.1.extend(models);
    }

    async fn models(&self) -> Vec<CarModel> {
        self.rows.read().await.1.clone()
    }
}

const SEED: &[(&str, &str, &[(&str, BodyType, u16)])] = &[
    (
        "NISSAN",
        "Great cars. Japanese technology",
        &[
            ("Pathfinder", BodyType::Suv, 2023),
            ("Qashqai", BodyType::Suv, 2023),
            ("XTRAIL", BodyType::Suv, 2023),
        ],
    ),
    (
        "Mercedes",
        "Great cars. German technology",
        &[
            ("A-Class", BodyType::Suv, 2023),
            ("C-Class", BodyType::Suv, 2023),
            ("E-Class", BodyType::Suv, 2023),
        ],
    ),
    (
        "Audi",
        "Great cars. German technology",
        &[
            ("A4", BodyType::Suv, 2023),
            ("A5", BodyType::Suv, 2023),
            ("A6", BodyType::Suv, 2023),
        ],
    ),
    (
        "Kia",
        "Great cars. Korean technology",
        &[
            ("Sorrento", BodyType::Suv, 2023),
            ("Carnival", BodyType::Suv, 2023),
            ("Cerato", BodyType::Sedan, 2023),
        ],
    ),
    (
        "Toyota",
        "Great cars. Japanese technology",
        &[
            ("Corolla", BodyType::Sedan, 2023),
            ("Camry", BodyType::Sedan, 2023),
            ("Kluger", BodyType::Suv, 2023),
        ],
    ),
];

pub fn seed_rows() -> (Vec<CarMake>, Vec<CarModel>) {
    let mut makes = Vec::with_capacity(SEED.len());
    let mut models = Vec::new();
    for (make, description, rows) in SEED {
        makes.push(CarMake {
            name: make.to_string(),
            description: description.to_string(),
        });
        models.extend(rows.iter().map(|(name, body_type, year)| CarModel {
            name: name.to_string(),
            make: make.to_string(),
            body_type: *body_type,
            year: *year,
        }));
    }
    (makes, models)
}

pub struct CarCatalog {
    store: Arc<dyn CatalogStore>,
    seed_lock: Mutex<()>,
}

impl CarCatalog {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self {
            store,
            seed_lock: Mutex::new(()),
        }
    }

    /// Seeds the store if it has no makes. Serialized, so concurrent first
    /// callers seed at most once. Returns whether this call seeded.
    pub async fn ensure_seeded(&self) -> bool {
        let _guard = self.seed_lock.lock().await;
        if self.store.count_makes().await > 0 {
            return false;
        }
        let (makes, models) = seed_rows();
        info!(makes = makes.len(), models = models.len(), "seeding empty car catalog");
        self.store.bulk_insert(makes, models).await;
        counter!("catalog_seed_total").increment(1);
        true
    }

    pub async fn list_cars(&self) -> Vec<CarListing> {
        self.ensure_seeded().await;
        self.store
            .models()
            .await
            .into_iter()
            .map(|m| CarListing {
                model: m.name,
                make: m.make,
            })
            .collect()
    }
}
