use std::sync::Arc;

use tracing::debug;

use crate::models::car::{BlockedDates, Car};
use crate::store::{get_json, keys, set_json, RecordStore};
use crate::utils::errors::AppResult;

/// Cars and their owner-entered blackout periods.
///
/// Blackouts live in a per-car set whose members are the JSON documents
/// themselves, so adding one never races with another admin edit.
#[derive(Clone)]
pub struct CarRepository {
    store: Arc<dyn RecordStore>,
}

impl CarRepository {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn save(&self, car: &Car) -> AppResult<()> {
        set_json(self.store.as_ref(), &keys::car(&car.id), car).await?;
        self.store.set_add(keys::CARS, &car.id).await?;
        debug!("💾 Car {} saved", car.id);
        Ok(())
    }

    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<Car>> {
        Ok(get_json(self.store.as_ref(), &keys::car(id)).await?)
    }

    pub async fn list(&self) -> AppResult<Vec<Car>> {
        let mut cars = Vec::new();
        for id in self.store.set_members(keys::CARS).await? {
            if let Some(car) = self.find_by_id(&id).await? {
                cars.push(car);
            }
        }
        cars.sort_by(|a, b| a.display_order.cmp(&b.display_order).then_with(|| a.id.cmp(&b.id)));
        Ok(cars)
    }

    pub async fn add_block(&self, car_id: &str, block: &BlockedDates) -> AppResult<()> {
        let raw = serde_json::to_string(block).map_err(crate::store::StoreError::from)?;
        self.store.set_add(&keys::car_blocks(car_id), &raw).await?;
        Ok(())
    }

    /// Returns `false` when no block with that id exists
    pub async fn remove_block(&self, car_id: &str, block_id: &str) -> AppResult<bool> {
        let key = keys::car_blocks(car_id);
        for raw in self.store.set_members(&key).await? {
            let block: BlockedDates = serde_json::from_str(&raw).map_err(crate::store::StoreError::from)?;
            if block.id == block_id {
                self.store.set_remove(&key, &raw).await?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub async fn blocks_for(&self, car_id: &str) -> AppResult<Vec<BlockedDates>> {
        let mut blocks = Vec::new();
        for raw in self.store.set_members(&keys::car_blocks(car_id)).await? {
            let block: BlockedDates = serde_json::from_str(&raw).map_err(crate::store::StoreError::from)?;
            blocks.push(block);
        }
        blocks.sort_by_key(|b| b.range.start_date);
        Ok(blocks)
    }
}
