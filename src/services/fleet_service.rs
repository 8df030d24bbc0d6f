//! Fleet management
//!
//! Car records, owner blackout periods and the public availability query.

use chrono::Utc;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::dto::car_dto::{BlockDatesRequest, SaveCarRequest};
use crate::models::booking::DateRange;
use crate::models::car::{BlockedDates, Car};
use crate::repositories::CarRepository;
use crate::services::availability_service::{Availability, AvailabilityService};
use crate::utils::errors::{not_found_error, AppResult};
use crate::utils::validation::validate_query_range;

#[derive(Clone)]
pub struct FleetService {
    cars: CarRepository,
    availability: AvailabilityService,
}

impl FleetService {
    pub fn new(cars: CarRepository, availability: AvailabilityService) -> Self {
        Self { cars, availability }
    }

    /// Create a car, or update it when the id already exists
    pub async fn save_car(&self, request: SaveCarRequest) -> AppResult<Car> {
        request.validate()?;

        let now = Utc::now();
        let existing = match &request.id {
            Some(id) => self.cars.find_by_id(id).await?,
            None => None,
        };

        let car = Car {
            id: request.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            brand: request.brand,
            model: request.model,
            year: request.year,
            daily_rate: request.daily_rate.round_dp(2),
            weekly_rate: request.weekly_rate.map(|rate| rate.round_dp(2)),
            available: request.available,
            show_on_homepage: request.show_on_homepage,
            display_order: request.display_order,
            created_at: existing.as_ref().map_or(now, |car| car.created_at),
            updated_at: now,
        };
        self.cars.save(&car).await?;

        info!(
            "🚗 Car {} {} ({})",
            car.id,
            if existing.is_some() { "updated" } else { "created" },
            car.display_name()
        );
        Ok(car)
    }

    pub async fn get_car(&self, id: &str) -> AppResult<Car> {
        self.cars
            .find_by_id(id)
            .await?
            .ok_or_else(|| not_found_error("Car", id))
    }

    /// Rentable cars in display order
    pub async fn list_cars(&self, homepage_only: bool) -> AppResult<Vec<Car>> {
        let cars = self.cars.list().await?;
        Ok(cars
            .into_iter()
            .filter(|car| car.available)
            .filter(|car| !homepage_only || car.show_on_homepage)
            .collect())
    }

    pub async fn block_dates(&self, car_id: &str, request: BlockDatesRequest) -> AppResult<BlockedDates> {
        request.validate()?;
        validate_query_range(request.start_date, request.end_date)?;
        let car = self.get_car(car_id).await?;

        let block = BlockedDates {
            id: Uuid::new_v4().to_string(),
            range: DateRange::new(request.start_date, request.end_date),
            reason: request.reason,
            created_at: Utc::now(),
        };
        self.cars.add_block(&car.id, &block).await?;

        info!(
            "🚧 Blocked {} from {} to {}",
            car.id, block.range.start_date, block.range.end_date
        );
        Ok(block)
    }

    pub async fn unblock_dates(&self, car_id: &str, block_id: &str) -> AppResult<()> {
        let car = self.get_car(car_id).await?;
        if !self.cars.remove_block(&car.id, block_id).await? {
            return Err(not_found_error("Blocked period", block_id));
        }
        info!("🟢 Removed block {} from {}", block_id, car.id);
        Ok(())
    }

    pub async fn availability(&self, car_id: &str, range: &DateRange) -> AppResult<Availability> {
        validate_query_range(range.start_date, range.end_date)?;
        let car = self.get_car(car_id).await?;
        self.availability.is_available(&car.id, range, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::BookingRepository;
    use crate::store::MemoryStore;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use std::sync::Arc;

    fn service() -> FleetService {
        let store: Arc<dyn crate::store::RecordStore> = Arc::new(MemoryStore::new());
        let cars = CarRepository::new(store.clone());
        let availability = AvailabilityService::new(BookingRepository::new(store), cars.clone());
        FleetService::new(cars, availability)
    }

    fn request(id: &str, order: i32, homepage: bool) -> SaveCarRequest {
        SaveCarRequest {
            id: Some(id.into()),
            brand: "Porsche".into(),
            model: "911".into(),
            year: 2024,
            daily_rate: Decimal::from(800),
            weekly_rate: None,
            available: true,
            show_on_homepage: homepage,
            display_order: order,
        }
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 9, day).unwrap()
    }

    #[tokio::test]
    async fn test_list_orders_and_filters_homepage() {
        let fleet = service();
        fleet.save_car(request("b", 2, true)).await.unwrap();
        fleet.save_car(request("a", 1, false)).await.unwrap();

        let all: Vec<String> = fleet.list_cars(false).await.unwrap().into_iter().map(|c| c.id).collect();
        assert_eq!(all, vec!["a", "b"]);

        let homepage = fleet.list_cars(true).await.unwrap();
        assert_eq!(homepage.len(), 1);
        assert_eq!(homepage[0].id, "b");
    }

    #[tokio::test]
    async fn test_block_and_unblock() {
        let fleet = service();
        fleet.save_car(request("a", 1, false)).await.unwrap();

        let block = fleet
            .block_dates(
                "a",
                BlockDatesRequest {
                    start_date: d(10),
                    end_date: d(12),
                    reason: Some("detailing".into()),
                },
            )
            .await
            .unwrap();

        let result = fleet.availability("a", &DateRange::new(d(11), d(13))).await.unwrap();
        assert!(!result.available);
        assert_eq!(result.conflicts.custom_blocks.len(), 1);

        fleet.unblock_dates("a", &block.id).await.unwrap();
        assert!(fleet.availability("a", &DateRange::new(d(11), d(13))).await.unwrap().available);
        assert!(fleet.unblock_dates("a", &block.id).await.is_err());
    }
}
