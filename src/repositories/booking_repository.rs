use std::sync::Arc;

use futures::future::try_join_all;
use tracing::{debug, warn};

use crate::models::booking::{Booking, BookingStatus};
use crate::store::{get_json, get_snapshot, keys, replace_json, set_json, RecordStore, Snapshot};
use crate::utils::errors::{not_found_error, AppError, AppResult};

/// Attempts made by [`BookingRepository::update`] before giving up on a
/// record that keeps changing underneath it
const MAX_WRITE_ATTEMPTS: usize = 3;

/// Filters for admin listings
#[derive(Debug, Clone, Default)]
pub struct BookingFilter {
    pub status: Option<BookingStatus>,
    pub car_id: Option<String>,
}

/// Booking records plus the `bookings`, `car:{id}:bookings` and
/// `bookings:status:{status}` index sets.
#[derive(Clone)]
pub struct BookingRepository {
    store: Arc<dyn RecordStore>,
}

impl BookingRepository {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn create(&self, booking: &Booking) -> AppResult<()> {
        set_json(self.store.as_ref(), &keys::booking(&booking.id), booking).await?;
        self.store.set_add(keys::BOOKINGS, &booking.id).await?;
        self.store.set_add(&keys::car_bookings(&booking.car_id), &booking.id).await?;
        self.store
            .set_add(&keys::bookings_by_status(booking.status), &booking.id)
            .await?;
        debug!("💾 Booking {} stored ({})", booking.id, booking.status);
        Ok(())
    }

    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<Booking>> {
        Ok(get_json(self.store.as_ref(), &keys::booking(id)).await?)
    }

    pub async fn get(&self, id: &str) -> AppResult<Booking> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| not_found_error("Booking", id))
    }

    pub async fn snapshot(&self, id: &str) -> AppResult<Snapshot<Booking>> {
        get_snapshot(self.store.as_ref(), &keys::booking(id))
            .await?
            .ok_or_else(|| not_found_error("Booking", id))
    }

    /// Read-modify-write with an optimistic check on the stored bytes.
    ///
    /// `mutate` runs against a fresh copy on every attempt so its guards see
    /// the latest state; it returns `Ok(false)` when there is nothing to
    /// write. Returns the booking as stored after the call.
    pub async fn update<F>(&self, id: &str, mut mutate: F) -> AppResult<Booking>
    where
        F: FnMut(&mut Booking) -> AppResult<bool> + Send,
    {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let snapshot = self.snapshot(id).await?;
            let mut booking = snapshot.record.clone();

            if !mutate(&mut booking)? {
                return Ok(snapshot.record);
            }

            let key = keys::booking(id);
            if replace_json(self.store.as_ref(), &key, &snapshot.raw, &booking).await? {
                self.reindex_status(&booking.id, snapshot.record.status, booking.status)
                    .await?;
                return Ok(booking);
            }

            warn!("⚠️ Booking {} changed during update (attempt {})", id, attempt);
        }

        Err(AppError::Conflict(format!(
            "booking {} was modified concurrently, retry the operation",
            id
        )))
    }

    async fn reindex_status(&self, id: &str, before: BookingStatus, after: BookingStatus) -> AppResult<()> {
        if before != after {
            self.store.set_remove(&keys::bookings_by_status(before), id).await?;
            self.store.set_add(&keys::bookings_by_status(after), id).await?;
        }
        Ok(())
    }

    pub async fn for_car(&self, car_id: &str) -> AppResult<Vec<Booking>> {
        let ids = self.store.set_members(&keys::car_bookings(car_id)).await?;
        self.load_all(ids).await
    }

    /// Newest first
    pub async fn list(&self, filter: &BookingFilter) -> AppResult<Vec<Booking>> {
        let ids = match (&filter.car_id, filter.status) {
            (Some(car_id), _) => self.store.set_members(&keys::car_bookings(car_id)).await?,
            (None, Some(status)) => self.store.set_members(&keys::bookings_by_status(status)).await?,
            (None, None) => self.store.set_members(keys::BOOKINGS).await?,
        };

        let mut bookings = self.load_all(ids).await?;
        if let Some(status) = filter.status {
            bookings.retain(|b| b.status == status);
        }
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(bookings)
    }

    async fn load_all(&self, ids: Vec<String>) -> AppResult<Vec<Booking>> {
        let loaded = try_join_all(ids.iter().map(|id| self.find_by_id(id))).await?;

        let mut bookings = Vec::with_capacity(loaded.len());
        for (id, booking) in ids.iter().zip(loaded) {
            match booking {
                Some(booking) => bookings.push(booking),
                None => warn!("⚠️ Index references missing booking {}", id),
            }
        }
        Ok(bookings)
    }
}
