use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;

use crate::models::promo::PromoCode;
use crate::store::{get_json, get_snapshot, keys, replace_json, set_json, RecordStore};
use crate::utils::errors::{AppError, AppResult};

const MAX_REDEEM_ATTEMPTS: usize = 5;

#[derive(Clone)]
pub struct PromoRepository {
    store: Arc<dyn RecordStore>,
}

impl PromoRepository {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn save(&self, promo: &PromoCode) -> AppResult<()> {
        let code = promo.code.to_uppercase();
        set_json(self.store.as_ref(), &keys::promo(&code), promo).await?;
        self.store.set_add(keys::PROMOS, &code).await?;
        Ok(())
    }

    pub async fn find(&self, code: &str) -> AppResult<Option<PromoCode>> {
        Ok(get_json(self.store.as_ref(), &keys::promo(code)).await?)
    }

    pub async fn list(&self) -> AppResult<Vec<PromoCode>> {
        let mut promos = Vec::new();
        for code in self.store.set_members(keys::PROMOS).await? {
            if let Some(promo) = self.find(&code).await? {
                promos.push(promo);
            }
        }
        promos.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(promos)
    }

    /// Count one redemption. Fails if the code stopped being redeemable
    /// since it was checked.
    pub async fn redeem(&self, code: &str, discount: Decimal) -> AppResult<PromoCode> {
        let key = keys::promo(code);

        for _ in 0..MAX_REDEEM_ATTEMPTS {
            let snapshot = get_snapshot::<PromoCode>(self.store.as_ref(), &key)
                .await?
                .ok_or_else(|| AppError::BadRequest(format!("promo code {} does not exist", code)))?;

            let mut promo = snapshot.record;
            if let Some(reason) = promo.redemption_blocker(Utc::now()) {
                return Err(AppError::BadRequest(reason.to_string()));
            }
            promo.times_redeemed += 1;
            promo.total_discounted += discount;

            if replace_json(self.store.as_ref(), &key, &snapshot.raw, &promo).await? {
                return Ok(promo);
            }
        }

        Err(AppError::Conflict(format!("promo code {} is busy, retry", code)))
    }

    /// Undo one redemption whose booking was never stored
    pub async fn release(&self, code: &str, discount: Decimal) -> AppResult<()> {
        let key = keys::promo(code);

        for _ in 0..MAX_REDEEM_ATTEMPTS {
            let Some(snapshot) = get_snapshot::<PromoCode>(self.store.as_ref(), &key).await? else {
                return Ok(());
            };

            let mut promo = snapshot.record;
            promo.times_redeemed = promo.times_redeemed.saturating_sub(1);
            promo.total_discounted = (promo.total_discounted - discount).max(Decimal::ZERO);

            if replace_json(self.store.as_ref(), &key, &snapshot.raw, &promo).await? {
                return Ok(());
            }
        }

        Err(AppError::Conflict(format!("promo code {} is busy, retry", code)))
    }
}
