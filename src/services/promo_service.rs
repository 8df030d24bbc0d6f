//! Promo code administration

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::info;
use validator::Validate;

use crate::dto::promo_dto::SavePromoRequest;
use crate::models::promo::PromoCode;
use crate::repositories::PromoRepository;
use crate::utils::errors::{validation_error, AppResult};

#[derive(Clone)]
pub struct PromoService {
    promos: PromoRepository,
}

impl PromoService {
    pub fn new(promos: PromoRepository) -> Self {
        Self { promos }
    }

    /// Create or replace a code. Redemption stats survive updates.
    pub async fn save(&self, request: SavePromoRequest) -> AppResult<PromoCode> {
        request.validate()?;

        match (request.percent_off, request.amount_off) {
            (Some(_), Some(_)) => {
                return Err(validation_error("percentOff", "use either percentOff or amountOff, not both"));
            }
            (None, None) => {
                return Err(validation_error("percentOff", "percentOff or amountOff is required"));
            }
            (Some(percent), None) if percent <= Decimal::ZERO || percent > Decimal::from(100) => {
                return Err(validation_error("percentOff", "percentOff must be between 0 and 100"));
            }
            _ => {}
        }

        let code = request.code.to_uppercase();
        let existing = self.promos.find(&code).await?;

        let promo = PromoCode {
            code,
            percent_off: request.percent_off,
            amount_off: request.amount_off.map(|amount| amount.round_dp(2)),
            active: request.active,
            max_redemptions: request.max_redemptions,
            expires_at: request.expires_at,
            times_redeemed: existing.as_ref().map_or(0, |p| p.times_redeemed),
            total_discounted: existing.as_ref().map_or(Decimal::ZERO, |p| p.total_discounted),
            created_at: existing.as_ref().map_or_else(Utc::now, |p| p.created_at),
        };
        self.promos.save(&promo).await?;

        info!("🏷️ Promo {} saved (active: {})", promo.code, promo.active);
        Ok(promo)
    }

    pub async fn list(&self) -> AppResult<Vec<PromoCode>> {
        self.promos.list().await
    }
}
