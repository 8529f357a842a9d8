use async_trait::async_trait;
use chrono::NaiveDate;
use log::{debug, warn};
use std::sync::Arc;

use super::pricing_model::{PriceHistory, PriceRecalculateInput};
use super::pricing_traits::PricingRepositoryTrait;
use crate::errors::Result;
use crate::instruments::{Instrument, InstrumentAnalytics, InstrumentRepositoryTrait};
use crate::utils::decimal_utils::{from_f64, to_f64};

#[async_trait]
pub trait PriceHistoryServiceTrait: Send + Sync {
    fn get_price_history(
        &self,
        instrument_id: &str,
        pricing_policy: &str,
        date: NaiveDate,
    ) -> Result<Option<PriceHistory>>;

    /// Runs auto-calculation and upserts the row.
    async fn save_price_history(&self, price: PriceHistory) -> Result<PriceHistory>;

    /// Recomputes the requested fields of a stored row and saves it.
    async fn recalculate_price_history(
        &self,
        price: PriceHistory,
        inputs: &[PriceRecalculateInput],
    ) -> Result<PriceHistory>;
}

pub struct PriceHistoryService {
    pricing_repository: Arc<dyn PricingRepositoryTrait>,
    instrument_repository: Arc<dyn InstrumentRepositoryTrait>,
    analytics: InstrumentAnalytics,
}

impl PriceHistoryService {
    pub fn new(
        pricing_repository: Arc<dyn PricingRepositoryTrait>,
        instrument_repository: Arc<dyn InstrumentRepositoryTrait>,
        analytics: InstrumentAnalytics,
    ) -> Self {
        PriceHistoryService {
            pricing_repository,
            instrument_repository,
            analytics,
        }
    }

    /// Fills the derived fields of a price row.
    ///
    /// Without explicit inputs: `ytm` and `modified_duration` are computed when
    /// zero, `factor` and `accrued_price` when unset. Explicit inputs force the
    /// named fields. Failures are appended to `error_message` and the field
    /// falls back to its neutral value.
    pub fn run_auto_calculation(
        &self,
        price: &mut PriceHistory,
        instrument: &Instrument,
        inputs: &[PriceRecalculateInput],
    ) {
        let requested = |input: PriceRecalculateInput| inputs.contains(&input);
        let principal = to_f64(price.principal_price);

        if requested(PriceRecalculateInput::Ytm) || price.ytm == 0.0 {
            match self.analytics.try_ytm(instrument, price.date, principal) {
                Ok(ytm) => price.ytm = ytm,
                Err(e) => {
                    warn!(
                        "calculate_ytm for {} on {}: {}",
                        instrument.user_code, price.date, e
                    );
                    price.push_error(format!("calculate_ytm error {}", e));
                    price.ytm = 0.0;
                }
            }
        }

        if requested(PriceRecalculateInput::ModifiedDuration) || price.modified_duration == 0.0 {
            if price.ytm == 0.0 {
                price.modified_duration = 0.0;
            } else {
                match self
                    .analytics
                    .try_modified_duration(instrument, price.date, price.ytm)
                {
                    Ok(duration) => price.modified_duration = duration,
                    Err(e) => {
                        price.push_error(format!("calculate_duration error {}", e));
                        price.modified_duration = 0.0;
                    }
                }
            }
        }

        if requested(PriceRecalculateInput::Factor) || (inputs.is_empty() && price.factor.is_none()) {
            price.factor = Some(from_f64(instrument.factor_at(price.date)));
        }

        if requested(PriceRecalculateInput::AccruedPrice)
            || (inputs.is_empty() && price.accrued_price.is_none())
        {
            price.accrued_price = Some(from_f64(instrument.accrued_price(price.date)));
        }

        debug!(
            "Auto-calculated price for {} on {}: ytm={} duration={}",
            instrument.user_code, price.date, price.ytm, price.modified_duration
        );
    }
}

#[async_trait]
impl PriceHistoryServiceTrait for PriceHistoryService {
    fn get_price_history(
        &self,
        instrument_id: &str,
        pricing_policy: &str,
        date: NaiveDate,
    ) -> Result<Option<PriceHistory>> {
        self.pricing_repository
            .get_price_history(instrument_id, pricing_policy, date)
    }

    async fn save_price_history(&self, price: PriceHistory) -> Result<PriceHistory> {
        self.recalculate_price_history(price, &[]).await
    }

    async fn recalculate_price_history(
        &self,
        mut price: PriceHistory,
        inputs: &[PriceRecalculateInput],
    ) -> Result<PriceHistory> {
        let instrument = self
            .instrument_repository
            .get_instrument(&price.instrument_id)?;
        self.run_auto_calculation(&mut price, &instrument, inputs);
        self.pricing_repository.save_price_history(price).await
    }
}
