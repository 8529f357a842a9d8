//! Repository traits for instruments and instrument types.

use async_trait::async_trait;

use super::instruments_model::{Instrument, InstrumentType};
use crate::errors::Result;

/// Tenant-scoped instrument storage.
///
/// Writes participate in the caller's savepoint.
#[async_trait]
pub trait InstrumentRepositoryTrait: Send + Sync {
    fn get_instrument(&self, instrument_id: &str) -> Result<Instrument>;

    fn find_instrument_by_user_code(&self, user_code: &str) -> Result<Option<Instrument>>;

    fn list_instruments(&self) -> Result<Vec<Instrument>>;

    /// Instrument type by user code.
    fn get_instrument_type(&self, user_code: &str) -> Result<InstrumentType>;

    /// Inserts or updates by id, including the child schedule collections.
    async fn save_instrument(&self, instrument: Instrument) -> Result<Instrument>;
}
