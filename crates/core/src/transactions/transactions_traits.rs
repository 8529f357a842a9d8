//! Repository traits for the ledger.

use async_trait::async_trait;

use super::transactions_model::{ComplexTransaction, Transaction};
use crate::errors::Result;
use crate::expressions::EntityRef;

/// Tenant-scoped ledger storage.
#[async_trait]
pub trait TransactionRepositoryTrait: Send + Sync {
    fn get_complex_transaction(&self, complex_transaction_id: &str) -> Result<ComplexTransaction>;

    /// Non-deleted complex transactions carrying `unique_code`.
    fn find_complex_transactions_by_unique_code(
        &self,
        unique_code: &str,
    ) -> Result<Vec<ComplexTransaction>>;

    /// Rows of one complex transaction ordered by `complex_transaction_order`.
    fn get_transactions(&self, complex_transaction_id: &str) -> Result<Vec<Transaction>>;

    /// Every stored row of the tenant.
    fn list_transactions(&self) -> Result<Vec<Transaction>>;

    fn next_complex_transaction_code(&self) -> Result<i64>;

    fn next_transaction_code(&self) -> Result<i64>;

    async fn save_complex_transaction(
        &self,
        complex_transaction: ComplexTransaction,
    ) -> Result<ComplexTransaction>;

    async fn save_transaction(&self, transaction: Transaction) -> Result<Transaction>;

    async fn delete_transactions(&self, transaction_ids: &[String]) -> Result<()>;
}

/// Lookup of referenced entities (portfolios, accounts, currencies...) by user code.
pub trait EntityRepositoryTrait: Send + Sync {
    fn find_entity(&self, kind: &str, user_code: &str) -> Result<Option<EntityRef>>;
}

/// Nestable savepoints over the tenant's storage.
#[async_trait]
pub trait SavepointRepositoryTrait: Send + Sync {
    /// Opens a savepoint and returns its name.
    async fn begin_savepoint(&self) -> Result<String>;

    async fn release_savepoint(&self, name: &str) -> Result<()>;

    async fn rollback_savepoint(&self, name: &str) -> Result<()>;
}
