//! Transactions module - ledger rows, transaction types and the processor
//! that books them.

mod field_resolver;
mod process_errors;
mod transaction_type_model;
mod transaction_type_processor;
mod transactions_model;
mod transactions_traits;


pub use field_resolver::FieldResolver;
pub use process_errors::{
    add_field_error, flatten_field_errors, invalid_expression_message, FieldErrors, ProcessErrors,
    UniquenessStatus, INVALID_EXPRESSION_VALUE, REASON_UNIQUE_CODE_ERROR,
    REASON_UNIQUE_CODE_SKIPPED, SKIPPED_BOOK_UNIQUE_CODE, SKIPPED_BOOK_UNIQUE_CODE_ERROR,
};
pub use transaction_type_model::{
    AccrualScheduleAction, ActionField, ActionRow, EventActionRow, EventScheduleRow,
    FactorScheduleAction, InputValueType, InstrumentAction, InstrumentTarget,
    ManualPricingFormulaAction, RebookReaction, SchedulePolicy, TransactionAction,
    TransactionType, TransactionTypeAction, TransactionTypeInput, UniquenessReaction,
};
pub use transaction_type_processor::{
    ProcessMode, ProcessOutcome, ProcessRequest, TransactionTypeProcessor,
    TransactionTypeProcessorTrait,
};
pub use transactions_model::{ComplexTransaction, ComplexTransactionStatus, Transaction, TransactionClass};
pub use transactions_traits::{
    EntityRepositoryTrait, SavepointRepositoryTrait, TransactionRepositoryTrait,
};
