//! Transaction type processor: applies a template to a set of input values and
//! materializes one complex transaction with its instruments, schedules and
//! ledger rows.

use async_trait::async_trait;
use chrono::NaiveDate;
use log::{debug, error, info, warn};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use super::field_resolver::{value_to_code, value_to_date, value_to_decimal, FieldResolver};
use super::process_errors::{
    add_field_error, invalid_expression_message, FieldErrors, ProcessErrors, UniquenessStatus,
    INVALID_EXPRESSION_VALUE, REASON_UNIQUE_CODE_ERROR, REASON_UNIQUE_CODE_SKIPPED,
    SKIPPED_BOOK_UNIQUE_CODE, SKIPPED_BOOK_UNIQUE_CODE_ERROR,
};
use super::transaction_type_model::{
    AccrualScheduleAction, ActionField, ActionRow, EventActionRow, EventScheduleRow, FactorScheduleAction,
    InputValueType, InstrumentAction, InstrumentTarget, ManualPricingFormulaAction,
    RebookReaction, TransactionAction, TransactionType, TransactionTypeAction,
    TransactionTypeInput, UniquenessReaction,
};
use super::transactions_model::{ComplexTransaction, ComplexTransactionStatus, Transaction};
use super::transactions_traits::{
    EntityRepositoryTrait, SavepointRepositoryTrait, TransactionRepositoryTrait,
};
use crate::constants::{PHANTOM_INSTRUMENT_SLOTS, USER_DATE_SLOTS, USER_NUMBER_SLOTS, USER_TEXT_SLOTS};
use crate::errors::{DatabaseError, Error, Result, ValidationError};
use crate::event_schedules::{
    EventClass, EventSchedule, EventScheduleAction, EventScheduleConfig,
    EventScheduleRebuilder, EventScheduleRepositoryTrait,
};
use crate::events::{DomainEvent, DomainEventSink, NoOpDomainEventSink};
use crate::expressions::{EntityRef, EvaluationContext, Namespace, Value};
use crate::instruments::{
    AccrualCalculationSchedule, FactorSchedule, Instrument, InstrumentRepositoryTrait,
    ManualPricingFormula,
};
use crate::settings::CoreSettings;
use crate::utils::CancellationToken;

const INSTRUMENT_KIND: &str = "instrument";
const REQUIRED_FIELD: &str = "This field is required.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessMode {
    Book,
    Rebook,
    Recalculate,
}

/// Input of one processor run.
#[derive(Debug, Clone)]
pub struct ProcessRequest {
    pub mode: ProcessMode,
    pub transaction_type: TransactionType,
    /// Explicit input values; they win over stored, context and default values.
    pub values: Namespace,
    pub status: ComplexTransactionStatus,
    pub member: Option<String>,
    /// Environment defaults consulted by `is_fill_from_context` inputs.
    pub context: Namespace,
    pub uniqueness_reaction: UniquenessReaction,
    /// Existing complex transaction (rebook and recalculate).
    pub complex_transaction: Option<ComplexTransaction>,
    pub recalculate_inputs: Vec<String>,
    /// Processing date used for date defaults.
    pub now: NaiveDate,
}

impl ProcessRequest {
    pub fn book(transaction_type: TransactionType, now: NaiveDate) -> Self {
        ProcessRequest {
            mode: ProcessMode::Book,
            transaction_type,
            values: Namespace::new(),
            status: ComplexTransactionStatus::Production,
            member: None,
            context: Namespace::new(),
            uniqueness_reaction: UniquenessReaction::default(),
            complex_transaction: None,
            recalculate_inputs: Vec::new(),
            now,
        }
    }

    pub fn rebook(
        transaction_type: TransactionType,
        complex_transaction: ComplexTransaction,
        now: NaiveDate,
    ) -> Self {
        let status = complex_transaction.status;
        ProcessRequest {
            mode: ProcessMode::Rebook,
            status,
            complex_transaction: Some(complex_transaction),
            ..ProcessRequest::book(transaction_type, now)
        }
    }

    pub fn recalculate(
        transaction_type: TransactionType,
        complex_transaction: ComplexTransaction,
        recalculate_inputs: Vec<String>,
        now: NaiveDate,
    ) -> Self {
        ProcessRequest {
            mode: ProcessMode::Recalculate,
            recalculate_inputs,
            ..ProcessRequest::rebook(transaction_type, complex_transaction, now)
        }
    }

    pub fn with_values(mut self, values: Namespace) -> Self {
        self.values = values;
        self
    }

    pub fn with_context(mut self, context: Namespace) -> Self {
        self.context = context;
        self
    }

    pub fn with_status(mut self, status: ComplexTransactionStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_member(mut self, member: impl Into<String>) -> Self {
        self.member = Some(member.into());
        self
    }

    pub fn with_uniqueness_reaction(mut self, reaction: UniquenessReaction) -> Self {
        self.uniqueness_reaction = reaction;
        self
    }
}

/// Result of one processor run.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutcome {
    pub values: Namespace,
    pub complex_transaction: Option<ComplexTransaction>,
    pub transactions: Vec<Transaction>,
    /// Instruments registered by instrument rows, in row order.
    pub instruments: Vec<Instrument>,
    pub errors: ProcessErrors,
    pub uniqueness_status: Option<UniquenessStatus>,
}

impl ProcessOutcome {
    pub fn is_success(&self) -> bool {
        !self.errors.has_errors()
    }
}

#[async_trait]
pub trait TransactionTypeProcessorTrait: Send + Sync {
    /// Runs one book, rebook or recalculate operation.
    ///
    /// Collected errors roll the savepoint back and are returned in the
    /// outcome. Persistence failures and cancellation roll back and return `Err`.
    async fn process(
        &self,
        request: ProcessRequest,
        cancel: &CancellationToken,
    ) -> Result<ProcessOutcome>;
}

/// Instrument lookups for expression builtins.
struct InstrumentLookup {
    instruments: Arc<dyn InstrumentRepositoryTrait>,
}

impl EvaluationContext for InstrumentLookup {
    fn find_instrument(&self, reference: &EntityRef) -> Option<Instrument> {
        if !reference.id.is_empty() {
            if let Ok(instrument) = self.instruments.get_instrument(&reference.id) {
                return Some(instrument);
            }
        }
        self.instruments
            .find_instrument_by_user_code(&reference.user_code)
            .ok()
            .flatten()
    }
}

pub struct TransactionTypeProcessor {
    transaction_repository: Arc<dyn TransactionRepositoryTrait>,
    instrument_repository: Arc<dyn InstrumentRepositoryTrait>,
    event_schedule_repository: Arc<dyn EventScheduleRepositoryTrait>,
    entity_repository: Arc<dyn EntityRepositoryTrait>,
    savepoints: Arc<dyn SavepointRepositoryTrait>,
    event_schedule_config: EventScheduleConfig,
    recalculate_iterations: u32,
    event_sink: Arc<dyn DomainEventSink>,
}

impl TransactionTypeProcessor {
    pub fn new(
        transaction_repository: Arc<dyn TransactionRepositoryTrait>,
        instrument_repository: Arc<dyn InstrumentRepositoryTrait>,
        event_schedule_repository: Arc<dyn EventScheduleRepositoryTrait>,
        entity_repository: Arc<dyn EntityRepositoryTrait>,
        savepoints: Arc<dyn SavepointRepositoryTrait>,
    ) -> Self {
        let defaults = CoreSettings::default();
        Self {
            transaction_repository,
            instrument_repository,
            event_schedule_repository,
            entity_repository,
            savepoints,
            event_schedule_config: defaults.event_schedule_config,
            recalculate_iterations: defaults.recalculate_iterations,
            event_sink: Arc::new(NoOpDomainEventSink),
        }
    }

    /// Sets the domain event sink for emitting events after commit.
    pub fn with_event_sink(mut self, event_sink: Arc<dyn DomainEventSink>) -> Self {
        self.event_sink = event_sink;
        self
    }

    pub fn with_settings(mut self, settings: &CoreSettings) -> Self {
        self.event_schedule_config = settings.event_schedule_config.clone();
        self.recalculate_iterations = settings.recalculate_iterations;
        self
    }
}

#[async_trait]
impl TransactionTypeProcessorTrait for TransactionTypeProcessor {
    async fn process(
        &self,
        request: ProcessRequest,
        cancel: &CancellationToken,
    ) -> Result<ProcessOutcome> {
        if request.mode != ProcessMode::Book && request.complex_transaction.is_none() {
            return Err(Error::Validation(ValidationError::MissingField(
                "complex_transaction".to_string(),
            )));
        }

        let mut run = ProcessRun::new(self, request, cancel);
        run.populate_values()?;
        run.resolve_selectors();

        if run.mode == ProcessMode::Recalculate {
            run.recalculate()?;
            return Ok(run.into_outcome());
        }

        let savepoint = self.savepoints.begin_savepoint().await?;
        match run.book().await {
            Ok(()) if !run.errors.has_errors() => {
                self.savepoints.release_savepoint(&savepoint).await?;
                let events = run.committed_events();
                let outcome = run.into_outcome();
                info!(
                    "Booked complex transaction {} with {} transactions",
                    outcome
                        .complex_transaction
                        .as_ref()
                        .map(|ct| ct.code)
                        .unwrap_or_default(),
                    outcome.transactions.len()
                );
                self.event_sink.emit_batch(events);
                Ok(outcome)
            }
            Ok(()) => {
                self.savepoints.rollback_savepoint(&savepoint).await?;
                debug!("Processor run rolled back: {:?}", run.errors);
                let mut outcome = run.into_outcome();
                outcome.transactions.clear();
                Ok(outcome)
            }
            Err(e) => {
                if !matches!(e, Error::Cancelled) {
                    error!("Processor run failed, rolling back: {}", e);
                }
                if let Err(rollback_error) = self.savepoints.rollback_savepoint(&savepoint).await {
                    error!("Failed to roll back savepoint {}: {}", savepoint, rollback_error);
                }
                Err(e)
            }
        }
    }
}

/// Mutable state of a single run.
struct ProcessRun<'a> {
    processor: &'a TransactionTypeProcessor,
    cancel: &'a CancellationToken,
    lookup: InstrumentLookup,
    entities: Arc<dyn EntityRepositoryTrait>,

    mode: ProcessMode,
    transaction_type: TransactionType,
    explicit_values: Namespace,
    context: Namespace,
    status: ComplexTransactionStatus,
    member: Option<String>,
    uniqueness_reaction: UniquenessReaction,
    recalculate_inputs: Vec<String>,
    now: NaiveDate,

    values: Namespace,
    errors: ProcessErrors,
    complex_transaction: ComplexTransaction,
    transactions: Vec<Transaction>,
    uniqueness_status: Option<UniquenessStatus>,

    /// Instruments touched by this run; phantom ids index into it.
    instruments: Vec<Instrument>,
    phantoms: BTreeMap<usize, usize>,
    dirty: BTreeSet<usize>,
    cleared: BTreeSet<(usize, &'static str)>,
    event_schedules: BTreeMap<usize, EventSchedule>,

    saved_instruments: Vec<String>,
    rebuilt_events: Vec<DomainEvent>,
    overwritten: Vec<String>,
}

impl<'a> ProcessRun<'a> {
    fn new(
        processor: &'a TransactionTypeProcessor,
        request: ProcessRequest,
        cancel: &'a CancellationToken,
    ) -> Self {
        let complex_transaction = request.complex_transaction.unwrap_or_default();
        ProcessRun {
            processor,
            cancel,
            lookup: InstrumentLookup {
                instruments: processor.instrument_repository.clone(),
            },
            entities: processor.entity_repository.clone(),
            mode: request.mode,
            transaction_type: request.transaction_type,
            explicit_values: request.values,
            context: request.context,
            status: request.status,
            member: request.member,
            uniqueness_reaction: request.uniqueness_reaction,
            recalculate_inputs: request.recalculate_inputs,
            now: request.now,
            values: Namespace::new(),
            errors: ProcessErrors::default(),
            complex_transaction,
            transactions: Vec::new(),
            uniqueness_status: None,
            instruments: Vec::new(),
            phantoms: BTreeMap::new(),
            dirty: BTreeSet::new(),
            cleared: BTreeSet::new(),
            event_schedules: BTreeMap::new(),
            saved_instruments: Vec::new(),
            rebuilt_events: Vec::new(),
            overwritten: Vec::new(),
        }
    }

    fn is_rebook(&self) -> bool {
        self.mode == ProcessMode::Rebook
    }

    fn into_outcome(self) -> ProcessOutcome {
        let instruments = self
            .phantoms
            .values()
            .filter_map(|idx| self.instruments.get(*idx).cloned())
            .collect();
        ProcessOutcome {
            values: self.values,
            complex_transaction: Some(self.complex_transaction),
            transactions: self.transactions,
            instruments,
            errors: self.errors,
            uniqueness_status: self.uniqueness_status,
        }
    }

    fn committed_events(&self) -> Vec<DomainEvent> {
        let mut events = vec![DomainEvent::complex_transaction_booked(
            self.complex_transaction.id.clone(),
            self.transaction_type.user_code.clone(),
            self.transactions.iter().map(|t| t.id.clone()).collect(),
            self.complex_transaction.status.as_str().to_string(),
        )];
        if !self.saved_instruments.is_empty() {
            events.push(DomainEvent::instruments_changed(self.saved_instruments.clone()));
        }
        events.extend(self.rebuilt_events.iter().cloned());
        if !self.overwritten.is_empty() {
            events.push(DomainEvent::complex_transactions_deleted(self.overwritten.clone()));
        }
        events
    }

    // ---- values --------------------------------------------------------

    fn populate_values(&mut self) -> Result<()> {
        for slot in 0..PHANTOM_INSTRUMENT_SLOTS {
            self.values.insert(format!("phantom_instrument_{}", slot), Value::Null);
        }
        for (name, value) in &self.complex_transaction.inputs {
            if !value.is_null() {
                self.values.insert(name.clone(), value.clone());
            }
        }
        for (name, value) in &self.explicit_values {
            self.values.insert(name.clone(), value.clone());
        }

        let inputs = self.transaction_type.inputs.clone();
        for input in &inputs {
            let mut errors = FieldErrors::new();
            let current = self.values.get(&input.name).cloned().unwrap_or_default();
            let value = if !current.is_null() {
                current
            } else if let Some(from_context) = self.context_value(input) {
                from_context
            } else {
                self.default_value(input, &mut errors)
            };
            let value = self.coerce_input(input, value, &mut errors)?;
            if !value.is_null() {
                self.values.insert(input.name.clone(), value);
            } else {
                debug!("Input '{}' has no value", input.name);
            }
            self.errors.add_value_errors(errors);
        }
        debug!("Populated {} values for {}", self.values.len(), self.transaction_type.user_code);
        Ok(())
    }

    fn context_value(&self, input: &TransactionTypeInput) -> Option<Value> {
        if !input.is_fill_from_context {
            return None;
        }
        if let Some(value) = self.context.get(&input.name).filter(|v| !v.is_null()) {
            return Some(value.clone());
        }
        if input.value_type == InputValueType::Relation {
            let kind = input.entity_kind.as_deref()?;
            return self.context.values().find_map(|value| match value {
                Value::Entity(entity) if entity.kind == kind => Some(value.clone()),
                _ => None,
            });
        }
        None
    }

    fn default_value(&self, input: &TransactionTypeInput, errors: &mut FieldErrors) -> Value {
        let Some(source) = input.value_expr.as_deref().filter(|s| !s.trim().is_empty()) else {
            return Value::Null;
        };
        let resolver = FieldResolver::new(&self.values, &self.lookup, self.entities.as_ref());
        match resolver.evaluate(source) {
            Ok(value) => value,
            Err(e) => {
                debug!("Default of input '{}' failed: {}", input.name, e);
                add_field_error(errors, &input.name, invalid_expression_message(source));
                Value::Null
            }
        }
    }

    /// Checks a value against the input's declared type.
    fn coerce_input(
        &self,
        input: &TransactionTypeInput,
        value: Value,
        errors: &mut FieldErrors,
    ) -> Result<Value> {
        if value.is_null() {
            return Ok(value);
        }
        let coerced = match input.value_type {
            InputValueType::Number => value_to_decimal(&value).map(Value::Number),
            InputValueType::Date => value_to_date(&value).map(Value::Date),
            InputValueType::String | InputValueType::Selector => match value {
                Value::String(_) => Some(value),
                other => Some(Value::String(value_to_code(&other))),
            },
            InputValueType::Relation => match value {
                Value::Entity(_) => Some(value),
                other => {
                    let kind = input.entity_kind.as_deref().unwrap_or_default();
                    let user_code = value_to_code(&other);
                    self.entities
                        .find_entity(kind, &user_code)?
                        .map(Value::Entity)
                }
            },
        };
        Ok(match coerced {
            Some(value) => value,
            None => {
                add_field_error(
                    errors,
                    &input.name,
                    format!("Value does not match input type {:?}.", input.value_type),
                );
                Value::Null
            }
        })
    }

    fn resolve_selectors(&mut self) {
        let inputs = self.transaction_type.inputs.clone();
        for input in inputs
            .iter()
            .filter(|i| i.value_type == InputValueType::Selector && !i.selector_values.is_empty())
        {
            let current = self
                .values
                .get(&input.name)
                .map(value_to_code)
                .unwrap_or_default();
            if !input.selector_values.contains(&current) {
                let mut errors = FieldErrors::new();
                let message = ValidationError::InvalidSelector {
                    field: input.name.clone(),
                    value: current,
                }
                .to_string();
                add_field_error(&mut errors, &input.name, message);
                self.values.insert(input.name.clone(), Value::String(String::new()));
                self.errors.add_value_errors(errors);
            }
        }
    }

    fn recalculate(&mut self) -> Result<()> {
        if self.recalculate_inputs.is_empty() {
            return Ok(());
        }
        let names = self.recalculate_inputs.clone();
        for pass in 0..self.processor.recalculate_iterations {
            for name in &names {
                self.cancel.check()?;
                let Some(input) = self.transaction_type.input(name).cloned() else {
                    warn!("Recalculate requested for unknown input '{}'", name);
                    continue;
                };
                if !input.can_recalculate || input.expression_iterations_count <= pass {
                    continue;
                }
                let source = input
                    .recalc_expr
                    .clone()
                    .filter(|s| !s.trim().is_empty())
                    .or_else(|| input.value_expr.clone())
                    .unwrap_or_default();
                if source.trim().is_empty() {
                    continue;
                }

                let mut errors = FieldErrors::new();
                let evaluated = {
                    let resolver =
                        FieldResolver::new(&self.values, &self.lookup, self.entities.as_ref());
                    resolver.evaluate(&source)
                };
                let value = match evaluated {
                    Ok(value) => self.coerce_input(&input, value, &mut errors)?,
                    Err(e) => {
                        error!("Recalculation of '{}' failed: {}", name, e);
                        add_field_error(&mut errors, name, invalid_expression_message(&source));
                        if input.value_type == InputValueType::String {
                            Value::String(INVALID_EXPRESSION_VALUE.to_string())
                        } else {
                            Value::Null
                        }
                    }
                };
                self.values.insert(name.clone(), value);
                self.errors.add_value_errors(errors);
            }
        }
        Ok(())
    }

    // ---- book ------------------------------------------------------------

    async fn book(&mut self) -> Result<()> {
        let actions: Vec<TransactionTypeAction> = self
            .transaction_type
            .ordered_actions()
            .into_iter()
            .cloned()
            .collect();

        for action in &actions {
            if let ActionRow::Instrument(row) = &action.row {
                self.cancel.check()?;
                if self.condition(action) {
                    self.book_instrument(action, row)?;
                }
            }
        }
        for action in &actions {
            if let ActionRow::FactorSchedule(row) = &action.row {
                self.cancel.check()?;
                if self.condition(action) {
                    self.book_factor_schedule(action, row)?;
                }
            }
        }
        for action in &actions {
            if let ActionRow::ManualPricingFormula(row) = &action.row {
                self.cancel.check()?;
                if self.condition(action) {
                    self.book_manual_pricing_formula(action, row)?;
                }
            }
        }
        for action in &actions {
            if let ActionRow::AccrualSchedule(row) = &action.row {
                self.cancel.check()?;
                if self.condition(action) {
                    self.book_accrual_schedule(action, row)?;
                }
            }
        }
        self.save_instruments().await?;

        for action in &actions {
            if let ActionRow::EventSchedule(row) = &action.row {
                self.cancel.check()?;
                if self.condition(action) {
                    self.book_event_schedule(action, row).await?;
                }
            }
        }
        for action in &actions {
            if let ActionRow::EventScheduleAction(row) = &action.row {
                self.cancel.check()?;
                if self.condition(action) {
                    self.book_event_action(action, row).await?;
                }
            }
        }

        self.check_uniqueness().await?;
        self.evaluate_date();

        if self.errors.has_errors() {
            return Ok(());
        }

        self.save_complex_transaction().await?;
        self.create_transactions(&actions).await?;

        self.complex_transaction.is_canceled = self.transactions.iter().any(|t| t.is_canceled);
        self.evaluate_text_and_user_fields();

        if self.complex_transaction.status == ComplexTransactionStatus::Pending {
            let ids: Vec<String> = self.transactions.drain(..).map(|t| t.id).collect();
            if !ids.is_empty() {
                self.processor.transaction_repository.delete_transactions(&ids).await?;
            }
        }

        if !self.errors.has_errors() {
            let saved = self
                .processor
                .transaction_repository
                .save_complex_transaction(self.complex_transaction.clone())
                .await?;
            self.complex_transaction = saved;
        }
        Ok(())
    }

    fn condition(&self, action: &TransactionTypeAction) -> bool {
        let resolver = FieldResolver::new(&self.values, &self.lookup, self.entities.as_ref());
        resolver.condition(&action.condition_expr)
    }

    fn book_instrument(&mut self, action: &TransactionTypeAction, row: &InstrumentAction) -> Result<()> {
        let mut errors = FieldErrors::new();
        let user_code = {
            let resolver = FieldResolver::new(&self.values, &self.lookup, self.entities.as_ref());
            resolver.text(&row.user_code, "user_code", &mut errors)
        };
        let Some(user_code) = user_code.filter(|c| !c.is_empty()) else {
            if errors.is_empty() {
                add_field_error(&mut errors, "user_code", REQUIRED_FIELD);
            }
            self.errors.add_instrument_errors(&errors);
            return Ok(());
        };

        let existing = match self.find_loaded(&user_code) {
            Some(idx) => Some(self.instruments[idx].clone()),
            None => self
                .processor
                .instrument_repository
                .find_instrument_by_user_code(&user_code)?
                .filter(|i| !i.is_deleted),
        };
        let exists = existing.is_some();

        let write = match (action.rebook_reaction, exists) {
            (None, _) | (Some(RebookReaction::Overwrite), _) => true,
            (Some(RebookReaction::Create), false) | (Some(RebookReaction::CreateIfNotExist), false) => true,
            (Some(RebookReaction::Create), true) if self.is_rebook() => {
                add_field_error(
                    &mut errors,
                    "user_code",
                    format!("Instrument '{}' already exists.", user_code),
                );
                self.errors.add_instrument_errors(&errors);
                return Ok(());
            }
            _ => false,
        };
        if !write && !exists {
            debug!("Instrument row {} skipped for '{}'", action.order, user_code);
            return Ok(());
        }

        let mut instrument = existing.unwrap_or_else(|| Instrument {
            id: Uuid::new_v4().to_string(),
            user_code: user_code.clone(),
            name: user_code.clone(),
            ..Instrument::default()
        });
        if write {
            self.apply_instrument_fields(&mut instrument, row, &mut errors);
            if instrument.instrument_type.is_empty() {
                add_field_error(&mut errors, "instrument_type", REQUIRED_FIELD);
            }
        }
        if !errors.is_empty() {
            self.errors.add_instrument_errors(&errors);
            return Ok(());
        }

        let idx = self.register_instrument(instrument);
        if write {
            self.dirty.insert(idx);
        }
        self.phantoms.insert(action.order, idx);
        let registered = &self.instruments[idx];
        self.values.insert(
            format!("phantom_instrument_{}", action.order),
            Value::Entity(EntityRef::new(
                INSTRUMENT_KIND,
                registered.id.clone(),
                registered.user_code.clone(),
            )),
        );
        debug!(
            "Instrument row {} -> {} (write: {})",
            action.order, registered.user_code, write
        );
        Ok(())
    }

    fn apply_instrument_fields(
        &self,
        instrument: &mut Instrument,
        row: &InstrumentAction,
        errors: &mut FieldErrors,
    ) {
        let r = FieldResolver::new(&self.values, &self.lookup, self.entities.as_ref());
        if let Some(name) = r.text(&row.name, "name", errors) {
            instrument.name = name;
        }
        if let Some(v) = r.text(&row.short_name, "short_name", errors) {
            instrument.short_name = Some(v);
        }
        if let Some(v) = r.text(&row.public_name, "public_name", errors) {
            instrument.public_name = Some(v);
        }
        if let Some(v) = r.text(&row.notes, "notes", errors) {
            instrument.notes = Some(v);
        }
        if let Some(v) = r.text(&row.instrument_type, "instrument_type", errors) {
            instrument.instrument_type = v;
        }
        if let Some(v) = r.text(&row.pricing_currency, "pricing_currency", errors) {
            instrument.pricing_currency = v;
        }
        if let Some(v) = r.decimal(&row.price_multiplier, "price_multiplier", errors) {
            instrument.price_multiplier = v;
        }
        if let Some(v) = r.text(&row.accrued_currency, "accrued_currency", errors) {
            instrument.accrued_currency = v;
        }
        if let Some(v) = r.decimal(&row.accrued_multiplier, "accrued_multiplier", errors) {
            instrument.accrued_multiplier = v;
        }
        if let Some(v) = r.code(&row.payment_size_detail, "payment_size_detail", errors) {
            instrument.payment_size_detail = v;
        }
        if let Some(v) = r.decimal(&row.default_price, "default_price", errors) {
            instrument.default_price = v;
        }
        if let Some(v) = r.decimal(&row.default_accrued, "default_accrued", errors) {
            instrument.default_accrued = v;
        }
        if let Some(v) = r.text(&row.user_text_1, "user_text_1", errors) {
            instrument.user_text_1 = Some(v);
        }
        if let Some(v) = r.text(&row.user_text_2, "user_text_2", errors) {
            instrument.user_text_2 = Some(v);
        }
        if let Some(v) = r.text(&row.user_text_3, "user_text_3", errors) {
            instrument.user_text_3 = Some(v);
        }
        if let Some(v) = r.date(&row.maturity_date, "maturity_date", errors) {
            instrument.maturity_date = Some(v);
        }
        if let Some(v) = r.decimal(&row.maturity_price, "maturity_price", errors) {
            instrument.maturity_price = v;
        }
    }

    fn find_loaded(&self, user_code: &str) -> Option<usize> {
        self.instruments.iter().position(|i| i.user_code == user_code)
    }

    fn register_instrument(&mut self, instrument: Instrument) -> usize {
        match self.instruments.iter().position(|i| i.id == instrument.id) {
            Some(idx) => {
                self.instruments[idx] = instrument;
                idx
            }
            None => {
                self.instruments.push(instrument);
                self.instruments.len() - 1
            }
        }
    }

    /// Arena index of a schedule row's instrument, loading it when needed.
    fn target_instrument(
        &mut self,
        target: &InstrumentTarget,
        errors: &mut FieldErrors,
    ) -> Result<Option<usize>> {
        if let Some(phantom) = target.instrument_phantom {
            let idx = self.phantoms.get(&phantom).copied();
            if idx.is_none() {
                add_field_error(
                    errors,
                    "instrument_phantom",
                    format!("Instrument of row {} was not created.", phantom),
                );
            }
            return Ok(idx);
        }

        let value = {
            let r = FieldResolver::new(&self.values, &self.lookup, self.entities.as_ref());
            r.value(&target.instrument, "instrument", errors)
        };
        let Some(value) = value else {
            if errors.is_empty() {
                add_field_error(errors, "instrument", REQUIRED_FIELD);
            }
            return Ok(None);
        };

        let (id, user_code) = match &value {
            Value::Entity(e) => (Some(e.id.clone()), e.user_code.clone()),
            other => (None, value_to_code(other)),
        };
        if let Some(idx) = self
            .instruments
            .iter()
            .position(|i| Some(&i.id) == id.as_ref() || i.user_code == user_code)
        {
            return Ok(Some(idx));
        }

        let loaded = match id {
            Some(id) => match self.processor.instrument_repository.get_instrument(&id) {
                Ok(instrument) => Some(instrument),
                Err(Error::Database(DatabaseError::NotFound(_))) => None,
                Err(e) => return Err(e),
            },
            None => self
                .processor
                .instrument_repository
                .find_instrument_by_user_code(&user_code)?,
        };
        match loaded {
            Some(instrument) => Ok(Some(self.register_instrument(instrument))),
            None => {
                add_field_error(
                    errors,
                    "instrument",
                    format!("Instrument '{}' not found.", user_code),
                );
                Ok(None)
            }
        }
    }

    /// Clears a collection at most once per run.
    fn should_clear(&mut self, idx: usize, collection: &'static str) -> bool {
        self.cleared.insert((idx, collection))
    }

    fn book_factor_schedule(
        &mut self,
        action: &TransactionTypeAction,
        row: &FactorScheduleAction,
    ) -> Result<()> {
        let mut errors = FieldErrors::new();
        let policy = RebookReaction::schedule_policy(action.rebook_reaction, self.is_rebook());
        let Some(idx) = self.target_instrument(&row.target, &mut errors)? else {
            self.errors.add_instrument_errors(&errors);
            return Ok(());
        };

        let (effective_date, factor_value) = {
            let r = FieldResolver::new(&self.values, &self.lookup, self.entities.as_ref());
            (
                r.date(&row.effective_date, "effective_date", &mut errors)
                    .unwrap_or(self.now),
                r.float(&row.factor_value, "factor_value", &mut errors)
                    .unwrap_or(0.0),
            )
        };
        if !errors.is_empty() {
            self.errors.add_instrument_errors(&errors);
            return Ok(());
        }

        if policy.clear && self.should_clear(idx, "factor") {
            self.instruments[idx].factor_schedules.clear();
            self.dirty.insert(idx);
        }
        if policy.write {
            let schedules = &mut self.instruments[idx].factor_schedules;
            let existing = schedules
                .iter()
                .position(|f| f.effective_date == effective_date)
                .filter(|_| policy.upsert);
            match existing {
                Some(pos) => schedules[pos].factor_value = factor_value,
                None => schedules.push(FactorSchedule {
                    id: Uuid::new_v4().to_string(),
                    effective_date,
                    factor_value,
                }),
            }
            schedules.sort_by_key(|f| f.effective_date);
            self.dirty.insert(idx);
        }
        Ok(())
    }

    fn book_manual_pricing_formula(
        &mut self,
        action: &TransactionTypeAction,
        row: &ManualPricingFormulaAction,
    ) -> Result<()> {
        let mut errors = FieldErrors::new();
        let policy = RebookReaction::schedule_policy(action.rebook_reaction, self.is_rebook());
        let Some(idx) = self.target_instrument(&row.target, &mut errors)? else {
            self.errors.add_instrument_errors(&errors);
            return Ok(());
        };

        let (pricing_policy, expr, notes) = {
            let r = FieldResolver::new(&self.values, &self.lookup, self.entities.as_ref());
            (
                r.text(&row.pricing_policy, "pricing_policy", &mut errors),
                r.text(&row.expr, "expr", &mut errors).unwrap_or_default(),
                r.text(&row.notes, "notes", &mut errors),
            )
        };
        let Some(pricing_policy) = pricing_policy else {
            if errors.is_empty() {
                add_field_error(&mut errors, "pricing_policy", REQUIRED_FIELD);
            }
            self.errors.add_instrument_errors(&errors);
            return Ok(());
        };
        if !errors.is_empty() {
            self.errors.add_instrument_errors(&errors);
            return Ok(());
        }

        if policy.clear && self.should_clear(idx, "manual_pricing") {
            self.instruments[idx].manual_pricing_formulas.clear();
            self.dirty.insert(idx);
        }
        if policy.write {
            let formulas = &mut self.instruments[idx].manual_pricing_formulas;
            let existing = formulas
                .iter()
                .position(|f| f.pricing_policy == pricing_policy)
                .filter(|_| policy.upsert);
            match existing {
                Some(pos) => {
                    formulas[pos].expr = expr;
                    formulas[pos].notes = notes;
                }
                None => formulas.push(ManualPricingFormula {
                    id: Uuid::new_v4().to_string(),
                    pricing_policy,
                    expr,
                    notes,
                }),
            }
            self.dirty.insert(idx);
        }
        Ok(())
    }

    fn book_accrual_schedule(
        &mut self,
        action: &TransactionTypeAction,
        row: &AccrualScheduleAction,
    ) -> Result<()> {
        let mut errors = FieldErrors::new();
        let policy = RebookReaction::schedule_policy(action.rebook_reaction, self.is_rebook());
        let Some(idx) = self.target_instrument(&row.target, &mut errors)? else {
            self.errors.add_instrument_errors(&errors);
            return Ok(());
        };

        let schedule = {
            let r = FieldResolver::new(&self.values, &self.lookup, self.entities.as_ref());
            let accrual_start_date = r
                .date(&row.accrual_start_date, "accrual_start_date", &mut errors)
                .unwrap_or(self.now);
            AccrualCalculationSchedule {
                id: Uuid::new_v4().to_string(),
                accrual_start_date,
                first_payment_date: r
                    .date(&row.first_payment_date, "first_payment_date", &mut errors)
                    .unwrap_or(accrual_start_date),
                accrual_size: r
                    .float(&row.accrual_size, "accrual_size", &mut errors)
                    .unwrap_or(0.0),
                accrual_calculation_model: r
                    .code(&row.accrual_calculation_model, "accrual_calculation_model", &mut errors)
                    .unwrap_or_default(),
                periodicity: r
                    .code(&row.periodicity, "periodicity", &mut errors)
                    .unwrap_or_default(),
                periodicity_n: r
                    .integer(&row.periodicity_n, "periodicity_n", &mut errors)
                    .and_then(|n| i32::try_from(n).ok())
                    .unwrap_or(1),
                eom: r.boolean(&row.eom, "eom", &mut errors).unwrap_or(false),
                notes: r.text(&row.notes, "notes", &mut errors),
            }
        };
        if schedule.first_payment_date < schedule.accrual_start_date {
            add_field_error(
                &mut errors,
                "first_payment_date",
                "First payment date precedes the accrual start date.",
            );
        }
        if !errors.is_empty() {
            self.errors.add_instrument_errors(&errors);
            return Ok(());
        }

        if policy.clear && self.should_clear(idx, "accrual") {
            self.instruments[idx].accrual_calculation_schedules.clear();
            self.dirty.insert(idx);
        }
        if policy.write {
            let schedules = &mut self.instruments[idx].accrual_calculation_schedules;
            let existing = schedules
                .iter()
                .position(|s| s.accrual_start_date == schedule.accrual_start_date)
                .filter(|_| policy.upsert);
            match existing {
                Some(pos) => {
                    let id = schedules[pos].id.clone();
                    schedules[pos] = AccrualCalculationSchedule { id, ..schedule };
                }
                None => schedules.push(schedule),
            }
            schedules.sort_by_key(|s| s.accrual_start_date);
            self.dirty.insert(idx);
        }
        Ok(())
    }

    /// Persists written instruments and rebuilds their generated events.
    async fn save_instruments(&mut self) -> Result<()> {
        let rebuilder = EventScheduleRebuilder::new(
            self.processor.event_schedule_repository.clone(),
            self.processor.event_schedule_config.clone(),
        );
        let dirty: Vec<usize> = std::mem::take(&mut self.dirty).into_iter().collect();
        for idx in dirty {
            self.cancel.check()?;
            let saved = self
                .processor
                .instrument_repository
                .save_instrument(self.instruments[idx].clone())
                .await?;
            self.instruments[idx] = saved.clone();
            if !self.saved_instruments.contains(&saved.id) {
                self.saved_instruments.push(saved.id.clone());
            }

            let mut errors = FieldErrors::new();
            let instrument_type = match self
                .processor
                .instrument_repository
                .get_instrument_type(&saved.instrument_type)
            {
                Ok(instrument_type) => instrument_type,
                Err(Error::Database(DatabaseError::NotFound(_))) => {
                    add_field_error(
                        &mut errors,
                        "instrument_type",
                        format!("Instrument type '{}' not found.", saved.instrument_type),
                    );
                    self.errors.add_instrument_errors(&errors);
                    continue;
                }
                Err(e) => return Err(e),
            };
            match rebuilder.rebuild(&saved, &instrument_type).await {
                Ok(plan) => {
                    if !plan.is_noop() {
                        self.rebuilt_events.push(DomainEvent::event_schedules_rebuilt(
                            saved.id.clone(),
                            plan.to_save.len(),
                            plan.to_delete.len(),
                        ));
                    }
                }
                Err(e @ Error::Configuration { .. }) => {
                    warn!("Event schedules of {} not rebuilt: {}", saved.user_code, e);
                    add_field_error(&mut errors, "instrument_type", e.to_string());
                    self.errors.add_instrument_errors(&errors);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn book_event_schedule(
        &mut self,
        action: &TransactionTypeAction,
        row: &EventScheduleRow,
    ) -> Result<()> {
        let mut errors = FieldErrors::new();
        let policy = RebookReaction::schedule_policy(action.rebook_reaction, self.is_rebook());
        let Some(idx) = self.target_instrument(&row.target, &mut errors)? else {
            self.errors.add_instrument_errors(&errors);
            return Ok(());
        };
        let instrument = self.instruments[idx].clone();
        let config = &self.processor.event_schedule_config;

        let mut schedule = {
            let r = FieldResolver::new(&self.values, &self.lookup, self.entities.as_ref());
            let effective_date = r
                .date(&row.effective_date, "effective_date", &mut errors)
                .unwrap_or(self.now);
            EventSchedule {
                id: Uuid::new_v4().to_string(),
                instrument_id: instrument.id.clone(),
                name: r
                    .text(&row.name, "name", &mut errors)
                    .unwrap_or_else(|| config.name.clone()),
                description: r
                    .text(&row.description, "description", &mut errors)
                    .unwrap_or_else(|| config.description.clone()),
                event_class: r
                    .code(&row.event_class, "event_class", &mut errors)
                    .unwrap_or(EventClass::OneOff),
                notification_class: r
                    .code(&row.notification_class, "notification_class", &mut errors)
                    .unwrap_or(config.notification_class),
                notify_in_n_days: r
                    .integer(&row.notify_in_n_days, "notify_in_n_days", &mut errors)
                    .unwrap_or(config.notify_in_n_days),
                periodicity: r.code(&row.periodicity, "periodicity", &mut errors),
                periodicity_n: r
                    .integer(&row.periodicity_n, "periodicity_n", &mut errors)
                    .and_then(|n| i32::try_from(n).ok())
                    .unwrap_or(1),
                effective_date,
                final_date: r
                    .date(&row.final_date, "final_date", &mut errors)
                    .or(instrument.maturity_date)
                    .unwrap_or(effective_date),
                is_auto_generated: false,
                accrual_calculation_schedule_id: None,
                factor_schedule_id: None,
                actions: Vec::new(),
            }
        };
        if !errors.is_empty() {
            self.errors.add_instrument_errors(&errors);
            return Ok(());
        }

        let repository = self.processor.event_schedule_repository.clone();
        if policy.clear && self.should_clear(idx, "event_schedule") {
            for existing in repository
                .get_event_schedules(&instrument.id)?
                .into_iter()
                .filter(|e| !e.is_auto_generated)
            {
                repository.delete_event_schedule(&existing.id).await?;
            }
        }
        if !policy.write {
            return Ok(());
        }
        if policy.upsert {
            if let Some(existing) = repository
                .get_event_schedules(&instrument.id)?
                .into_iter()
                .find(|e| {
                    !e.is_auto_generated
                        && e.name == schedule.name
                        && e.effective_date == schedule.effective_date
                })
            {
                schedule.id = existing.id;
            }
        }
        let saved = repository.save_event_schedule(schedule).await?;
        self.event_schedules.insert(action.order, saved);
        Ok(())
    }

    async fn book_event_action(
        &mut self,
        action: &TransactionTypeAction,
        row: &EventActionRow,
    ) -> Result<()> {
        let mut errors = FieldErrors::new();
        let policy = RebookReaction::schedule_policy(action.rebook_reaction, self.is_rebook());
        if !policy.write {
            return Ok(());
        }
        if !self.event_schedules.contains_key(&row.event_schedule_phantom) {
            add_field_error(
                &mut errors,
                "event_schedule_phantom",
                format!("Event schedule of row {} was not created.", row.event_schedule_phantom),
            );
            self.errors.add_instrument_errors(&errors);
            return Ok(());
        }

        let event_action = {
            let r = FieldResolver::new(&self.values, &self.lookup, self.entities.as_ref());
            EventScheduleAction {
                id: Uuid::new_v4().to_string(),
                transaction_type: r.text(&row.transaction_type, "transaction_type", &mut errors),
                text: r.text(&row.text, "text", &mut errors).unwrap_or_default(),
                is_sent_to_pending: r
                    .boolean(&row.is_sent_to_pending, "is_sent_to_pending", &mut errors)
                    .unwrap_or(false),
                is_book_automatic: r
                    .boolean(&row.is_book_automatic, "is_book_automatic", &mut errors)
                    .unwrap_or(false),
                button_position: r
                    .integer(&row.button_position, "button_position", &mut errors)
                    .and_then(|n| i32::try_from(n).ok())
                    .unwrap_or(0),
            }
        };
        if !errors.is_empty() {
            self.errors.add_instrument_errors(&errors);
            return Ok(());
        }

        let Some(schedule) = self.event_schedules.get_mut(&row.event_schedule_phantom) else {
            return Ok(());
        };
        schedule.actions.push(event_action);
        let saved = self
            .processor
            .event_schedule_repository
            .save_event_schedule(schedule.clone())
            .await?;
        *schedule = saved;
        Ok(())
    }

    // ---- complex transaction ---------------------------------------------

    async fn check_uniqueness(&mut self) -> Result<()> {
        let code = match self
            .transaction_type
            .transaction_unique_code_expr
            .as_deref()
            .filter(|s| !s.trim().is_empty())
        {
            None => None,
            Some(source) => {
                let r = FieldResolver::new(&self.values, &self.lookup, self.entities.as_ref());
                match r.evaluate(source) {
                    Ok(Value::Null) => None,
                    Ok(value) => Some(value_to_code(&value)),
                    Err(e) => {
                        error!("Transaction unique code expression failed: {}", e);
                        None
                    }
                }
            }
        }
        .filter(|c| !c.is_empty());
        self.complex_transaction.transaction_unique_code = code.clone();

        let collisions: Vec<ComplexTransaction> = match &code {
            Some(code) => self
                .processor
                .transaction_repository
                .find_complex_transactions_by_unique_code(code)?
                .into_iter()
                .filter(|ct| !ct.is_deleted && ct.id != self.complex_transaction.id)
                .collect(),
            None => Vec::new(),
        };
        let fresh = if self.is_rebook() {
            UniquenessStatus::Update
        } else {
            UniquenessStatus::Create
        };

        let status = match (self.uniqueness_reaction, code.is_some(), !collisions.is_empty()) {
            (UniquenessReaction::BookWithoutUniqueCode, _, _) => {
                self.complex_transaction.transaction_unique_code = None;
                UniquenessStatus::BookedWithoutUniqueCode
            }
            (_, false, _) | (_, true, false) => fresh,
            (UniquenessReaction::Skip, true, true) => {
                self.errors
                    .add_general(Some(REASON_UNIQUE_CODE_SKIPPED), SKIPPED_BOOK_UNIQUE_CODE);
                UniquenessStatus::Skip
            }
            (UniquenessReaction::TreatAsError, true, true) => {
                self.errors.add_general(
                    Some(REASON_UNIQUE_CODE_ERROR),
                    SKIPPED_BOOK_UNIQUE_CODE_ERROR,
                );
                UniquenessStatus::Error
            }
            (UniquenessReaction::Overwrite, true, true) => {
                let repository = self.processor.transaction_repository.clone();
                for mut collision in collisions {
                    let ids: Vec<String> = repository
                        .get_transactions(&collision.id)?
                        .into_iter()
                        .map(|t| t.id)
                        .collect();
                    if !ids.is_empty() {
                        repository.delete_transactions(&ids).await?;
                    }
                    collision.mark_deleted();
                    info!("Unique code taken by {}, deleting it", collision.code);
                    self.overwritten.push(collision.id.clone());
                    repository.save_complex_transaction(collision).await?;
                }
                UniquenessStatus::Overwrite
            }
        };
        debug!(
            "Unique code {:?}: {:?}",
            self.complex_transaction.transaction_unique_code, status
        );
        self.uniqueness_status = Some(status);
        Ok(())
    }

    fn evaluate_date(&mut self) {
        if !self.complex_transaction.is_persisted() {
            self.complex_transaction.date = self.now;
        }
        let Some(source) = self
            .transaction_type
            .date_expr
            .clone()
            .filter(|s| !s.trim().is_empty())
        else {
            return;
        };
        let mut errors = FieldErrors::new();
        let date = {
            let r = FieldResolver::new(&self.values, &self.lookup, self.entities.as_ref());
            r.date(&Some(ActionField::Expr(source)), "date", &mut errors)
        };
        if let Some(date) = date {
            self.complex_transaction.date = date;
        }
        self.errors.add_complex_transaction_errors(&errors);
    }

    async fn save_complex_transaction(&mut self) -> Result<()> {
        let repository = self.processor.transaction_repository.clone();
        let ct = &mut self.complex_transaction;
        if !ct.is_persisted() {
            ct.id = Uuid::new_v4().to_string();
            ct.code = repository.next_complex_transaction_code()?;
        }
        ct.transaction_type = self.transaction_type.user_code.clone();
        ct.status = self.status;
        if self.member.is_some() {
            ct.owner = self.member.clone();
        }
        ct.inputs = self
            .transaction_type
            .inputs
            .iter()
            .filter_map(|input| {
                self.values
                    .get(&input.name)
                    .filter(|v| !v.is_null())
                    .map(|v| (input.name.clone(), v.clone()))
            })
            .collect();

        let saved = repository.save_complex_transaction(ct.clone()).await?;
        self.complex_transaction = saved;
        Ok(())
    }

    /// Builds ledger rows in declared order. Rows keep the id and code of the
    /// previous row with the same `complex_transaction_order`.
    async fn create_transactions(&mut self, actions: &[TransactionTypeAction]) -> Result<()> {
        let repository = self.processor.transaction_repository.clone();
        let mut previous: BTreeMap<i32, Transaction> = repository
            .get_transactions(&self.complex_transaction.id)?
            .into_iter()
            .map(|t| (t.complex_transaction_order, t))
            .collect();

        let mut order = 0;
        for action in actions {
            let ActionRow::Transaction(row) = &action.row else {
                continue;
            };
            self.cancel.check()?;
            if !self.condition(action) {
                continue;
            }
            order += 1;

            let mut errors = FieldErrors::new();
            let mut transaction = self.build_transaction(row, &mut errors)?;
            if !errors.is_empty() {
                self.errors.add_transaction_errors(&errors);
                continue;
            }

            transaction.complex_transaction_id = Some(self.complex_transaction.id.clone());
            transaction.complex_transaction_order = order;
            match previous.remove(&order) {
                Some(old) => {
                    transaction.id = old.id;
                    transaction.transaction_code = old.transaction_code;
                }
                None => {
                    transaction.id = Uuid::new_v4().to_string();
                    transaction.transaction_code = repository.next_transaction_code()?;
                }
            }
            let saved = repository.save_transaction(transaction).await?;
            self.transactions.push(saved);
        }

        let leftovers: Vec<String> = previous.into_values().map(|t| t.id).collect();
        if !leftovers.is_empty() {
            repository.delete_transactions(&leftovers).await?;
        }
        debug!(
            "Created {} transactions for complex transaction {}",
            self.transactions.len(),
            self.complex_transaction.code
        );
        Ok(())
    }

    fn phantom_or_relation(
        &self,
        r: &FieldResolver<'_>,
        phantom: Option<usize>,
        field: &Option<ActionField>,
        name: &str,
        errors: &mut FieldErrors,
    ) -> Result<Option<String>> {
        if let Some(order) = phantom {
            return Ok(self
                .phantoms
                .get(&order)
                .map(|idx| self.instruments[*idx].id.clone()));
        }
        r.relation(field, name, INSTRUMENT_KIND, errors)
    }

    fn build_transaction(
        &self,
        row: &TransactionAction,
        errors: &mut FieldErrors,
    ) -> Result<Transaction> {
        let r = FieldResolver::new(&self.values, &self.lookup, self.entities.as_ref());
        let date = self.complex_transaction.date;
        let amount = |field: &Option<ActionField>, name: &str, errors: &mut FieldErrors| {
            r.decimal(field, name, errors)
                .unwrap_or(Decimal::ZERO)
                .round_dp(2)
        };
        let number = |field: &Option<ActionField>, name: &str, errors: &mut FieldErrors| {
            r.decimal(field, name, errors).unwrap_or(Decimal::ZERO)
        };

        let mut transaction = Transaction {
            transaction_class: row.transaction_class,
            instrument: self.phantom_or_relation(
                &r,
                row.instrument_phantom,
                &row.instrument,
                "instrument",
                errors,
            )?,
            transaction_currency: r.text(&row.transaction_currency, "transaction_currency", errors),
            position_size_with_sign: number(&row.position_size_with_sign, "position_size_with_sign", errors),
            settlement_currency: r.text(&row.settlement_currency, "settlement_currency", errors),
            cash_consideration: amount(&row.cash_consideration, "cash_consideration", errors),
            principal_with_sign: amount(&row.principal_with_sign, "principal_with_sign", errors),
            carry_with_sign: amount(&row.carry_with_sign, "carry_with_sign", errors),
            overheads_with_sign: amount(&row.overheads_with_sign, "overheads_with_sign", errors),
            accounting_date: r
                .date(&row.accounting_date, "accounting_date", errors)
                .unwrap_or(date),
            cash_date: r.date(&row.cash_date, "cash_date", errors).unwrap_or(date),
            portfolio: r.relation(&row.portfolio, "portfolio", "portfolio", errors)?,
            account_position: r.relation(&row.account_position, "account_position", "account", errors)?,
            account_cash: r.relation(&row.account_cash, "account_cash", "account", errors)?,
            account_interim: r.relation(&row.account_interim, "account_interim", "account", errors)?,
            strategy1_position: r.relation(&row.strategy1_position, "strategy1_position", "strategy1", errors)?,
            strategy1_cash: r.relation(&row.strategy1_cash, "strategy1_cash", "strategy1", errors)?,
            strategy2_position: r.relation(&row.strategy2_position, "strategy2_position", "strategy2", errors)?,
            strategy2_cash: r.relation(&row.strategy2_cash, "strategy2_cash", "strategy2", errors)?,
            strategy3_position: r.relation(&row.strategy3_position, "strategy3_position", "strategy3", errors)?,
            strategy3_cash: r.relation(&row.strategy3_cash, "strategy3_cash", "strategy3", errors)?,
            counterparty: r.relation(&row.counterparty, "counterparty", "counterparty", errors)?,
            responsible: r.relation(&row.responsible, "responsible", "responsible", errors)?,
            linked_instrument: self.phantom_or_relation(
                &r,
                row.linked_instrument_phantom,
                &row.linked_instrument,
                "linked_instrument",
                errors,
            )?,
            allocation_balance: self.phantom_or_relation(
                &r,
                row.allocation_balance_phantom,
                &row.allocation_balance,
                "allocation_balance",
                errors,
            )?,
            allocation_pl: self.phantom_or_relation(
                &r,
                row.allocation_pl_phantom,
                &row.allocation_pl,
                "allocation_pl",
                errors,
            )?,
            reference_fx_rate: number(&row.reference_fx_rate, "reference_fx_rate", errors),
            factor: number(&row.factor, "factor", errors),
            trade_price: number(&row.trade_price, "trade_price", errors),
            is_canceled: r.boolean(&row.is_canceled, "is_canceled", errors).unwrap_or(false),
            notes: r.text(&row.notes, "notes", errors),
            ..Transaction::default()
        };
        transaction.sync_transaction_date();
        Ok(transaction)
    }

    fn evaluate_text_and_user_fields(&mut self) {
        let mut errors = FieldErrors::new();
        let r = FieldResolver::new(&self.values, &self.lookup, self.entities.as_ref());
        let ct = &mut self.complex_transaction;

        if let Some(source) = self.transaction_type.display_expr.as_deref() {
            match r.evaluate(source) {
                Ok(value) if !value.is_null() => ct.text = Some(value_to_code(&value)),
                Ok(_) => {}
                Err(_) => add_field_error(&mut errors, "text", invalid_expression_message(source)),
            }
        }

        for (slot, source) in &self.transaction_type.user_text_exprs {
            let field = format!("user_text_{}", slot);
            if *slot == 0 || *slot > USER_TEXT_SLOTS {
                add_field_error(&mut errors, &field, "Unknown user field.");
                continue;
            }
            if let Some(text) = r.text(&Some(ActionField::expr(source.as_str())), &field, &mut errors) {
                ct.user_text.insert(*slot, text);
            }
        }
        for (slot, source) in &self.transaction_type.user_number_exprs {
            let field = format!("user_number_{}", slot);
            if *slot == 0 || *slot > USER_NUMBER_SLOTS {
                add_field_error(&mut errors, &field, "Unknown user field.");
                continue;
            }
            if let Some(number) = r.decimal(&Some(ActionField::expr(source.as_str())), &field, &mut errors) {
                ct.user_number.insert(*slot, number);
            }
        }
        for (slot, source) in &self.transaction_type.user_date_exprs {
            let field = format!("user_date_{}", slot);
            if *slot == 0 || *slot > USER_DATE_SLOTS {
                add_field_error(&mut errors, &field, "Unknown user field.");
                continue;
            }
            if let Some(date) = r.date(&Some(ActionField::expr(source.as_str())), &field, &mut errors) {
                ct.user_date.insert(*slot, date);
            }
        }
        self.errors.add_complex_transaction_errors(&errors);
    }
}

impl FromStr for ProcessMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "book" => Ok(ProcessMode::Book),
            "rebook" => Ok(ProcessMode::Rebook),
            "recalculate" => Ok(ProcessMode::Recalculate),
            other => Err(Error::Validation(ValidationError::InvalidInput(format!(
                "Unknown process mode '{}'",
                other
            )))),
        }
    }
}
