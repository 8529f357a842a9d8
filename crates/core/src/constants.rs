/// Quantity threshold for significant positions
pub const QUANTITY_THRESHOLD: &str = "0.00000001";

/// Relative tolerance used when comparing floating point factors
pub const FLOAT_REL_TOLERANCE: f64 = 1e-9;

/// Face value used by the bond-math layer
pub const FACE_VALUE: f64 = 100.0;

/// Upper bound on schedule stepping (about 10,000 years of daily steps)
pub const MAX_PERIOD_STEPS: usize = 3_652_058;

/// Maturity date used for perpetual instruments
pub const PERPETUAL_MATURITY: (i32, u32, u32) = (9999, 12, 31);

/// Label used by grouping and subtotals when a value is absent
pub const NO_DATA: &str = "No Data";

/// Number of user-defined slots on a complex transaction
pub const USER_TEXT_SLOTS: u8 = 30;
pub const USER_NUMBER_SLOTS: u8 = 20;
pub const USER_DATE_SLOTS: u8 = 5;

/// Number of phantom instrument names seeded into a processor namespace
pub const PHANTOM_INSTRUMENT_SLOTS: usize = 10;

/// Evaluator limits
pub const MAX_EXPRESSION_STRING_LEN: usize = 20_000;
pub const MAX_EXPRESSION_EXPONENT: i64 = 10_000;
pub const MAX_EXPRESSION_LIST_LEN: usize = 1_000;
