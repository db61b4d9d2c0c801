//! Gas calculation utilities
//!
//! Provides the gas parameters the tracer needs and the formulas built on
//! them: memory expansion, hashing surcharge and call forwarding.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use alloy::primitives::U256;
use revm::interpreter::gas::{CALLVALUE, KECCAK256WORD, MEMORY, NEWACCOUNT};
use serde::Deserialize;

use crate::{errors::ConfigError, traits::GasSchedule, types::WORD_SIZE};

/// Constant part of the call family since EIP-150
pub const CALL: u64 = 700;

/// Denominator of the quadratic memory cost term
pub const QUAD_COEFF_DIV: u64 = 512;

/// Gas parameters used by the reconstructor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GasParam {
    /// Constant gas of CALL, STATICCALL and DELEGATECALL
    Call,
    /// Surcharge for calls transferring value
    CallValueTransfer,
    /// Surcharge for calls transferring value to an empty account
    CallNewAccount,
    /// Hashing cost per 32-byte word
    Keccak256Word,
    /// Linear memory cost per word
    Memory,
    /// Denominator of the quadratic memory cost
    QuadCoeffDiv,
}

impl GasParam {
    /// All parameters
    pub const ALL: [GasParam; 6] = [
        GasParam::Call,
        GasParam::CallValueTransfer,
        GasParam::CallNewAccount,
        GasParam::Keccak256Word,
        GasParam::Memory,
        GasParam::QuadCoeffDiv,
    ];

    /// Name of the parameter as used in gas schedules
    pub const fn name(self) -> &'static str {
        match self {
            GasParam::Call => "call",
            GasParam::CallValueTransfer => "callValueTransfer",
            GasParam::CallNewAccount => "callNewAccount",
            GasParam::Keccak256Word => "keccak256Word",
            GasParam::Memory => "memory",
            GasParam::QuadCoeffDiv => "quadCoeffDiv",
        }
    }

    /// Mainnet value of the parameter
    pub const fn default_value(self) -> u64 {
        match self {
            GasParam::Call => CALL,
            GasParam::CallValueTransfer => CALLVALUE,
            GasParam::CallNewAccount => NEWACCOUNT,
            GasParam::Keccak256Word => KECCAK256WORD,
            GasParam::Memory => MEMORY,
            GasParam::QuadCoeffDiv => QUAD_COEFF_DIV,
        }
    }
}

impl fmt::Display for GasParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for GasParam {
    type Err = ConfigError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        GasParam::ALL
            .into_iter()
            .find(|param| param.name() == name)
            .ok_or_else(|| ConfigError::UnknownGasParam(name.to_string()))
    }
}

/// Mainnet gas schedule with optional per-parameter overrides
///
/// Deserializes from a map of parameter names to values, e.g.
/// `{"call": 0, "callNewAccount": 25000}`. Unknown names are rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "HashMap<String, u64>")]
pub struct GasParams {
    overrides: HashMap<GasParam, u64>,
}

impl GasParams {
    /// Creates a schedule with mainnet values
    pub fn new() -> Self {
        Default::default()
    }

    /// Overrides `param` with `value`
    pub fn with(mut self, param: GasParam, value: u64) -> Self {
        self.overrides.insert(param, value);
        self
    }

    /// Overrides the parameter called `name` with `value`
    pub fn with_named(self, name: &str, value: u64) -> Result<Self, ConfigError> {
        Ok(self.with(name.parse()?, value))
    }

    /// Looks up a parameter by name
    pub fn by_name(&self, name: &str) -> Option<u64> {
        name.parse().ok().map(|param| self.gas_param(param))
    }
}

impl TryFrom<HashMap<String, u64>> for GasParams {
    type Error = ConfigError;

    fn try_from(values: HashMap<String, u64>) -> Result<Self, Self::Error> {
        values
            .into_iter()
            .try_fold(GasParams::new(), |params, (name, value)| {
                params.with_named(&name, value)
            })
    }
}

impl GasSchedule for GasParams {
    fn gas_param(&self, param: GasParam) -> u64 {
        self.overrides
            .get(&param)
            .copied()
            .unwrap_or_else(|| param.default_value())
    }
}

/// Number of words needed to hold `bytes` bytes
pub fn words_for(bytes: u64) -> u64 {
    bytes.div_ceil(WORD_SIZE as u64)
}

/// Converts a stack value to `u64`, saturating values that do not fit
pub fn saturating_u64(value: U256) -> u64 {
    value.saturating_to()
}

/// End of the memory region `[offset, offset + size)`
///
/// A zero-sized region never touches memory, whatever its offset.
pub fn memory_end(offset: U256, size: U256) -> u64 {
    if size.is_zero() {
        0
    } else {
        saturating_u64(offset).saturating_add(saturating_u64(size))
    }
}

/// Total memory cost of `words` words
pub fn memory_cost<G: GasSchedule>(schedule: &G, words: u64) -> u64 {
    let words = u128::from(words);
    let linear = words * u128::from(schedule.gas_param(GasParam::Memory));
    let quadratic = words * words / u128::from(schedule.gas_param(GasParam::QuadCoeffDiv).max(1));
    u64::try_from(linear.saturating_add(quadratic)).unwrap_or(u64::MAX)
}

/// Cost of growing memory from `current_words` to `next_words`
///
/// Zero when memory does not grow.
pub fn memory_expansion_cost<G: GasSchedule>(
    schedule: &G,
    current_words: u64,
    next_words: u64,
) -> u64 {
    if next_words <= current_words {
        0
    } else {
        memory_cost(schedule, next_words).saturating_sub(memory_cost(schedule, current_words))
    }
}

/// Hashing surcharge for `size` bytes of input
pub fn keccak_word_cost<G: GasSchedule>(schedule: &G, size: u64) -> u64 {
    schedule
        .gas_param(GasParam::Keccak256Word)
        .saturating_mul(words_for(size))
}

/// Gas forwarded to a sub-call
///
/// At most all but one 64th of `gas_left` may be forwarded, further capped by
/// the amount the caller requested.
pub fn forwarded_gas(gas_left: u64, requested: U256) -> u64 {
    let capped = gas_left - gas_left / 64;
    capped.min(saturating_u64(requested))
}
