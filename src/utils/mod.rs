//! Utility functions for struct-log reconstruction
//!
//! # Modules
//!
//! - [`gas_utils`]: Gas parameters and formulas
//!   - Named gas schedule with overrides
//!   - Memory expansion cost
//!   - Call forwarding (all but one 64th) rule
//!
//! - [`state_utils`]: State accessors
//!   - In-memory state
//!   - revm database bridge

/// Gas calculation utilities
pub mod gas_utils;

/// State accessor implementations
pub mod state_utils;
