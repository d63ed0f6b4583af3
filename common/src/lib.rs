//! CurRate Common Types
//!
//! Shared types for the CurRate converter: the supported currencies, the
//! exchange rate snapshot model and the clock abstraction.

pub mod currency;
pub mod error;
pub mod rate;
pub mod time;

pub use currency::*;
pub use error::*;
pub use rate::*;
pub use time::*;
