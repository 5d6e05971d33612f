//! Price sources.

pub mod provider;
pub mod tiingo;

pub use provider::{FetchRequest, FetchResult, PriceProvider};
pub use tiingo::TiingoProvider;
