pub mod feed;
pub mod loader;
pub mod types;

pub use feed::{PriceHistory, PriceSource};
pub use loader::PriceLoader;
pub use types::{OptionType, PricePoint, VolatilityEstimate};
