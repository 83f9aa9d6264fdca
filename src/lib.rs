//! Concentrated-liquidity AMM pool engine: fixed-point tick math, a tick
//! bitmap and book, a per-position fee ledger, a TWAP oracle, the swap-step
//! calculator, and the [`pool::PoolEngine`] state machine tying them
//! together.

pub mod bit_math;
pub mod callback;
pub mod error;
pub mod full_math;
pub mod oracle;
pub mod pool;
pub mod position;
pub mod sqrt_price_math;
pub mod swap_math;
pub mod tick;
pub mod tick_bitmap;
pub mod tick_math;
pub mod unsafe_math;
pub mod utils;

pub use callback::{PaymentCallback, TokenId, TokenVault};
pub use error::{PoolError, Result};
pub use pool::{PoolEngine, ProtocolFees, Slot0};
