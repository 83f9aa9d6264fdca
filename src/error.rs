use thiserror::Error;

/// Error taxonomy for the pool engine and its math components.
///
/// Every fallible operation in this crate returns one of these kinds; there is
/// no retry policy baked in here, callers decide what to do with a rejected
/// call. All errors abort the calling operation with no observable state
/// change.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    #[error("pool has not been initialized")]
    NotInitialized,
    #[error("pool is already initialized")]
    AlreadyInitialized,
    #[error("reentrant call into a locked pool")]
    Locked,
    #[error("tick range is invalid")]
    InvalidTickRange,
    #[error("tick is out of bounds")]
    TickOutOfBounds,
    #[error("tick is not a multiple of tick spacing")]
    TickNotSpaced,
    #[error("liquidity gross exceeds maxLiquidityPerTick")]
    LiquidityOverflow,
    #[error("payment callback did not deliver the required input amount")]
    InsufficientInputAmount,
    #[error("sqrtPriceLimitX96 is out of range for the swap direction")]
    PriceLimitOutOfRange,
    #[error("fixed point arithmetic overflowed")]
    Overflow,
    #[error("requested observation predates the oldest stored observation")]
    OracleOld,
    #[error("amount must be non-zero")]
    ZeroAmount,
    #[error("caller is not authorized for this operation")]
    Unauthorized,
    #[error("feeProtocol nibble must be 0 or in [4, 10]")]
    InvalidFeeProtocol,
}

pub type Result<T> = core::result::Result<T, PoolError>;
