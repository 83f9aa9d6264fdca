//! External collaborators the pool engine invokes but does not own: balance
//! reads/transfers and the payment callbacks through which callers settle
//! what they owe. Modeled as generic type parameters on `PoolEngine`, the
//! same way the teacher's `Math<Provider>` takes its tick data source as a
//! generic `TicksProvider` rather than a trait object.

use crate::error::PoolError;
use alloy_primitives::{I256, U256};

/// Token identifiers are opaque to the engine; it only ever compares or
/// forwards them.
pub type TokenId = u64;

pub trait TokenVault {
    fn balance_of(&self, token: TokenId, account: u64) -> Result<U256, PoolError>;
    fn transfer(&mut self, token: TokenId, to: u64, amount: U256) -> Result<(), PoolError>;
}

/// Invoked by the engine after it has recorded what the caller owes; each
/// callback must ensure the stated post-balance before returning.
pub trait PaymentCallback {
    fn on_mint_payment(&mut self, owed_0: U256, owed_1: U256, data: &[u8]) -> Result<(), PoolError>;

    /// `delta0`/`delta1` are signed: positive means the caller owes the pool.
    fn on_swap_payment(&mut self, delta_0: I256, delta_1: I256, data: &[u8]) -> Result<(), PoolError>;

    fn on_flash_payment(&mut self, fee_0: U256, fee_1: U256, data: &[u8]) -> Result<(), PoolError>;
}
