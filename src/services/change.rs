//! Change engine
//!
//! Greedy change-making over the fixed coin set. Every coin divides the sum
//! of the smaller ones cleanly enough that the greedy answer is also the one
//! with the fewest coins.

use crate::models::{Coin, CoinLedger};

/// Compute the change owed after paying `cost` out of `paid`.
///
/// The whole ledger is handed over and the remainder comes back as new
/// coins, largest denominations first. The returned ledger replaces the
/// buyer's previous one.
///
/// Callers check affordability first. A `cost` above the ledger total yields
/// an empty ledger. A remainder that is not a multiple of 5 keeps the
/// fraction in the machine.
pub fn compute_change(cost: u64, paid: &CoinLedger) -> CoinLedger {
    let mut remainder = paid.total().saturating_sub(cost);
    let mut change = CoinLedger::new();

    for coin in Coin::DESCENDING {
        if remainder == 0 {
            break;
        }
        let value = u64::from(coin.value());
        let count = remainder / value;
        remainder -= count * value;
        change.set(coin, u32::try_from(count).unwrap_or(u32::MAX));
    }

    change
}
