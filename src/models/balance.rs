//! Coin ledger model
//!
//! A buyer's deposited coins are held as one counter per denomination.
//! Only the five denominations in [`Coin`] exist; every amount the machine
//! handles is therefore a multiple of 5.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A coin accepted by the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Coin {
    Five,
    Ten,
    Twenty,
    Fifty,
    Hundred,
}

impl Coin {
    /// All denominations, largest first.
    pub const DESCENDING: [Coin; 5] = [
        Coin::Hundred,
        Coin::Fifty,
        Coin::Twenty,
        Coin::Ten,
        Coin::Five,
    ];

    /// Face value in cents
    pub fn value(self) -> u32 {
        match self {
            Coin::Five => 5,
            Coin::Ten => 10,
            Coin::Twenty => 20,
            Coin::Fifty => 50,
            Coin::Hundred => 100,
        }
    }

    /// Look up a coin by face value
    pub fn from_value(value: u32) -> Option<Coin> {
        match value {
            5 => Some(Coin::Five),
            10 => Some(Coin::Ten),
            20 => Some(Coin::Twenty),
            50 => Some(Coin::Fifty),
            100 => Some(Coin::Hundred),
            _ => None,
        }
    }
}

/// Rejected face value
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{0} is not an accepted coin (expected one of 5, 10, 20, 50, 100)")]
pub struct InvalidCoin(pub u32);

impl TryFrom<u32> for Coin {
    type Error = InvalidCoin;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Coin::from_value(value).ok_or(InvalidCoin(value))
    }
}

impl From<Coin> for u32 {
    fn from(coin: Coin) -> Self {
        coin.value()
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

/// Per-denomination coin counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinLedger {
    pub five: u32,
    pub ten: u32,
    pub twenty: u32,
    pub fifty: u32,
    pub hundred: u32,
}

impl CoinLedger {
    /// Empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of coins held of one denomination
    pub fn count(&self, coin: Coin) -> u32 {
        match coin {
            Coin::Five => self.five,
            Coin::Ten => self.ten,
            Coin::Twenty => self.twenty,
            Coin::Fifty => self.fifty,
            Coin::Hundred => self.hundred,
        }
    }

    fn count_mut(&mut self, coin: Coin) -> &mut u32 {
        match coin {
            Coin::Five => &mut self.five,
            Coin::Ten => &mut self.ten,
            Coin::Twenty => &mut self.twenty,
            Coin::Fifty => &mut self.fifty,
            Coin::Hundred => &mut self.hundred,
        }
    }

    /// Overwrite the counter of one denomination
    pub fn set(&mut self, coin: Coin, count: u32) {
        *self.count_mut(coin) = count;
    }

    /// Weighted sum of all coins in cents
    pub fn total(&self) -> u64 {
        Coin::DESCENDING
            .iter()
            .map(|&coin| u64::from(self.count(coin)) * u64::from(coin.value()))
            .sum()
    }

    /// Number of physical coins held
    pub fn coin_count(&self) -> u64 {
        Coin::DESCENDING
            .iter()
            .map(|&coin| u64::from(self.count(coin)))
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.coin_count() == 0
    }

    /// Expand the ledger into individual coin values, largest first.
    ///
    /// `{hundred: 2, fifty: 1, five: 1}` becomes `[100, 100, 50, 5]`.
    pub fn to_coin_sequence(&self) -> Vec<u32> {
        let mut coins = Vec::with_capacity(self.coin_count() as usize);
        for coin in Coin::DESCENDING {
            for _ in 0..self.count(coin) {
                coins.push(coin.value());
            }
        }
        coins
    }
}

/// Stored coin ledger of one buyer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Balance {
    /// Owning user (one ledger per user)
    pub user_id: Uuid,
    /// Held coins
    pub coins: CoinLedger,
}

impl Balance {
    /// Zeroed ledger for a freshly registered buyer
    pub fn empty(user_id: Uuid) -> Self {
        Self {
            user_id,
            coins: CoinLedger::new(),
        }
    }
}
