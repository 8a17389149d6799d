use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Currencies handled by the backend.
///
/// Governed wallet-to-wallet transfers are denominated in the stablecoin;
/// the native coin only appears in fee transactions and deposits.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Sol,
    Usdc,
}

impl Currency {
    pub fn is_stablecoin(&self) -> bool {
        matches!(self, Currency::Usdc)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Sol => "SOL",
            Currency::Usdc => "USDC",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Currency {
    type Err = UnknownCurrency;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SOL" => Ok(Currency::Sol),
            "USDC" => Ok(Currency::Usdc),
            other => Err(UnknownCurrency(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown currency: {0}")]
pub struct UnknownCurrency(pub String);
