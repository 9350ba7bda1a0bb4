//! Execution results reported back by the executor.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Which side of a swap an execution record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionSide {
    Buy,
    Sell,
}

impl ExecutionSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionSide::Buy => "buy",
            ExecutionSide::Sell => "sell",
        }
    }
}

/// Outcome of a buy or sell submitted by the executor.
///
/// For a buy, `input_amount` is native currency spent and `output_amount` is
/// tokens received. For a sell it is the other way round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub tx_id: String,
    pub instrument_address: String,
    pub input_amount: Decimal,
    pub output_amount: Decimal,
    /// Realized price per token in native currency
    pub price: Decimal,
    /// Price impact in percent
    pub slippage: Decimal,
    /// Fee paid in native currency
    pub fee: Decimal,
    #[serde(default)]
    pub error_message: String,
}

impl ExecutionResult {
    /// Failed execution carrying only an error message.
    pub fn failed(address: impl Into<String>, input_amount: Decimal, message: impl Into<String>) -> Self {
        Self {
            success: false,
            tx_id: String::new(),
            instrument_address: address.into(),
            input_amount,
            output_amount: Decimal::ZERO,
            price: Decimal::ZERO,
            slippage: Decimal::ZERO,
            fee: Decimal::ZERO,
            error_message: message.into(),
        }
    }
}
