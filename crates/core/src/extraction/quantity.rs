use thiserror::Error;

use crate::domain::order::{MAX_QUANTITY, MIN_QUANTITY};
use crate::text::is_numeric;

use super::matcher::is_unit;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum QuantityError {
    #[error("quantity {0} must be at least {MIN_QUANTITY}")]
    NonPositive(i64),
    #[error("quantity {0} exceeds the maximum of {MAX_QUANTITY}")]
    TooLarge(i64),
}

impl QuantityError {
    /// Shown to the customer verbatim.
    pub fn user_message(&self) -> String {
        match self {
            Self::NonPositive(value) => format!(
                "The quantity must be at least {MIN_QUANTITY}; I can't add {value} units. \
                 How many would you like?"
            ),
            Self::TooLarge(value) => format!(
                "We can take up to {MAX_QUANTITY} units per item in one order, and you asked \
                 for {value}. How many would you like?"
            ),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuantityToken {
    pub value: i64,
    /// Position in the normalized token stream, so spec matching can skip it.
    pub token_index: usize,
}

/// First standalone integer in the token stream. A number directly followed by a unit (`10 lb`)
/// describes the product, not the quantity, and is skipped.
pub fn find_quantity(tokens: &[String]) -> Option<QuantityToken> {
    tokens.iter().enumerate().find_map(|(index, token)| {
        if !is_numeric(token) {
            return None;
        }
        if tokens.get(index + 1).is_some_and(|next| is_unit(next)) {
            return None;
        }
        Some(QuantityToken { value: parse_saturating(token), token_index: index })
    })
}

pub fn validate_quantity(value: i64) -> Result<u32, QuantityError> {
    if value < i64::from(MIN_QUANTITY) {
        return Err(QuantityError::NonPositive(value));
    }
    if value > i64::from(MAX_QUANTITY) {
        return Err(QuantityError::TooLarge(value));
    }
    u32::try_from(value).map_err(|_| QuantityError::TooLarge(value))
}

fn parse_saturating(token: &str) -> i64 {
    token.parse::<i64>().unwrap_or(if token.starts_with('-') { i64::MIN } else { i64::MAX })
}
