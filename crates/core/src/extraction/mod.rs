//! Product and quantity extraction from free text.
//!
//! Every active product is scored against the message; the best candidate wins and close
//! runners-up are reported as ambiguity rather than surfaced to the customer.

pub mod matcher;
pub mod quantity;
pub mod synonyms;

use crate::domain::product::{Product, ProductId};
use crate::text::tokenize;

pub use matcher::{rank, score_product, Candidate, MatchScore, QueryTerms};
pub use quantity::{find_quantity, validate_quantity, QuantityError, QuantityToken};
pub use synonyms::{SynonymGroup, SynonymTable};

/// Runner-up scores at or above this share of the top score are logged as ambiguous.
pub const AMBIGUITY_RATIO_PERCENT: u32 = 80;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedEntity {
    pub product: Product,
    pub quantity: u32,
    /// The message carried no quantity and 1 was assumed.
    pub quantity_defaulted: bool,
    pub score: MatchScore,
    pub ambiguous_with: Vec<ProductId>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Extraction {
    /// No product was named.
    None,
    /// A product was named with an out-of-range quantity.
    Invalid(QuantityError),
    Resolved(ResolvedEntity),
}

#[derive(Clone, Debug, Default)]
pub struct EntityExtractor {
    synonyms: SynonymTable,
}

impl EntityExtractor {
    pub fn new(synonyms: SynonymTable) -> Self {
        Self { synonyms }
    }

    pub fn extract(&self, message: &str, catalog: &[Product]) -> Extraction {
        let tokens = tokenize(message);
        let quantity = find_quantity(&tokens);
        let query = QueryTerms::new(&tokens, quantity.map(|token| token.token_index));

        let candidates = rank(&query, catalog, &self.synonyms);
        let Some(top) = candidates.first() else {
            return Extraction::None;
        };

        let (quantity, quantity_defaulted) = match quantity {
            Some(token) => match validate_quantity(token.value) {
                Ok(value) => (value, false),
                Err(error) => {
                    tracing::info!(
                        event_name = "extraction.quantity_rejected",
                        product_id = %top.product.id,
                        quantity = token.value,
                        "quantity outside accepted range"
                    );
                    return Extraction::Invalid(error);
                }
            },
            None => (1, true),
        };

        let top_total = top.score.total();
        let ambiguous_with = candidates[1..]
            .iter()
            .filter(|candidate| candidate.score.total() * 100 >= top_total * AMBIGUITY_RATIO_PERCENT)
            .map(|candidate| candidate.product.id)
            .collect::<Vec<_>>();

        if !ambiguous_with.is_empty() {
            tracing::warn!(
                event_name = "extraction.ambiguous_match",
                chosen_product_id = %top.product.id,
                chosen_score = top_total,
                competing = ?ambiguous_with,
                "multiple catalog candidates within 80% of the top score; picking the first"
            );
        }

        Extraction::Resolved(ResolvedEntity {
            product: top.product.clone(),
            quantity,
            quantity_defaulted,
            score: top.score,
            ambiguous_with,
        })
    }
}
