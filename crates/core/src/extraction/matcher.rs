use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::domain::product::Product;
use crate::text::{is_numeric, is_stop_word, normalize, same_word};

use super::synonyms::SynonymTable;

pub const OVERLAP_WEIGHT: u32 = 1;
pub const SYNONYM_WEIGHT: u32 = 2;
pub const SPEC_WEIGHT: u32 = 3;

const UNITS: &[(&str, &str)] = &[
    ("lb", "lb"),
    ("lbs", "lb"),
    ("libra", "lb"),
    ("libras", "lb"),
    ("kg", "kg"),
    ("kgs", "kg"),
    ("kilo", "kg"),
    ("kilos", "kg"),
    ("g", "g"),
    ("gr", "g"),
    ("ml", "ml"),
    ("l", "l"),
    ("lt", "l"),
    ("litro", "l"),
    ("litros", "l"),
    ("liter", "l"),
    ("liters", "l"),
    ("oz", "oz"),
    ("gal", "gal"),
    ("galon", "gal"),
    ("gallon", "gal"),
    ("m", "m"),
    ("mt", "m"),
    ("metro", "m"),
    ("metros", "m"),
    ("cm", "cm"),
    ("mm", "mm"),
    ("in", "in"),
    ("inch", "in"),
    ("pulgadas", "in"),
];

const COLORS: &[(&str, &str)] = &[
    ("red", "red"),
    ("rojo", "red"),
    ("roja", "red"),
    ("white", "white"),
    ("blanco", "white"),
    ("blanca", "white"),
    ("yellow", "yellow"),
    ("amarillo", "yellow"),
    ("amarilla", "yellow"),
    ("blue", "blue"),
    ("azul", "blue"),
    ("green", "green"),
    ("verde", "green"),
    ("black", "black"),
    ("negro", "black"),
    ("negra", "black"),
    ("orange", "orange"),
    ("naranja", "orange"),
    ("gray", "gray"),
    ("grey", "gray"),
    ("gris", "gray"),
];

pub fn canonical_unit(token: &str) -> Option<&'static str> {
    UNITS.iter().find(|(alias, _)| *alias == token).map(|(_, canonical)| *canonical)
}

pub fn is_unit(token: &str) -> bool {
    canonical_unit(token).is_some()
}

pub fn canonical_color(token: &str) -> Option<&'static str> {
    let singular = token.strip_suffix('s').unwrap_or(token);
    COLORS
        .iter()
        .find(|(alias, _)| *alias == token || *alias == singular)
        .map(|(_, canonical)| *canonical)
}

/// Specification token in comparable form: numbers as-is, units and colors canonicalized.
fn spec_form(token: &str) -> Option<String> {
    if is_numeric(token) {
        return Some(token.trim_start_matches('-').to_string());
    }
    canonical_unit(token).or_else(|| canonical_color(token)).map(str::to_string)
}

/// Query side of the match: content words and specification tokens, prepared once per message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryTerms {
    pub normalized: String,
    pub keywords: Vec<String>,
    pub specs: Vec<String>,
}

impl QueryTerms {
    /// `quantity_index` is the token already consumed as the quantity; it never counts as a
    /// specification.
    pub fn new(tokens: &[String], quantity_index: Option<usize>) -> Self {
        let mut keywords = Vec::new();
        let mut specs = Vec::new();
        for (index, token) in tokens.iter().enumerate() {
            if Some(index) == quantity_index {
                continue;
            }
            if let Some(spec) = spec_form(token) {
                if !specs.contains(&spec) {
                    specs.push(spec);
                }
                continue;
            }
            if token.len() > 1 && !is_stop_word(token) && !keywords.contains(token) {
                keywords.push(token.clone());
            }
        }
        Self { normalized: tokens.join(" "), keywords, specs }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchScore {
    pub overlap: u32,
    pub synonym_hits: u32,
    pub spec_matches: u32,
}

impl MatchScore {
    pub fn total(&self) -> u32 {
        self.overlap * OVERLAP_WEIGHT
            + self.synonym_hits * SYNONYM_WEIGHT
            + self.spec_matches * SPEC_WEIGHT
    }

    /// Keyword overlap with the product, where a synonym hit counts as an overlapping keyword in
    /// the customer's own vocabulary (`extintor`, `hard hat`). Spec matches alone (a bare `10` or
    /// `red`) never qualify.
    pub fn is_candidate(&self) -> bool {
        self.overlap + self.synonym_hits > 0
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate<'a> {
    pub product: &'a Product,
    /// Position in the catalog slice; the tie-breaker.
    pub catalog_index: usize,
    pub score: MatchScore,
}

pub fn score_product(query: &QueryTerms, product: &Product, synonyms: &SynonymTable) -> MatchScore {
    let name = normalize(&product.name);
    let name_tokens = name.split_whitespace().collect::<Vec<_>>();

    let overlap = query
        .keywords
        .iter()
        .filter(|keyword| name_tokens.iter().any(|token| same_word(token, keyword)))
        .count();

    let product_text = format!("{name} {}", normalize(&product.description));
    let synonym_hits = synonyms.hits(&query.normalized, &product_text);

    let name_specs = name_tokens.iter().filter_map(|token| spec_form(token)).collect::<Vec<_>>();
    let spec_matches = query.specs.iter().filter(|spec| name_specs.contains(spec)).count();

    MatchScore {
        overlap: u32::try_from(overlap).unwrap_or(u32::MAX),
        synonym_hits,
        spec_matches: u32::try_from(spec_matches).unwrap_or(u32::MAX),
    }
}

/// Active products with naming evidence, best first. Equal totals keep catalog order.
pub fn rank<'a>(
    query: &QueryTerms,
    catalog: &'a [Product],
    synonyms: &SynonymTable,
) -> Vec<Candidate<'a>> {
    let mut candidates = catalog
        .iter()
        .enumerate()
        .filter(|(_, product)| product.active)
        .map(|(catalog_index, product)| Candidate {
            product,
            catalog_index,
            score: score_product(query, product, synonyms),
        })
        .filter(|candidate| candidate.score.is_candidate())
        .collect::<Vec<_>>();

    candidates.sort_by(|left, right| match right.score.total().cmp(&left.score.total()) {
        Ordering::Equal => left.catalog_index.cmp(&right.catalog_index),
        other => other,
    });
    candidates
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{rank, score_product, QueryTerms};
    use crate::domain::product::{Product, ProductId};
    use crate::extraction::synonyms::SynonymTable;
    use crate::text::tokenize;

    fn product(id: i64, name: &str) -> Product {
        Product {
            id: ProductId(id),
            name: name.to_string(),
            description: String::new(),
            price: Decimal::new(10_000, 0),
            stock: 5,
            category: None,
            active: true,
        }
    }

    fn terms(message: &str, quantity_index: Option<usize>) -> QueryTerms {
        QueryTerms::new(&tokenize(message), quantity_index)
    }

    #[test]
    fn query_terms_separate_keywords_from_specs() {
        let query = terms("I want 3 red extinguishers 20 lb", Some(2));
        assert_eq!(query.keywords, vec!["extinguishers"]);
        assert_eq!(query.specs, vec!["red", "20", "lb"]);
    }

    #[test]
    fn score_weights_overlap_synonyms_and_specs() {
        let synonyms = SynonymTable::default();
        let query = terms("extinguisher 20 lb", None);
        let score = score_product(&query, &product(1, "Fire Extinguisher ABC 20 lb"), &synonyms);
        assert_eq!(score.overlap, 1);
        assert_eq!(score.synonym_hits, 1);
        assert_eq!(score.spec_matches, 2);
        assert_eq!(score.total(), 1 + 2 + 6);
    }

    #[test]
    fn spec_only_matches_are_not_candidates() {
        let synonyms = SynonymTable::default();
        let catalog = vec![product(1, "Safety Vest Orange"), product(2, "Traffic Cone Orange")];
        assert!(rank(&terms("orange", None), &catalog, &synonyms).is_empty());
    }

    #[test]
    fn ties_keep_catalog_order_across_runs() {
        let synonyms = SynonymTable::default();
        let catalog = vec![
            product(5, "Nitrile Gloves M"),
            product(2, "Nitrile Gloves L"),
            product(9, "Leather Gloves"),
        ];
        let query = terms("nitrile gloves", None);
        for _ in 0..5 {
            let ranked = rank(&query, &catalog, &synonyms);
            let ids = ranked.iter().map(|candidate| candidate.product.id.0).collect::<Vec<_>>();
            assert_eq!(ids, vec![5, 2, 9]);
        }
    }

    #[test]
    fn inactive_products_are_skipped() {
        let synonyms = SynonymTable::default();
        let mut retired = product(1, "Safety Helmet White");
        retired.active = false;
        let catalog = vec![retired, product(2, "Safety Helmet Yellow")];
        let ranked = rank(&terms("helmet", None), &catalog, &synonyms);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].product.id.0, 2);
    }
}
