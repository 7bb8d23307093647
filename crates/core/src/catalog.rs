//! Catalog presentation: category inference, base-name grouping and text rendering.
//!
//! Rendering is a pure function of the product slice, so the same catalog snapshot always
//! produces the same text.

use std::collections::BTreeMap;

use rust_decimal::{Decimal, RoundingStrategy};

use crate::domain::product::Product;
use crate::extraction::matcher::{canonical_color, is_unit};
use crate::text::{contains_phrase, is_numeric, normalize};

/// Prefix telling the composer to show the list in full instead of summarizing it.
pub const CATALOG_MARKER: &str = "CATALOG:";

const CATEGORY_RULES: &[(&str, &[&str])] = &[
    (
        "Fire safety",
        &["extinguisher", "extintor", "extintores", "fire", "incendio", "hose", "manguera", "gabinete"],
    ),
    (
        "Personal protective equipment",
        &[
            "helmet", "casco", "glove", "gloves", "guante", "guantes", "goggles", "gafas", "vest",
            "chaleco", "mask", "mascarilla", "respirator", "respirador", "boot", "boots", "bota",
            "botas", "earplug", "earplugs", "harness", "arnes",
        ],
    ),
    ("Signage", &["sign", "signs", "senal", "senales", "cone", "cono", "tape", "cinta"]),
    ("First aid", &["first aid", "botiquin", "bandage", "venda", "stretcher", "camilla"]),
];

const OTHER_CATEGORY: &str = "Other";

/// Display category, inferred from the name before falling back to the stored category.
pub fn infer_category(product: &Product) -> String {
    let name = normalize(&product.name);
    CATEGORY_RULES
        .iter()
        .find(|(_, words)| words.iter().any(|word| contains_phrase(&name, word)))
        .map(|(category, _)| (*category).to_string())
        .or_else(|| product.category.clone().filter(|category| !category.trim().is_empty()))
        .unwrap_or_else(|| OTHER_CATEGORY.to_string())
}

fn is_variant_token(normalized_word: &str) -> bool {
    normalized_word.is_empty()
        || is_numeric(normalized_word)
        || is_unit(normalized_word)
        || canonical_color(normalized_word).is_some()
        || normalized_word.chars().any(|character| character.is_ascii_digit())
}

/// Product name with sizes, units and colors removed, in the original casing.
pub fn base_name(name: &str) -> String {
    let kept = name
        .split_whitespace()
        .filter(|word| {
            let normalized = normalize(word);
            !normalized.split_whitespace().all(is_variant_token)
        })
        .collect::<Vec<_>>();
    if kept.is_empty() {
        name.trim().to_string()
    } else {
        kept.join(" ")
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProductGroup {
    pub base_name: String,
    /// Cheapest first; equal prices keep id order.
    pub variants: Vec<Product>,
}

/// Groups products sharing a base name. Groups appear in first-seen order.
pub fn group_by_base_name(products: &[Product]) -> Vec<ProductGroup> {
    let mut groups: Vec<ProductGroup> = Vec::new();
    let mut index_by_key: BTreeMap<String, usize> = BTreeMap::new();

    for product in products {
        let display = base_name(&product.name);
        let key = normalize(&display);
        match index_by_key.get(&key) {
            Some(&index) => groups[index].variants.push(product.clone()),
            None => {
                index_by_key.insert(key, groups.len());
                groups.push(ProductGroup { base_name: display, variants: vec![product.clone()] });
            }
        }
    }

    for group in &mut groups {
        group.variants.sort_by(|left, right| {
            left.price.cmp(&right.price).then_with(|| left.id.cmp(&right.id))
        });
    }
    groups
}

/// `$85,000` or `$12,500.50`.
pub fn format_price(price: Decimal) -> String {
    let rounded = price.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let negative = rounded.is_sign_negative();
    let text = rounded.abs().normalize().to_string();
    let (whole, fraction) = match text.split_once('.') {
        Some((whole, fraction)) => (whole.to_string(), Some(fraction.to_string())),
        None => (text, None),
    };

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (index, digit) in whole.chars().enumerate() {
        if index > 0 && (whole.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if negative { "-" } else { "" };
    match fraction {
        Some(fraction) => format!("{sign}${grouped}.{fraction:0<2}"),
        None => format!("{sign}${grouped}"),
    }
}

/// One line per single-variant group, a bulleted sub-list for families.
pub fn render_groups(groups: &[ProductGroup]) -> String {
    let mut lines = Vec::new();
    for group in groups {
        match group.variants.as_slice() {
            [single] => lines.push(format!("- {}: {}", single.name, format_price(single.price))),
            variants => {
                lines.push(format!("- {}:", group.base_name));
                for variant in variants {
                    lines.push(format!("  - {}: {}", variant.name, format_price(variant.price)));
                }
            }
        }
    }
    lines.join("\n")
}

/// Full browse listing of available products, grouped by category, tagged with
/// [`CATALOG_MARKER`].
pub fn render_catalog(products: &[Product]) -> String {
    let available = products.iter().filter(|product| product.is_available()).collect::<Vec<_>>();
    if available.is_empty() {
        return format!("{CATALOG_MARKER}\nWe have no products available right now.");
    }

    let mut by_category: Vec<(String, Vec<Product>)> = Vec::new();
    for product in available {
        let category = infer_category(product);
        match by_category.iter_mut().find(|(name, _)| *name == category) {
            Some((_, members)) => members.push(product.clone()),
            None => by_category.push((category, vec![product.clone()])),
        }
    }
    by_category.sort_by_key(|(category, _)| category_rank(category));

    let mut sections = vec![CATALOG_MARKER.to_string()];
    for (category, members) in by_category {
        sections.push(format!("{category}:\n{}", render_groups(&group_by_base_name(&members))));
    }
    sections.join("\n\n")
}

fn category_rank(category: &str) -> usize {
    CATEGORY_RULES
        .iter()
        .position(|(known, _)| *known == category)
        .unwrap_or(CATEGORY_RULES.len())
}
