//! Customer-data slot detection.
//!
//! Detection is best effort. The [`SlotDetector`] trait is the seam where a model-based detector
//! can replace [`HeuristicSlotDetector`] without touching the checkout flow.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::order::CustomerSlot;
use crate::text::{contains_phrase, normalize};

static NUMBER_ONLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[\d\s.\-()]+$").expect("number pattern compiles"));
static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[a-z0-9._%+\-]+@[a-z0-9\-]+(\.[a-z0-9\-]+)+").expect("email pattern compiles")
});
static STREET_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+\s*[a-zA-Z]?\s*#\s*\d+").expect("address pattern compiles"));

const ADDRESS_WORDS: &[&str] = &[
    "calle", "cl", "carrera", "cra", "kr", "avenida", "av", "diagonal", "dg", "transversal", "tv",
    "autopista", "apto", "apartamento", "torre", "street", "st", "avenue", "ave", "road", "rd",
    "apt", "apartment", "suite", "building",
];

const NEIGHBORHOOD_WORDS: &[&str] =
    &["barrio", "neighborhood", "neighbourhood", "sector", "urbanizacion", "conjunto", "district"];

const INSTRUCTION_WORDS: &[&str] = &[
    "none", "no", "nothing", "n a", "ninguna", "ninguno", "nada", "deliver", "leave", "ring",
    "call", "knock", "gate", "doorman", "entregar", "dejar", "porteria", "portero", "timbre",
    "llamar", "after", "before", "morning", "afternoon", "manana", "tarde",
];

/// Lead-ins stripped from the stored value, paired with the slot they announce.
const PREFIXES: &[(&str, CustomerSlot)] = &[
    ("my name is", CustomerSlot::FullName),
    ("mi nombre es", CustomerSlot::FullName),
    ("me llamo", CustomerSlot::FullName),
    ("soy", CustomerSlot::FullName),
    ("my phone is", CustomerSlot::Phone),
    ("my number is", CustomerSlot::Phone),
    ("mi celular es", CustomerSlot::Phone),
    ("mi telefono es", CustomerSlot::Phone),
    ("my id is", CustomerSlot::NationalId),
    ("mi cedula es", CustomerSlot::NationalId),
    ("cedula", CustomerSlot::NationalId),
    ("my address is", CustomerSlot::Address),
    ("mi direccion es", CustomerSlot::Address),
    ("i live at", CustomerSlot::Address),
    ("my neighborhood is", CustomerSlot::Neighborhood),
    ("mi barrio es", CustomerSlot::Neighborhood),
    ("barrio", CustomerSlot::Neighborhood),
    ("neighborhood", CustomerSlot::Neighborhood),
    ("instructions", CustomerSlot::ExtraInstructions),
    ("instrucciones", CustomerSlot::ExtraInstructions),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotRule {
    Phone,
    NationalId,
    Email,
    Prefix,
    AddressKeyword,
    NeighborhoodKeyword,
    CapitalizedName,
    InstructionKeyword,
    FirstMissing,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotMatch {
    pub slot: CustomerSlot,
    pub value: String,
    pub rule: SlotRule,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SlotRejection {
    #[error("no customer data slots are missing")]
    NothingMissing,
    #[error("empty slot value")]
    Empty,
    #[error("number `{0}` is neither a mobile phone nor a national id")]
    InvalidNumber(String),
    #[error("{0:?} expects a number")]
    ExpectedNumber(CustomerSlot),
    #[error("{0:?} is already filled")]
    AlreadyFilled(CustomerSlot),
}

impl SlotRejection {
    pub fn user_message(&self) -> String {
        match self {
            Self::NothingMissing => "I already have all your details.".to_string(),
            Self::Empty => "I didn't catch that.".to_string(),
            Self::InvalidNumber(_) => "That number doesn't look right. A mobile number has 10 \
                digits and starts with 3; an ID number has 6 to 10 digits."
                .to_string(),
            Self::ExpectedNumber(slot) => format!("I need your {} as digits only.", slot.label()),
            Self::AlreadyFilled(slot) => format!("I already have your {}.", slot.label()),
        }
    }
}

pub trait SlotDetector: Send + Sync {
    /// Assigns the message to one of the `missing` slots.
    fn detect(&self, message: &str, missing: &[CustomerSlot]) -> Result<SlotMatch, SlotRejection>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct HeuristicSlotDetector;

impl SlotDetector for HeuristicSlotDetector {
    fn detect(&self, message: &str, missing: &[CustomerSlot]) -> Result<SlotMatch, SlotRejection> {
        let Some(first_missing) = missing.first().copied() else {
            return Err(SlotRejection::NothingMissing);
        };
        let (announced, value) = strip_prefix(message.trim());
        if value.is_empty() {
            return Err(SlotRejection::Empty);
        }
        let is_missing = |slot: CustomerSlot| missing.contains(&slot);
        let found = |slot, rule| Ok(SlotMatch { slot, value: value.to_string(), rule });

        if NUMBER_ONLY.is_match(value) {
            return detect_number(value, missing);
        }

        if EMAIL.is_match(value) {
            if is_missing(CustomerSlot::ExtraInstructions) {
                return found(CustomerSlot::ExtraInstructions, SlotRule::Email);
            }
            return Err(SlotRejection::AlreadyFilled(CustomerSlot::ExtraInstructions));
        }

        if let Some(slot) = announced {
            if matches!(slot, CustomerSlot::Phone | CustomerSlot::NationalId) {
                return Err(SlotRejection::ExpectedNumber(slot));
            }
            if is_missing(slot) {
                return found(slot, SlotRule::Prefix);
            }
        }

        let normalized = normalize(value);
        let has_any = |words: &[&str]| words.iter().any(|word| contains_phrase(&normalized, word));

        if is_missing(CustomerSlot::Address)
            && (STREET_NUMBER.is_match(value) || has_any(ADDRESS_WORDS))
        {
            return found(CustomerSlot::Address, SlotRule::AddressKeyword);
        }
        if is_missing(CustomerSlot::Neighborhood) && has_any(NEIGHBORHOOD_WORDS) {
            return found(CustomerSlot::Neighborhood, SlotRule::NeighborhoodKeyword);
        }
        if is_missing(CustomerSlot::FullName) && looks_like_name(value) {
            return found(CustomerSlot::FullName, SlotRule::CapitalizedName);
        }
        if is_missing(CustomerSlot::ExtraInstructions)
            && (first_missing == CustomerSlot::ExtraInstructions || has_any(INSTRUCTION_WORDS))
        {
            return found(CustomerSlot::ExtraInstructions, SlotRule::InstructionKeyword);
        }

        if matches!(first_missing, CustomerSlot::Phone | CustomerSlot::NationalId) {
            return Err(SlotRejection::ExpectedNumber(first_missing));
        }
        found(first_missing, SlotRule::FirstMissing)
    }
}

fn strip_prefix(message: &str) -> (Option<CustomerSlot>, &str) {
    let lowered = crate::text::strip_accents(message);
    for (prefix, slot) in PREFIXES {
        if lowered.starts_with(prefix) {
            let rest = &message[prefix_byte_len(message, prefix.chars().count())..];
            let boundary = rest.chars().next().map_or(true, |next| !next.is_alphanumeric());
            if boundary {
                let value = rest.trim_start_matches([':', ',', ' ', '-']).trim();
                return (Some(*slot), value);
            }
        }
    }
    (None, message)
}

fn prefix_byte_len(message: &str, char_count: usize) -> usize {
    message.char_indices().nth(char_count).map_or(message.len(), |(index, _)| index)
}

fn detect_number(value: &str, missing: &[CustomerSlot]) -> Result<SlotMatch, SlotRejection> {
    let mut digits = value.chars().filter(char::is_ascii_digit).collect::<String>();
    if digits.len() == 12 && digits.starts_with("57") {
        digits.drain(..2);
    }

    let slot = if digits.len() == 10 && digits.starts_with('3') {
        CustomerSlot::Phone
    } else if (6..=10).contains(&digits.len()) {
        CustomerSlot::NationalId
    } else {
        return Err(SlotRejection::InvalidNumber(digits));
    };

    if !missing.contains(&slot) {
        return Err(SlotRejection::AlreadyFilled(slot));
    }
    let rule = match slot {
        CustomerSlot::Phone => SlotRule::Phone,
        _ => SlotRule::NationalId,
    };
    Ok(SlotMatch { slot, value: digits, rule })
}

/// Two to five alphabetic words, each capitalized.
fn looks_like_name(value: &str) -> bool {
    let words = value.split_whitespace().collect::<Vec<_>>();
    (2..=5).contains(&words.len())
        && words.iter().all(|word| {
            word.chars().next().is_some_and(char::is_uppercase)
                && word.chars().all(|character| character.is_alphabetic() || character == '.')
        })
}

#[cfg(test)]
mod tests {
    use super::{HeuristicSlotDetector, SlotDetector, SlotRejection, SlotRule};
    use crate::domain::order::CustomerSlot;

    const ALL: [CustomerSlot; 6] = CustomerSlot::REQUIRED;

    fn detect(message: &str, missing: &[CustomerSlot]) -> Result<(CustomerSlot, String), SlotRejection> {
        HeuristicSlotDetector.detect(message, missing).map(|found| (found.slot, found.value))
    }

    #[test]
    fn ten_digits_starting_with_three_is_a_phone() {
        assert_eq!(
            detect("3001234567", &ALL),
            Ok((CustomerSlot::Phone, "3001234567".to_string()))
        );
        assert_eq!(
            detect("+57 300 123 4567", &ALL),
            Ok((CustomerSlot::Phone, "3001234567".to_string()))
        );
    }

    #[test]
    fn shorter_numbers_are_national_ids() {
        assert_eq!(detect("1020304050", &ALL).map(|found| found.0), Ok(CustomerSlot::NationalId));
        assert_eq!(detect("52.123.456", &ALL), Ok((CustomerSlot::NationalId, "52123456".into())));
        assert_eq!(detect("12345", &ALL), Err(SlotRejection::InvalidNumber("12345".into())));
    }

    #[test]
    fn phone_shaped_number_with_phone_filled_is_rejected() {
        let missing = [CustomerSlot::NationalId, CustomerSlot::Address];
        assert_eq!(
            detect("3001234567", &missing),
            Err(SlotRejection::AlreadyFilled(CustomerSlot::Phone))
        );
    }

    #[test]
    fn email_goes_to_instructions_only_when_free() {
        assert_eq!(
            detect("ana@example.com", &ALL).map(|found| found.0),
            Ok(CustomerSlot::ExtraInstructions)
        );
        assert_eq!(
            detect("ana@example.com", &[CustomerSlot::Address]),
            Err(SlotRejection::AlreadyFilled(CustomerSlot::ExtraInstructions))
        );
    }

    #[test]
    fn keyword_rules_pick_address_neighborhood_and_name() {
        assert_eq!(detect("Carrera 7 # 45-10", &ALL).map(|found| found.0), Ok(CustomerSlot::Address));
        assert_eq!(
            detect("Barrio Chapinero", &ALL),
            Ok((CustomerSlot::Neighborhood, "Chapinero".to_string()))
        );
        assert_eq!(
            detect("My name is Ana Gomez", &ALL),
            Ok((CustomerSlot::FullName, "Ana Gomez".to_string()))
        );
        assert_eq!(detect("Ana María Gómez", &ALL).map(|found| found.0), Ok(CustomerSlot::FullName));
    }

    #[test]
    fn capitalized_words_fall_through_once_name_is_known() {
        let missing = [CustomerSlot::Neighborhood, CustomerSlot::ExtraInstructions];
        let found = HeuristicSlotDetector.detect("Chapinero Alto", &missing).expect("detected");
        assert_eq!(found.slot, CustomerSlot::Neighborhood);
        assert_eq!(found.rule, SlotRule::FirstMissing);
    }

    #[test]
    fn instructions_accept_none() {
        let found = HeuristicSlotDetector
            .detect("none", &[CustomerSlot::ExtraInstructions])
            .expect("detected");
        assert_eq!(found.slot, CustomerSlot::ExtraInstructions);
        assert_eq!(found.value, "none");
    }

    #[test]
    fn numeric_slots_refuse_free_text() {
        assert_eq!(
            detect("call me maybe", &[CustomerSlot::Phone]),
            Err(SlotRejection::ExpectedNumber(CustomerSlot::Phone))
        );
        assert_eq!(detect("anything", &[]), Err(SlotRejection::NothingMissing));
    }
}
