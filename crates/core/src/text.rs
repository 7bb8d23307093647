//! Text normalization shared by the extractor, the signal detectors and retrieval.
//!
//! Everything compares on a folded form: lowercase, accents stripped, punctuation turned into
//! whitespace, apostrophes dropped (`what's` becomes `whats`).

use std::collections::BTreeSet;

const STOP_WORDS: &[&str] = &[
    // english
    "a", "an", "the", "i", "me", "my", "you", "your", "we", "our", "it", "is", "are", "be",
    "do", "does", "did", "have", "has", "of", "for", "to", "in", "on", "at", "with", "and", "or",
    "please", "some", "any", "want", "would", "like", "need", "also", "add", "can", "could",
    "show", "what", "which", "how", "much", "many", "there", "this", "that", "these", "those",
    "id", "im", "get", "give", "buy", "about", "price", "cost", "sell", "available", "hi",
    "hello", "more", "units", "unit", "tell", "info", "information",
    // spanish
    "el", "la", "los", "las", "un", "una", "unos", "unas", "de", "del", "al", "y", "o", "en",
    "con", "por", "para", "que", "quiero", "necesito", "tambien", "agrega", "agregar", "dame",
    "me", "mi", "tu", "su", "es", "son", "hay", "tiene", "tienen", "tienes", "cuanto", "cuesta",
    "precio", "favor", "hola", "unidades", "unidad", "comprar", "vender", "venden",
];

pub fn fold_char(character: char) -> char {
    match character {
        'á' | 'à' | 'ä' | 'â' | 'ã' | 'Á' | 'À' | 'Ä' | 'Â' | 'Ã' => 'a',
        'é' | 'è' | 'ë' | 'ê' | 'É' | 'È' | 'Ë' | 'Ê' => 'e',
        'í' | 'ì' | 'ï' | 'î' | 'Í' | 'Ì' | 'Ï' | 'Î' => 'i',
        'ó' | 'ò' | 'ö' | 'ô' | 'õ' | 'Ó' | 'Ò' | 'Ö' | 'Ô' | 'Õ' => 'o',
        'ú' | 'ù' | 'ü' | 'û' | 'Ú' | 'Ù' | 'Ü' | 'Û' => 'u',
        'ñ' | 'Ñ' => 'n',
        'ç' | 'Ç' => 'c',
        other => other.to_ascii_lowercase(),
    }
}

pub fn strip_accents(text: &str) -> String {
    text.chars().map(fold_char).collect()
}

/// Lowercased, accent-free, punctuation-free text with single spaces. A `-` that starts a word
/// and precedes a digit is kept so negative quantities survive normalization.
pub fn normalize(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(character) = chars.next() {
        let folded = fold_char(character);
        if folded.is_ascii_alphanumeric() {
            output.push(folded);
        } else if folded == '-'
            && (output.is_empty() || output.ends_with(' '))
            && chars.peek().is_some_and(|next| next.is_ascii_digit())
        {
            output.push('-');
        } else if folded == '\'' || folded == '’' {
            continue;
        } else {
            output.push(' ');
        }
    }
    output.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn tokenize(text: &str) -> Vec<String> {
    normalize(text).split_whitespace().map(str::to_string).collect()
}

pub fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.contains(&token)
}

pub fn is_numeric(token: &str) -> bool {
    let digits = token.strip_prefix('-').unwrap_or(token);
    !digits.is_empty() && digits.chars().all(|character| character.is_ascii_digit())
}

/// Content-bearing tokens in first-seen order: no stop words, no bare numbers, no one-letter
/// tokens, no duplicates.
pub fn keywords(text: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    tokenize(text)
        .into_iter()
        .filter(|token| token.len() > 1 && !is_stop_word(token) && !is_numeric(token))
        .filter(|token| seen.insert(token.clone()))
        .collect()
}

/// Singular form for the plural patterns that show up in catalog names (english and spanish).
pub fn singular(word: &str) -> String {
    if word.len() > 4 {
        if let Some(stem) = word.strip_suffix("ies") {
            return format!("{stem}y");
        }
        for suffix in ["ches", "shes", "sses", "xes", "zes"] {
            if word.ends_with(suffix) {
                return word[..word.len() - 2].to_string();
            }
        }
        if let Some(stem) = word.strip_suffix("ces") {
            return format!("{stem}z");
        }
        if let Some(stem) = word.strip_suffix("ores") {
            return format!("{stem}or");
        }
    }
    if word.len() > 3 && word.ends_with('s') && !word.ends_with("ss") {
        return word[..word.len() - 1].to_string();
    }
    word.to_string()
}

/// Search variants for one keyword: itself, accent-free, singular and a plural form.
pub fn variants(word: &str) -> Vec<String> {
    let lowered = word.to_lowercase();
    let folded = strip_accents(&lowered);
    let singular_form = singular(&folded);
    let plural_form = if singular_form.ends_with(['a', 'e', 'i', 'o', 'u']) {
        format!("{singular_form}s")
    } else {
        format!("{singular_form}es")
    };

    let mut seen = BTreeSet::new();
    [lowered, folded, singular_form.clone(), plural_form, format!("{singular_form}s")]
        .into_iter()
        .filter(|variant| !variant.is_empty())
        .filter(|variant| seen.insert(variant.clone()))
        .collect()
}

/// Whole-phrase containment on normalized text.
pub fn contains_phrase(normalized_text: &str, phrase: &str) -> bool {
    let phrase = normalize(phrase);
    if phrase.is_empty() {
        return false;
    }
    format!(" {normalized_text} ").contains(&format!(" {phrase} "))
}

fn stems(word: &str) -> [String; 3] {
    let short = match word.strip_suffix("es") {
        Some(stem) if word.len() > 4 => stem.to_string(),
        _ => word.to_string(),
    };
    [word.to_string(), singular(word), short]
}

/// Loose equality that tolerates english and spanish plural endings on either side.
pub fn same_word(left: &str, right: &str) -> bool {
    if left == right {
        return true;
    }
    let right_stems = stems(right);
    stems(left).iter().any(|stem| right_stems.contains(stem))
}
