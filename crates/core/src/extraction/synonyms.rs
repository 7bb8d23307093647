use crate::text::{normalize, same_word};

/// One product family and the words customers use for it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SynonymGroup {
    pub canonical: &'static str,
    pub variants: &'static [&'static str],
}

const DEFAULT_GROUPS: &[SynonymGroup] = &[
    SynonymGroup {
        canonical: "extinguisher",
        variants: &["extintor", "fire suppressant device", "fire suppressor", "apagafuegos"],
    },
    SynonymGroup { canonical: "helmet", variants: &["casco", "hard hat", "hardhat", "safety hat"] },
    SynonymGroup { canonical: "glove", variants: &["guante", "hand protection"] },
    SynonymGroup {
        canonical: "goggles",
        variants: &["gafas", "safety glasses", "lentes", "monogafas", "eye protection"],
    },
    SynonymGroup { canonical: "vest", variants: &["chaleco", "reflective vest", "hi vis"] },
    SynonymGroup { canonical: "mask", variants: &["mascarilla", "respirator", "respirador", "tapabocas"] },
    SynonymGroup {
        canonical: "first aid kit",
        variants: &["botiquin", "medical kit", "kit de primeros auxilios"],
    },
    SynonymGroup { canonical: "sign", variants: &["senal", "senalizacion", "signage", "aviso"] },
    SynonymGroup { canonical: "boot", variants: &["bota", "safety shoe", "calzado de seguridad"] },
    SynonymGroup {
        canonical: "ear protection",
        variants: &["earplug", "tapon auditivo", "protector auditivo", "ear muff"],
    },
];

#[derive(Clone, Debug)]
pub struct SynonymTable {
    groups: Vec<SynonymGroup>,
}

impl Default for SynonymTable {
    fn default() -> Self {
        Self::new(DEFAULT_GROUPS.to_vec())
    }
}

impl SynonymTable {
    pub fn new(groups: Vec<SynonymGroup>) -> Self {
        Self { groups }
    }

    pub fn groups(&self) -> &[SynonymGroup] {
        &self.groups
    }

    /// Number of synonym groups mentioned by both the query and the product text.
    pub fn hits(&self, normalized_query: &str, normalized_product: &str) -> u32 {
        let hits = self
            .groups
            .iter()
            .filter(|group| {
                mentions(group, normalized_query) && mentions(group, normalized_product)
            })
            .count();
        u32::try_from(hits).unwrap_or(u32::MAX)
    }

    /// Every term of each group the query mentions, canonical first. Lets a lexical search for
    /// `casco` also look for `helmet`.
    pub fn expand(&self, normalized_query: &str) -> Vec<&'static str> {
        self.groups
            .iter()
            .filter(|group| mentions(group, normalized_query))
            .flat_map(|group| std::iter::once(group.canonical).chain(group.variants.iter().copied()))
            .collect()
    }
}

fn mentions(group: &SynonymGroup, normalized_text: &str) -> bool {
    std::iter::once(group.canonical)
        .chain(group.variants.iter().copied())
        .any(|term| mentions_term(term, normalized_text))
}

/// Word-by-word match over a sliding window; every word tolerates plural endings.
fn mentions_term(term: &str, normalized_text: &str) -> bool {
    let term = normalize(term);
    let term_words = term.split_whitespace().collect::<Vec<_>>();
    let text_words = normalized_text.split_whitespace().collect::<Vec<_>>();
    if term_words.is_empty() || term_words.len() > text_words.len() {
        return false;
    }
    text_words.windows(term_words.len()).any(|window| {
        window.iter().zip(&term_words).all(|(word, term_word)| same_word(word, term_word))
    })
}
