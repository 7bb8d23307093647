use std::collections::BTreeSet;
use std::sync::Arc;

use tendero_core::catalog::{group_by_base_name, render_catalog, render_groups};
use tendero_core::config::RetrievalConfig;
use tendero_core::domain::product::{Product, ProductId};
use tendero_core::extraction::SynonymTable;
use tendero_core::text::{contains_phrase, keywords, normalize, same_word, variants};
use tendero_db::{CatalogRepository, RepositoryError};

use crate::vector::VectorSearch;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetrievalSettings {
    pub vector_enabled: bool,
    pub top_k: usize,
    /// Lexical search tops up the result set while it holds fewer than this many products.
    pub min_results: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self { vector_enabled: true, top_k: 5, min_results: 3 }
    }
}

impl From<&RetrievalConfig> for RetrievalSettings {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            vector_enabled: config.vector_enabled,
            top_k: config.top_k,
            min_results: config.min_results,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetrievalMode {
    Browse,
    Targeted,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetrievalResult {
    pub mode: RetrievalMode,
    pub products: Vec<Product>,
    /// Rendered listing, or the "try these keywords" hint when nothing matched.
    pub text: String,
    pub vector_hits: usize,
    pub lexical_hits: usize,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    pub fn product_ids(&self) -> Vec<ProductId> {
        self.products.iter().map(|product| product.id).collect()
    }
}

/// Semantic search with a lexical safety net.
pub struct HybridRetriever {
    catalog: Arc<dyn CatalogRepository>,
    vector: Option<Arc<dyn VectorSearch>>,
    synonyms: SynonymTable,
    settings: RetrievalSettings,
}

impl HybridRetriever {
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        vector: Option<Arc<dyn VectorSearch>>,
        settings: RetrievalSettings,
    ) -> Self {
        Self { catalog, vector, synonyms: SynonymTable::default(), settings }
    }

    pub fn with_synonyms(mut self, synonyms: SynonymTable) -> Self {
        self.synonyms = synonyms;
        self
    }

    /// Every available product, grouped by category.
    pub async fn browse(&self) -> Result<RetrievalResult, RepositoryError> {
        let active = self.catalog.list_active_products().await?;
        let text = render_catalog(&active);
        let products = active.into_iter().filter(Product::is_available).collect::<Vec<_>>();
        Ok(RetrievalResult {
            mode: RetrievalMode::Browse,
            lexical_hits: products.len(),
            products,
            text,
            vector_hits: 0,
        })
    }

    pub async fn search(&self, query: &str) -> Result<RetrievalResult, RepositoryError> {
        let query_keywords = keywords(query);
        let expanded = self.synonyms.expand(&normalize(query));
        let mut found: Vec<Product> = Vec::new();
        let mut seen = BTreeSet::new();

        let vector_hits = self.vector_candidates(query, &query_keywords, &expanded).await?;
        let vector_count = vector_hits.len();
        for product in vector_hits {
            if seen.insert(product.id) {
                found.push(product);
            }
        }

        let mut lexical_count = 0;
        if found.len() < self.settings.min_results {
            let terms = lexical_terms(&query_keywords, &expanded);
            if !terms.is_empty() {
                let lexical = self.catalog.search_by_terms(&terms, self.settings.top_k).await?;
                for product in lexical.into_iter().filter(Product::is_available) {
                    if seen.insert(product.id) {
                        lexical_count += 1;
                        found.push(product);
                    }
                }
            }
        }

        tracing::debug!(
            event_name = "retrieval.search",
            keywords = ?query_keywords,
            vector_hits = vector_count,
            lexical_hits = lexical_count,
            "hybrid retrieval finished"
        );

        let text = if found.is_empty() {
            self.no_match_hint()
        } else {
            format!("Products matching the question:\n{}", render_groups(&group_by_base_name(&found)))
        };
        Ok(RetrievalResult {
            mode: RetrievalMode::Targeted,
            products: found,
            text,
            vector_hits: vector_count,
            lexical_hits: lexical_count,
        })
    }

    /// Vector hits that share at least one keyword with the query. An unavailable index only
    /// costs recall.
    async fn vector_candidates(
        &self,
        query: &str,
        query_keywords: &[String],
        expanded: &[&str],
    ) -> Result<Vec<Product>, RepositoryError> {
        let Some(vector) = self.vector.as_ref().filter(|_| self.settings.vector_enabled) else {
            return Ok(Vec::new());
        };
        if query_keywords.is_empty() {
            return Ok(Vec::new());
        }

        let ids = match vector.search(query, self.settings.top_k).await {
            Ok(ids) => ids,
            Err(error) => {
                tracing::warn!(
                    event_name = "retrieval.vector_unavailable",
                    error = %error,
                    "vector search failed; continuing with lexical search"
                );
                return Ok(Vec::new());
            }
        };

        let mut products = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(product) = self.catalog.find_by_id(id).await? else {
                continue;
            };
            if product.is_available() && shares_keyword(&product, query_keywords, expanded) {
                products.push(product);
            }
        }
        Ok(products)
    }

    fn no_match_hint(&self) -> String {
        let suggestions = self
            .synonyms
            .groups()
            .iter()
            .map(|group| group.canonical)
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "I couldn't find products matching that. Try keywords such as: {suggestions}. You can \
             also ask what we have to see the full catalog."
        )
    }
}

fn shares_keyword(product: &Product, query_keywords: &[String], expanded: &[&str]) -> bool {
    let product_text = normalize(&format!("{} {}", product.name, product.description));
    let product_keywords = keywords(&product_text);
    query_keywords
        .iter()
        .any(|keyword| product_keywords.iter().any(|word| same_word(word, keyword)))
        || expanded.iter().any(|term| contains_phrase(&product_text, term))
}

fn lexical_terms(query_keywords: &[String], expanded: &[&str]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    query_keywords
        .iter()
        .flat_map(|keyword| variants(keyword))
        .chain(expanded.iter().map(|term| normalize(term)))
        .filter(|term| seen.insert(term.clone()))
        .collect()
}
