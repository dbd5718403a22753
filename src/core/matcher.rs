use crate::core::catalog::{ServiceCatalog, ServiceEntry, CUSTOM_CATEGORY};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Maximum number of suggestions returned by a search
pub const MAX_RESULTS: usize = 10;

/// Fuzzy pass only runs when direct + synonym passes found fewer than this
pub const FUZZY_THRESHOLD: usize = 5;

/// How a catalog entry matched the query, best first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Direct,
    Synonym,
    Fuzzy,
}

/// A single search suggestion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub name: String,
    pub category: String,
    #[serde(rename = "matchType")]
    pub match_type: MatchType,
    #[serde(rename = "sourceQuery")]
    pub source_query: String,
}

/// Free text resolved against the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedService {
    pub name: String,
    pub category: String,
    #[serde(rename = "isCustom")]
    pub is_custom: bool,
}

/// Ranked service search over the catalog
///
/// # Passes
/// 1. Direct: canonical name contains the query
/// 2. Synonym: any synonym contains the query
/// 3. Fuzzy: any query token is contained in any name token (only when
///    passes 1 and 2 found fewer than [`FUZZY_THRESHOLD`] entries)
///
/// Never fails: unmatched input yields no suggestions, or a custom service
/// when normalizing.
#[derive(Debug, Clone)]
pub struct ServiceMatcher {
    catalog: Arc<ServiceCatalog>,
}

impl ServiceMatcher {
    pub fn new(catalog: Arc<ServiceCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &ServiceCatalog {
        &self.catalog
    }

    pub fn search(&self, query: &str) -> Vec<MatchResult> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Vec::new();
        }

        let mut results = Vec::with_capacity(MAX_RESULTS);
        let mut matched: HashSet<&str> = HashSet::new();

        let push = |entry: &ServiceEntry, match_type: MatchType, results: &mut Vec<MatchResult>| {
            results.push(MatchResult {
                name: entry.name.clone(),
                category: entry.category.clone(),
                match_type,
                source_query: query.clone(),
            });
        };

        // Pass 1: direct
        for entry in self.catalog.entries() {
            if entry.name.to_lowercase().contains(&query) {
                matched.insert(&entry.name);
                push(entry, MatchType::Direct, &mut results);
            }
        }

        // Pass 2: synonym
        for entry in self.catalog.entries() {
            if matched.contains(entry.name.as_str()) {
                continue;
            }
            if entry.synonyms.iter().any(|s| s.contains(&query)) {
                matched.insert(&entry.name);
                push(entry, MatchType::Synonym, &mut results);
            }
        }

        // Pass 3: fuzzy token overlap
        if results.len() < FUZZY_THRESHOLD {
            let query_tokens: Vec<&str> = query.split_whitespace().collect();
            for entry in self.catalog.entries() {
                if matched.contains(entry.name.as_str()) {
                    continue;
                }
                let name = entry.name.to_lowercase();
                let hit = name
                    .split_whitespace()
                    .any(|name_token| query_tokens.iter().any(|q| name_token.contains(q)));
                if hit {
                    matched.insert(&entry.name);
                    push(entry, MatchType::Fuzzy, &mut results);
                }
            }
        }

        results.truncate(MAX_RESULTS);
        results
    }

    /// Map free text to its canonical name, or return it unchanged
    pub fn normalize(&self, free_text: &str) -> String {
        self.resolve(free_text).name
    }

    /// Like [`normalize`](Self::normalize) but also reports the category;
    /// unmatched text becomes a custom service.
    pub fn resolve(&self, free_text: &str) -> NormalizedService {
        let needle = free_text.trim().to_lowercase();

        let found = self.catalog.lookup(&needle).or_else(|| {
            self.catalog
                .entries()
                .iter()
                .find(|e| e.synonyms.contains(&needle))
        });

        match found {
            Some(entry) if !needle.is_empty() => NormalizedService {
                name: entry.name.clone(),
                category: entry.category.clone(),
                is_custom: false,
            },
            _ => NormalizedService {
                name: free_text.to_string(),
                category: CUSTOM_CATEGORY.to_string(),
                is_custom: true,
            },
        }
    }
}

impl Default for ServiceMatcher {
    fn default() -> Self {
        Self::new(Arc::new(ServiceCatalog::builtin()))
    }
}
