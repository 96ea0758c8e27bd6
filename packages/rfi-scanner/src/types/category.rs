//! Target categories and the terms that identify them in text.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A target category such as "acoustic" or "ecology".
///
/// `terms` are lowercase word stems. A single-word term matches any word that
/// starts with it ("ecolog" matches "ecological"); a multi-word term matches a
/// run of words whose last word starts with the last stem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,

    /// Human label used in prompts and notifications
    pub label: String,

    /// Lowercase word stems
    pub terms: Vec<String>,
}

impl Category {
    pub fn new(
        name: impl Into<String>,
        label: impl Into<String>,
        terms: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            terms: terms
                .into_iter()
                .map(|t| t.into().to_lowercase())
                .collect(),
        }
    }

    /// Whether any term starts at `words[at]`. Words must be lowercase.
    pub fn matches_at(&self, words: &[&str], at: usize) -> bool {
        self.terms.iter().any(|term| term_matches_at(term, words, at))
    }

    /// Whether a single lowercase word is a category term.
    pub fn matches_word(&self, word: &str) -> bool {
        self.matches_at(&[word], 0)
    }
}

fn term_matches_at(term: &str, words: &[&str], at: usize) -> bool {
    let stems: Vec<&str> = term.split_whitespace().collect();
    let Some((last, leading)) = stems.split_last() else {
        return false;
    };
    if at + stems.len() > words.len() {
        return false;
    }
    leading
        .iter()
        .zip(&words[at..])
        .all(|(stem, word)| stem == word)
        && words[at + leading.len()].starts_with(last)
}

/// Named set of categories a job can target.
#[derive(Debug, Clone, Default)]
pub struct CategoryCatalog {
    categories: BTreeMap<String, Category>,
}

impl CategoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog of the consultee topics planning authorities most often
    /// ask applicants about.
    pub fn builtin() -> Self {
        let defs: &[(&str, &str, &[&str])] = &[
            (
                "acoustic",
                "Noise and acoustics",
                &["noise", "acoustic", "sound", "vibration", "decibel"],
            ),
            (
                "ecology",
                "Ecology and biodiversity",
                &["ecolog", "biodiversity", "bats", "bat roost", "habitat", "species", "protected species", "newt"],
            ),
            (
                "flood",
                "Flood risk",
                &["flood", "sequential test", "exception test"],
            ),
            (
                "drainage",
                "Drainage",
                &["drainage", "suds", "surface water", "attenuation", "soakaway"],
            ),
            (
                "transport",
                "Transport and highways",
                &["transport", "highway", "traffic", "parking", "visibility splay", "junction"],
            ),
            (
                "heritage",
                "Heritage",
                &["heritage", "listed building", "conservation area", "historic"],
            ),
            (
                "archaeology",
                "Archaeology",
                &["archaeolog", "written scheme of investigation", "trial trench"],
            ),
            (
                "contamination",
                "Land contamination",
                &["contamina", "ground investigation", "remediation", "phase 1 desk study"],
            ),
            (
                "arboricultural",
                "Trees",
                &["arboricultur", "tree", "root protection"],
            ),
            (
                "air-quality",
                "Air quality",
                &["air quality", "dust", "emission", "odour"],
            ),
            (
                "landscape",
                "Landscape and visual",
                &["landscape", "visual impact", "lvia", "planting"],
            ),
            (
                "energy",
                "Energy and sustainability",
                &["energy", "sustainability", "carbon", "renewable"],
            ),
        ];

        let mut catalog = Self::new();
        for (name, label, terms) in defs {
            catalog.insert(Category::new(*name, *label, terms.iter().copied()));
        }
        catalog
    }

    /// Add or replace a category.
    pub fn insert(&mut self, category: Category) {
        self.categories
            .insert(category.name.to_lowercase(), category);
    }

    pub fn with(mut self, category: Category) -> Self {
        self.insert(category);
        self
    }

    /// Look up a category by name (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&Category> {
        self.categories.get(&name.to_lowercase())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Category> {
        self.categories.values()
    }
}
