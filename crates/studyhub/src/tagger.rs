//! Coarse subject tagging for extracted questions.
//!
//! The default path is a keyword heuristic over a fixed vocabulary. With an
//! [`AiContentService`] attached, the model proposes the names instead and
//! the heuristic is only used when it returns nothing.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info};

use crate::ai::AiContentService;
use crate::db::concept_repo::{self, ConceptRow};
use crate::db::{Database, DatabaseError};
use crate::pipeline::TaggingResult;

/// Concept assigned when no keyword matches.
pub const FALLBACK_CONCEPT: &str = "General Studies";

/// Most concepts attached to one batch of questions.
pub const MAX_CONCEPTS_PER_BATCH: usize = 10;

struct ConceptRule {
    concept: &'static str,
    keywords: &'static [&'static str],
}

/// Keywords match at word starts, so `cell` also matches `cells` and `cellular`.
/// A trailing space limits a keyword to the whole word.
const VOCABULARY: &[ConceptRule] = &[
    ConceptRule {
        concept: "Mathematics",
        keywords: &[
            "equation", "integral", "integrate", "derivative", "differentiate", "calculus",
            "algebra", "matri", "probability", "theorem", "geometry", "trigonometr",
            "polynomial",
        ],
    },
    ConceptRule {
        concept: "Computer Science",
        keywords: &[
            "algorithm", "stack", "queue", "recursion", "recursive", "data structure",
            "linked list", "binary tree", "complexity", "compiler", "programming",
            "sorting", "hash table", "database",
        ],
    },
    ConceptRule {
        concept: "Physics",
        keywords: &[
            "velocity", "acceleration", "momentum", "newton", "quantum", "electric",
            "magnetic", "thermodynamic", "wavelength", "kinetic energy",
        ],
    },
    ConceptRule {
        concept: "Chemistry",
        keywords: &[
            "molecule", "molecular", "reaction", "compound", "acid", "organic chemistry",
            "periodic table", "covalent", "oxidation", "mole ",
        ],
    },
    ConceptRule {
        concept: "Biology",
        keywords: &[
            "cell", "gene ", "genes ", "genetic", "genome", "dna", "protein", "organism", "evolution", "photosynthesis",
            "enzyme", "mitosis",
        ],
    },
    ConceptRule {
        concept: "Economics",
        keywords: &[
            "market", "demand", "supply", "inflation", "gdp", "elasticity", "monetary",
            "fiscal",
        ],
    },
    ConceptRule {
        concept: "History",
        keywords: &[
            "world war", "empire", "revolution", "treaty", "dynasty", "colonial",
            "civilization",
        ],
    },
    ConceptRule {
        concept: "Literature",
        keywords: &["poem", "poet", "novel", "narrator", "metaphor", "sonnet", "protagonist"],
    },
];

/// Lowercases and replaces every non-alphanumeric run with one space,
/// padded so keywords can be matched as ` keyword`.
fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push(' ');
    let mut last_space = true;
    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            out.push(c);
            last_space = false;
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    if !last_space {
        out.push(' ');
    }
    out
}

/// Deterministic tagging. Concepts come back in vocabulary order; the
/// result is never empty.
pub fn tag_questions(texts: &[String]) -> Vec<String> {
    let haystack = normalize(&texts.join("\n"));
    let matched: Vec<String> = VOCABULARY
        .iter()
        .filter(|rule| {
            rule.keywords
                .iter()
                .any(|kw| haystack.contains(&format!(" {}", kw)))
        })
        .map(|rule| rule.concept.to_string())
        .collect();

    if matched.is_empty() {
        vec![FALLBACK_CONCEPT.to_string()]
    } else {
        matched
    }
}

/// Asks the model for concept names, falling back to [`tag_questions`].
pub async fn tag_with_ai(ai: &AiContentService, texts: &[String]) -> Vec<String> {
    let concepts = ai.identify_concepts(texts).await;
    if concepts.is_empty() {
        debug!("AI returned no concepts, using keyword tagging");
        tag_questions(texts)
    } else {
        concepts
    }
}

/// Trims, collapses inner whitespace and drops case-insensitive duplicates.
fn clean_names(names: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .into_iter()
        .map(|n| n.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|n| !n.is_empty())
        .filter(|n| seen.insert(n.to_lowercase()))
        .take(MAX_CONCEPTS_PER_BATCH)
        .collect()
}

/// Tags question batches and records the concepts.
pub struct ConceptTagger {
    db: Database,
    ai: Option<Arc<AiContentService>>,
}

impl ConceptTagger {
    pub fn new(db: Database) -> Self {
        Self { db, ai: None }
    }

    pub fn with_ai(mut self, ai: Arc<AiContentService>) -> Self {
        self.ai = Some(ai);
        self
    }

    pub fn uses_ai(&self) -> bool {
        self.ai.is_some()
    }

    /// Exact-name lookup, creating the concept when absent.
    pub fn find_or_create(&self, name: &str) -> Result<(ConceptRow, bool), DatabaseError> {
        concept_repo::find_or_create(&self.db, name)
    }

    pub async fn tag(&self, texts: &[String]) -> Result<TaggingResult, DatabaseError> {
        let names = match &self.ai {
            Some(ai) => tag_with_ai(ai, texts).await,
            None => tag_questions(texts),
        };

        let mut concepts = Vec::new();
        let mut created = 0usize;
        for name in clean_names(names) {
            let (concept, was_created) = self.find_or_create(&name)?;
            if was_created {
                created += 1;
                if let Some(ai) = &self.ai {
                    self.describe(ai, &concept, texts).await?;
                }
            }
            concepts.push(concept.name);
        }

        info!(
            concepts = concepts.len(),
            created,
            ai = self.uses_ai(),
            "Tagged questions"
        );

        Ok(TaggingResult {
            concepts,
            created,
            ai_assisted: self.uses_ai(),
        })
    }

    /// Stores the model's description of a newly created concept.
    async fn describe(
        &self,
        ai: &AiContentService,
        concept: &ConceptRow,
        texts: &[String],
    ) -> Result<(), DatabaseError> {
        let analysis = ai.analyze_concept(&concept.name, &texts.join("\n")).await;
        if analysis.description.is_none() && analysis.category.is_none() && analysis.summary.is_none() {
            return Ok(());
        }
        concept_repo::set_details(
            &self.db,
            &concept.id,
            analysis.description.as_deref(),
            analysis.category.as_deref(),
            analysis.summary.as_deref(),
        )?;
        Ok(())
    }
}
