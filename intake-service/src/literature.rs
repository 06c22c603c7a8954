//! Medical literature context for the diagnosis prompt.
//!
//! [`PassageLibrary`] is a small in-memory index: passages are loaded from a JSON file and
//! ranked by how many of the query's terms they share. Terms are lowercased words of at least
//! four letters, cut to a short prefix so that Russian inflections ("головная", "головной")
//! still match.

use anyhow::Context as _;
use async_trait::async_trait;
use serde::Deserialize;
use std::{collections::HashSet, path::Path};
use tracing::{debug, info};

const TERM_MIN_CHARS: usize = 4;
const TERM_PREFIX_CHARS: usize = 6;

/// Source of reference text for a free-text query
#[async_trait]
pub trait LiteratureProvider: Send + Sync {
    /// Relevant context for `query`; empty when nothing matches
    async fn get_context(&self, query: &str) -> anyhow::Result<String>;
}

/// Provider used when no literature is configured
pub struct NoLiterature;

#[async_trait]
impl LiteratureProvider for NoLiterature {
    async fn get_context(&self, _query: &str) -> anyhow::Result<String> {
        Ok(String::new())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Passage {
    #[serde(default)]
    pub category: String,
    pub content: String,
    #[serde(default)]
    pub page: Option<u32>,
}

struct IndexedPassage {
    passage: Passage,
    terms: HashSet<String>,
}

pub struct PassageLibrary {
    passages: Vec<IndexedPassage>,
    top_k: usize,
}

fn terms(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphabetic())
        .filter(|word| word.chars().count() >= TERM_MIN_CHARS)
        .map(|word| word.chars().take(TERM_PREFIX_CHARS).collect())
        .collect()
}

impl PassageLibrary {
    pub fn new(passages: Vec<Passage>, top_k: usize) -> Self {
        let passages = passages
            .into_iter()
            .map(|passage| IndexedPassage {
                terms: terms(&passage.content),
                passage,
            })
            .collect();
        Self { passages, top_k }
    }

    /// Load passages from a JSON array of `{category, content, page}` objects
    pub async fn load(path: &Path, top_k: usize) -> anyhow::Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read literature file {}", path.display()))?;
        let passages: Vec<Passage> = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse literature file {}", path.display()))?;
        info!(path = %path.display(), passages = passages.len(), "Loaded literature passages");
        Ok(Self::new(passages, top_k))
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    /// Up to `top_k` passages sharing terms with `query`, best first, with their scores
    pub fn search(&self, query: &str) -> Vec<(f64, &Passage)> {
        let query_terms = terms(query);
        if query_terms.is_empty() {
            return Vec::new();
        }

        let mut ranked: Vec<(f64, &Passage)> = self
            .passages
            .iter()
            .filter_map(|indexed| {
                let overlap = indexed.terms.intersection(&query_terms).count();
                (overlap > 0).then(|| {
                    (
                        overlap as f64 / query_terms.len() as f64,
                        &indexed.passage,
                    )
                })
            })
            .collect();
        // stable sort keeps file order among equal scores
        ranked.sort_by(|a, b| b.0.total_cmp(&a.0));
        ranked.truncate(self.top_k);
        ranked
    }
}

fn format_passage(score: f64, passage: &Passage) -> String {
    let page = passage
        .page
        .map_or_else(|| "н/д".to_string(), |page| page.to_string());
    let category: &str = if passage.category.is_empty() {
        "общее"
    } else {
        &passage.category
    };
    format!(
        "Из раздела {category} (релевантность: {:.0}%):\n{}\nИсточник: стр. {page}\n{}",
        score * 100.0,
        passage.content,
        "-".repeat(40)
    )
}

#[async_trait]
impl LiteratureProvider for PassageLibrary {
    async fn get_context(&self, query: &str) -> anyhow::Result<String> {
        let results = self.search(query);
        debug!(results = results.len(), "Literature search finished");
        Ok(results
            .into_iter()
            .map(|(score, passage)| format_passage(score, passage))
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passage(category: &str, content: &str) -> Passage {
        Passage {
            category: category.to_string(),
            content: content.to_string(),
            page: Some(1),
        }
    }

    fn library() -> PassageLibrary {
        PassageLibrary::new(
            vec![
                passage("неврология", "Мигрень проявляется пульсирующей головной болью и тошнотой."),
                passage("пульмонология", "Бронхит сопровождается кашлем с мокротой."),
                passage("гастроэнтерология", "Гастрит вызывает тошноту и тяжесть в животе."),
            ],
            2,
        )
    }

    #[test]
    fn ranks_by_shared_terms() {
        let library = library();
        let results = library.search("Сильная головная боль и тошнота");
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].1.category, "неврология");
        assert_eq!(results[1].1.category, "гастроэнтерология");
        assert!(results[0].0 > results[1].0);
    }

    #[test]
    fn unrelated_query_finds_nothing() {
        assert!(library().search("Перелом ноги").is_empty());
        assert!(library().search("да").is_empty());
    }

    #[tokio::test]
    async fn context_lists_sources() {
        let context = library().get_context("кашель с мокротой").await.unwrap();
        assert!(context.starts_with("Из раздела пульмонология"));
        assert!(context.contains("Источник: стр. 1"));
    }

    #[tokio::test]
    async fn loads_passages_from_json() {
        let path = std::env::temp_dir().join(format!("passages-{}.json", uuid::Uuid::new_v4()));
        tokio::fs::write(
            &path,
            r#"[{"category": "кардиология", "content": "Стенокардия: давящая боль за грудиной."}]"#,
        )
        .await
        .unwrap();

        let library = PassageLibrary::load(&path, 5).await.unwrap();
        tokio::fs::remove_file(&path).await.unwrap();

        assert_eq!(library.len(), 1);
        assert_eq!(library.search("давящая боль в груди").len(), 1);
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let path = std::env::temp_dir().join("definitely-missing-passages.json");
        assert!(PassageLibrary::load(&path, 5).await.is_err());
    }
}
