use super::SearchIndex;
use super::tokenizer::tokenize_query;
use super::types::{DeleteOutcome, SearchDocument, SearchHit};
use crate::error::IndexError;
use crate::keys::normalize::normalize_style;

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};

/// In-process index: documents by id plus `token -> document ids` postings
/// built from each document's `searchKeywords`.
#[derive(Default)]
pub struct MemorySearchIndex {
    documents: DashMap<String, SearchDocument>,
    postings: DashMap<String, HashSet<String>>,
}

impl MemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Ranks documents by how many distinct query tokens they contain, then by id.
    /// An empty query matches every document. `style` restricts hits to documents
    /// carrying that style.
    pub fn query(&self, text: &str, style: Option<&str>, limit: usize) -> Vec<SearchHit> {
        let tokens = tokenize_query(text);
        let style = style.map(normalize_style).filter(|s| !s.is_empty());

        let mut scores: HashMap<String, usize> = HashMap::new();
        if tokens.is_empty() {
            for entry in self.documents.iter() {
                scores.insert(entry.key().clone(), 0);
            }
        } else {
            for token in &tokens {
                if let Some(ids) = self.postings.get(token) {
                    for id in ids.iter() {
                        *scores.entry(id.clone()).or_insert(0) += 1;
                    }
                }
            }
        }

        let mut hits: Vec<SearchHit> = scores
            .into_iter()
            .filter_map(|(id, score)| {
                let document = self.documents.get(&id)?.clone();
                match &style {
                    Some(style) if !document.styles.contains(style) => None,
                    _ => Some(SearchHit { document, score }),
                }
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.document.id.cmp(&b.document.id))
        });
        hits.truncate(limit);
        hits
    }

    fn unindex(&self, document: &SearchDocument) {
        for token in document.search_keywords.split_whitespace() {
            let emptied = match self.postings.get_mut(token) {
                Some(mut ids) => {
                    ids.remove(&document.id);
                    ids.is_empty()
                }
                None => false,
            };
            if emptied {
                self.postings.remove_if(token, |_, ids| ids.is_empty());
            }
        }
    }

    fn index(&self, document: &SearchDocument) {
        for token in document.search_keywords.split_whitespace() {
            self.postings
                .entry(token.to_string())
                .or_default()
                .insert(document.id.clone());
        }
    }
}

#[async_trait]
impl SearchIndex for MemorySearchIndex {
    async fn upsert(&self, document: SearchDocument) -> Result<(), IndexError> {
        if let Some(previous) = self.documents.insert(document.id.clone(), document.clone()) {
            self.unindex(&previous);
        }
        self.index(&document);
        tracing::debug!("Indexed document {}", document.id);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<DeleteOutcome, IndexError> {
        match self.documents.remove(id) {
            Some((_, previous)) => {
                self.unindex(&previous);
                Ok(DeleteOutcome::Deleted)
            }
            None => Ok(DeleteOutcome::NotFound),
        }
    }

    async fn get(&self, id: &str) -> Result<Option<SearchDocument>, IndexError> {
        Ok(self.documents.get(id).map(|document| document.clone()))
    }
}
