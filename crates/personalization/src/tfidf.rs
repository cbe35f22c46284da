//! TF-IDF vectorizer over short product descriptions.
//!
//! Tokens are lowercase runs of two or more word characters; English stop
//! words are dropped. The vocabulary keeps the `max_features` most frequent
//! terms across the corpus. Rows are L2-normalized, so the dot product of two
//! rows is their cosine similarity.

use ndarray::Array2;
use std::collections::{BTreeMap, HashMap};

const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
    "by", "can", "could", "did", "do", "does", "doing", "down", "during", "each", "few", "for",
    "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers", "herself",
    "him", "himself", "his", "how", "if", "in", "into", "is", "it", "its", "itself", "just",
    "me", "more", "most", "my", "myself", "no", "nor", "not", "now", "of", "off", "on", "once",
    "only", "or", "other", "our", "ours", "ourselves", "out", "over", "own", "same", "she",
    "should", "so", "some", "such", "than", "that", "the", "their", "theirs", "them",
    "themselves", "then", "there", "these", "they", "this", "those", "through", "to", "too",
    "under", "until", "up", "very", "was", "we", "were", "what", "when", "where", "which",
    "while", "who", "whom", "why", "will", "with", "would", "you", "your", "yours", "yourself",
    "yourselves",
];

pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| t.chars().count() >= 2)
        .map(|t| t.to_lowercase())
        .filter(|t| !STOP_WORDS.contains(&t.as_str()))
        .collect()
}

#[derive(Debug, Clone)]
pub struct TfidfVectorizer {
    max_features: usize,
    vocabulary: BTreeMap<String, usize>,
    idf: Vec<f64>,
}

impl TfidfVectorizer {
    pub fn new(max_features: usize) -> Self {
        Self {
            max_features,
            vocabulary: BTreeMap::new(),
            idf: Vec::new(),
        }
    }

    pub fn vocabulary_len(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn fit_transform(&mut self, documents: &[String]) -> Array2<f64> {
        let tokenized: Vec<Vec<String>> = documents.iter().map(|d| tokenize(d)).collect();

        let mut term_totals: HashMap<&str, usize> = HashMap::new();
        let mut doc_freq: HashMap<&str, usize> = HashMap::new();
        for tokens in &tokenized {
            let mut seen: Vec<&str> = Vec::new();
            for token in tokens {
                *term_totals.entry(token.as_str()).or_insert(0) += 1;
                if !seen.contains(&token.as_str()) {
                    seen.push(token.as_str());
                    *doc_freq.entry(token.as_str()).or_insert(0) += 1;
                }
            }
        }

        let mut ranked: Vec<(&str, usize)> = term_totals.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        ranked.truncate(self.max_features);

        // Column order is alphabetical.
        let mut kept: Vec<&str> = ranked.into_iter().map(|(t, _)| t).collect();
        kept.sort_unstable();

        let n_docs = documents.len() as f64;
        self.vocabulary = kept
            .iter()
            .enumerate()
            .map(|(i, t)| (t.to_string(), i))
            .collect();
        self.idf = kept
            .iter()
            .map(|t| {
                let df = doc_freq.get(t).copied().unwrap_or(0) as f64;
                ((1.0 + n_docs) / (1.0 + df)).ln() + 1.0
            })
            .collect();

        self.transform_tokenized(&tokenized)
    }

    pub fn transform(&self, documents: &[String]) -> Array2<f64> {
        let tokenized: Vec<Vec<String>> = documents.iter().map(|d| tokenize(d)).collect();
        self.transform_tokenized(&tokenized)
    }

    fn transform_tokenized(&self, tokenized: &[Vec<String>]) -> Array2<f64> {
        let mut matrix = Array2::<f64>::zeros((tokenized.len(), self.vocabulary.len()));
        for (row, tokens) in tokenized.iter().enumerate() {
            for token in tokens {
                if let Some(&col) = self.vocabulary.get(token) {
                    matrix[[row, col]] += 1.0;
                }
            }
            for (col, idf) in self.idf.iter().enumerate() {
                matrix[[row, col]] *= idf;
            }
        }
        l2_normalize_rows(&mut matrix);
        matrix
    }
}

pub fn l2_normalize_rows(matrix: &mut Array2<f64>) {
    for mut row in matrix.rows_mut() {
        let norm = row.dot(&row).sqrt();
        if norm > 0.0 {
            row.mapv_inplace(|v| v / norm);
        }
    }
}

/// Pairwise cosine similarity between the rows of `matrix`. Zero rows have
/// similarity 0 with everything, themselves included.
pub fn cosine_similarity(matrix: &Array2<f64>) -> Array2<f64> {
    let mut normalized = matrix.clone();
    l2_normalize_rows(&mut normalized);
    normalized.dot(&normalized.t())
}
