//! Product recommendation engine — collaborative filtering over a user×item
//! purchase matrix, content-based filtering over TF-IDF product text, and a
//! rank-weighted hybrid of the two.
//!
//! A `RecommendationEngine` is an immutable snapshot: it is fitted once from
//! the catalog and purchase history and never updated in place.

use ndarray::Array2;
use notify_core::config::RecommendationConfig;
use notify_core::error::{NotifyError, NotifyResult};
use notify_core::types::{ProductRecord, PurchaseRecord, Recommendation};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, info};

use crate::catalog::ProductCatalog;
use crate::tfidf::{cosine_similarity, TfidfVectorizer};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredItem {
    pub product_id: String,
    pub score: f64,
}

/// Highest score first; equal scores fall back to product id.
fn sort_scored(items: &mut [ScoredItem]) {
    items.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.product_id.cmp(&b.product_id))
    });
}

/// `(count - i) / count` for 0-based rank `i`.
fn rank_weight(rank: usize, count: usize) -> f64 {
    (count - rank) as f64 / count as f64
}

// ─── Collaborative filtering ───────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CollaborativeModel {
    user_index: HashMap<String, usize>,
    items: Vec<String>,
    /// Purchase counts, users × items.
    matrix: Array2<f64>,
    /// Cosine similarity between user rows.
    similarity: Array2<f64>,
}

impl CollaborativeModel {
    pub fn fit(purchases: &[PurchaseRecord]) -> Self {
        let users: BTreeSet<&str> = purchases.iter().map(|p| p.user_id.as_str()).collect();
        let items: BTreeSet<&str> = purchases.iter().map(|p| p.product_id.as_str()).collect();
        let user_index: HashMap<String, usize> = users
            .iter()
            .enumerate()
            .map(|(i, u)| (u.to_string(), i))
            .collect();
        let item_index: HashMap<&str, usize> =
            items.iter().enumerate().map(|(i, p)| (*p, i)).collect();

        let mut matrix = Array2::<f64>::zeros((users.len(), items.len()));
        for purchase in purchases {
            let u = user_index[purchase.user_id.as_str()];
            let i = item_index[purchase.product_id.as_str()];
            matrix[[u, i]] += 1.0;
        }
        let similarity = cosine_similarity(&matrix);

        Self {
            user_index,
            items: items.into_iter().map(str::to_string).collect(),
            matrix,
            similarity,
        }
    }

    pub fn empty() -> Self {
        Self::fit(&[])
    }

    pub fn user_count(&self) -> usize {
        self.user_index.len()
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Items bought by the `neighbor_count` most similar users that the
    /// target has never bought, weighted by neighbor rank. Users with no
    /// purchase row get an empty list.
    pub fn recommend(&self, user_id: &str, neighbor_count: usize, limit: usize) -> Vec<ScoredItem> {
        let Some(&target) = self.user_index.get(user_id) else {
            return Vec::new();
        };

        let mut neighbors: Vec<(usize, f64)> = (0..self.user_index.len())
            .filter(|&u| u != target)
            .map(|u| (u, self.similarity[[target, u]]))
            .collect();
        neighbors.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        neighbors.truncate(neighbor_count);

        let k = neighbors.len();
        let mut scores: HashMap<usize, f64> = HashMap::new();
        for (rank, (neighbor, _)) in neighbors.iter().enumerate() {
            let weight = rank_weight(rank, k);
            for item in 0..self.items.len() {
                if self.matrix[[*neighbor, item]] > 0.0 && self.matrix[[target, item]] == 0.0 {
                    *scores.entry(item).or_insert(0.0) += weight;
                }
            }
        }

        let mut items: Vec<ScoredItem> = scores
            .into_iter()
            .map(|(item, score)| ScoredItem {
                product_id: self.items[item].clone(),
                score,
            })
            .collect();
        sort_scored(&mut items);
        items.truncate(limit);
        items
    }
}

// ─── Content-based filtering ───────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ContentModel {
    catalog: ProductCatalog,
    /// Cosine similarity between products, in catalog order.
    similarity: Array2<f64>,
}

impl ContentModel {
    pub fn fit(catalog: &ProductCatalog, max_features: usize) -> Self {
        let mut vectorizer = TfidfVectorizer::new(max_features);
        let tfidf = vectorizer.fit_transform(&catalog.documents());
        debug!(
            products = catalog.len(),
            vocabulary = vectorizer.vocabulary_len(),
            "Fitted TF-IDF product vectors"
        );
        Self {
            catalog: catalog.clone(),
            similarity: cosine_similarity(&tfidf),
        }
    }

    /// Nearest `neighbors_per_item` products (never the product itself) for
    /// each purchased product, with similarities summed across purchases.
    /// With `exclude_purchased`, purchased products are skipped as neighbors.
    pub fn recommend(
        &self,
        purchased: &[String],
        neighbors_per_item: usize,
        limit: usize,
        exclude_purchased: bool,
    ) -> Vec<ScoredItem> {
        let owned: HashSet<&str> = purchased.iter().map(String::as_str).collect();
        let mut scores: HashMap<usize, f64> = HashMap::new();
        let mut visited: HashSet<usize> = HashSet::new();

        for product_id in purchased {
            let Some(source) = self.catalog.position(product_id) else {
                continue;
            };
            if !visited.insert(source) {
                continue;
            }

            let mut candidates: Vec<(usize, f64)> = (0..self.catalog.len())
                .filter(|&j| j != source)
                .filter(|&j| {
                    !exclude_purchased
                        || !owned.contains(self.catalog.products()[j].product_id.as_str())
                })
                .map(|j| (j, self.similarity[[source, j]]))
                .collect();
            candidates.sort_by(|a, b| {
                b.1.partial_cmp(&a.1)
                    .unwrap_or(Ordering::Equal)
                    .then(a.0.cmp(&b.0))
            });
            for (j, sim) in candidates.into_iter().take(neighbors_per_item) {
                *scores.entry(j).or_insert(0.0) += sim;
            }
        }

        let mut items: Vec<ScoredItem> = scores
            .into_iter()
            .map(|(j, score)| ScoredItem {
                product_id: self.catalog.products()[j].product_id.clone(),
                score,
            })
            .collect();
        sort_scored(&mut items);
        items.truncate(limit);
        items
    }
}

// ─── Hybrid ────────────────────────────────────────────────────────────────

/// Merge two ranked lists with rank-decay weights scaled by each model's
/// weight. Scores of items present in both lists add up.
pub fn hybrid_merge(
    collaborative: &[ScoredItem],
    content: &[ScoredItem],
    collaborative_weight: f64,
    content_weight: f64,
    limit: usize,
) -> Vec<ScoredItem> {
    let mut combined: HashMap<&str, f64> = HashMap::new();
    for (list, weight) in [(collaborative, collaborative_weight), (content, content_weight)] {
        for (rank, item) in list.iter().enumerate() {
            *combined.entry(item.product_id.as_str()).or_insert(0.0) +=
                rank_weight(rank, list.len()) * weight;
        }
    }
    let mut merged: Vec<ScoredItem> = combined
        .into_iter()
        .map(|(product_id, score)| ScoredItem {
            product_id: product_id.to_string(),
            score,
        })
        .collect();
    sort_scored(&mut merged);
    merged.truncate(limit);
    merged
}

pub struct RecommendationEngine {
    catalog: ProductCatalog,
    collaborative: CollaborativeModel,
    content: ContentModel,
    purchased_by_user: HashMap<String, Vec<String>>,
    config: RecommendationConfig,
}

impl RecommendationEngine {
    /// Fit both models. Fails on an empty catalog.
    pub fn build(
        catalog: Vec<ProductRecord>,
        purchases: &[PurchaseRecord],
        config: RecommendationConfig,
    ) -> NotifyResult<Self> {
        if catalog.is_empty() {
            return Err(NotifyError::ModelBuild(
                "product catalog is empty".to_string(),
            ));
        }
        let purchases_len = purchases.len();
        let catalog = ProductCatalog::new(catalog);
        // Purchases of products no longer in the catalog never become candidates.
        let purchases: Vec<PurchaseRecord> = purchases
            .iter()
            .filter(|p| catalog.get(&p.product_id).is_some())
            .cloned()
            .collect();
        let dropped = purchases_len - purchases.len();
        if dropped > 0 {
            debug!(dropped, "Ignoring purchases of products outside the catalog");
        }
        let collaborative = CollaborativeModel::fit(&purchases);
        let content = ContentModel::fit(&catalog, config.max_features);

        let mut owned: HashMap<String, BTreeSet<String>> = HashMap::new();
        for purchase in &purchases {
            owned
                .entry(purchase.user_id.clone())
                .or_default()
                .insert(purchase.product_id.clone());
        }
        let purchased_by_user = owned
            .into_iter()
            .map(|(user, products)| (user, products.into_iter().collect()))
            .collect();

        info!(
            users = collaborative.user_count(),
            items = collaborative.item_count(),
            products = catalog.len(),
            "Built recommendation models"
        );

        Ok(Self {
            catalog,
            collaborative,
            content,
            purchased_by_user,
            config,
        })
    }

    /// Engine with no data; every query returns an empty list.
    pub fn empty(config: RecommendationConfig) -> Self {
        let catalog = ProductCatalog::default();
        Self {
            content: ContentModel::fit(&catalog, config.max_features),
            catalog,
            collaborative: CollaborativeModel::empty(),
            purchased_by_user: HashMap::new(),
            config,
        }
    }

    pub fn catalog(&self) -> &ProductCatalog {
        &self.catalog
    }

    pub fn collaborative(&self, user_id: &str, limit: usize) -> Vec<ScoredItem> {
        self.collaborative
            .recommend(user_id, self.config.neighbor_count, limit)
    }

    pub fn content_based(&self, user_id: &str, limit: usize) -> Vec<ScoredItem> {
        match self.purchased_by_user.get(user_id) {
            Some(purchased) => self.content.recommend(
                purchased,
                self.config.content_neighbors,
                limit,
                self.config.content_exclude_purchased,
            ),
            None => Vec::new(),
        }
    }

    /// Ranked hybrid list with product metadata attached. Candidates missing
    /// from the catalog are dropped.
    pub fn hybrid(&self, user_id: &str, limit: usize) -> Vec<Recommendation> {
        let collaborative = self.collaborative(user_id, limit);
        let content = self.content_based(user_id, limit);
        let merged = hybrid_merge(
            &collaborative,
            &content,
            self.config.collaborative_weight,
            self.config.content_weight,
            limit,
        );

        merged
            .into_iter()
            .filter_map(|item| {
                self.catalog.get(&item.product_id).map(|p| Recommendation {
                    product_id: p.product_id.clone(),
                    name: p.name.clone(),
                    category: p.category.clone(),
                    price: p.price,
                    score: item.score,
                })
            })
            .collect()
    }
}
