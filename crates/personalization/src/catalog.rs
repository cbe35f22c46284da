//! Product catalog snapshot — the immutable set of products the similarity
//! models were fitted against.

use notify_core::types::ProductRecord;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct ProductCatalog {
    products: Vec<ProductRecord>,
    index: HashMap<String, usize>,
}

impl ProductCatalog {
    /// Later duplicates of a product id replace earlier ones.
    pub fn new(products: Vec<ProductRecord>) -> Self {
        let mut unique: Vec<ProductRecord> = Vec::with_capacity(products.len());
        let mut index = HashMap::new();
        for product in products {
            match index.get(&product.product_id) {
                Some(&i) => unique[i] = product,
                None => {
                    index.insert(product.product_id.clone(), unique.len());
                    unique.push(product);
                }
            }
        }
        Self {
            products: unique,
            index,
        }
    }

    pub fn get(&self, product_id: &str) -> Option<&ProductRecord> {
        self.index.get(product_id).map(|&i| &self.products[i])
    }

    pub fn position(&self, product_id: &str) -> Option<usize> {
        self.index.get(product_id).copied()
    }

    pub fn products(&self) -> &[ProductRecord] {
        &self.products
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// Text fed to the TF-IDF vectorizer for each product, in catalog order.
    pub fn documents(&self) -> Vec<String> {
        self.products
            .iter()
            .map(|p| {
                format!(
                    "{} {} {}",
                    p.name,
                    p.category,
                    p.subcategory.as_deref().unwrap_or("")
                )
            })
            .collect()
    }
}
