//! Product finders and statistics on top of a generic repository

use std::collections::BTreeSet;
use std::ops::Deref;

use super::traits::{Repository, RepositoryResult};
use crate::identifier::Identifier;
use crate::models::{Product, ProductStats};

/// Product-specific queries; everything else derefs to the wrapped repository
#[derive(Debug, Clone)]
pub struct ProductRepository<R> {
    inner: R,
}

impl<R: Repository<Product>> ProductRepository<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Live products in `category`
    pub async fn find_by_category(&self, category: &str) -> RepositoryResult<Vec<Product>> {
        self.inner
            .find_all(&Identifier::new().equal("category", category))
            .await
    }

    /// Live products flagged in stock
    pub async fn find_in_stock_products(&self) -> RepositoryResult<Vec<Product>> {
        self.inner
            .find_all(&Identifier::new().equal("inStock", true))
            .await
    }

    /// Live products with `min_price <= price <= max_price`
    pub async fn find_products_by_price_range(
        &self,
        min_price: f64,
        max_price: f64,
    ) -> RepositoryResult<Vec<Product>> {
        self.inner
            .find_all(&Identifier::new().between("price", min_price, max_price))
            .await
    }

    /// Totals, mean price and distinct categories over live products
    pub async fn get_product_stats(&self) -> RepositoryResult<ProductStats> {
        let products = self.inner.find_all(&Identifier::new()).await?;
        let in_stock_products = products.iter().filter(|p| p.in_stock).count() as u64;
        let average_price = if products.is_empty() {
            0.0
        } else {
            products.iter().map(|p| p.price).sum::<f64>() / products.len() as f64
        };
        let categories: BTreeSet<&str> = products.iter().map(|p| p.category.as_str()).collect();

        Ok(ProductStats {
            total_products: products.len() as u64,
            in_stock_products,
            average_price,
            categories: categories.into_iter().map(str::to_string).collect(),
        })
    }
}

impl<R> Deref for ProductRepository<R> {
    type Target = R;

    fn deref(&self) -> &R {
        &self.inner
    }
}
