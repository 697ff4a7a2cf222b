//! Product business rules

use bson::oid::ObjectId;

use super::check_price;
use crate::identifier;
use crate::models::{Product, ProductStats};
use crate::repository::{ProductRepository, Repository, RepositoryError, RepositoryResult};

/// Product operations with validation rules
#[derive(Debug, Clone)]
pub struct ProductService<R> {
    products: ProductRepository<R>,
}

impl<R: Repository<Product>> ProductService<R> {
    pub fn new(products: ProductRepository<R>) -> Self {
        Self { products }
    }

    /// The wrapped repository
    pub fn repository(&self) -> &ProductRepository<R> {
        &self.products
    }

    /// Create an in-stock product with slug `{category}-{name}`
    pub async fn create_product(
        &self,
        name: &str,
        category: &str,
        price: f64,
    ) -> RepositoryResult<Product> {
        if name.is_empty() {
            return Err(RepositoryError::validation_failed(
                "product name is required",
            ));
        }
        if category.is_empty() {
            return Err(RepositoryError::validation_failed(
                "product category is required",
            ));
        }
        check_price(price)?;

        let product = self
            .products
            .insert(Product::new(name, category, price))
            .await?;
        tracing::info!(name, category, "Product created");
        Ok(product)
    }

    pub async fn get_product_by_id(&self, id: ObjectId) -> RepositoryResult<Product> {
        self.products.find_one_by_id(id).await
    }

    /// Overwrite a stored product, matched by its `_id`
    pub async fn update_product(&self, product: Product) -> RepositoryResult<Product> {
        check_price(product.price)?;
        let id = product
            .base
            .id
            .ok_or_else(|| RepositoryError::validation_failed("product id is required"))?;
        self.products.update(&identifier::by_id(id), product).await
    }

    pub async fn set_product_stock(&self, id: ObjectId, in_stock: bool) -> RepositoryResult<Product> {
        let mut product = self
            .products
            .find_one_by_id(id)
            .await
            .map_err(|e| e.context("product not found"))?;
        product.in_stock = in_stock;
        self.products.update(&identifier::by_id(id), product).await
    }

    /// Permanently remove a product
    pub async fn delete_product(&self, id: ObjectId) -> RepositoryResult<()> {
        self.products.delete(&identifier::by_id(id)).await
    }

    pub async fn get_products_by_category(&self, category: &str) -> RepositoryResult<Vec<Product>> {
        if category.is_empty() {
            return Err(RepositoryError::validation_failed("category is required"));
        }
        self.products.find_by_category(category).await
    }

    pub async fn get_in_stock_products(&self) -> RepositoryResult<Vec<Product>> {
        self.products.find_in_stock_products().await
    }

    /// Products priced `min_price..=max_price`; both bounds non-negative
    pub async fn get_products_by_price_range(
        &self,
        min_price: f64,
        max_price: f64,
    ) -> RepositoryResult<Vec<Product>> {
        if min_price < 0.0 || max_price < 0.0 || min_price > max_price {
            return Err(RepositoryError::validation_failed("invalid price range"));
        }
        self.products
            .find_products_by_price_range(min_price, max_price)
            .await
    }

    pub async fn get_product_statistics(&self) -> RepositoryResult<ProductStats> {
        self.products.get_product_stats().await
    }

    /// Validate every product, then insert them in one batch
    pub async fn create_products(&self, products: Vec<Product>) -> RepositoryResult<Vec<Product>> {
        for (i, product) in products.iter().enumerate() {
            let checked = if product.base.name.is_empty() {
                Err(RepositoryError::validation_failed("name is required"))
            } else if product.category.is_empty() {
                Err(RepositoryError::validation_failed("category is required"))
            } else {
                check_price(product.price)
            };
            if let Err(e) = checked {
                return Err(RepositoryError::validation_failed(format!(
                    "product {}: {}",
                    i, e.message
                )));
            }
        }
        self.products.bulk_insert(products).await
    }

    /// Set the stock flag one product at a time, stopping at the first failure
    pub async fn bulk_update_stock(&self, ids: &[ObjectId], in_stock: bool) -> RepositoryResult<()> {
        for id in ids {
            self.set_product_stock(*id, in_stock).await.map_err(|e| {
                e.context(format!("failed to update stock for product {}", id.to_hex()))
            })?;
        }
        Ok(())
    }
}
