//! Bundled entities used by the specific repositories and services

use bson::Document;
use serde::{Deserialize, Serialize};

use crate::domain::{BaseEntity, Entity};

/// A user account
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(flatten)]
    pub base: BaseEntity,

    #[serde(default)]
    pub email: String,

    #[serde(default)]
    pub age: i32,

    #[serde(default)]
    pub active: bool,
}

impl User {
    /// Active user named `User_{email}` with slug `user-{email}`
    pub fn new(email: impl Into<String>, age: i32) -> Self {
        let email = email.into();
        Self {
            base: BaseEntity::new(format!("User_{}", email), format!("user-{}", email)),
            email,
            age,
            active: true,
        }
    }
}

impl Entity for User {
    fn base(&self) -> &BaseEntity {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseEntity {
        &mut self.base
    }

    fn filter_fields(&self) -> Document {
        let mut filter = self.base.filter_fields();
        if !self.email.is_empty() {
            filter.insert("email", self.email.clone());
        }
        if self.age != 0 {
            filter.insert("age", self.age);
        }
        if self.active {
            filter.insert("active", true);
        }
        filter
    }
}

/// A catalog product
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    #[serde(flatten)]
    pub base: BaseEntity,

    #[serde(default)]
    pub price: f64,

    #[serde(default)]
    pub category: String,

    #[serde(default)]
    pub in_stock: bool,
}

impl Product {
    /// In-stock product with slug `{category}-{name}`
    pub fn new(name: impl Into<String>, category: impl Into<String>, price: f64) -> Self {
        let name = name.into();
        let category = category.into();
        Self {
            base: BaseEntity::new(name.clone(), format!("{}-{}", category, name)),
            price,
            category,
            in_stock: true,
        }
    }
}

impl Entity for Product {
    fn base(&self) -> &BaseEntity {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseEntity {
        &mut self.base
    }

    fn filter_fields(&self) -> Document {
        let mut filter = self.base.filter_fields();
        if self.price != 0.0 {
            filter.insert("price", self.price);
        }
        if !self.category.is_empty() {
            filter.insert("category", self.category.clone());
        }
        if self.in_stock {
            filter.insert("inStock", true);
        }
        filter
    }
}

/// Aggregate figures over live users
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub total_users: u64,
    pub active_users: u64,
    /// Mean age, `0.0` when there are no users
    pub average_age: f64,
}

/// Aggregate figures over live products
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductStats {
    pub total_products: u64,
    pub in_stock_products: u64,
    /// Mean price, `0.0` when there are no products
    pub average_price: f64,
    /// Distinct categories, sorted
    pub categories: Vec<String>,
}
