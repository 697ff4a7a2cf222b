//! User finders and statistics on top of a generic repository

use std::ops::Deref;

use super::traits::{Repository, RepositoryResult};
use crate::identifier::{self, Identifier};
use crate::models::{User, UserStats};

/// User-specific queries; everything else derefs to the wrapped repository
#[derive(Debug, Clone)]
pub struct UserRepository<R> {
    inner: R,
}

impl<R: Repository<User>> UserRepository<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Live user with the given email
    pub async fn find_by_email(&self, email: &str) -> RepositoryResult<User> {
        self.inner.find_one(&identifier::by_email(email)).await
    }

    /// Live users flagged active
    pub async fn find_active_users(&self) -> RepositoryResult<Vec<User>> {
        self.inner.find_all(&identifier::active()).await
    }

    /// Live users with `min_age <= age <= max_age`
    pub async fn find_users_by_age_range(
        &self,
        min_age: i32,
        max_age: i32,
    ) -> RepositoryResult<Vec<User>> {
        self.inner
            .find_all(&Identifier::new().between("age", min_age, max_age))
            .await
    }

    /// Totals and mean age over live users
    pub async fn get_user_stats(&self) -> RepositoryResult<UserStats> {
        let users = self.inner.find_all(&Identifier::new()).await?;
        let active_users = users.iter().filter(|u| u.active).count() as u64;
        let average_age = if users.is_empty() {
            0.0
        } else {
            users.iter().map(|u| f64::from(u.age)).sum::<f64>() / users.len() as f64
        };
        Ok(UserStats {
            total_users: users.len() as u64,
            active_users,
            average_age,
        })
    }
}

impl<R> Deref for UserRepository<R> {
    type Target = R;

    fn deref(&self) -> &R {
        &self.inner
    }
}
