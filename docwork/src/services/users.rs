//! User business rules

use bson::oid::ObjectId;

use super::check_age;
use crate::identifier;
use crate::models::{User, UserStats};
use crate::repository::{
    Repository, RepositoryError, RepositoryResult, UserRepository,
};

/// User operations with validation and uniqueness rules
#[derive(Debug, Clone)]
pub struct UserService<R> {
    users: UserRepository<R>,
}

impl<R: Repository<User>> UserService<R> {
    pub fn new(users: UserRepository<R>) -> Self {
        Self { users }
    }

    /// The wrapped repository
    pub fn repository(&self) -> &UserRepository<R> {
        &self.users
    }

    /// Enforce email uniqueness at the store
    ///
    /// Closes the window between the duplicate pre-check in
    /// [`UserService::create_user`] and the insert.
    pub async fn ensure_indexes(&self) -> RepositoryResult<()> {
        self.users.ensure_unique_index("email").await
    }

    /// Create an active user named `User_{email}`
    ///
    /// Fails with `ValidationFailed` on an empty email or an age outside
    /// 0..=150 and with `DuplicateEntity` when the email is taken.
    pub async fn create_user(&self, email: &str, age: i32) -> RepositoryResult<User> {
        if email.is_empty() {
            return Err(RepositoryError::validation_failed("email is required"));
        }
        check_age(age)?;

        match self.users.find_by_email(email).await {
            Ok(_) => return Err(RepositoryError::duplicate("User", email)),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let user = self.users.insert(User::new(email, age)).await?;
        tracing::info!(email, "User created");
        Ok(user)
    }

    pub async fn get_user_by_id(&self, id: ObjectId) -> RepositoryResult<User> {
        self.users.find_one_by_id(id).await
    }

    pub async fn get_user_by_email(&self, email: &str) -> RepositoryResult<User> {
        self.users.find_by_email(email).await
    }

    /// Overwrite a stored user, matched by its `_id`
    pub async fn update_user(&self, user: User) -> RepositoryResult<User> {
        check_age(user.age)?;
        let id = user
            .base
            .id
            .ok_or_else(|| RepositoryError::validation_failed("user id is required"))?;
        self.users.update(&identifier::by_id(id), user).await
    }

    pub async fn deactivate_user(&self, id: ObjectId) -> RepositoryResult<()> {
        self.set_active(id, false).await.map(|_| ())
    }

    pub async fn activate_user(&self, id: ObjectId) -> RepositoryResult<User> {
        self.set_active(id, true).await
    }

    async fn set_active(&self, id: ObjectId, active: bool) -> RepositoryResult<User> {
        let mut user = self
            .users
            .find_one_by_id(id)
            .await
            .map_err(|e| e.context("user not found"))?;
        user.active = active;
        self.users.update(&identifier::by_id(id), user).await
    }

    /// Permanently remove a user
    pub async fn delete_user(&self, id: ObjectId) -> RepositoryResult<()> {
        self.users.delete(&identifier::by_id(id)).await
    }

    pub async fn get_all_active_users(&self) -> RepositoryResult<Vec<User>> {
        self.users.find_active_users().await
    }

    /// Users aged `min_age..=max_age`; the range must lie within 0..=150
    pub async fn get_users_by_age_range(
        &self,
        min_age: i32,
        max_age: i32,
    ) -> RepositoryResult<Vec<User>> {
        if min_age < 0 || max_age > 150 || min_age > max_age {
            return Err(RepositoryError::validation_failed("invalid age range"));
        }
        self.users.find_users_by_age_range(min_age, max_age).await
    }

    pub async fn get_user_statistics(&self) -> RepositoryResult<UserStats> {
        self.users.get_user_stats().await
    }

    /// Validate every user, then insert them in one batch
    ///
    /// Nothing is written when any user fails validation; the message names
    /// the zero-based index of the first offender.
    pub async fn create_users(&self, users: Vec<User>) -> RepositoryResult<Vec<User>> {
        for (i, user) in users.iter().enumerate() {
            if user.email.is_empty() {
                return Err(RepositoryError::validation_failed(format!(
                    "user {}: email is required",
                    i
                )));
            }
            check_age(user.age).map_err(|e| e.context(format!("user {}", i)))?;
        }
        self.users.bulk_insert(users).await
    }

    /// Deactivate users one at a time, stopping at the first failure
    pub async fn bulk_deactivate_users(&self, ids: &[ObjectId]) -> RepositoryResult<()> {
        for id in ids {
            self.deactivate_user(*id)
                .await
                .map_err(|e| e.context(format!("failed to deactivate user {}", id.to_hex())))?;
        }
        Ok(())
    }
}
