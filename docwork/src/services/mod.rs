//! Service layer
//!
//! Services validate input and apply business rules before delegating to a
//! repository. Rule violations are `ValidationFailed` errors whose message
//! names the broken rule; callers match on the error kind, not the text.
//!
//! Sequential batch operations (`bulk_deactivate_users`, `bulk_update_stock`)
//! stop at the first failing item and keep the items already applied.

mod products;
mod users;

pub use products::ProductService;
pub use users::UserService;

use crate::repository::{RepositoryError, RepositoryResult};

/// Inclusive bounds for a user's age
pub const AGE_RANGE: std::ops::RangeInclusive<i32> = 0..=150;

fn check_age(age: i32) -> RepositoryResult<()> {
    if AGE_RANGE.contains(&age) {
        Ok(())
    } else {
        Err(RepositoryError::validation_failed(
            "age must be between 0 and 150",
        ))
    }
}

fn check_price(price: f64) -> RepositoryResult<()> {
    if price >= 0.0 {
        Ok(())
    } else {
        Err(RepositoryError::validation_failed(
            "price must be non-negative",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::RepositoryErrorKind;

    #[test]
    fn test_check_age_bounds() {
        assert!(check_age(0).is_ok());
        assert!(check_age(150).is_ok());
        let err = check_age(-5).unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::ValidationFailed);
        assert_eq!(err.message, "age must be between 0 and 150");
        assert!(check_age(200).is_err());
    }

    #[test]
    fn test_check_price() {
        assert!(check_price(0.0).is_ok());
        assert_eq!(
            check_price(-0.01).unwrap_err().message,
            "price must be non-negative"
        );
        assert!(check_price(f64::NAN).is_err());
    }
}
