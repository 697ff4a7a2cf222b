//! Entity contract
//!
//! Every persisted type embeds a [`BaseEntity`] (identity, slug, name and the
//! lifecycle timestamps) and implements [`Entity`] so the unit of work can
//! stamp timestamps, read identities and build sparse filters without
//! knowing the concrete type.
//!
//! # Example
//!
//! ```rust
//! use bson::Document;
//! use docwork::domain::{BaseEntity, Entity};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Default, Serialize, Deserialize)]
//! pub struct Tag {
//!     #[serde(flatten)]
//!     pub base: BaseEntity,
//!     #[serde(default)]
//!     pub color: String,
//! }
//!
//! impl Entity for Tag {
//!     fn base(&self) -> &BaseEntity {
//!         &self.base
//!     }
//!
//!     fn base_mut(&mut self) -> &mut BaseEntity {
//!         &mut self.base
//!     }
//!
//!     fn filter_fields(&self) -> Document {
//!         let mut filter = self.base.filter_fields();
//!         if !self.color.is_empty() {
//!             filter.insert("color", self.color.clone());
//!         }
//!         filter
//!     }
//! }
//!
//! assert_eq!(Tag::collection_name(), "tags");
//! ```

use bson::{oid::ObjectId, DateTime, Document};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Persisted name of the soft-delete timestamp
pub const DELETED_AT: &str = "deletedAt";

/// Persisted name of the last-update timestamp
pub const UPDATED_AT: &str = "updatedAt";

/// Persisted name of the identity field
pub const ID: &str = "_id";

/// Current time at the precision the store keeps (milliseconds)
pub fn now() -> DateTime {
    DateTime::from_chrono(chrono::Utc::now())
}

/// Fields shared by every persisted entity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseEntity {
    /// Identity, assigned on insert when absent
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    /// Human-readable lookup key
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub slug: String,

    /// Display name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    /// Stamped on insert
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime>,

    /// Stamped on insert and every mutation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime>,

    /// Present while the entity is soft-deleted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime>,
}

impl BaseEntity {
    /// Base fields with a name and slug, everything else unset
    pub fn new(name: impl Into<String>, slug: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slug: slug.into(),
            ..Default::default()
        }
    }

    /// True while a deletion timestamp is present
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Stamp creation and update with the same instant
    pub fn stamp_created(&mut self, at: DateTime) {
        self.created_at = Some(at);
        self.updated_at = Some(at);
    }

    /// Stamp the update timestamp
    pub fn touch(&mut self, at: DateTime) {
        self.updated_at = Some(at);
    }

    /// Set deletion and update timestamps
    pub fn mark_deleted(&mut self, at: DateTime) {
        self.deleted_at = Some(at);
        self.updated_at = Some(at);
    }

    /// Clear the deletion timestamp and re-stamp the update timestamp
    pub fn restore(&mut self, at: DateTime) {
        self.deleted_at = None;
        self.updated_at = Some(at);
    }

    /// Equality predicates for every base field that is set
    pub fn filter_fields(&self) -> Document {
        let mut filter = Document::new();
        if let Some(id) = self.id {
            filter.insert(ID, id);
        }
        if !self.slug.is_empty() {
            filter.insert("slug", self.slug.clone());
        }
        if !self.name.is_empty() {
            filter.insert("name", self.name.clone());
        }
        if let Some(at) = self.created_at {
            filter.insert("createdAt", at);
        }
        if let Some(at) = self.updated_at {
            filter.insert(UPDATED_AT, at);
        }
        if let Some(at) = self.deleted_at {
            filter.insert(DELETED_AT, at);
        }
        filter
    }
}

/// Capabilities every persisted type exposes
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + Unpin + 'static {
    /// Embedded base fields
    fn base(&self) -> &BaseEntity;

    /// Embedded base fields, mutable
    fn base_mut(&mut self) -> &mut BaseEntity;

    /// Every non-default field as an equality predicate under its persisted name
    ///
    /// Used when an entity serves as a sparse filter. A field that holds its
    /// default value cannot be matched through this path.
    fn filter_fields(&self) -> Document;

    /// Identity, if assigned
    fn id(&self) -> Option<ObjectId> {
        self.base().id
    }

    /// True while a deletion timestamp is present
    fn is_deleted(&self) -> bool {
        self.base().is_deleted()
    }

    /// Type name without its module path, e.g. `User`
    fn entity_name() -> &'static str
    where
        Self: Sized,
    {
        entity_name::<Self>()
    }

    /// Collection holding this type, e.g. `users`
    fn collection_name() -> String
    where
        Self: Sized,
    {
        collection_name::<Self>()
    }
}

/// Type name without its module path or generic arguments
pub fn entity_name<E: ?Sized>() -> &'static str {
    let full = std::any::type_name::<E>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Lowercased type name plus `s`; no irregular plurals
pub fn collection_name<E: ?Sized>() -> String {
    format!("{}s", entity_name::<E>().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    struct Category;
    mod nested {
        pub struct Person;
    }

    #[test]
    fn test_collection_name() {
        assert_eq!(collection_name::<Category>(), "categorys");
        assert_eq!(collection_name::<nested::Person>(), "persons");
        assert_eq!(entity_name::<nested::Person>(), "Person");
    }

    #[test]
    fn test_is_deleted_follows_deleted_at() {
        let mut base = BaseEntity::new("Widget", "widget");
        assert!(!base.is_deleted());

        let at = now();
        base.mark_deleted(at);
        assert!(base.is_deleted());
        assert_eq!(base.updated_at, Some(at));

        base.restore(now());
        assert!(!base.is_deleted());
        assert!(base.deleted_at.is_none());
    }

    #[test]
    fn test_stamp_created_sets_equal_timestamps() {
        let mut base = BaseEntity::default();
        base.stamp_created(now());
        assert!(base.created_at.is_some());
        assert_eq!(base.created_at, base.updated_at);
    }

    #[test]
    fn test_serialized_names() {
        let id = ObjectId::new();
        let at = DateTime::from_millis(1_700_000_000_000);
        let base = BaseEntity {
            id: Some(id),
            slug: "s".to_string(),
            name: "n".to_string(),
            created_at: Some(at),
            updated_at: Some(at),
            deleted_at: None,
        };
        let doc = bson::to_document(&base).unwrap();
        assert_eq!(
            doc,
            doc! { "_id": id, "slug": "s", "name": "n", "createdAt": at, "updatedAt": at }
        );

        let back: BaseEntity = bson::from_document(doc).unwrap();
        assert_eq!(back, base);
    }

    #[test]
    fn test_empty_base_serializes_to_empty_document() {
        let doc = bson::to_document(&BaseEntity::default()).unwrap();
        assert!(doc.is_empty());
    }

    #[test]
    fn test_filter_fields_skips_unset() {
        let base = BaseEntity::new("", "only-slug");
        assert_eq!(base.filter_fields(), doc! { "slug": "only-slug" });
    }
}
