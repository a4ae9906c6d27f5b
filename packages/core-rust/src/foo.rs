//! The foo domain entity and its partial-update record.

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};

/// A foo as the service sees it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Foo {
    /// Opaque identifier assigned once at creation.
    pub id: String,
    /// Unique, non-empty name.
    pub name: String,
    /// Free text. Empty means no note.
    pub note: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Foo {
    /// Checks the fields a caller must provide.
    ///
    /// # Errors
    ///
    /// Returns an `Invalid` error when the name is empty.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::invalid("name is required"));
        }
        Ok(())
    }

    /// Applies the present fields of `upd`, leaving absent ones untouched.
    pub fn apply(&mut self, upd: &FooUpdate) {
        if let Some(name) = &upd.name {
            self.name.clone_from(name);
        }
        if let Some(note) = &upd.note {
            self.note.clone_from(note);
        }
    }
}

/// Partial update of an existing foo.
///
/// `None` means "leave unchanged"; `Some(String::new())` means "set to empty".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FooUpdate {
    pub id: String,
    pub name: Option<String>,
    pub note: Option<String>,
}

impl FooUpdate {
    /// # Errors
    ///
    /// Returns an `Invalid` error when the id is empty or a present name is empty.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(Error::invalid("foo id is required"));
        }
        if self.name.as_deref() == Some("") {
            return Err(Error::invalid("name must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn validate_requires_name() {
        let foo = Foo {
            note: "note".to_string(),
            ..Foo::default()
        };
        assert_eq!(foo.validate().unwrap_err().kind(), ErrorKind::Invalid);

        let foo = Foo {
            name: "first_foo".to_string(),
            ..Foo::default()
        };
        assert!(foo.validate().is_ok());
    }

    #[test]
    fn apply_note_only_leaves_name() {
        let mut foo = Foo {
            id: "1".to_string(),
            name: "first".to_string(),
            note: "old".to_string(),
            ..Foo::default()
        };
        foo.apply(&FooUpdate {
            id: "1".to_string(),
            name: None,
            note: Some("new".to_string()),
        });
        assert_eq!(foo.name, "first");
        assert_eq!(foo.note, "new");
    }

    #[test]
    fn apply_distinguishes_empty_from_absent() {
        let mut foo = Foo {
            name: "first".to_string(),
            note: "old".to_string(),
            ..Foo::default()
        };
        foo.apply(&FooUpdate {
            note: Some(String::new()),
            ..FooUpdate::default()
        });
        assert_eq!(foo.note, "");
        assert_eq!(foo.name, "first");
    }

    #[test]
    fn update_validation() {
        assert!(FooUpdate::default().validate().is_err());
        let upd = FooUpdate {
            id: "1".to_string(),
            name: Some(String::new()),
            note: None,
        };
        assert_eq!(upd.validate().unwrap_err().kind(), ErrorKind::Invalid);
        let upd = FooUpdate {
            id: "1".to_string(),
            ..FooUpdate::default()
        };
        assert!(upd.validate().is_ok());
    }
}
