//! In-memory store content: groups, entries and their string fields.

use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Names of the standard entry fields.
pub mod standard_fields {
    /// Entry title.
    pub const TITLE: &str = "Title";
    /// Account user name.
    pub const USER_NAME: &str = "UserName";
    /// Account password.
    pub const PASSWORD: &str = "Password";
    /// Associated URL.
    pub const URL: &str = "URL";
    /// Free-form notes.
    pub const NOTES: &str = "Notes";

    /// Returns `true` for one of the five standard field names.
    pub fn is_standard(name: &str) -> bool {
        [TITLE, USER_NAME, PASSWORD, URL, NOTES].contains(&name)
    }
}

/// One named string value of an entry.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize)]
pub struct Field {
    /// Field name (standard or custom).
    pub name: String,
    /// Field value, possibly containing placeholders.
    pub value: String,
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("value_len", &self.value.len())
            .finish()
    }
}

/// Credential record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct Entry {
    /// Stable entry identifier.
    pub id: String,
    /// Identifier of the owning group.
    pub group: String,
    /// Modification counter, bumped on every field write.
    #[serde(default)]
    pub revision: u64,
    /// Ordered string fields.
    #[serde(default)]
    pub fields: Vec<Field>,
}

impl Entry {
    /// Creates an entry without fields.
    pub fn new(id: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            group: group.into(),
            revision: 0,
            fields: Vec::new(),
        }
    }

    /// Builder-style field setter used by fixtures and importers.
    pub fn with_field(mut self, name: &str, value: &str) -> Self {
        self.set(name, value);
        self
    }

    /// Returns a field value when present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|field| field.name == name)
            .map(|field| field.value.as_str())
    }

    /// Returns a field value or the empty string.
    pub fn read_safe(&self, name: &str) -> &str {
        self.get(name).unwrap_or("")
    }

    /// Writes a field value and bumps the revision.
    pub fn set(&mut self, name: &str, value: &str) {
        match self.fields.iter_mut().find(|field| field.name == name) {
            Some(field) => {
                field.value.zeroize();
                field.value = value.to_string();
            }
            None => self.fields.push(Field {
                name: name.to_string(),
                value: value.to_string(),
            }),
        }
        self.revision = self.revision.saturating_add(1);
    }
}

/// Folder of entries; groups form a tree through `parent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize)]
pub struct Group {
    /// Stable group identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Parent group identifier; `None` for the root.
    #[serde(default)]
    pub parent: Option<String>,
}

/// Decrypted in-memory content of one backing store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct Store {
    /// Database display name.
    #[serde(default)]
    pub name: String,
    /// All groups, root first.
    #[serde(default)]
    pub groups: Vec<Group>,
    /// All entries in storage order.
    #[serde(default)]
    pub entries: Vec<Entry>,
}

impl Store {
    /// Creates a store with a single root group.
    pub fn with_root(name: impl Into<String>, root_id: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            groups: vec![Group {
                id: root_id.into(),
                name: name.clone(),
                parent: None,
            }],
            name,
            entries: Vec::new(),
        }
    }

    /// Adds a child group.
    pub fn add_group(&mut self, id: &str, name: &str, parent: &str) {
        self.groups.push(Group {
            id: id.to_string(),
            name: name.to_string(),
            parent: Some(parent.to_string()),
        });
    }

    /// Adds an entry.
    pub fn add_entry(&mut self, entry: Entry) {
        self.entries.push(entry);
    }

    /// Looks up an entry by id.
    pub fn entry(&self, id: &str) -> Option<&Entry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    /// Looks up an entry by id for mutation.
    pub fn entry_mut(&mut self, id: &str) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|entry| entry.id == id)
    }

    /// Looks up a group by id.
    pub fn group(&self, id: &str) -> Option<&Group> {
        self.groups.iter().find(|group| group.id == id)
    }

    /// Returns the root group, if any.
    pub fn root(&self) -> Option<&Group> {
        self.groups.iter().find(|group| group.parent.is_none())
    }

    /// Iterates entries directly inside `group_id`, in storage order.
    pub fn entries_in_group<'a>(&'a self, group_id: &'a str) -> impl Iterator<Item = &'a Entry> {
        self.entries.iter().filter(move |entry| entry.group == group_id)
    }

    /// Returns the `.`-separated path of group names from the root.
    pub fn group_path(&self, group_id: &str) -> String {
        let mut names = Vec::new();
        let mut cursor = self.group(group_id);
        // Bounded walk: a malformed parent cycle must not hang the caller.
        while let Some(group) = cursor {
            if names.len() > self.groups.len() {
                break;
            }
            names.push(group.name.as_str());
            cursor = group.parent.as_deref().and_then(|parent| self.group(parent));
        }
        names.reverse();
        names.join(".")
    }
}
