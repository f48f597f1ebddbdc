//! Reference placeholder compiler.
//!
//! Supported placeholders (matched case-insensitively):
//! - standard fields as `{Title}`, `{UserName}`, `{Password}`, `{URL}`, `{Notes}`
//! - custom fields as `{S:<name>}`
//! - `{GROUP}`, `{GROUPPATH}`
//! - `{DOCDIR}`, `{DB_PATH}`, `{DB_DIR}`, `{DB_NAME}`, `{DB_BASENAME}`, `{DB_EXT}`
//! - `{ENV_DIRSEP}`
//! - field references `{REF:<wanted>@<searched>:<text>}`

use std::collections::HashMap;
use std::path::MAIN_SEPARATOR;

use vault_session_core::{Entry, Locator, Store, standard_fields};

use crate::{ExpandContext, ExpandError, PlaceholderCompiler};

/// Maximum nesting of placeholder values and references.
pub const MAX_RECURSION_DEPTH: u32 = 12;

const REF_START: &str = "{REF:";
const REF_LOOP_LIMIT: usize = 20;
const CUSTOM_FIELD_PREFIX: &str = "S:";

type RefCache = HashMap<String, String>;

/// Placeholder compiler over an entry snapshot.
#[derive(Debug, Default, Clone, Copy)]
pub struct SprCompiler;

impl SprCompiler {
    /// Creates the compiler.
    pub fn new() -> Self {
        Self
    }

    fn compile(
        &self,
        text: &str,
        entry: &Entry,
        store: &Store,
        locator: &Locator,
        depth: u32,
        refs: &mut RefCache,
    ) -> Result<String, ExpandError> {
        if depth >= MAX_RECURSION_DEPTH {
            return Err(ExpandError::RecursionLimit);
        }
        if !text.contains('{') {
            return Ok(text.to_string());
        }

        let mut out = text.to_string();
        let scope = Scope {
            entry,
            store,
            locator,
            depth,
        };

        for field in &entry.fields {
            let placeholder = if standard_fields::is_standard(&field.name) {
                format!("{{{}}}", field.name)
            } else {
                format!("{{{CUSTOM_FIELD_PREFIX}{}}}", field.name)
            };
            out = self.fill_if_exists(&out, &placeholder, &field.value, &scope, refs)?;
        }

        if let Some(group) = store.group(&entry.group) {
            out = self.fill_if_exists(&out, "{GROUP}", &group.name, &scope, refs)?;
            let path = store.group_path(&group.id);
            out = self.fill_if_exists(&out, "{GROUPPATH}", &path, &scope, refs)?;
        }

        if !locator.is_empty() {
            let db = DbParts::of(locator);
            out = self.fill_if_exists(&out, "{DOCDIR}", &db.dir, &scope, refs)?;
            out = self.fill_if_exists(&out, "{DB_PATH}", &db.path, &scope, refs)?;
            out = self.fill_if_exists(&out, "{DB_DIR}", &db.dir, &scope, refs)?;
            out = self.fill_if_exists(&out, "{DB_NAME}", &db.name, &scope, refs)?;
            out = self.fill_if_exists(&out, "{DB_BASENAME}", &db.base_name, &scope, refs)?;
            out = self.fill_if_exists(&out, "{DB_EXT}", &db.extension, &scope, refs)?;
        }

        out = self.fill_if_exists(&out, "{ENV_DIRSEP}", &MAIN_SEPARATOR.to_string(), &scope, refs)?;

        self.fill_references(out, store, locator, depth, refs)
    }

    fn fill_if_exists(
        &self,
        text: &str,
        placeholder: &str,
        value: &str,
        scope: &Scope<'_>,
        refs: &mut RefCache,
    ) -> Result<String, ExpandError> {
        if find_ci(text, placeholder, 0).is_none() {
            return Ok(text.to_string());
        }
        let compiled = self.compile(
            value,
            scope.entry,
            scope.store,
            scope.locator,
            scope.depth + 1,
            refs,
        )?;
        Ok(replace_ci(text, placeholder, &compiled))
    }

    fn fill_references(
        &self,
        mut text: String,
        store: &Store,
        locator: &Locator,
        depth: u32,
        refs: &mut RefCache,
    ) -> Result<String, ExpandError> {
        let mut offset = 0;
        for _ in 0..REF_LOOP_LIMIT {
            text = fill_from_cache(text, refs);

            let Some(start) = find_ci(&text, REF_START, offset) else {
                break;
            };
            let Some(end) = text[start..].find('}').map(|rel| start + rel) else {
                break;
            };
            let full = text[start..=end].to_string();
            let inner = &text[start + REF_START.len()..end];

            let Some(reference) = FieldRef::parse(inner) else {
                offset = start + 1;
                continue;
            };
            let Some(found) = reference.find_in(store) else {
                offset = start + 1;
                continue;
            };
            let Some(raw) = reference.wanted_value(found) else {
                offset = start + 1;
                continue;
            };

            let compiled = self.compile(&raw, found, store, locator, depth + 1, refs)?;
            refs.entry(full).or_insert(compiled);
            text = fill_from_cache(text, refs);
        }
        Ok(text)
    }
}

impl PlaceholderCompiler for SprCompiler {
    fn expand(&self, template: &str, ctx: &ExpandContext) -> Result<String, ExpandError> {
        let entry = ctx.entry()?;
        let mut refs = RefCache::new();
        self.compile(template, entry, &ctx.store, &ctx.locator, 0, &mut refs)
    }
}

struct Scope<'a> {
    entry: &'a Entry,
    store: &'a Store,
    locator: &'a Locator,
    depth: u32,
}

struct DbParts {
    path: String,
    dir: String,
    name: String,
    base_name: String,
    extension: String,
}

impl DbParts {
    fn of(locator: &Locator) -> Self {
        let path = locator.as_str().to_string();
        let name = locator.file_name().to_string();
        let dir = path
            .rfind(['/', '\\'])
            .map(|index| path[..index].to_string())
            .unwrap_or_default();
        let (base_name, extension) = match name.rfind('.') {
            Some(index) if index > 0 => (name[..index].to_string(), name[index + 1..].to_string()),
            _ => (name.clone(), String::new()),
        };
        Self {
            path,
            dir,
            name,
            base_name,
            extension,
        }
    }
}

/// Parsed `<wanted>@<searched>:<text>` reference body.
struct FieldRef<'a> {
    wanted: char,
    searched: char,
    needle: &'a str,
}

impl<'a> FieldRef<'a> {
    fn parse(inner: &'a str) -> Option<Self> {
        let bytes = inner.as_bytes();
        // Byte checks are enough: '@' at 1 and ':' at 3 force single-byte
        // characters at 0 and 2.
        if bytes.len() <= 4 || bytes[1] != b'@' || bytes[3] != b':' {
            return None;
        }
        let wanted = char::from(bytes[0]).to_ascii_uppercase();
        let searched = char::from(bytes[2]).to_ascii_uppercase();
        if !is_ref_field(wanted) || !is_ref_field(searched) {
            return None;
        }
        Some(Self {
            wanted,
            searched,
            needle: &inner[4..],
        })
    }

    fn find_in<'s>(&self, store: &'s Store) -> Option<&'s Entry> {
        let needle = self.needle.to_lowercase();
        store.entries.iter().find(|entry| match self.searched {
            'I' => entry.id.eq_ignore_ascii_case(self.needle),
            field => ref_field_name(field)
                .map(|name| entry.read_safe(name).to_lowercase().contains(&needle))
                .unwrap_or(false),
        })
    }

    fn wanted_value(&self, entry: &Entry) -> Option<String> {
        match self.wanted {
            'I' => Some(entry.id.clone()),
            field => ref_field_name(field).map(|name| entry.read_safe(name).to_string()),
        }
    }
}

fn is_ref_field(code: char) -> bool {
    code == 'I' || ref_field_name(code).is_some()
}

fn ref_field_name(code: char) -> Option<&'static str> {
    match code {
        'T' => Some(standard_fields::TITLE),
        'U' => Some(standard_fields::USER_NAME),
        'A' => Some(standard_fields::URL),
        'P' => Some(standard_fields::PASSWORD),
        'N' => Some(standard_fields::NOTES),
        _ => None,
    }
}

fn fill_from_cache(mut text: String, refs: &RefCache) -> String {
    for (reference, value) in refs {
        if text.contains(reference.as_str()) {
            text = text.replace(reference.as_str(), value);
        }
    }
    text
}

/// Finds `pattern` in `text` at or after byte `from`, ignoring ASCII case.
fn find_ci(text: &str, pattern: &str, from: usize) -> Option<usize> {
    if from > text.len() {
        return None;
    }
    let haystack = text.as_bytes();
    let needle = pattern.as_bytes();
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    (from..=haystack.len() - needle.len())
        .find(|&index| haystack[index..index + needle.len()].eq_ignore_ascii_case(needle))
}

fn replace_ci(text: &str, pattern: &str, replacement: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    while let Some(index) = find_ci(text, pattern, cursor) {
        out.push_str(&text[cursor..index]);
        out.push_str(replacement);
        cursor = index + pattern.len();
    }
    out.push_str(&text[cursor..]);
    out
}
