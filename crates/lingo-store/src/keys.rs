//! Storage key derivation.
//!
//! Entity type names may contain characters that are illegal or ambiguous in
//! a key space (`App\Models\Article`), so they are slugified before use:
//! path separators become `_`, everything is lower-cased, and every run of
//! non-alphanumeric characters collapses to a single `-`. Letters and digits
//! outside ASCII cannot appear in a slug, so names containing them get a
//! `u<crc32>` suffix computed over their lower-cased alphanumerics, keeping
//! `Статья` and `Новость` apart. Normalization is otherwise lossy; two type
//! names that slugify identically share a namespace.

use lingo_types::{EntityRef, Language};

use crate::error::{StoreError, StoreResult};

/// Namespace holding the per-language index records.
pub const INDEX_PREFIX: &str = "meta/";

/// Extension of every stored record.
pub const RECORD_EXTENSION: &str = ".json";

/// Token substituted when a type normalizes to the reserved index namespace.
const RESERVED_TYPE_TOKEN: &str = "meta-type";

/// Token used when a type name has no letters or digits at all.
const FALLBACK_TYPE_TOKEN: &str = "entity";

/// Normalize an entity type name into a key-safe token.
///
/// ```
/// use lingo_store::normalize_entity_type;
///
/// assert_eq!(normalize_entity_type("App\\Models\\Article"), "app-models-article");
/// assert_eq!(normalize_entity_type("blog_post"), "blog-post");
/// ```
pub fn normalize_entity_type(entity_type: &str) -> String {
    let replaced = entity_type.replace(['\\', '/'], "_");

    let mut slug = String::with_capacity(replaced.len());
    let mut pending_separator = false;
    let mut non_ascii = false;
    for ch in replaced.chars() {
        if !ch.is_ascii() && ch.is_alphanumeric() {
            non_ascii = true;
        }
        if ch.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('-');
            }
            pending_separator = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_separator = true;
        }
    }

    if non_ascii {
        let folded: String = replaced
            .chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(char::to_lowercase)
            .collect();
        let hash = crc32fast::hash(folded.as_bytes());
        if !slug.is_empty() {
            slug.push('-');
        }
        slug.push_str(&format!("u{hash:08x}"));
        return slug;
    }

    match slug.as_str() {
        "" => FALLBACK_TYPE_TOKEN.to_string(),
        "meta" => RESERVED_TYPE_TOKEN.to_string(),
        _ => slug,
    }
}

/// Namespace prefix for every instance of a type: `<type>/`.
pub fn type_prefix(entity_type: &str) -> String {
    format!("{}/", normalize_entity_type(entity_type))
}

/// Namespace prefix for one instance: `<type>/<id>/`.
pub fn entity_prefix(entity: &EntityRef) -> String {
    format!("{}{}/", type_prefix(entity.entity_type()), entity.entity_id())
}

/// Key of the blob for `entity` in `language`: `<type>/<id>/<language>.json`.
pub fn blob_key(entity: &EntityRef, language: &Language) -> String {
    format!("{}{language}{RECORD_EXTENSION}", entity_prefix(entity))
}

/// Key of the index record for `language`: `meta/<language>.json`.
pub fn index_key(language: &Language) -> String {
    format!("{INDEX_PREFIX}{language}{RECORD_EXTENSION}")
}

/// Parse the language out of a record file name (`en.json` -> `en`).
///
/// Returns `None` for names that are not `<valid language>.json`.
pub fn language_from_file_name(file_name: &str) -> Option<Language> {
    let stem = file_name.strip_suffix(RECORD_EXTENSION)?;
    Language::new(stem).ok()
}

/// Validate that `key` is a relative, `/`-separated path that cannot escape
/// the store's root.
pub fn validate_key(key: &str) -> StoreResult<()> {
    if key.is_empty() {
        return Err(StoreError::invalid_key(key, "key must not be empty"));
    }
    if key.starts_with('/') {
        return Err(StoreError::invalid_key(key, "key must be relative"));
    }
    if key.contains('\\') {
        return Err(StoreError::invalid_key(key, "key must use '/' separators"));
    }
    for component in key.split('/') {
        match component {
            "" => return Err(StoreError::invalid_key(key, "empty path component")),
            "." | ".." => {
                return Err(StoreError::invalid_key(
                    key,
                    format!("relative component {component:?}"),
                ))
            }
            _ => {}
        }
    }
    Ok(())
}
