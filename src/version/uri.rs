//! Path attribute and ingest URI derivation.

use crate::rules::RemapTable;

/// Characters that survive IRI encoding unchanged, besides ASCII
/// alphanumerics and non-ASCII code points.
const IRI_SAFE: &str = "-._~/:@!$&'()*+,;=";

/// Path-derived metadata settings for a job.
#[derive(Debug, Clone)]
pub struct UriMapping {
    /// Metadata attribute name for the entry path; `None` omits the group.
    pub path_attribute: Option<String>,
    pub path_remap: RemapTable,
    pub file_name_remap: RemapTable,
    pub uri_remap: RemapTable,
    /// Scheme of the canonical ingest URI.
    pub scheme: String,
}

impl Default for UriMapping {
    fn default() -> Self {
        Self {
            path_attribute: None,
            path_remap: RemapTable::new(),
            file_name_remap: RemapTable::new(),
            uri_remap: RemapTable::new(),
            scheme: "file".to_string(),
        }
    }
}

impl UriMapping {
    /// Attribute name and remapped value, when a path attribute is configured.
    pub fn path_attribute(&self, raw_path: &str, uri_prefix: &str) -> Option<(String, String)> {
        let name = self.path_attribute.as_ref()?;
        let path = strip_uri_prefix(raw_path, uri_prefix);
        Some((name.clone(), self.path_remap.apply(path)))
    }

    /// URI the entry is ingested under.
    pub fn ingest_uri(&self, raw_path: &str, uri_prefix: &str) -> String {
        let path = strip_uri_prefix(raw_path, uri_prefix);
        let renamed = self.rename_final_component(path);
        if !self.uri_remap.is_empty() {
            return self.uri_remap.apply(&renamed);
        }
        format!(
            "{}:////{}",
            self.scheme,
            iri_encode(renamed.trim_start_matches('/'))
        )
    }

    // Only the name after the last separator goes through the file-name table
    fn rename_final_component(&self, path: &str) -> String {
        let (dir, name) = match path.rfind('/') {
            Some(split) => path.split_at(split + 1),
            None => ("", path),
        };
        format!("{}{}", dir, self.file_name_remap.apply(name))
    }
}

/// Remove a store-specific URI prefix (e.g. `smb://`) from a raw path.
pub fn strip_uri_prefix<'a>(raw_path: &'a str, uri_prefix: &str) -> &'a str {
    if uri_prefix.is_empty() {
        return raw_path;
    }
    match raw_path.get(..uri_prefix.len()) {
        Some(head) if head.eq_ignore_ascii_case(uri_prefix) => &raw_path[uri_prefix.len()..],
        _ => raw_path,
    }
}

/// Percent-encode everything outside the IRI-safe set.
pub fn iri_encode(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len());
    for ch in value.chars() {
        if ch.is_ascii_alphanumeric() || IRI_SAFE.contains(ch) || (!ch.is_ascii() && !ch.is_control()) {
            encoded.push(ch);
        } else {
            let mut buf = [0u8; 4];
            for byte in ch.encode_utf8(&mut buf).bytes() {
                encoded.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    encoded
}
