//! Virtual path and URL helpers.
//!
//! Content paths and URLs are both *virtual*: absolute, `/`-separated,
//! rooted at the site (`/blog/post.md`, `/blog/post/`). Nothing in this
//! module touches the filesystem; physical paths only appear in the loader
//! and the writer.
//!
//! ## Placeholders
//!
//! URLs may contain `:token` placeholders that are substituted when an entity
//! is initialized, e.g. `/:section/:year/:slug/`. Resolution of the token
//! names lives in [`crate::content`]; this module only does the scanning.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UrlError {
    #[error("malformed url `{0}`")]
    Malformed(String),
    #[error("url `{0}` escapes the site root")]
    EscapesRoot(String),
    #[error("cannot resolve relative url `{0}` without an origin page")]
    MissingOrigin(String),
    #[error("no page registered with uid `{0}`")]
    UnknownUid(String),
}

const MAX_SLUG_LEN: usize = 80;

/// Last segment of a virtual path (empty for paths ending in `/`).
pub fn file_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(pos) => &path[pos + 1..],
        None => path,
    }
}

/// Lowercased extension of the last segment, without the dot.
///
/// Dot-files such as `/.htaccess` have no extension.
pub fn extension(path: &str) -> Option<String> {
    let name = file_name(path);
    match name.rfind('.') {
        Some(pos) if pos > 0 && pos + 1 < name.len() => Some(name[pos + 1..].to_ascii_lowercase()),
        _ => None,
    }
}

/// Last segment without its extension.
pub fn file_stem(path: &str) -> &str {
    let name = file_name(path);
    match name.rfind('.') {
        Some(pos) if pos > 0 => &name[..pos],
        _ => name,
    }
}

/// Directory part of a path, always ending in `/`.
///
/// - `/blog/post.md` → `/blog/`
/// - `/post.md` → `/`
/// - `/blog/` → `/blog/`
pub fn parent_dir(path: &str) -> String {
    match path.rfind('/') {
        Some(pos) => path[..=pos].to_string(),
        None => "/".to_string(),
    }
}

/// Remove the extension of the last segment, if any.
pub fn strip_extension(path: &str) -> String {
    let name = file_name(path);
    match name.rfind('.') {
        Some(pos) if pos > 0 => {
            let cut = path.len() - name.len() + pos;
            path[..cut].to_string()
        }
        _ => path.to_string(),
    }
}

/// Replace the extension of the last segment. `new_ext` includes the dot.
pub fn change_extension(path: &str, new_ext: &str) -> String {
    format!("{}{}", strip_extension(path), new_ext)
}

/// Split a source path into its top-level section and the remainder.
///
/// - `/blog/2024/post.md` → (`blog`, `/2024/post.md`)
/// - `/about.md` → (``, `/about.md`)
pub fn split_section(path: &str) -> (String, String) {
    let trimmed = path.trim_start_matches('/');
    match trimmed.find('/') {
        Some(pos) => (trimmed[..pos].to_string(), trimmed[pos..].to_string()),
        None => (String::new(), format!("/{trimmed}")),
    }
}

/// Normalize an absolute virtual path: collapse repeated slashes and resolve
/// `.` and `..` segments. A trailing slash is preserved.
pub fn normalize(path: &str) -> Result<String, UrlError> {
    if !path.starts_with('/') {
        return Err(UrlError::Malformed(path.to_string()));
    }
    let mut segments: Vec<&str> = Vec::new();
    let mut trailing = path.ends_with('/');
    for segment in path.split('/') {
        match segment {
            "" => {}
            "." => trailing = true,
            ".." => {
                if segments.pop().is_none() {
                    return Err(UrlError::EscapesRoot(path.to_string()));
                }
                trailing = true;
            }
            s => {
                segments.push(s);
                trailing = path.ends_with('/');
            }
        }
    }
    let mut out = String::with_capacity(path.len());
    for segment in &segments {
        out.push('/');
        out.push_str(segment);
    }
    if trailing || segments.is_empty() {
        out.push('/');
    }
    Ok(out)
}

/// Whether a URL is usable as a site-relative output location.
///
/// Must be absolute (`/`-rooted, not `//`-scheme-relative), and free of
/// whitespace, control characters, backslashes, query/fragment markers and
/// `..` segments.
pub fn is_valid_url_path(url: &str) -> bool {
    if !url.starts_with('/') || url.starts_with("//") {
        return false;
    }
    if url
        .chars()
        .any(|c| c.is_whitespace() || c.is_control() || matches!(c, '\\' | '?' | '#'))
    {
        return false;
    }
    !url.split('/').any(|segment| segment == "..")
}

/// Turn free text into a URL-safe slug.
///
/// - Lowercases, keeps alphanumerics (including non-ASCII letters)
/// - Replaces everything else with dashes and collapses runs of dashes
/// - Strips leading and trailing dashes
/// - Truncates to `MAX_SLUG_LEN` characters at the last dash before the limit
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut prev_dash = false;
    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            slug.push(c);
            prev_dash = false;
        } else if !prev_dash {
            slug.push('-');
            prev_dash = true;
        }
    }
    let trimmed = slug.trim_matches('-');

    if trimmed.chars().count() <= MAX_SLUG_LEN {
        return trimmed.to_string();
    }
    let truncated: String = trimmed.chars().take(MAX_SLUG_LEN).collect();
    match truncated.rfind('-') {
        Some(pos) => truncated[..pos].to_string(),
        None => truncated,
    }
}

/// Replace `:token` placeholders using `resolve`.
///
/// A token is `:` followed by a lowercase letter, then letters, digits or
/// underscores. Tokens that `resolve` does not know are removed and returned
/// in the second element so the caller can warn about them. A `:` that does
/// not start a token is kept literally.
pub fn substitute_placeholders(
    url: &str,
    resolve: impl Fn(&str) -> Option<String>,
) -> (String, Vec<String>) {
    let mut out = String::with_capacity(url.len());
    let mut unknown = Vec::new();
    let mut rest = url;

    while let Some(pos) = rest.find(':') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let starts_token = after.chars().next().is_some_and(|c| c.is_ascii_lowercase());
        if !starts_token {
            out.push(':');
            rest = after;
            continue;
        }
        let len = after
            .find(|c: char| !(c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'))
            .unwrap_or(after.len());
        let token = &after[..len];
        match resolve(token) {
            Some(value) => out.push_str(&value),
            None => unknown.push(token.to_string()),
        }
        rest = &after[len..];
    }
    out.push_str(rest);
    (out, unknown)
}

/// Compose a site path with the configured base URL and base path.
///
/// `("https://example.com/", "/docs", "/guide/")` → `https://example.com/docs/guide/`
pub fn join_base(base_url: &str, base_path: &str, path: &str) -> String {
    let base_path = base_path.trim_matches('/');
    let mut out = base_url.trim_end_matches('/').to_string();
    if !base_path.is_empty() {
        out.push('/');
        out.push_str(base_path);
    }
    out.push_str(path);
    out
}
