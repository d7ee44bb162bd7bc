//! Username normalization
//!
//! Directory users may type `jsmith`, `jsmith@company.com` or `COMPANY\jsmith`;
//! all of them map to the same account key.

/// Reduce a username to its bare, lowercase account name.
pub fn normalize_username(raw: &str) -> String {
    let mut name = raw.trim();

    if let Some((before, _)) = name.split_once('@') {
        name = before;
    }
    if let Some((_, after)) = name.rsplit_once('\\') {
        name = after;
    }

    name.to_lowercase()
}

/// Like [`normalize_username`], additionally stripping an explicit
/// `domain\` prefix or `@domain` suffix.
pub fn normalize_username_for_domain(raw: &str, domain: &str) -> String {
    let domain = domain.trim();
    if domain.is_empty() {
        return normalize_username(raw);
    }

    let lowered = raw.trim().to_lowercase();
    let domain = domain.to_lowercase();
    let suffix = format!("@{}", domain);
    let prefix = format!("{}\\", domain);

    let stripped = lowered
        .strip_suffix(suffix.as_str())
        .or_else(|| lowered.strip_prefix(prefix.as_str()))
        .unwrap_or(&lowered);

    normalize_username(stripped)
}
