//! Shared utility functions

use crate::error::DbError;

/// Maximum length of a collection, database, or field identifier
pub const MAX_IDENTIFIER_LENGTH: usize = 64;

/// Validate an identifier used as a collection, database, or field name
///
/// Identifiers end up in table names and JSON paths, so only
/// `[A-Za-z_][A-Za-z0-9_-]*` is accepted.
pub fn validate_identifier(kind: &str, name: &str) -> Result<(), DbError> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

    if !valid_start || !valid_rest || name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(DbError::InvalidIdentifier(format!(
            "{} name '{}' must match [A-Za-z_][A-Za-z0-9_-]* (max {} characters)",
            kind, name, MAX_IDENTIFIER_LENGTH
        )));
    }
    Ok(())
}

/// SQLite JSON path for a top-level field
pub fn json_path(field: &str) -> String {
    format!("$.\"{}\"", field)
}

/// SQLite JSON path for a dot-separated nested field, e.g. `counts.access`
pub fn nested_json_path(path: &str) -> String {
    path.split('.').fold("$".to_string(), |mut acc, segment| {
        acc.push_str(&format!(".\"{}\"", segment));
        acc
    })
}

/// Mask the password component of a URI so it can be logged
///
/// # Examples
///
/// ```
/// use pkgauth_db::utils::redact_uri;
///
/// assert_eq!(redact_uri("mongodb://admin:s3cret@db:27017"), "mongodb://admin:****@db:27017");
/// assert_eq!(redact_uri("sqlite://data/users.db"), "sqlite://data/users.db");
/// ```
pub fn redact_uri(uri: &str) -> String {
    let Some(scheme_end) = uri.find("://") else {
        return uri.to_string();
    };
    let authority_start = scheme_end + 3;
    let rest = &uri[authority_start..];
    let authority_len = rest.find('/').unwrap_or(rest.len());
    let authority = &rest[..authority_len];

    let Some(at) = authority.rfind('@') else {
        return uri.to_string();
    };
    let userinfo = &authority[..at];
    let user = userinfo.split(':').next().unwrap_or_default();
    let masked = if userinfo.contains(':') {
        format!("{}:****", user)
    } else {
        user.to_string()
    };

    format!(
        "{}{}{}",
        &uri[..authority_start],
        masked,
        &uri[authority_start + at..]
    )
}
