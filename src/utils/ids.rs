use once_cell::sync::Lazy;
use regex::Regex;

static ID_BODY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_\-]*$").expect("static regex"));

/// Vendor identifier families and their canonical prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdKind {
    Contract,
    Group,
    Property,
    Product,
    Include,
    EdgeHostname,
    CpCode,
    Activation,
}

impl IdKind {
    pub const ALL: &'static [IdKind] = &[
        IdKind::Contract,
        IdKind::Group,
        IdKind::Property,
        IdKind::Product,
        IdKind::Include,
        IdKind::EdgeHostname,
        IdKind::CpCode,
        IdKind::Activation,
    ];

    pub fn prefix(self) -> &'static str {
        match self {
            IdKind::Contract => "ctr_",
            IdKind::Group => "grp_",
            IdKind::Property => "prp_",
            IdKind::Product => "prd_",
            IdKind::Include => "inc_",
            IdKind::EdgeHostname => "ehn_",
            IdKind::CpCode => "cpc_",
            IdKind::Activation => "atv_",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            IdKind::Contract => "contract",
            IdKind::Group => "group",
            IdKind::Property => "property",
            IdKind::Product => "product",
            IdKind::Include => "include",
            IdKind::EdgeHostname => "edge hostname",
            IdKind::CpCode => "CP code",
            IdKind::Activation => "activation",
        }
    }

    fn from_prefix(raw: &str) -> Option<IdKind> {
        let lowered = raw.to_lowercase();
        IdKind::ALL
            .iter()
            .copied()
            .find(|kind| lowered.starts_with(kind.prefix()))
    }
}

/// Canonicalises an identifier: inserts the missing prefix, lower-cases an
/// upper-case prefix, leaves an already canonical ID untouched.
pub fn normalize_id(raw: &str, kind: IdKind) -> Result<String, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(format!("{} ID must be a non-empty string", kind.label()));
    }
    if let Some(found) = IdKind::from_prefix(trimmed) {
        if found != kind {
            return Err(format!(
                "expected a {} ID ({}…) but got a {} ID '{}'",
                kind.label(),
                kind.prefix(),
                found.label(),
                trimmed
            ));
        }
        let body = &trimmed[kind.prefix().len()..];
        if !ID_BODY.is_match(body) {
            return Err(format!("'{}' is not a valid {} ID", trimmed, kind.label()));
        }
        return Ok(format!("{}{}", kind.prefix(), body));
    }
    if !ID_BODY.is_match(trimmed) {
        return Err(format!("'{}' is not a valid {} ID", trimmed, kind.label()));
    }
    Ok(format!("{}{}", kind.prefix(), trimmed))
}

/// Removes the prefix for endpoints that take bare numeric IDs.
pub fn strip_prefix(id: &str, kind: IdKind) -> &str {
    id.strip_prefix(kind.prefix()).unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserts_missing_prefix() {
        assert_eq!(normalize_id("12345", IdKind::Group).unwrap(), "grp_12345");
        assert_eq!(normalize_id(" 1-ABC ", IdKind::Contract).unwrap(), "ctr_1-ABC");
    }

    #[test]
    fn keeps_canonical_prefix() {
        assert_eq!(normalize_id("ctr_1-ABC", IdKind::Contract).unwrap(), "ctr_1-ABC");
        assert_eq!(normalize_id("prp_999", IdKind::Property).unwrap(), "prp_999");
    }

    #[test]
    fn lowercases_upper_prefix() {
        assert_eq!(normalize_id("CTR_1-ABC", IdKind::Contract).unwrap(), "ctr_1-ABC");
    }

    #[test]
    fn rejects_foreign_prefix() {
        let err = normalize_id("grp_1", IdKind::Contract).unwrap_err();
        assert!(err.contains("group ID"));
    }

    #[test]
    fn rejects_garbage() {
        assert!(normalize_id("a b", IdKind::Property).is_err());
        assert!(normalize_id("", IdKind::Property).is_err());
        assert!(normalize_id("prp_", IdKind::Property).is_err());
    }

    #[test]
    fn strip_prefix_returns_body() {
        assert_eq!(strip_prefix("cpc_123", IdKind::CpCode), "123");
        assert_eq!(strip_prefix("123", IdKind::CpCode), "123");
    }
}
