use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Parses dotted paths with optional bracket indexes, e.g.
/// `properties.items[0].propertyId`.
pub fn parse_path(path: &str) -> Vec<PathSegment> {
    let mut segments = Vec::new();
    for part in path.split('.') {
        let mut rest = part.trim();
        if let Some(open) = rest.find('[') {
            let key = rest[..open].trim();
            if !key.is_empty() {
                segments.push(PathSegment::Key(key.to_string()));
            }
            rest = &rest[open..];
            while let Some(stripped) = rest.strip_prefix('[') {
                let Some(close) = stripped.find(']') else {
                    break;
                };
                let inner = stripped[..close].trim();
                match inner.parse::<usize>() {
                    Ok(index) => segments.push(PathSegment::Index(index)),
                    Err(_) => segments.push(PathSegment::Key(inner.trim_matches('\'').to_string())),
                }
                rest = &stripped[close + 1..];
            }
        } else if !rest.is_empty() {
            segments.push(PathSegment::Key(rest.to_string()));
        }
    }
    segments
}

/// Follows `path` into `target`; an empty path yields the root.
pub fn lookup<'a>(target: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = target;
    for segment in parse_path(path) {
        current = match segment {
            PathSegment::Key(key) => current.get(key.as_str())?,
            PathSegment::Index(index) => current.as_array()?.get(index)?,
        };
    }
    Some(current)
}

pub fn lookup_str<'a>(target: &'a Value, path: &str) -> Option<&'a str> {
    lookup(target, path).and_then(|v| v.as_str())
}

/// Array at `path`, or an empty slice when absent or not an array.
pub fn lookup_items<'a>(target: &'a Value, path: &str) -> &'a [Value] {
    lookup(target, path)
        .and_then(|v| v.as_array())
        .map(|arr| arr.as_slice())
        .unwrap_or(&[])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_keys_and_indexes() {
        assert_eq!(
            parse_path("a.b[2].c"),
            vec![
                PathSegment::Key("a".into()),
                PathSegment::Key("b".into()),
                PathSegment::Index(2),
                PathSegment::Key("c".into()),
            ]
        );
        assert!(parse_path("").is_empty());
    }

    #[test]
    fn lookup_walks_nested_values() {
        let body = json!({"properties": {"items": [{"propertyId": "prp_1"}]}});
        assert_eq!(lookup_str(&body, "properties.items[0].propertyId"), Some("prp_1"));
        assert_eq!(lookup_items(&body, "properties.items").len(), 1);
        assert!(lookup(&body, "properties.items[3]").is_none());
        assert_eq!(lookup(&body, ""), Some(&body));
    }
}
