//! Parsing of `key=value,key=value` label list annotations.

/// A malformed entry in a label list.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("label entry {0:?} is missing a `=` separator")]
    MissingSeparator(String),

    #[error("label entry {0:?} has an empty key")]
    EmptyKey(String),
}

/// Parses a comma-separated list of `key=value` pairs, preserving their order.
///
/// The first `=` in each entry separates the key from the value, so values may themselves contain
/// `=`. Surrounding whitespace is ignored in entries, keys and values. An empty (or blank) list
/// yields no pairs, while any malformed entry fails the whole list.
pub fn parse_label_list(s: &str) -> Result<Vec<(String, String)>, ParseError> {
    if s.trim().is_empty() {
        return Ok(Vec::new());
    }

    s.split(',')
        .map(|entry| {
            let entry = entry.trim();
            match entry.split_once('=') {
                None => Err(ParseError::MissingSeparator(entry.to_string())),
                Some((key, value)) => match (key.trim(), value.trim()) {
                    ("", _) => Err(ParseError::EmptyKey(entry.to_string())),
                    (key, value) => Ok((key.to_string(), value.to_string())),
                },
            }
        })
        .collect()
}

/// Reads a label list annotation value. If the value is invalid, the error is logged and the
/// empty list is returned.
pub(crate) fn labels_annotation(annotation: &str, value: &str) -> Vec<(String, String)> {
    parse_label_list(value).unwrap_or_else(|error| {
        tracing::info!(%annotation, %value, %error, "Invalid label list; check the annotation");
        Vec::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(ps: &[(&str, &str)]) -> Vec<(String, String)> {
        ps.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn parses_in_order() {
        assert_eq!(
            parse_label_list("team=platform,env=prod"),
            Ok(pairs(&[("team", "platform"), ("env", "prod")]))
        );
        assert_eq!(
            parse_label_list("z=1,a=2"),
            Ok(pairs(&[("z", "1"), ("a", "2")])),
            "entries must not be reordered"
        );
    }

    #[test]
    fn splits_on_first_separator() {
        assert_eq!(
            parse_label_list("selector=a=b"),
            Ok(pairs(&[("selector", "a=b")]))
        );
        assert_eq!(parse_label_list("key="), Ok(pairs(&[("key", "")])));
    }

    #[test]
    fn trims_entries() {
        assert_eq!(
            parse_label_list(" team=platform , env=prod "),
            Ok(pairs(&[("team", "platform"), ("env", "prod")]))
        );
    }

    #[test]
    fn trims_keys_and_values() {
        assert_eq!(
            parse_label_list("team =platform,env= prod"),
            Ok(pairs(&[("team", "platform"), ("env", "prod")]))
        );
        assert_eq!(
            parse_label_list(" = platform"),
            Err(ParseError::EmptyKey("= platform".to_string()))
        );
    }

    #[test]
    fn empty_value_is_an_empty_list() {
        assert_eq!(parse_label_list(""), Ok(vec![]));
        assert_eq!(parse_label_list("  "), Ok(vec![]));
    }

    #[test]
    fn rejects_missing_separator() {
        assert_eq!(
            parse_label_list("foo"),
            Err(ParseError::MissingSeparator("foo".to_string()))
        );
        assert_eq!(
            parse_label_list("team=platform,foo"),
            Err(ParseError::MissingSeparator("foo".to_string())),
            "a later malformed entry fails the whole list"
        );
        assert_eq!(
            parse_label_list("team=platform,"),
            Err(ParseError::MissingSeparator(String::new())),
        );
    }

    #[test]
    fn rejects_empty_key() {
        assert_eq!(
            parse_label_list("=platform"),
            Err(ParseError::EmptyKey("=platform".to_string()))
        );
    }

    #[test]
    fn degrades_to_empty() {
        assert!(labels_annotation("test", "team=platform,foo").is_empty());
        assert_eq!(
            labels_annotation("test", "team=platform"),
            pairs(&[("team", "platform")])
        );
    }
}
