//! Manifest variable interpolation
//!
//! Scalar values in the manifest may reference externally-supplied
//! variables: `${VAR}`, `${VAR-default}` / `${VAR:-default}`,
//! `${VAR?msg}` / `${VAR:?msg}`, and `$$` for a literal dollar. The
//! `:`-prefixed operators also treat empty values as unset.
//!
//! Interpolation runs over the whole document before typed
//! deserialization. Every absent must-be-provided variable is collected so
//! deployment validation can report the full set in one error, before any
//! service starts.

use crate::error::ManifestError;
use regex::{Captures, Regex};
use std::collections::HashMap;

const PATTERN: &str =
    r"\$\$|\$\{(?P<name>[A-Za-z_][A-Za-z0-9_]*)(?:(?P<op>:?[-?])(?P<arg>[^}]*))?\}";

/// Resolves `${...}` references against a fixed variable set.
pub struct Interpolator {
    vars: HashMap<String, String>,
    pattern: Regex,
    unclosed: Regex,
}

impl Interpolator {
    pub fn new(vars: HashMap<String, String>) -> Self {
        Self {
            vars,
            pattern: Regex::new(PATTERN).expect("interpolation pattern is valid"),
            unclosed: Regex::new(r"\$\{[^}]*\z").expect("unclosed pattern is valid"),
        }
    }

    /// Interpolator over the process environment.
    pub fn from_env() -> Self {
        Self::new(std::env::vars().collect())
    }

    fn lookup(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// Interpolate one scalar. Missing `?`-marked variables are appended
    /// to `missing` instead of failing immediately.
    pub fn apply(&self, raw: &str, missing: &mut Vec<String>) -> Result<String, ManifestError> {
        if self.unclosed.is_match(raw) {
            return Err(ManifestError::BadSubstitution {
                value: raw.to_string(),
                reason: "unterminated ${...} expression".to_string(),
            });
        }

        let result = self.pattern.replace_all(raw, |caps: &Captures| {
            let whole = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
            if whole == "$$" {
                return "$".to_string();
            }
            let name = &caps["name"];
            let value = self.lookup(name);
            match (caps.name("op").map(|m| m.as_str()), value) {
                // Plain ${VAR}: unset resolves to empty
                (None, v) => v.unwrap_or_default().to_string(),
                // Default operators
                (Some("-"), Some(v)) => v.to_string(),
                (Some("-"), None) => caps["arg"].to_string(),
                (Some(":-"), Some(v)) if !v.is_empty() => v.to_string(),
                (Some(":-"), _) => caps["arg"].to_string(),
                // Must-be-provided markers
                (Some("?"), Some(v)) => v.to_string(),
                (Some(":?"), Some(v)) if !v.is_empty() => v.to_string(),
                (Some(_), _) => {
                    let message = caps["arg"].trim();
                    if message.is_empty() {
                        missing.push(name.to_string());
                    } else {
                        missing.push(format!("{} ({})", name, message));
                    }
                    String::new()
                }
            }
        });

        Ok(result.into_owned())
    }
}

/// Interpolate every string scalar in a parsed YAML document in place.
///
/// Returns `MissingVariables` listing all absent must-be-provided
/// variables at once. With `lenient` set, missing markers resolve to
/// empty instead (teardown paths only need names, not values).
pub fn apply_document(
    doc: &mut serde_yaml::Value,
    interp: &Interpolator,
    lenient: bool,
) -> Result<(), ManifestError> {
    let mut missing = Vec::new();
    walk(doc, interp, &mut missing)?;

    if !lenient && !missing.is_empty() {
        missing.sort();
        missing.dedup();
        return Err(ManifestError::MissingVariables { names: missing });
    }
    Ok(())
}

fn walk(
    value: &mut serde_yaml::Value,
    interp: &Interpolator,
    missing: &mut Vec<String>,
) -> Result<(), ManifestError> {
    match value {
        serde_yaml::Value::String(s) => {
            *s = interp.apply(s, missing)?;
        }
        serde_yaml::Value::Sequence(items) => {
            for item in items {
                walk(item, interp, missing)?;
            }
        }
        serde_yaml::Value::Mapping(map) => {
            for (_, item) in map.iter_mut() {
                walk(item, interp, missing)?;
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interp(pairs: &[(&str, &str)]) -> Interpolator {
        Interpolator::new(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    fn apply(i: &Interpolator, raw: &str) -> (String, Vec<String>) {
        let mut missing = Vec::new();
        let out = i.apply(raw, &mut missing).unwrap();
        (out, missing)
    }

    #[test]
    fn test_plain_substitution() {
        let i = interp(&[("HOST_PORT", "8080")]);
        assert_eq!(apply(&i, "${HOST_PORT}:8080").0, "8080:8080");
    }

    #[test]
    fn test_unset_plain_is_empty() {
        let i = interp(&[]);
        assert_eq!(apply(&i, "host=${DB_HOST}").0, "host=");
    }

    #[test]
    fn test_default_operators() {
        let i = interp(&[("EMPTY", "")]);
        assert_eq!(apply(&i, "${MISSING:-redis}").0, "redis");
        assert_eq!(apply(&i, "${MISSING-redis}").0, "redis");
        // `:-` treats empty as unset, `-` does not
        assert_eq!(apply(&i, "${EMPTY:-redis}").0, "redis");
        assert_eq!(apply(&i, "${EMPTY-redis}").0, "");
    }

    #[test]
    fn test_required_marker_collected() {
        let i = interp(&[]);
        let (_, missing) = apply(&i, "${DB_ROOT_PASSWORD:?database root password}");
        assert_eq!(missing, vec!["DB_ROOT_PASSWORD (database root password)"]);
    }

    #[test]
    fn test_required_marker_satisfied() {
        let i = interp(&[("DB_ROOT_PASSWORD", "hunter2")]);
        let (out, missing) = apply(&i, "${DB_ROOT_PASSWORD:?required}");
        assert_eq!(out, "hunter2");
        assert!(missing.is_empty());
    }

    #[test]
    fn test_dollar_escape() {
        let i = interp(&[]);
        assert_eq!(apply(&i, "cost: $$5").0, "cost: $5");
    }

    #[test]
    fn test_unterminated_expression_rejected() {
        let i = interp(&[]);
        let mut missing = Vec::new();
        let err = i.apply("${DB_HOST", &mut missing).unwrap_err();
        assert!(matches!(err, ManifestError::BadSubstitution { .. }));
    }

    #[test]
    fn test_document_walk_collects_all_missing() {
        let i = interp(&[]);
        let mut doc: serde_yaml::Value = serde_yaml::from_str(
            "services:\n  frontend:\n    ports:\n      - \"${HOST_PORT:?host port}:8080\"\n    environment:\n      DOMAIN: ${CUSTOMER_DOMAIN:?}\n",
        )
        .unwrap();

        let err = apply_document(&mut doc, &i, false).unwrap_err();
        match err {
            ManifestError::MissingVariables { names } => {
                assert_eq!(names, vec!["CUSTOMER_DOMAIN", "HOST_PORT (host port)"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_document_walk_lenient() {
        let i = interp(&[]);
        let mut doc: serde_yaml::Value =
            serde_yaml::from_str("ports:\n  - \"${HOST_PORT:?}:8080\"\n").unwrap();
        apply_document(&mut doc, &i, true).unwrap();
        assert_eq!(doc["ports"][0].as_str(), Some(":8080"));
    }
}
