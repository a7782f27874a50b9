//! # Validators & Diff Suppressors
//!
//! Validators are pure functions `(value, path) -> (warnings, errors)` that run at plan time
//! over user-supplied values. They are composable ([`all`]) and cheap to clone.
//!
//! Null values are never passed to validators; required-ness is checked separately.

use crate::value::Value;
use regex::Regex;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

/// Outcome of a validator run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationOutcome {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidationOutcome {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            warnings: Vec::new(),
            errors: vec![message.into()],
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            warnings: vec![message.into()],
            errors: Vec::new(),
        }
    }

    pub fn merge(&mut self, other: ValidationOutcome) {
        self.warnings.extend(other.warnings);
        self.errors.extend(other.errors);
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

type ValidateFn = dyn Fn(&Value, &str) -> ValidationOutcome + Send + Sync;

#[derive(Clone)]
pub struct Validator(Arc<ValidateFn>);

impl Validator {
    pub fn new(f: impl Fn(&Value, &str) -> ValidationOutcome + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn run(&self, value: &Value, path: &str) -> ValidationOutcome {
        (self.0)(value, path)
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Validator")
    }
}

fn with_str(
    value: &Value,
    path: &str,
    check: impl FnOnce(&str) -> ValidationOutcome,
) -> ValidationOutcome {
    match value.as_str() {
        Some(s) => check(s),
        None => ValidationOutcome::error(format!(
            "expected {path} to be a string, got {}",
            value.type_name()
        )),
    }
}

/// Runs every validator and merges the outcomes.
pub fn all(validators: Vec<Validator>) -> Validator {
    Validator::new(move |value, path| {
        let mut outcome = ValidationOutcome::ok();
        for v in &validators {
            outcome.merge(v.run(value, path));
        }
        outcome
    })
}

pub fn string_len_between(min: usize, max: usize) -> Validator {
    Validator::new(move |value, path| {
        with_str(value, path, |s| {
            let len = s.chars().count();
            if (min..=max).contains(&len) {
                ValidationOutcome::ok()
            } else {
                ValidationOutcome::error(format!(
                    "expected length of {path} to be in the range ({min} - {max}), got {s}"
                ))
            }
        })
    })
}

/// Matches the whole string against `pattern`. An invalid pattern fails every value.
pub fn string_matches(pattern: &str, message: &str) -> Validator {
    let message = message.to_owned();
    match Regex::new(pattern) {
        Ok(re) => Validator::new(move |value, path| {
            with_str(value, path, |s| {
                if re.is_match(s) {
                    ValidationOutcome::ok()
                } else {
                    ValidationOutcome::error(format!("invalid value for {path} ({message})"))
                }
            })
        }),
        Err(e) => {
            let reason = e.to_string();
            Validator::new(move |_, path| {
                ValidationOutcome::error(format!("validator for {path} has a bad pattern: {reason}"))
            })
        }
    }
}

pub fn ip_address() -> Validator {
    Validator::new(|value, path| {
        with_str(value, path, |s| match s.parse::<IpAddr>() {
            Ok(_) => ValidationOutcome::ok(),
            Err(_) => ValidationOutcome::error(format!("expected {path} to contain a valid IP, got: {s}")),
        })
    })
}

/// A CIDR in network form: host bits must be zero.
pub fn cidr() -> Validator {
    Validator::new(|value, path| {
        with_str(value, path, |s| match s.parse::<ipnet::IpNet>() {
            Ok(net) if net.trunc() == net => ValidationOutcome::ok(),
            Ok(net) => ValidationOutcome::error(format!(
                "expected {path} to contain a network CIDR, got {s} (did you mean {}?)",
                net.trunc()
            )),
            Err(_) => ValidationOutcome::error(format!(
                "expected {path} to contain a valid CIDR, got: {s}"
            )),
        })
    })
}

pub fn uuid() -> Validator {
    Validator::new(|value, path| {
        with_str(value, path, |s| match uuid::Uuid::parse_str(s) {
            Ok(_) => ValidationOutcome::ok(),
            Err(_) => ValidationOutcome::error(format!("expected {path} to be a valid UUID, got {s}")),
        })
    })
}

pub fn int_between(min: i64, max: i64) -> Validator {
    Validator::new(move |value, path| match value.as_int() {
        Some(i) if (min..=max).contains(&i) => ValidationOutcome::ok(),
        Some(i) => ValidationOutcome::error(format!(
            "expected {path} to be in the range ({min} - {max}), got {i}"
        )),
        None => ValidationOutcome::error(format!(
            "expected {path} to be an integer, got {}",
            value.type_name()
        )),
    })
}

pub fn port() -> Validator {
    int_between(1, 65535)
}

pub fn string_in_slice(allowed: &[&str], ignore_case: bool) -> Validator {
    let allowed: Vec<String> = allowed.iter().map(|s| (*s).to_owned()).collect();
    Validator::new(move |value, path| {
        with_str(value, path, |s| {
            let hit = allowed.iter().any(|a| {
                if ignore_case {
                    a.eq_ignore_ascii_case(s)
                } else {
                    a == s
                }
            });
            if hit {
                ValidationOutcome::ok()
            } else {
                ValidationOutcome::error(format!(
                    "expected {path} to be one of {allowed:?}, got {s}"
                ))
            }
        })
    })
}

pub const MAX_TAGS: usize = 10;
pub const MAX_TAG_KEY_LEN: usize = 36;
pub const MAX_TAG_VALUE_LEN: usize = 43;

/// Tag maps: up to 10 entries, keys 1-36 chars, values 0-43 chars.
pub fn tags() -> Validator {
    Validator::new(|value, path| {
        let Some(map) = value.as_map() else {
            return ValidationOutcome::error(format!("expected {path} to be a map"));
        };
        let mut outcome = ValidationOutcome::ok();
        if map.len() > MAX_TAGS {
            outcome.merge(ValidationOutcome::error(format!(
                "{path} can hold at most {MAX_TAGS} tags, got {}",
                map.len()
            )));
        }
        for (key, v) in map {
            let key_len = key.chars().count();
            if key_len == 0 || key_len > MAX_TAG_KEY_LEN {
                outcome.merge(ValidationOutcome::error(format!(
                    "tag key {key:?} in {path} must be 1-{MAX_TAG_KEY_LEN} characters"
                )));
            }
            match v.as_str() {
                Some(s) if s.chars().count() <= MAX_TAG_VALUE_LEN => {}
                Some(_) => outcome.merge(ValidationOutcome::error(format!(
                    "tag value for {key:?} in {path} must be at most {MAX_TAG_VALUE_LEN} characters"
                ))),
                None => outcome.merge(ValidationOutcome::error(format!(
                    "tag value for {key:?} in {path} must be a string"
                ))),
            }
        }
        outcome
    })
}

/// Suppresses diffs between strings differing only in case.
pub fn suppress_case_insensitive(_path: &str, old: &Value, new: &Value) -> bool {
    match (old.as_str(), new.as_str()) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        _ => false,
    }
}

/// Suppresses diffs between a bool and its `"true"`/`"false"` string form.
pub fn suppress_bool_string(_path: &str, old: &Value, new: &Value) -> bool {
    match (as_loose_bool(old), as_loose_bool(new)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn as_loose_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) if s.eq_ignore_ascii_case("true") => Some(true),
        Value::String(s) if s.eq_ignore_ascii_case("false") => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_map;

    #[test]
    fn test_string_len() {
        let v = string_len_between(1, 5);
        assert!(v.run(&"abc".into(), "name").is_ok());
        let out = v.run(&"abcdef".into(), "name");
        assert_eq!(out.errors.len(), 1);
        assert!(out.errors[0].contains("name"));
        assert!(!v.run(&Value::Int(1), "name").is_ok());
    }

    #[test]
    fn test_cidr_requires_network_address() {
        let v = cidr();
        assert!(v.run(&"192.168.0.0/16".into(), "cidr").is_ok());
        assert!(!v.run(&"192.168.1.5/16".into(), "cidr").is_ok());
        assert!(!v.run(&"not-a-cidr".into(), "cidr").is_ok());
    }

    #[test]
    fn test_ip_uuid_port() {
        assert!(ip_address().run(&"192.168.1.1".into(), "gw").is_ok());
        assert!(!ip_address().run(&"192.168.1.300".into(), "gw").is_ok());
        assert!(uuid().run(&"6a2b9a1c-4c4b-4f3a-9d53-3a2b8f9c0d11".into(), "id").is_ok());
        assert!(!uuid().run(&"inst-123".into(), "id").is_ok());
        assert!(port().run(&Value::Int(443), "p").is_ok());
        assert!(!port().run(&Value::Int(0), "p").is_ok());
        assert!(!port().run(&Value::Int(65536), "p").is_ok());
    }

    #[test]
    fn test_regex_and_enum() {
        let v = string_matches(r"^[a-z][a-z0-9_-]*$", "lowercase name");
        assert!(v.run(&"vpc-1".into(), "name").is_ok());
        assert!(!v.run(&"Vpc".into(), "name").is_ok());

        let bad = string_matches("(", "x");
        assert!(!bad.run(&"anything".into(), "name").is_ok());

        let e = string_in_slice(&["5_bgp", "5_sbgp"], false);
        assert!(e.run(&"5_bgp".into(), "type").is_ok());
        assert!(!e.run(&"5_BGP".into(), "type").is_ok());
        assert!(string_in_slice(&["PER"], true).run(&"per".into(), "t").is_ok());
    }

    #[test]
    fn test_tags_limits() {
        let ok = value_map! { "env" => "prod" };
        assert!(tags().run(&ok, "tags").is_ok());

        let long_key = value_map! { "k".repeat(37) => "v" };
        assert!(!tags().run(&long_key, "tags").is_ok());

        let long_value = value_map! { "k" => "v".repeat(44) };
        assert!(!tags().run(&long_value, "tags").is_ok());

        let mut many = std::collections::BTreeMap::new();
        for i in 0..11 {
            many.insert(format!("k{i}"), Value::from("v"));
        }
        assert!(!tags().run(&Value::Map(many), "tags").is_ok());
    }

    #[test]
    fn test_all_merges_errors() {
        let v = all(vec![string_len_between(10, 20), cidr()]);
        assert_eq!(v.run(&"x".into(), "c").errors.len(), 2);
    }

    #[test]
    fn test_suppressors() {
        assert!(suppress_case_insensitive("id", &"ABC".into(), &"abc".into()));
        assert!(suppress_bool_string("admin_state_up", &"true".into(), &Value::Bool(true)));
        assert!(!suppress_bool_string("admin_state_up", &"false".into(), &Value::Bool(true)));
    }
}
