//! # Plan
//!
//! [`plan`] turns the user's configuration and the prior state into the values the apply step
//! will work with, plus the per-attribute [`InstanceDiff`] and the resulting [`PlanAction`].
//!
//! ## Steps
//!
//! 1. **Validate** the configuration against the schema: unknown and missing-required
//!    attributes, user values on computed-only attributes, `conflicts_with`, item counts and
//!    every attribute validator. Nested blocks are validated element by element.
//! 2. **Fill** unset attributes: the declared default, otherwise the prior value for computed
//!    attributes (the cloud owns them), otherwise null.
//! 3. **Suppress** changes the attribute's diff-suppress function declares equivalent.
//! 4. **Diff** prior against planned. Any changed force-new attribute turns the plan into a
//!    [`PlanAction::Replace`].
//!
//! The resource's custom-diff hook runs on the finished [`Plan`] and may mark further
//! attributes force-new.

use crate::diag::{Diagnostic, Diagnostics};
use crate::schema::{Block, Schema};
use crate::state::{values_differ, InstanceState};
use crate::value::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanAction {
    Create,
    Update,
    /// Destroy then create.
    Replace,
    NoOp,
}

/// One changed attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDiff {
    pub old: Value,
    pub new: Value,
    pub requires_new: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstanceDiff {
    pub attributes: BTreeMap<String, AttributeDiff>,
}

impl InstanceDiff {
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&AttributeDiff> {
        self.attributes.get(name)
    }

    pub fn requires_new(&self) -> bool {
        self.attributes.values().any(|a| a.requires_new)
    }

    /// Names of the changed attributes that force replacement.
    pub fn replace_paths(&self) -> Vec<String> {
        self.attributes
            .iter()
            .filter(|(_, a)| a.requires_new)
            .map(|(name, _)| name.clone())
            .collect()
    }
}

/// Outcome of planning one resource instance.
#[derive(Debug, Clone)]
pub struct Plan {
    pub planned: BTreeMap<String, Value>,
    pub diff: InstanceDiff,
    pub diagnostics: Diagnostics,
    exists: bool,
}

impl Plan {
    pub fn action(&self) -> PlanAction {
        if !self.exists {
            PlanAction::Create
        } else if self.diff.is_empty() {
            PlanAction::NoOp
        } else if self.diff.requires_new() {
            PlanAction::Replace
        } else {
            PlanAction::Update
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.diagnostics.has_errors()
    }

    pub fn get(&self, name: &str) -> &Value {
        const NULL: &Value = &Value::Null;
        self.planned.get(name).unwrap_or(NULL)
    }

    pub fn has_change(&self, name: &str) -> bool {
        self.diff.attributes.contains_key(name)
    }

    /// Marks a changed attribute as requiring replacement. No-op when it did not change.
    pub fn force_new(&mut self, name: &str) {
        if let Some(a) = self.diff.attributes.get_mut(name) {
            a.requires_new = true;
        }
    }

    /// Overrides a planned value, keeping the diff in step.
    pub fn set_new(&mut self, name: &str, value: Value, prior: Option<&InstanceState>) {
        let old = prior
            .and_then(|p| p.attributes.get(name))
            .cloned()
            .unwrap_or_default();
        if self.exists && values_differ(&old, &value) {
            let requires_new = self.diff.get(name).is_some_and(|a| a.requires_new);
            self.diff.attributes.insert(
                name.to_owned(),
                AttributeDiff {
                    old,
                    new: value.clone(),
                    requires_new,
                },
            );
        } else {
            self.diff.attributes.remove(name);
        }
        self.planned.insert(name.to_owned(), value);
    }

    /// Adds a plan-time error, e.g. from a custom-diff hook.
    pub fn error(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_owned()
    } else {
        format!("{prefix}.{name}")
    }
}

/// Validates a configuration map against a block and returns it converted to the declared
/// kinds. Invalid attributes are left out of the result.
pub fn validate_config(
    block: &Block,
    config: &BTreeMap<String, Value>,
    prefix: &str,
    diags: &mut Diagnostics,
) -> BTreeMap<String, Value> {
    let mut typed = BTreeMap::new();

    for name in config.keys() {
        if block.get(name).is_none() {
            diags.push(
                Diagnostic::error(format!("unsupported argument {name:?}"))
                    .with_detail(format!("an argument named {name:?} is not expected here"))
                    .at(join(prefix, name)),
            );
        }
    }

    for (name, attribute) in block.iter() {
        let path = join(prefix, name);
        let raw = match config.get(name) {
            Some(v) if !v.is_null() => v,
            _ => {
                if attribute.required {
                    diags.push(
                        Diagnostic::error(format!("missing required argument {name:?}")).at(path),
                    );
                }
                continue;
            }
        };

        if attribute.computed && !attribute.optional {
            diags.push(
                Diagnostic::error(format!("value for unconfigurable attribute {name:?}"))
                    .with_detail("this attribute is computed by the cloud and cannot be set")
                    .at(path),
            );
            continue;
        }

        let value = match attribute.coerce_json(&raw.to_json()) {
            Ok(v) => v,
            Err(e) => {
                diags.push(
                    Diagnostic::error(format!("incorrect attribute value type for {name:?}"))
                        .with_detail(e.to_string())
                        .at(path),
                );
                continue;
            }
        };

        for other in &attribute.conflicts_with {
            if config.get(other).is_some_and(|v| !v.is_null()) {
                diags.push(
                    Diagnostic::error(format!("{name:?} conflicts with {other:?}"))
                        .with_detail(format!("only one of {name:?} or {other:?} can be set"))
                        .at(path.clone()),
                );
            }
        }

        if let Some(items) = value.as_slice() {
            if let Some(max) = attribute.max_items.filter(|max| items.len() > *max) {
                diags.push(
                    Diagnostic::error(format!("too many items for {name:?}"))
                        .with_detail(format!("at most {max} allowed, got {}", items.len()))
                        .at(path.clone()),
                );
            }
            if let Some(min) = attribute.min_items.filter(|min| items.len() < *min) {
                diags.push(
                    Diagnostic::error(format!("not enough items for {name:?}"))
                        .with_detail(format!("at least {min} required, got {}", items.len()))
                        .at(path.clone()),
                );
            }
            if let Some(nested) = attribute.kind.nested_block() {
                for (i, item) in items.iter().enumerate() {
                    if let Some(fields) = item.as_map() {
                        validate_config(nested, fields, &format!("{path}.{i}"), diags);
                    }
                }
            }
        }

        for validator in &attribute.validators {
            let outcome = validator.run(&value, &path);
            for warning in outcome.warnings {
                diags.push(Diagnostic::warning(warning).at(path.clone()));
            }
            for error in outcome.errors {
                diags.push(Diagnostic::error(error).at(path.clone()));
            }
        }

        typed.insert(name.clone(), value);
    }
    typed
}

/// Plans one instance. `prior` is `None` (or gone) for a resource that does not exist yet.
pub fn plan(schema: &Schema, prior: Option<&InstanceState>, config: &BTreeMap<String, Value>) -> Plan {
    let mut diagnostics = Diagnostics::new();
    let typed = validate_config(&schema.block, config, "", &mut diagnostics);

    let prior = prior.filter(|p| !p.is_gone());
    let exists = prior.is_some();
    let mut planned = BTreeMap::new();
    let mut diff = InstanceDiff::default();

    for (name, attribute) in schema.block.iter() {
        let old = prior
            .and_then(|p| p.attributes.get(name))
            .cloned()
            .unwrap_or_default();

        let mut new = match typed.get(name) {
            Some(v) => v.clone(),
            None => match &attribute.default {
                Some(default) => attribute
                    .coerce_json(&default.to_json())
                    .unwrap_or_else(|_| default.clone()),
                None if attribute.computed => old.clone(),
                None => Value::Null,
            },
        };

        if let Some(suppress) = &attribute.diff_suppress {
            if !old.is_null() && !new.is_null() && suppress(name, &old, &new) {
                new = old.clone();
            }
        }

        if exists && values_differ(&old, &new) {
            diff.attributes.insert(
                name.clone(),
                AttributeDiff {
                    old,
                    new: new.clone(),
                    requires_new: attribute.force_new,
                },
            );
        }
        planned.insert(name.clone(), new);
    }

    Plan {
        planned,
        diff,
        diagnostics,
        exists,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Attribute, Kind};
    use crate::validation;
    use crate::value_map;

    fn port_schema() -> Schema {
        Schema::new(
            Block::new()
                .attr("name", Attribute::optional(Kind::String))
                .attr("network_id", Attribute::required(Kind::String).force_new())
                .attr(
                    "admin_state_up",
                    Attribute::optional_computed(Kind::Bool)
                        .diff_suppress(validation::suppress_bool_string),
                )
                .attr(
                    "security_group_ids",
                    Attribute::optional(Kind::set_of(Kind::String))
                        .conflicts_with(&["no_security_groups"]),
                )
                .attr("no_security_groups", Attribute::optional(Kind::Bool))
                .attr("mac_address", Attribute::computed(Kind::String))
                .attr("device_owner", Attribute::optional(Kind::String).default_value("none"))
                .attr(
                    "fixed_ip",
                    Attribute::optional(Kind::block_list(
                        Block::new()
                            .attr("subnet_id", Attribute::required(Kind::String))
                            .attr("ip_address", Attribute::optional(Kind::String).validate(validation::ip_address())),
                    ))
                    .max_items(2),
                ),
        )
    }

    fn config(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs.iter().map(|(k, v)| ((*k).to_owned(), v.clone())).collect()
    }

    fn existing() -> InstanceState {
        InstanceState::new("port-1")
            .with_attribute("name", "p")
            .with_attribute("network_id", "net-1")
            .with_attribute("admin_state_up", true)
            .with_attribute("mac_address", "fa:16:3e:00:00:01")
            .with_attribute("device_owner", "none")
    }

    #[test]
    fn test_create_applies_defaults() {
        let plan = plan(&port_schema(), None, &config(&[("network_id", "net-1".into())]));
        assert!(plan.is_valid(), "{:?}", plan.diagnostics);
        assert_eq!(plan.action(), PlanAction::Create);
        assert_eq!(plan.get("device_owner"), &Value::from("none"));
        assert!(plan.get("mac_address").is_null());
    }

    #[test]
    fn test_validation_collects_every_problem() {
        let plan = plan(
            &port_schema(),
            None,
            &config(&[
                ("bogus", "x".into()),
                ("mac_address", "aa".into()),
                ("security_group_ids", vec![Value::from("sg")].into()),
                ("no_security_groups", true.into()),
                (
                    "fixed_ip",
                    vec![
                        value_map! { "subnet_id" => "s", "ip_address" => "not-an-ip" },
                        value_map! { "subnet_id" => "s" },
                        value_map! { "subnet_id" => "s" },
                    ]
                    .into(),
                ),
            ]),
        );
        let paths: Vec<_> = plan
            .diagnostics
            .errors()
            .filter_map(|d| d.attribute.clone())
            .collect();
        assert!(paths.contains(&"bogus".to_owned()));
        assert!(paths.contains(&"network_id".to_owned()));
        assert!(paths.contains(&"mac_address".to_owned()));
        assert!(paths.contains(&"security_group_ids".to_owned()));
        assert!(paths.contains(&"fixed_ip".to_owned()));
        assert!(paths.contains(&"fixed_ip.0.ip_address".to_owned()));
        assert!(!plan.is_valid());
    }

    #[test]
    fn test_force_new_change_replaces() {
        let prior = existing();
        let cfg = config(&[("name", "p".into()), ("network_id", "net-2".into())]);
        let plan = plan(&port_schema(), Some(&prior), &cfg);
        assert_eq!(plan.action(), PlanAction::Replace);
        assert_eq!(plan.diff.replace_paths(), vec!["network_id".to_owned()]);
    }

    #[test]
    fn test_in_place_update_and_computed_carry_forward() {
        let prior = existing();
        let cfg = config(&[("name", "q".into()), ("network_id", "net-1".into())]);
        let plan = plan(&port_schema(), Some(&prior), &cfg);
        assert_eq!(plan.action(), PlanAction::Update);
        assert_eq!(plan.diff.attributes.len(), 1);
        assert_eq!(plan.get("mac_address"), &Value::from("fa:16:3e:00:00:01"));
        assert_eq!(plan.get("admin_state_up"), &Value::Bool(true));
    }

    #[test]
    fn test_suppressed_representation_is_no_op() {
        let prior = existing();
        let cfg = config(&[
            ("name", "p".into()),
            ("network_id", "net-1".into()),
            ("admin_state_up", "true".into()),
        ]);
        let plan = plan(&port_schema(), Some(&prior), &cfg);
        assert_eq!(plan.action(), PlanAction::NoOp, "{:?}", plan.diff);
    }

    #[test]
    fn test_set_order_is_not_a_change() {
        let prior = existing().with_attribute(
            "security_group_ids",
            Value::Set(vec!["a".into(), "b".into()]),
        );
        let cfg = config(&[
            ("name", "p".into()),
            ("network_id", "net-1".into()),
            ("security_group_ids", vec![Value::from("b"), Value::from("a")].into()),
        ]);
        assert_eq!(plan(&port_schema(), Some(&prior), &cfg).action(), PlanAction::NoOp);
    }

    #[test]
    fn test_custom_hook_can_force_new() {
        let prior = existing();
        let cfg = config(&[("name", "q".into()), ("network_id", "net-1".into())]);
        let mut plan = plan(&port_schema(), Some(&prior), &cfg);
        plan.force_new("name");
        assert_eq!(plan.action(), PlanAction::Replace);

        plan.set_new("name", "p".into(), Some(&prior));
        assert_eq!(plan.action(), PlanAction::NoOp);
    }
}
