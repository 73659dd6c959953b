use crate::config::Filters;
use regex::Regex;
use std::collections::HashMap;

/// The one field the shipped configuration can filter on.
pub const HOST_NAME_FIELD: &str = "host_name";

struct FieldRule {
    field: String,
    pattern: Regex,
}

/// Pass/drop decision over a parsed token set.
///
/// Rules are compiled once at startup; evaluation is an unanchored regex
/// match against the named field's value. No configured rules means every
/// token set passes.
pub struct FilterEngine {
    rules: Vec<FieldRule>,
}

impl FilterEngine {
    pub fn new(filters: &Filters) -> anyhow::Result<Self> {
        let mut rules = Vec::new();
        if let Some(pattern) = &filters.host_name {
            let regex = Regex::new(pattern)
                .map_err(|e| anyhow::anyhow!("Invalid regex pattern '{}': {}", pattern, e))?;
            rules.push(FieldRule {
                field: HOST_NAME_FIELD.to_string(),
                pattern: regex,
            });
        }
        Ok(FilterEngine { rules })
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn evaluate(&self, tokens: &HashMap<String, String>) -> bool {
        for rule in &self.rules {
            match tokens.get(&rule.field) {
                Some(value) if rule.pattern.is_match(value) => {
                    log::debug!(
                        "filter '{}' matched {}={}",
                        rule.pattern.as_str(),
                        rule.field,
                        value
                    );
                }
                Some(value) => {
                    log::debug!(
                        "filter '{}' rejected {}={}",
                        rule.pattern.as_str(),
                        rule.field,
                        value
                    );
                    return false;
                }
                None => {
                    log::debug!("filter field '{}' absent from payload", rule.field);
                    return false;
                }
            }
        }
        true
    }
}
