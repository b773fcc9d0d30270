//! Permissive, rule-driven output validation (spec.md §4.2, §9). The
//! original implementation hardcoded specific column names and
//! relationships; here the rules are data, supplied by the prompts
//! config, so the Processor never branches on a domain column name.

use crate::row::RowRecord;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct CategoricalRule {
    pub column: String,
    pub valid_values: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelationshipConstraint {
    /// `then_column` must equal `value` when the trigger holds.
    ExpectedValue { value: String },
    /// `then_column` must not be one of `values`; coerced to `correct_to`
    /// when it is.
    ForbiddenValues { values: Vec<String>, correct_to: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelationshipRule {
    pub when_column: String,
    pub when_value: String,
    pub then_column: String,
    pub constraint: RelationshipConstraint,
}

fn value_str(row: &RowRecord, column: &str) -> String {
    match row.get(column) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

/// `flag = when_value ⇒ paired field` relationship checks. Violations are
/// corrected and logged; the row is never rejected.
pub fn apply_relationship_rules(row: &mut RowRecord, rules: &[RelationshipRule], row_id: i64) {
    for rule in rules {
        if value_str(row, &rule.when_column) != rule.when_value {
            continue;
        }
        let current = value_str(row, &rule.then_column);
        match &rule.constraint {
            RelationshipConstraint::ExpectedValue { value } => {
                if &current != value {
                    tracing::warn!(row_id, column = %rule.then_column, current = %current, expected = %value, "relationship violation: coercing to expected value");
                    row.insert(rule.then_column.clone(), Value::String(value.clone()));
                }
            }
            RelationshipConstraint::ForbiddenValues { values, correct_to } => {
                if values.iter().any(|v| v == &current) {
                    tracing::warn!(row_id, column = %rule.then_column, current = %current, "relationship violation: coercing to fallback value");
                    row.insert(rule.then_column.clone(), Value::String(correct_to.clone()));
                }
            }
        }
    }
}

fn is_organic_format(value: &str) -> bool {
    value.contains('_') || value.chars().next().is_some_and(|c| c.is_uppercase())
}

const SPECIAL_MARKERS: [&str; 4] = ["-", "NONE", "Unknown", ""];

/// Accepts values in the declared set, bracketed, error sentinels, or
/// organically formatted labels; anything else is logged as unusual but
/// still accepted. Model creativity is tolerated; only relationships are
/// corrected.
pub fn apply_categorical_rules(row: &RowRecord, rules: &[CategoricalRule], row_id: i64) {
    for rule in rules {
        let value = value_str(row, &rule.column);
        if value.is_empty() {
            continue;
        }
        let is_in_list = rule.valid_values.iter().any(|v| v == &value);
        let is_bracketed = value.starts_with('[') && value.ends_with(']');
        let is_error = value.starts_with("ERROR_");
        let is_special = SPECIAL_MARKERS.contains(&value.as_str());

        if is_in_list || is_bracketed || is_error || is_special {
            continue;
        }
        if is_organic_format(&value) {
            tracing::info!(row_id, column = %rule.column, value = %value, "organic label, not in configured value set");
        } else {
            tracing::warn!(row_id, column = %rule.column, value = %value, "unexpected value, allowing as organic");
        }
    }
}

/// If the primary indicator column holds the "not applicable" sentinel,
/// coerce every other configured output column to the "not applicable"
/// default value and report that this short-circuited further validation.
pub fn apply_primary_indicator(
    row: &mut RowRecord,
    primary_column: &str,
    na_sentinel: &str,
    other_columns: &[String],
    na_default: &str,
    row_id: i64,
) -> bool {
    if value_str(row, primary_column) != na_sentinel {
        return false;
    }
    for column in other_columns {
        let current = value_str(row, column);
        if current != na_default && current != "ERROR_MISSING_KEY" {
            tracing::warn!(row_id, %column, current = %current, "{primary_column}={na_sentinel}: coercing to not-applicable default");
            row.insert(column.clone(), Value::String(na_default.to_string()));
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row_with(pairs: &[(&str, &str)]) -> RowRecord {
        let mut row = RowRecord::new();
        for (k, v) in pairs {
            row.insert(k.to_string(), json!(v));
        }
        row
    }

    #[test]
    fn expected_value_constraint_corrects_mismatch() {
        let mut row = row_with(&[("Flag", "N"), ("Reason", "typo")]);
        let rules = vec![RelationshipRule {
            when_column: "Flag".into(),
            when_value: "N".into(),
            then_column: "Reason".into(),
            constraint: RelationshipConstraint::ExpectedValue { value: "NONE".into() },
        }];
        apply_relationship_rules(&mut row, &rules, 1);
        assert_eq!(value_str(&row, "Reason"), "NONE");
    }

    #[test]
    fn forbidden_values_constraint_falls_back() {
        let mut row = row_with(&[("Flag", "Y"), ("Competitor", "NONE")]);
        let rules = vec![RelationshipRule {
            when_column: "Flag".into(),
            when_value: "Y".into(),
            then_column: "Competitor".into(),
            constraint: RelationshipConstraint::ForbiddenValues {
                values: vec!["NONE".into(), "-".into(), "".into()],
                correct_to: "Other".into(),
            },
        }];
        apply_relationship_rules(&mut row, &rules, 1);
        assert_eq!(value_str(&row, "Competitor"), "Other");
    }

    #[test]
    fn relationship_rule_is_a_no_op_when_trigger_does_not_match() {
        let mut row = row_with(&[("Flag", "Maybe"), ("Reason", "custom")]);
        let rules = vec![RelationshipRule {
            when_column: "Flag".into(),
            when_value: "N".into(),
            then_column: "Reason".into(),
            constraint: RelationshipConstraint::ExpectedValue { value: "NONE".into() },
        }];
        apply_relationship_rules(&mut row, &rules, 1);
        assert_eq!(value_str(&row, "Reason"), "custom");
    }

    #[test]
    fn categorical_rules_never_mutate_the_row() {
        let row = row_with(&[("Sentiment", "Surprised_Delight")]);
        let rules = vec![CategoricalRule { column: "Sentiment".into(), valid_values: vec!["Positive".into(), "Negative".into()] }];
        apply_categorical_rules(&row, &rules, 1);
        assert_eq!(value_str(&row, "Sentiment"), "Surprised_Delight");
    }

    #[test]
    fn primary_indicator_na_coerces_other_columns() {
        let mut row = row_with(&[("Booking_Related", "N"), ("Sentiment", "Positive")]);
        let short_circuited = apply_primary_indicator(
            &mut row,
            "Booking_Related",
            "N",
            &["Sentiment".to_string()],
            "-",
            1,
        );
        assert!(short_circuited);
        assert_eq!(value_str(&row, "Sentiment"), "-");
    }

    #[test]
    fn primary_indicator_not_na_does_not_short_circuit() {
        let mut row = row_with(&[("Booking_Related", "Y"), ("Sentiment", "Positive")]);
        let short_circuited = apply_primary_indicator(
            &mut row,
            "Booking_Related",
            "N",
            &["Sentiment".to_string()],
            "-",
            1,
        );
        assert!(!short_circuited);
        assert_eq!(value_str(&row, "Sentiment"), "Positive");
    }
}
