//! Financial data validation
//!
//! Plausibility checks over extracted figures: magnitude ranges, accounting
//! identities, and comparison against known-correct reference data.
//! Validation is advisory. Every check reports results, none of them fail
//! the pipeline.

use crate::error::Result;
use crate::models::ValidationResult;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Expected magnitude ranges for common statement captions, in millions.
/// Family names are lowercase substrings matched against data keys, so
/// "current assets" covers "Total Current Assets FY2023" and similar.
/// Order matters: the first matching family wins.
const EXPECTED_RANGES: &[(&str, f64, f64)] = &[
    ("current assets", 100.0, 100_000.0),
    ("current liabilities", 100.0, 100_000.0),
    ("inventory", 10.0, 50_000.0),
    ("revenue", 100.0, 500_000.0),
    ("capex", 10.0, 50_000.0),
    // net income can be negative
    ("net income", -10_000.0, 50_000.0),
    ("total assets", 1_000.0, 1_000_000.0),
];

/// One magnitude range, matched by family-name substring.
#[derive(Debug, Clone)]
pub struct FieldRange {
    pub family: String,
    pub min: f64,
    pub max: f64,
}

/// Named accounting identity checked over the extracted figures. The
/// predicate reports an error string when an operand is missing, so the
/// caller can tell "violated" from "could not evaluate".
pub struct MathRelationship {
    pub name: &'static str,
    pub check: fn(&Map<String, Value>) -> std::result::Result<bool, String>,
}

/// Known-correct answer for one company, with the numeric figures the
/// extraction should reproduce.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceEntry {
    pub company: String,
    pub answer: String,
    #[serde(default)]
    pub justification: String,
    #[serde(default)]
    pub values: Map<String, Value>,
}

/// Loads reference entries from a JSON file holding an array of entries.
pub fn load_reference_entries(path: &Path) -> Result<Vec<ReferenceEntry>> {
    let raw = fs::read_to_string(path)?;
    let entries: Vec<ReferenceEntry> = serde_json::from_str(&raw)?;
    info!(count = entries.len(), path = %path.display(), "loaded reference entries");
    Ok(entries)
}

/// Validator for extracted financial data. All tables are built at
/// construction and never change afterwards.
pub struct FinancialDataValidator {
    ranges: Vec<FieldRange>,
    relationships: Vec<MathRelationship>,
    reference: HashMap<String, ReferenceEntry>,
}

impl FinancialDataValidator {
    pub fn new() -> Self {
        let ranges = EXPECTED_RANGES
            .iter()
            .map(|(family, min, max)| FieldRange {
                family: (*family).to_string(),
                min: *min,
                max: *max,
            })
            .collect();
        Self {
            ranges,
            relationships: default_relationships(),
            reference: HashMap::new(),
        }
    }

    /// Builds a validator with reference data for ground-truth comparison,
    /// keyed by lower-cased company name.
    pub fn with_reference_entries(entries: Vec<ReferenceEntry>) -> Self {
        let mut validator = Self::new();
        for entry in entries {
            let key = entry.company.trim().to_lowercase();
            validator.reference.insert(key, entry);
        }
        validator
    }

    /// Checks each extracted figure against its family's expected range.
    /// Bounds are inclusive: a value exactly at the edge is valid, one unit
    /// outside is a warning. Keys with no matching family are unverified.
    pub fn validate_range(&self, data: &Map<String, Value>) -> IndexMap<String, ValidationResult> {
        let mut results = IndexMap::new();
        for (key, value) in data {
            let Some(number) = numeric_value(value) else {
                results.insert(key.clone(), ValidationResult::error("Non-numeric value"));
                continue;
            };
            let Some(range) = self.range_for(key) else {
                results.insert(
                    key.clone(),
                    ValidationResult::unverified("No validation rule available"),
                );
                continue;
            };
            let result = if range.min <= number && number <= range.max {
                ValidationResult::valid("Value within expected range")
            } else {
                ValidationResult::warning(format!(
                    "Value {} outside expected range ({}, {})",
                    number, range.min, range.max
                ))
                .with_actual(number)
            };
            results.insert(key.clone(), result);
        }
        debug!(checked = results.len(), "range validation finished");
        results
    }

    /// Evaluates every accounting identity. A predicate that cannot find
    /// its operands reports an error; one that evaluates false reports a
    /// warning.
    pub fn validate_math(&self, data: &Map<String, Value>) -> IndexMap<String, ValidationResult> {
        let mut results = IndexMap::new();
        for relationship in &self.relationships {
            let result = match (relationship.check)(data) {
                Ok(true) => ValidationResult::valid("Mathematical relationship holds"),
                Ok(false) => ValidationResult::warning("Mathematical relationship violated"),
                Err(detail) => ValidationResult::error(format!("Validation failed: {}", detail)),
            };
            results.insert(relationship.name.to_string(), result);
        }
        results
    }

    /// Compares extracted figures against the reference entry for the
    /// company. Keys match after normalization (lowercase, alphanumerics
    /// only); when several data keys normalize identically the first one
    /// in document order wins. Reference fields with no numeric match are
    /// appended after the matched set as errors.
    pub fn compare_with_reference(
        &self,
        company: &str,
        data: &Map<String, Value>,
    ) -> IndexMap<String, ValidationResult> {
        let mut results = IndexMap::new();
        let Some(entry) = self.reference.get(&company.trim().to_lowercase()) else {
            results.insert(
                "ground_truth".to_string(),
                ValidationResult::error("No ground truth data available for this company"),
            );
            return results;
        };

        for (field, expected) in &entry.values {
            let Some(expected) = numeric_value(expected) else {
                continue;
            };
            let matched = data.iter().find(|(key, value)| {
                numeric_value(value).is_some() && normalize_key(key) == normalize_key(field)
            });
            if let Some((_, value)) = matched {
                let actual = numeric_value(value).unwrap_or_default();
                results.insert(field.clone(), grade_against_reference(expected, actual));
            }
        }
        for (field, expected) in &entry.values {
            let Some(expected) = numeric_value(expected) else {
                continue;
            };
            if !results.contains_key(field) {
                results.insert(
                    field.clone(),
                    ValidationResult::error("Value not found in extracted data")
                        .with_expected(expected),
                );
            }
        }
        results
    }

    /// Runs all three check families and groups the results by category.
    pub fn comprehensive(
        &self,
        company: &str,
        data: &Map<String, Value>,
    ) -> IndexMap<String, IndexMap<String, ValidationResult>> {
        let mut report = IndexMap::new();
        report.insert("range_validation".to_string(), self.validate_range(data));
        report.insert("math_validation".to_string(), self.validate_math(data));
        report.insert(
            "ground_truth".to_string(),
            self.compare_with_reference(company, data),
        );
        report
    }

    fn range_for(&self, key: &str) -> Option<&FieldRange> {
        let key = key.to_lowercase();
        self.ranges.iter().find(|range| key.contains(&range.family))
    }
}

impl Default for FinancialDataValidator {
    fn default() -> Self {
        Self::new()
    }
}

fn grade_against_reference(expected: f64, actual: f64) -> ValidationResult {
    let error_pct = (actual - expected).abs() / expected.abs().max(1.0) * 100.0;
    if error_pct < 1.0 {
        ValidationResult::valid("Exact match with ground truth")
            .with_expected(expected)
            .with_actual(actual)
    } else if error_pct < 5.0 {
        ValidationResult::warning(format!("Within 5% of ground truth (error: {:.1}%)", error_pct))
            .with_expected(expected)
            .with_actual(actual)
            .with_error_percentage(error_pct)
    } else {
        ValidationResult::error(format!("Differs from ground truth by {:.1}%", error_pct))
            .with_expected(expected)
            .with_actual(actual)
            .with_error_percentage(error_pct)
    }
}

fn default_relationships() -> Vec<MathRelationship> {
    vec![
        MathRelationship {
            name: "current_assets_exceed_inventory",
            check: |data| Ok(metric(data, "current assets")? > metric(data, "inventory")?),
        },
        MathRelationship {
            name: "quick_assets_reconcile",
            check: |data| {
                let current_assets = metric(data, "current assets")?;
                let inventory = metric(data, "inventory")?;
                let quick_assets = metric(data, "quick assets")?;
                // allow small rounding differences
                Ok((current_assets - inventory - quick_assets).abs() < 1.0)
            },
        },
        MathRelationship {
            name: "assets_exceed_liabilities",
            check: |data| Ok(metric(data, "total assets")? > metric(data, "total liabilities")?),
        },
    ]
}

/// First numeric figure whose key contains the lowercase pattern.
fn metric(data: &Map<String, Value>, pattern: &str) -> std::result::Result<f64, String> {
    for (key, value) in data {
        if key.to_lowercase().contains(pattern) {
            if let Some(number) = numeric_value(value) {
                return Ok(number);
            }
        }
    }
    Err(format!("no numeric value matching `{}`", pattern))
}

fn numeric_value(value: &Value) -> Option<f64> {
    value.as_f64()
}

/// Lowercases and strips everything but letters and digits, so
/// "Current Assets FY2023" and "current_assets_fy2023" compare equal.
fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ValidationStatus;
    use serde_json::json;

    fn data(pairs: &[(&str, Value)]) -> Map<String, Value> {
        let mut map = Map::new();
        for (key, value) in pairs {
            map.insert((*key).to_string(), value.clone());
        }
        map
    }

    fn amcor_reference() -> Vec<ReferenceEntry> {
        let mut values = Map::new();
        values.insert("Current Assets FY2023".to_string(), json!(5308.0));
        values.insert("Inventory FY2023".to_string(), json!(2284.0));
        values.insert("Current Liabilities FY2023".to_string(), json!(4476.0));
        vec![ReferenceEntry {
            company: "Amcor".to_string(),
            answer: "0.68".to_string(),
            justification: "(5308 - 2284) / 4476".to_string(),
            values,
        }]
    }

    #[test]
    fn range_bounds_are_inclusive() {
        let validator = FinancialDataValidator::new();
        let figures = data(&[
            ("Current Assets FY2023", json!(100.0)),
            ("Total Assets FY2023", json!(1_000_000.0)),
        ]);
        let results = validator.validate_range(&figures);
        assert_eq!(results["Current Assets FY2023"].status, ValidationStatus::Valid);
        assert_eq!(results["Total Assets FY2023"].status, ValidationStatus::Valid);

        let outside = data(&[
            ("Current Assets FY2023", json!(99.0)),
            ("Total Assets FY2023", json!(1_000_001.0)),
        ]);
        let results = validator.validate_range(&outside);
        assert_eq!(results["Current Assets FY2023"].status, ValidationStatus::Warning);
        assert_eq!(results["Total Assets FY2023"].status, ValidationStatus::Warning);
        assert_eq!(results["Total Assets FY2023"].actual_value, Some(1_000_001.0));
    }

    #[test]
    fn unknown_family_is_unverified_and_non_numeric_is_error() {
        let validator = FinancialDataValidator::new();
        let figures = data(&[
            ("Goodwill FY2023", json!(1500.0)),
            ("Inventory FY2023", json!("2284")),
        ]);
        let results = validator.validate_range(&figures);
        assert_eq!(results["Goodwill FY2023"].status, ValidationStatus::Unverified);
        assert_eq!(results["Inventory FY2023"].status, ValidationStatus::Error);
        assert_eq!(results["Inventory FY2023"].message, "Non-numeric value");
    }

    #[test]
    fn negative_net_income_is_in_range() {
        let validator = FinancialDataValidator::new();
        let figures = data(&[("Net Income FY2023", json!(-5000.0))]);
        let results = validator.validate_range(&figures);
        assert_eq!(results["Net Income FY2023"].status, ValidationStatus::Valid);
    }

    #[test]
    fn relationships_hold_violate_and_error() {
        let validator = FinancialDataValidator::new();

        let consistent = data(&[
            ("Current Assets FY2023", json!(5308.0)),
            ("Inventory FY2023", json!(2284.0)),
            ("Quick Assets FY2023", json!(3024.0)),
            ("Total Assets FY2023", json!(17403.0)),
            ("Total Liabilities FY2023", json!(13400.0)),
        ]);
        let results = validator.validate_math(&consistent);
        assert_eq!(results["current_assets_exceed_inventory"].status, ValidationStatus::Valid);
        assert_eq!(results["quick_assets_reconcile"].status, ValidationStatus::Valid);
        assert_eq!(results["assets_exceed_liabilities"].status, ValidationStatus::Valid);

        let inverted = data(&[
            ("Current Assets FY2023", json!(1000.0)),
            ("Inventory FY2023", json!(2284.0)),
        ]);
        let results = validator.validate_math(&inverted);
        assert_eq!(results["current_assets_exceed_inventory"].status, ValidationStatus::Warning);
        // quick assets figure absent entirely
        assert_eq!(results["quick_assets_reconcile"].status, ValidationStatus::Error);
        assert!(results["quick_assets_reconcile"].message.contains("quick assets"));
    }

    #[test]
    fn reference_grading_thresholds() {
        let validator = FinancialDataValidator::with_reference_entries(amcor_reference());

        let exact = data(&[
            ("Current Assets FY2023", json!(5308.0)),
            ("Inventory FY2023", json!(2284.0)),
            ("Current Liabilities FY2023", json!(4476.0)),
        ]);
        let results = validator.compare_with_reference("Amcor", &exact);
        assert_eq!(results["Current Assets FY2023"].status, ValidationStatus::Valid);
        assert_eq!(results["Current Assets FY2023"].error_percentage, None);

        let close = data(&[
            ("Current Assets FY2023", json!(5400.0)),
            ("Inventory FY2023", json!(2284.0)),
            ("Current Liabilities FY2023", json!(4476.0)),
        ]);
        let results = validator.compare_with_reference("amcor", &close);
        assert_eq!(results["Current Assets FY2023"].status, ValidationStatus::Warning);
        assert!(results["Current Assets FY2023"].message.contains("Within 5%"));

        let wrong = data(&[
            ("Current Assets FY2023", json!(9999.0)),
            ("Inventory FY2023", json!(2284.0)),
            ("Current Liabilities FY2023", json!(4476.0)),
        ]);
        let results = validator.compare_with_reference("Amcor", &wrong);
        assert_eq!(results["Current Assets FY2023"].status, ValidationStatus::Error);
        assert!(results["Current Assets FY2023"].error_percentage.unwrap() > 5.0);
    }

    #[test]
    fn missing_reference_fields_append_after_matches() {
        let validator = FinancialDataValidator::with_reference_entries(amcor_reference());
        let partial = data(&[("Current Assets FY2023", json!(5308.0))]);
        let results = validator.compare_with_reference("Amcor", &partial);

        let keys: Vec<&str> = results.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            ["Current Assets FY2023", "Inventory FY2023", "Current Liabilities FY2023"]
        );
        assert_eq!(results["Inventory FY2023"].status, ValidationStatus::Error);
        assert_eq!(results["Inventory FY2023"].message, "Value not found in extracted data");
        assert_eq!(results["Inventory FY2023"].expected_value, Some(2284.0));
    }

    #[test]
    fn unknown_company_reports_single_error() {
        let validator = FinancialDataValidator::with_reference_entries(amcor_reference());
        let results = validator.compare_with_reference("Initech", &data(&[]));
        assert_eq!(results.len(), 1);
        assert_eq!(results["ground_truth"].status, ValidationStatus::Error);
    }

    #[test]
    fn colliding_keys_resolve_to_first_in_document_order() {
        let validator = FinancialDataValidator::with_reference_entries(amcor_reference());
        // both keys normalize to "currentassetsfy2023"
        let colliding = data(&[
            ("Current Assets FY2023", json!(5308.0)),
            ("current_assets_fy2023", json!(9999.0)),
            ("Inventory FY2023", json!(2284.0)),
            ("Current Liabilities FY2023", json!(4476.0)),
        ]);
        for _ in 0..10 {
            let results = validator.compare_with_reference("Amcor", &colliding);
            assert_eq!(results["Current Assets FY2023"].actual_value, Some(5308.0));
            assert_eq!(results["Current Assets FY2023"].status, ValidationStatus::Valid);
        }
    }

    #[test]
    fn reference_entries_load_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reference.json");
        std::fs::write(
            &path,
            r#"[{
                "company": "Amcor",
                "answer": "0.69",
                "justification": "(5308 - 2284) / 4476",
                "values": {"Current Assets FY2023": 5308.0}
            }]"#,
        )
        .unwrap();

        let entries = load_reference_entries(&path).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].company, "Amcor");

        let validator = FinancialDataValidator::with_reference_entries(entries);
        let figures = data(&[("Current Assets FY2023", json!(5308.0))]);
        let results = validator.compare_with_reference("amcor", &figures);
        assert_eq!(results["Current Assets FY2023"].status, ValidationStatus::Valid);
    }

    #[test]
    fn comprehensive_groups_by_category() {
        let validator = FinancialDataValidator::with_reference_entries(amcor_reference());
        let figures = data(&[("Current Assets FY2023", json!(5308.0))]);
        let report = validator.comprehensive("Amcor", &figures);
        let categories: Vec<&str> = report.keys().map(String::as_str).collect();
        assert_eq!(categories, ["range_validation", "math_validation", "ground_truth"]);
    }
}
