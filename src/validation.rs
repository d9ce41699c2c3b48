// 🚦 Step Validation Gate - may this step be left forward?
//
// Pure and synchronous: safe to call on every keystroke to enable or
// disable the "Next" control.

use crate::form::{FieldMap, FieldValue};
use std::collections::HashMap;

pub type StepId = &'static str;

// ============================================================================
// VALIDATION RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
    /// Step the field belongs to
    pub context: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.context, self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), Vec<ValidationError>>;

// ============================================================================
// RULES
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum FieldRule {
    /// Non-empty after trimming
    NonEmpty,
    /// Parses as a number greater than zero
    PositiveNumber,
    /// Exactly `n` ASCII digits (mobile number, pincode, Aadhaar)
    Digits(usize),
    /// One of a fixed set of choices
    OneOf(Vec<&'static str>),
    /// A photo or document is attached
    MediaAttached,
    /// A geo level has a selection
    GeoSelected,
}

impl FieldRule {
    fn check(&self, value: Option<&FieldValue>) -> Result<(), String> {
        let Some(value) = value else {
            return Err("Required field is missing".to_string());
        };

        match self {
            FieldRule::NonEmpty => {
                if value.is_blank() {
                    return Err("Required field is empty".to_string());
                }
            }
            FieldRule::PositiveNumber => match value.as_number() {
                Some(n) if n.is_finite() && n > 0.0 => {}
                Some(n) => return Err(format!("Must be greater than 0, got {}", n)),
                None => return Err("Must be a number".to_string()),
            },
            FieldRule::Digits(n) => {
                let text = value.as_text().unwrap_or_default();
                let text = text.trim();
                if text.len() != *n || !text.chars().all(|c| c.is_ascii_digit()) {
                    return Err(format!("Must be exactly {} digits", n));
                }
            }
            FieldRule::OneOf(allowed) => {
                let text = value.as_text().unwrap_or_default();
                if !allowed.iter().any(|choice| *choice == text) {
                    return Err(format!("Must be one of: {}", allowed.join(", ")));
                }
            }
            FieldRule::MediaAttached => {
                if !matches!(value, FieldValue::Media(_)) {
                    return Err("Attach a photo".to_string());
                }
            }
            FieldRule::GeoSelected => {
                if !matches!(value, FieldValue::Geo { id, .. } if !id.is_empty()) {
                    return Err("Select an option".to_string());
                }
            }
        }

        Ok(())
    }
}

/// Only check a field when another field holds a given choice
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: &'static str,
    pub equals: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldCheck {
    pub field: &'static str,
    pub rule: FieldRule,
    pub when: Option<Condition>,
}

impl FieldCheck {
    pub fn new(field: &'static str, rule: FieldRule) -> Self {
        FieldCheck { field, rule, when: None }
    }

    /// Restrict the check to one branch of a yes/no or mode choice
    pub fn when(mut self, field: &'static str, equals: &'static str) -> Self {
        self.when = Some(Condition { field, equals });
        self
    }

    fn applies(&self, fields: &FieldMap) -> bool {
        match &self.when {
            None => true,
            Some(cond) => fields.is(cond.field, cond.equals),
        }
    }
}

// ============================================================================
// GATE
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct StepValidationGate {
    rules: HashMap<StepId, Vec<FieldCheck>>,
}

impl StepValidationGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(mut self, step: StepId, check: FieldCheck) -> Self {
        self.rules.entry(step).or_default().push(check);
        self
    }

    /// Shorthand for an unconditional rule
    pub fn require(self, step: StepId, field: &'static str, rule: FieldRule) -> Self {
        self.check(step, FieldCheck::new(field, rule))
    }

    /// Every failing check for a step; steps without rules always pass
    pub fn validate(&self, step: StepId, fields: &FieldMap) -> ValidationResult {
        let errors: Vec<ValidationError> = self
            .rules
            .get(step)
            .map(|checks| checks.as_slice())
            .unwrap_or_default()
            .iter()
            .filter(|check| check.applies(fields))
            .filter_map(|check| {
                check.rule.check(fields.get(check.field)).err().map(|message| ValidationError {
                    field: check.field.to_string(),
                    message,
                    context: step.to_string(),
                })
            })
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn is_valid(&self, step: StepId, fields: &FieldMap) -> bool {
        self.validate(step, fields).is_ok()
    }

    /// First rule registered for a field, used to pick an input widget
    pub fn rule_for(&self, step: StepId, field: &str) -> Option<&FieldRule> {
        self.rules
            .get(step)?
            .iter()
            .find(|c| c.field == field)
            .map(|c| &c.rule)
    }

    /// Fields a step checks under the current answers
    pub fn active_fields(&self, step: StepId, fields: &FieldMap) -> Vec<&'static str> {
        self.rules
            .get(step)
            .map(|checks| {
                checks
                    .iter()
                    .filter(|c| c.applies(fields))
                    .map(|c| c.field)
                    .collect()
            })
            .unwrap_or_default()
    }
}
