// 📝 Form Fields - the values a wizard session collects

use crate::media::MediaHandle;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One captured field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Number(f64),
    /// A choice from a fixed set ("yes"/"no", "count"/"weight", ...)
    Choice(String),
    Media(MediaHandle),
    /// Geo selection mirrored from the selector chain
    Geo { id: String, label: String },
}

impl FieldValue {
    /// Text form sent in multipart submissions; media has none
    pub fn as_text(&self) -> Option<String> {
        match self {
            FieldValue::Text(s) | FieldValue::Choice(s) => Some(s.clone()),
            FieldValue::Number(n) => Some(format_number(*n)),
            FieldValue::Geo { id, .. } => Some(id.clone()),
            FieldValue::Media(_) => None,
        }
    }

    /// Numeric view; text is parsed so keyboard input validates live
    ///
    /// `inf` and `NaN` parse as `f64` but are never a usable answer.
    pub fn as_number(&self) -> Option<f64> {
        let n = match self {
            FieldValue::Number(n) => *n,
            FieldValue::Text(s) => s.trim().parse().ok()?,
            _ => return None,
        };
        n.is_finite().then_some(n)
    }

    pub fn is_blank(&self) -> bool {
        match self {
            FieldValue::Text(s) | FieldValue::Choice(s) => s.trim().is_empty(),
            FieldValue::Geo { id, .. } => id.is_empty(),
            FieldValue::Number(n) => n.is_nan(),
            FieldValue::Media(_) => false,
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Field id → value, ordered so submissions are deterministic
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldMap {
    values: BTreeMap<String, FieldValue>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, field: impl Into<String>, value: FieldValue) {
        self.values.insert(field.into(), value);
    }

    pub fn set_text(&mut self, field: impl Into<String>, text: impl Into<String>) {
        self.set(field, FieldValue::Text(text.into()));
    }

    pub fn set_choice(&mut self, field: impl Into<String>, choice: impl Into<String>) {
        self.set(field, FieldValue::Choice(choice.into()));
    }

    pub fn remove(&mut self, field: &str) -> Option<FieldValue> {
        self.values.remove(field)
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.values.get(field)
    }

    /// Text, choice or geo id for a field
    pub fn text(&self, field: &str) -> Option<String> {
        self.get(field).and_then(FieldValue::as_text)
    }

    /// Does the field hold exactly this choice/text?
    pub fn is(&self, field: &str, expected: &str) -> bool {
        self.text(field).map(|v| v == expected).unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.values.iter()
    }

    /// Attached media, in field order
    pub fn media(&self) -> impl Iterator<Item = (&String, &MediaHandle)> {
        self.values.iter().filter_map(|(k, v)| match v {
            FieldValue::Media(handle) => Some((k, handle)),
            _ => None,
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_views() {
        assert_eq!(FieldValue::Number(50.0).as_text().as_deref(), Some("50"));
        assert_eq!(FieldValue::Number(2.5).as_text().as_deref(), Some("2.5"));
        assert_eq!(
            FieldValue::Geo { id: "32".into(), label: "Kerala".into() }.as_text().as_deref(),
            Some("32")
        );
        assert_eq!(
            FieldValue::Media(MediaHandle::from_path("a.jpg")).as_text(),
            None
        );
    }

    #[test]
    fn test_number_parses_text() {
        assert_eq!(FieldValue::Text(" 12 ".into()).as_number(), Some(12.0));
        assert_eq!(FieldValue::Text("abc".into()).as_number(), None);
    }

    #[test]
    fn test_number_rejects_non_finite() {
        for text in ["inf", "-inf", "infinity", "NaN"] {
            assert_eq!(FieldValue::Text(text.into()).as_number(), None, "{}", text);
        }
        assert_eq!(FieldValue::Number(f64::INFINITY).as_number(), None);
        assert_eq!(FieldValue::Number(f64::NAN).as_number(), None);
    }

    #[test]
    fn test_field_map_helpers() {
        let mut fields = FieldMap::new();
        fields.set_choice("harvested_before", "yes");
        fields.set("photo", FieldValue::Media(MediaHandle::from_path("p.png")));

        assert!(fields.is("harvested_before", "yes"));
        assert!(!fields.is("harvested_before", "no"));
        assert!(!fields.is("missing", "yes"));
        assert_eq!(fields.media().count(), 1);
        assert_eq!(fields.len(), 2);
    }
}
