// 🗺️ Geographic Hierarchy - state → district → subdistrict → panchayat → village
//
// Each level's options depend on the selection one level up. The resolver is
// the only thing that knows where options come from; the selector chain owns
// what is currently selected.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// GEO LEVEL
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeoLevel {
    State,
    District,
    Subdistrict,
    Panchayat,
    Village,
}

impl GeoLevel {
    /// All levels in hierarchy order (root first)
    pub const ALL: [GeoLevel; 5] = [
        GeoLevel::State,
        GeoLevel::District,
        GeoLevel::Subdistrict,
        GeoLevel::Panchayat,
        GeoLevel::Village,
    ];

    pub fn index(&self) -> usize {
        match self {
            GeoLevel::State => 0,
            GeoLevel::District => 1,
            GeoLevel::Subdistrict => 2,
            GeoLevel::Panchayat => 3,
            GeoLevel::Village => 4,
        }
    }

    pub fn parent(&self) -> Option<GeoLevel> {
        match self {
            GeoLevel::State => None,
            other => Some(GeoLevel::ALL[other.index() - 1]),
        }
    }

    pub fn child(&self) -> Option<GeoLevel> {
        GeoLevel::ALL.get(self.index() + 1).copied()
    }

    /// Levels strictly below this one, nearest first
    pub fn descendants(&self) -> &'static [GeoLevel] {
        &GeoLevel::ALL[self.index() + 1..]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GeoLevel::State => "state",
            GeoLevel::District => "district",
            GeoLevel::Subdistrict => "subdistrict",
            GeoLevel::Panchayat => "panchayat",
            GeoLevel::Village => "village",
        }
    }

    /// Form field id that mirrors this level's selection
    pub fn field_id(&self) -> &'static str {
        match self {
            GeoLevel::State => "state_id",
            GeoLevel::District => "district_id",
            GeoLevel::Subdistrict => "subdistrict_id",
            GeoLevel::Panchayat => "panchayat_id",
            GeoLevel::Village => "village_id",
        }
    }
}

impl fmt::Display for GeoLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// DISPLAY LANGUAGE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    #[default]
    English,
    /// Regional script (e.g. Malayalam, Kannada, Tamil)
    Local,
}

impl std::str::FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "en" | "english" => Ok(Language::English),
            "local" | "regional" => Ok(Language::Local),
            other => Err(format!("unknown language: {}", other)),
        }
    }
}

// ============================================================================
// GEO OPTION
// ============================================================================

/// One selectable administrative unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoOption {
    /// Opaque backend id
    pub id: String,

    /// English label
    pub name: String,

    /// Regional-language label, when the backend has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_local: Option<String>,

    /// Raw backend record, kept for prefill (e.g. village pincode)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
}

impl GeoOption {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        GeoOption {
            id: id.into(),
            name: name.into(),
            name_local: None,
            raw: None,
        }
    }

    pub fn with_local_name(mut self, name_local: impl Into<String>) -> Self {
        self.name_local = Some(name_local.into());
        self
    }

    /// Label in the requested language, falling back to English
    pub fn label(&self, language: Language) -> &str {
        match (language, &self.name_local) {
            (Language::Local, Some(local)) if !local.is_empty() => local,
            _ => &self.name,
        }
    }

    /// Case-insensitive substring match against either label, in either direction
    ///
    /// "Thrissur" matches "Thrissur District" and vice versa.
    pub fn fuzzy_matches(&self, needle: &str) -> bool {
        let needle = needle.trim().to_lowercase();
        if needle.is_empty() {
            return false;
        }

        std::iter::once(self.name.as_str())
            .chain(self.name_local.as_deref())
            .map(|label| label.trim().to_lowercase())
            .filter(|label| !label.is_empty())
            .any(|label| label.contains(&needle) || needle.contains(&label))
    }

    /// Read a string from the raw payload
    pub fn raw_str(&self, key: &str) -> Option<&str> {
        self.raw.as_ref()?.get(key)?.as_str()
    }
}

// ============================================================================
// RESOLVER CONTRACT
// ============================================================================

/// Fetches option lists for one level of the hierarchy
///
/// `parent_id` is `None` only for [`GeoLevel::State`]. Implementations never
/// retry on their own; the caller decides.
#[async_trait]
pub trait GeoHierarchyResolver: Send + Sync {
    async fn resolve(&self, level: GeoLevel, parent_id: Option<&str>) -> Result<Vec<GeoOption>>;

    /// Abort every in-flight resolution; aborted calls return `WizardError::Cancelled`
    fn cancel_pending(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_navigation() {
        assert_eq!(GeoLevel::State.parent(), None);
        assert_eq!(GeoLevel::State.child(), Some(GeoLevel::District));
        assert_eq!(GeoLevel::Village.child(), None);
        assert_eq!(GeoLevel::Panchayat.parent(), Some(GeoLevel::Subdistrict));
        assert_eq!(
            GeoLevel::District.descendants(),
            &[GeoLevel::Subdistrict, GeoLevel::Panchayat, GeoLevel::Village]
        );
        assert!(GeoLevel::Village.descendants().is_empty());
    }

    #[test]
    fn test_label_falls_back_to_english() {
        let plain = GeoOption::new("1", "Kerala");
        assert_eq!(plain.label(Language::Local), "Kerala");

        let local = GeoOption::new("1", "Kerala").with_local_name("കേരളം");
        assert_eq!(local.label(Language::Local), "കേരളം");
        assert_eq!(local.label(Language::English), "Kerala");
    }

    #[test]
    fn test_fuzzy_match_both_directions() {
        let option = GeoOption::new("7", "Thrissur").with_local_name("തൃശ്ശൂർ");

        assert!(option.fuzzy_matches("thrissur district"));
        assert!(option.fuzzy_matches("THRISS"));
        assert!(option.fuzzy_matches("തൃശ്ശൂർ"));
        assert!(!option.fuzzy_matches("Palakkad"));
        assert!(!option.fuzzy_matches("   "));
    }

    #[test]
    fn test_raw_payload_lookup() {
        let mut option = GeoOption::new("v1", "Kodakara");
        option.raw = Some(serde_json::json!({"pincode": "680684"}));

        assert_eq!(option.raw_str("pincode"), Some("680684"));
        assert_eq!(option.raw_str("missing"), None);
    }
}
