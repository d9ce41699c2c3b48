// 🌴 Flow catalogue - the concrete wizards the app ships
//
// Each flow is a step list plus the gate that guards it. Field ids match the
// multipart names the backend expects.

use crate::error::Result;
use crate::form::FieldMap;
use crate::geo::GeoLevel;
use crate::validation::{FieldCheck, FieldRule, StepId, StepValidationGate};
use crate::wizard::{Step, WizardController};

const YES_NO: [&str; 2] = ["yes", "no"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    FarmerRegistration,
    QuickRegistration,
    FarmHarvest,
}

impl FlowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowKind::FarmerRegistration => "farmer_registration",
            FlowKind::QuickRegistration => "quick_registration",
            FlowKind::FarmHarvest => "farm_harvest",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            FlowKind::FarmerRegistration => "Farmer registration",
            FlowKind::QuickRegistration => "Quick registration",
            FlowKind::FarmHarvest => "Farm & harvest",
        }
    }

    pub fn build(&self) -> Flow {
        match self {
            FlowKind::FarmerRegistration => farmer_registration(),
            FlowKind::QuickRegistration => quick_registration(),
            FlowKind::FarmHarvest => farm_harvest(),
        }
    }
}

impl std::str::FromStr for FlowKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "farmer" | "farmer_registration" => Ok(FlowKind::FarmerRegistration),
            "quick" | "quick_registration" => Ok(FlowKind::QuickRegistration),
            "harvest" | "farm_harvest" => Ok(FlowKind::FarmHarvest),
            other => Err(format!("unknown flow: {}", other)),
        }
    }
}

pub struct Flow {
    pub kind: FlowKind,
    pub steps: Vec<Step>,
    pub gate: StepValidationGate,
}

impl Flow {
    pub fn into_controller(self) -> Result<WizardController> {
        WizardController::new(self.steps, self.gate)
    }

    /// Ids of steps that hold the location selector
    pub fn location_steps(&self) -> Vec<StepId> {
        let state_field = GeoLevel::State.field_id();
        self.steps
            .iter()
            .filter(|s| s.fields.contains(&state_field))
            .map(|s| s.id)
            .collect()
    }
}

fn geo_fields() -> Vec<&'static str> {
    GeoLevel::ALL.iter().map(|l| l.field_id()).collect()
}

fn require_geo(mut gate: StepValidationGate, step: StepId) -> StepValidationGate {
    for level in GeoLevel::ALL {
        gate = gate.require(step, level.field_id(), FieldRule::GeoSelected);
    }
    gate
}

// ============================================================================
// FARMER REGISTRATION
// ============================================================================

fn coconut_branch(fields: &FieldMap) -> StepId {
    if fields.is("grows_coconut", "yes") {
        "farm_details"
    } else {
        "documents"
    }
}

/// personal → location → grows coconut? → farm details (yes) → documents → review
pub fn farmer_registration() -> Flow {
    let mut location = geo_fields();
    location.push("pincode");

    let steps = vec![
        Step::new("personal", "Personal details").fields(&["full_name", "mobile", "gender", "profile_photo"]),
        Step::new("location", "Location").fields(&location),
        Step::new("coconut_farming", "Do you grow coconut?")
            .fields(&["grows_coconut"])
            .branch(coconut_branch),
        Step::new("farm_details", "Farm details").fields(&["farm_area", "tree_count"]),
        Step::new("documents", "Documents").fields(&["aadhaar_number", "aadhaar_photo"]),
        Step::new("review", "Review & submit"),
    ];

    let gate = StepValidationGate::new()
        .require("personal", "full_name", FieldRule::NonEmpty)
        .require("personal", "mobile", FieldRule::Digits(10))
        .require("personal", "gender", FieldRule::OneOf(vec!["male", "female", "other"]))
        .require("personal", "profile_photo", FieldRule::MediaAttached)
        .require("location", "pincode", FieldRule::Digits(6))
        .require("coconut_farming", "grows_coconut", FieldRule::OneOf(YES_NO.to_vec()))
        .require("farm_details", "farm_area", FieldRule::PositiveNumber)
        .require("farm_details", "tree_count", FieldRule::PositiveNumber)
        .require("documents", "aadhaar_number", FieldRule::Digits(12))
        .require("documents", "aadhaar_photo", FieldRule::MediaAttached);

    Flow {
        kind: FlowKind::FarmerRegistration,
        steps,
        gate: require_geo(gate, "location"),
    }
}

// ============================================================================
// QUICK REGISTRATION
// ============================================================================

pub fn quick_registration() -> Flow {
    let steps = vec![
        Step::new("identity", "Who are you?").fields(&["full_name", "mobile"]),
        Step::new("location", "Location").fields(&geo_fields()),
        Step::new("review", "Review & submit"),
    ];

    let gate = StepValidationGate::new()
        .require("identity", "full_name", FieldRule::NonEmpty)
        .require("identity", "mobile", FieldRule::Digits(10));

    Flow {
        kind: FlowKind::QuickRegistration,
        steps,
        gate: require_geo(gate, "location"),
    }
}

// ============================================================================
// FARM / HARVEST
// ============================================================================

fn harvested_branch(fields: &FieldMap) -> StepId {
    if fields.is("harvested_before", "yes") {
        "last_harvest"
    } else {
        "sale_mode"
    }
}

fn sale_mode_branch(fields: &FieldMap) -> StepId {
    if fields.is("sale_mode", "weight") {
        "sale_by_weight"
    } else {
        "sale_by_count"
    }
}

fn to_review(_: &FieldMap) -> StepId {
    "review"
}

/// farm → harvested before? → last harvest (yes) → sale mode → by count | by weight → review
pub fn farm_harvest() -> Flow {
    let steps = vec![
        Step::new("farm", "Farm").fields(&["farm_name", "tree_count"]),
        Step::new("harvested", "Harvested before?")
            .fields(&["harvested_before"])
            .branch(harvested_branch),
        Step::new("last_harvest", "Last harvest").fields(&["last_harvest_date", "last_harvest_nuts"]),
        Step::new("sale_mode", "How do you sell?")
            .fields(&["sale_mode"])
            .branch(sale_mode_branch),
        Step::new("sale_by_count", "Price per nut")
            .fields(&["price_per_nut", "nuts_per_harvest"])
            .branch(to_review),
        Step::new("sale_by_weight", "Price per kg").fields(&["price_per_kg", "kg_per_harvest"]),
        Step::new("review", "Review & submit"),
    ];

    let gate = StepValidationGate::new()
        .require("farm", "farm_name", FieldRule::NonEmpty)
        .require("farm", "tree_count", FieldRule::PositiveNumber)
        .require("harvested", "harvested_before", FieldRule::OneOf(YES_NO.to_vec()))
        .require("last_harvest", "last_harvest_date", FieldRule::NonEmpty)
        .require("last_harvest", "last_harvest_nuts", FieldRule::PositiveNumber)
        .require("sale_mode", "sale_mode", FieldRule::OneOf(vec!["count", "weight"]))
        .require("sale_by_count", "price_per_nut", FieldRule::PositiveNumber)
        .check(
            "sale_by_count",
            FieldCheck::new("nuts_per_harvest", FieldRule::PositiveNumber).when("sale_mode", "count"),
        )
        .require("sale_by_weight", "price_per_kg", FieldRule::PositiveNumber)
        .check(
            "sale_by_weight",
            FieldCheck::new("kg_per_harvest", FieldRule::PositiveNumber).when("sale_mode", "weight"),
        );

    Flow {
        kind: FlowKind::FarmHarvest,
        steps,
        gate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::FieldValue;
    use crate::media::MediaHandle;
    use crate::wizard::{Position, Transition};

    fn geo(id: &str) -> FieldValue {
        FieldValue::Geo {
            id: id.to_string(),
            label: format!("place {}", id),
        }
    }

    fn photo(name: &str) -> FieldValue {
        FieldValue::Media(MediaHandle::from_path(name))
    }

    #[test]
    fn test_every_branch_target_exists() {
        for kind in [FlowKind::FarmerRegistration, FlowKind::QuickRegistration, FlowKind::FarmHarvest] {
            let flow = kind.build();
            let ids: Vec<StepId> = flow.steps.iter().map(|s| s.id).collect();
            let mut answers = FieldMap::new();
            for (field, value) in [("grows_coconut", "no"), ("harvested_before", "no"), ("sale_mode", "weight")] {
                answers.set_choice(field, value);
            }
            for step in &flow.steps {
                if let Some(branch) = step.branch {
                    assert!(ids.contains(&branch(&answers)), "{} in {}", step.id, kind.as_str());
                    assert!(ids.contains(&branch(&FieldMap::new())));
                }
            }
        }
    }

    #[test]
    fn test_flow_names_parse() {
        assert_eq!("quick".parse::<FlowKind>(), Ok(FlowKind::QuickRegistration));
        assert_eq!("farm-harvest".parse::<FlowKind>(), Ok(FlowKind::FarmHarvest));
        assert!("aggregator".parse::<FlowKind>().is_err());
    }

    #[test]
    fn test_location_step_detected() {
        assert_eq!(farmer_registration().location_steps(), vec!["location"]);
        assert!(farm_harvest().location_steps().is_empty());
    }

    #[test]
    fn test_farmer_registration_skips_farm_details() {
        let mut wizard = farmer_registration().into_controller().unwrap();
        {
            let fields = wizard.fields_mut();
            fields.set_text("full_name", "Lakshmi");
            fields.set_text("mobile", "9847012345");
            fields.set_choice("gender", "female");
            fields.set("profile_photo", photo("me.jpg"));
        }
        assert_eq!(wizard.go_next(), Transition::Moved { from: "personal", to: "location" });

        // Pincode alone is not enough
        wizard.fields_mut().set_text("pincode", "680001");
        assert!(matches!(wizard.go_next(), Transition::Blocked(e) if e.len() == 5));

        for level in GeoLevel::ALL {
            wizard.set_field(level.field_id(), geo("1"));
        }
        wizard.go_next();
        wizard.fields_mut().set_choice("grows_coconut", "no");
        assert_eq!(wizard.go_next(), Transition::Moved { from: "coconut_farming", to: "documents" });

        wizard.fields_mut().set_text("aadhaar_number", "123412341234");
        wizard.set_field("aadhaar_photo", photo("aadhaar.png"));
        wizard.go_next();
        assert_eq!(wizard.session().position(), Position::Step("review"));
        assert_eq!(wizard.go_next(), Transition::Completing);
    }

    #[test]
    fn test_switching_coconut_answer_drops_farm_details() {
        let mut wizard = farmer_registration().into_controller().unwrap();
        {
            let fields = wizard.fields_mut();
            fields.set_text("full_name", "Lakshmi");
            fields.set_text("mobile", "9847012345");
            fields.set_choice("gender", "female");
            fields.set("profile_photo", photo("me.jpg"));
            fields.set_text("pincode", "680684");
        }
        for level in GeoLevel::ALL {
            wizard.set_field(level.field_id(), geo("1"));
        }
        wizard.go_next();
        wizard.go_next();

        wizard.fields_mut().set_choice("grows_coconut", "yes");
        assert_eq!(wizard.go_next(), Transition::Moved { from: "coconut_farming", to: "farm_details" });
        wizard.fields_mut().set_text("farm_area", "2");
        wizard.fields_mut().set_text("tree_count", "120");
        assert_eq!(wizard.go_back(), Transition::Moved { from: "farm_details", to: "coconut_farming" });

        wizard.fields_mut().set_choice("grows_coconut", "no");
        assert_eq!(wizard.go_next(), Transition::Moved { from: "coconut_farming", to: "documents" });
        wizard.fields_mut().set_text("aadhaar_number", "123412341234");
        wizard.set_field("aadhaar_photo", photo("aadhaar.png"));
        wizard.go_next();
        assert_eq!(wizard.go_next(), Transition::Completing);

        let submitted = wizard.submission_fields();
        assert!(submitted.get("tree_count").is_none());
        assert!(submitted.get("farm_area").is_none());
        assert!(submitted.is("grows_coconut", "no"));
        assert_eq!(submitted.text("pincode").as_deref(), Some("680684"));
        assert_eq!(submitted.media().count(), 2);
    }

    #[test]
    fn test_switching_sale_mode_submits_one_price() {
        let mut wizard = farm_harvest().into_controller().unwrap();
        wizard.fields_mut().set_text("farm_name", "North grove");
        wizard.fields_mut().set_text("tree_count", "40");
        wizard.go_next();
        wizard.fields_mut().set_choice("harvested_before", "no");
        wizard.go_next();

        wizard.fields_mut().set_choice("sale_mode", "count");
        wizard.go_next();
        wizard.fields_mut().set_text("price_per_nut", "14");
        wizard.go_back();

        wizard.fields_mut().set_choice("sale_mode", "weight");
        assert_eq!(wizard.go_next(), Transition::Moved { from: "sale_mode", to: "sale_by_weight" });
        wizard.fields_mut().set_text("price_per_kg", "38.5");
        wizard.fields_mut().set_text("kg_per_harvest", "400");
        wizard.go_next();

        let submitted = wizard.submission_fields();
        assert!(submitted.get("price_per_nut").is_none());
        assert_eq!(submitted.text("price_per_kg").as_deref(), Some("38.5"));
    }

    #[test]
    fn test_harvest_flow_weight_path() {
        let mut wizard = farm_harvest().into_controller().unwrap();
        wizard.fields_mut().set_text("farm_name", "South grove");
        wizard.set_field("tree_count", FieldValue::Number(120.0));
        wizard.go_next();

        wizard.fields_mut().set_choice("harvested_before", "yes");
        assert_eq!(wizard.go_next(), Transition::Moved { from: "harvested", to: "last_harvest" });
        wizard.fields_mut().set_text("last_harvest_date", "2026-08-14");
        wizard.fields_mut().set_text("last_harvest_nuts", "900");
        wizard.go_next();

        wizard.fields_mut().set_choice("sale_mode", "weight");
        assert_eq!(wizard.go_next(), Transition::Moved { from: "sale_mode", to: "sale_by_weight" });
        wizard.fields_mut().set_text("price_per_kg", "38.5");
        assert!(!wizard.can_go_next());
        wizard.fields_mut().set_text("kg_per_harvest", "400");
        assert_eq!(wizard.go_next(), Transition::Moved { from: "sale_by_weight", to: "review" });

        assert_eq!(
            wizard.session().visited(),
            &["farm", "harvested", "last_harvest", "sale_mode", "sale_by_weight", "review"]
        );
    }

    #[test]
    fn test_sale_by_count_goes_straight_to_review() {
        let mut wizard = farm_harvest().into_controller().unwrap();
        wizard.fields_mut().set_text("farm_name", "North grove");
        wizard.fields_mut().set_text("tree_count", "40");
        wizard.go_next();
        wizard.fields_mut().set_choice("harvested_before", "no");
        assert_eq!(wizard.go_next(), Transition::Moved { from: "harvested", to: "sale_mode" });
        wizard.fields_mut().set_choice("sale_mode", "count");
        wizard.go_next();
        wizard.fields_mut().set_text("price_per_nut", "14");
        wizard.fields_mut().set_text("nuts_per_harvest", "2000");
        assert_eq!(wizard.go_next(), Transition::Moved { from: "sale_by_count", to: "review" });
    }
}
