// 🔗 Dependent Selector Chain - five cascading pickers with last-selection-wins
//
// Selecting a level synchronously clears every level below it and bumps each
// of their request epochs. The child fetch is tagged with the child's new
// epoch; a response whose tag no longer matches is discarded. That tag check
// is the only race protection: requests are never truly aborted.

use crate::error::{Result, WizardError};
use crate::form::{FieldMap, FieldValue};
use crate::geo::{GeoHierarchyResolver, GeoLevel, GeoOption, Language};
use crate::location::{Coordinates, DeviceLocation};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// Form field the village pincode and geocoded postal code prefill
pub const POSTAL_CODE_FIELD: &str = "pincode";

// ============================================================================
// LOAD STATE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    /// Nothing requested yet (or the parent is unset)
    Idle,
    /// A fetch tagged with the current epoch is in flight
    Loading,
    Loaded,
    /// Last fetch failed; options are empty
    Error(String),
}

impl LoadState {
    pub fn is_loading(&self) -> bool {
        matches!(self, LoadState::Loading)
    }
}

// ============================================================================
// PER-LEVEL STATE
// ============================================================================

#[derive(Debug, Clone)]
pub struct LevelState {
    pub level: GeoLevel,
    pub selected_id: Option<String>,
    pub selected_label: Option<String>,
    pub options: Vec<GeoOption>,
    pub load: LoadState,
    pub request_epoch: u64,
}

impl LevelState {
    fn new(level: GeoLevel) -> Self {
        LevelState {
            level,
            selected_id: None,
            selected_label: None,
            options: Vec::new(),
            load: LoadState::Idle,
            request_epoch: 0,
        }
    }

    /// Drop selection and options, and supersede any in-flight fetch
    fn invalidate(&mut self) {
        self.selected_id = None;
        self.selected_label = None;
        self.options.clear();
        self.load = LoadState::Idle;
        self.request_epoch += 1;
    }

    /// The full option record behind the current selection
    pub fn selected_option(&self) -> Option<&GeoOption> {
        let id = self.selected_id.as_deref()?;
        self.options.iter().find(|o| o.id == id)
    }

    pub fn find_option(&self, id: &str) -> Option<&GeoOption> {
        self.options.iter().find(|o| o.id == id)
    }
}

// ============================================================================
// FETCH TICKET
// ============================================================================

/// A fetch the chain wants issued, tagged with the epoch it was issued under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub level: GeoLevel,
    pub parent_id: Option<String>,
    pub epoch: u64,
}

/// What happened to a fetch response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Options replaced
    Applied { level: GeoLevel, count: usize },
    /// A newer request superseded this one; response dropped
    Stale { level: GeoLevel, epoch: u64 },
    /// Fetch failed; level left empty and not loading
    Failed { level: GeoLevel, message: String },
    /// Selection was on the last level, nothing to fetch
    NoChild,
}

// ============================================================================
// SELECTION STATE
// ============================================================================

/// Plain state machine; every mutation is synchronous
#[derive(Debug, Clone)]
pub struct SelectionState {
    levels: Vec<LevelState>,
    pub language: Language,
}

impl Default for SelectionState {
    fn default() -> Self {
        Self::new(Language::default())
    }
}

impl SelectionState {
    pub fn new(language: Language) -> Self {
        SelectionState {
            levels: GeoLevel::ALL.iter().map(|l| LevelState::new(*l)).collect(),
            language,
        }
    }

    pub fn level(&self, level: GeoLevel) -> &LevelState {
        &self.levels[level.index()]
    }

    fn level_mut(&mut self, level: GeoLevel) -> &mut LevelState {
        &mut self.levels[level.index()]
    }

    pub fn levels(&self) -> &[LevelState] {
        &self.levels
    }

    /// Start (re)loading the root level
    pub fn begin_root_load(&mut self) -> FetchTicket {
        let root = self.level_mut(GeoLevel::State);
        root.request_epoch += 1;
        root.load = LoadState::Loading;

        FetchTicket {
            level: GeoLevel::State,
            parent_id: None,
            epoch: root.request_epoch,
        }
    }

    /// Steps 1-3 of a selection: set, invalidate descendants, tag the child fetch
    pub fn begin_select(&mut self, level: GeoLevel, option_id: &str) -> Result<Option<FetchTicket>> {
        let language = self.language;
        let state = self.level_mut(level);

        let label = match state.find_option(option_id) {
            Some(option) => option.label(language).to_string(),
            None => {
                return Err(WizardError::Validation(format!(
                    "{} option {} is not in the current list",
                    level, option_id
                )))
            }
        };

        state.selected_id = Some(option_id.to_string());
        state.selected_label = Some(label);

        for descendant in level.descendants() {
            self.level_mut(*descendant).invalidate();
        }

        let Some(child) = level.child() else {
            return Ok(None);
        };

        let child_state = self.level_mut(child);
        child_state.load = LoadState::Loading;

        debug!(level = %level, option = option_id, child_epoch = child_state.request_epoch, "geo selection");

        Ok(Some(FetchTicket {
            level: child,
            parent_id: Some(option_id.to_string()),
            epoch: child_state.request_epoch,
        }))
    }

    /// Re-issue the fetch for one level from its parent's current selection
    ///
    /// Returns `None` when the parent has no selection to fetch under.
    pub fn begin_refresh(&mut self, level: GeoLevel) -> Option<FetchTicket> {
        let parent_id = match level.parent() {
            None => return Some(self.begin_root_load()),
            Some(parent) => self.level(parent).selected_id.clone()?,
        };

        for descendant in level.descendants() {
            self.level_mut(*descendant).invalidate();
        }

        let state = self.level_mut(level);
        state.invalidate();
        state.load = LoadState::Loading;

        Some(FetchTicket {
            level,
            parent_id: Some(parent_id),
            epoch: state.request_epoch,
        })
    }

    /// Step 4: apply a response only if its epoch is still live
    pub fn complete_fetch(&mut self, ticket: &FetchTicket, result: Result<Vec<GeoOption>>) -> FetchOutcome {
        let state = self.level_mut(ticket.level);

        if state.request_epoch != ticket.epoch {
            debug!(
                level = %ticket.level,
                epoch = ticket.epoch,
                live = state.request_epoch,
                "discarding stale geo response"
            );
            return FetchOutcome::Stale {
                level: ticket.level,
                epoch: ticket.epoch,
            };
        }

        match result {
            Ok(options) => {
                let count = options.len();
                state.options = options;
                state.load = LoadState::Loaded;

                // A refreshed list may no longer contain the old selection
                let selection_gone = state
                    .selected_id
                    .as_deref()
                    .map(|id| state.find_option(id).is_none())
                    .unwrap_or(false);
                if selection_gone {
                    state.selected_id = None;
                    state.selected_label = None;
                    for descendant in ticket.level.descendants() {
                        self.level_mut(*descendant).invalidate();
                    }
                }

                FetchOutcome::Applied {
                    level: ticket.level,
                    count,
                }
            }
            Err(WizardError::Cancelled) => {
                state.load = LoadState::Idle;
                FetchOutcome::Stale {
                    level: ticket.level,
                    epoch: ticket.epoch,
                }
            }
            Err(e) => {
                warn!(level = %ticket.level, error = %e, "geo fetch failed");
                state.options.clear();
                state.load = LoadState::Error(e.to_string());
                FetchOutcome::Failed {
                    level: ticket.level,
                    message: e.to_string(),
                }
            }
        }
    }

    /// Supersede everything in flight (screen torn down)
    pub fn teardown(&mut self) {
        for state in &mut self.levels {
            state.request_epoch += 1;
            if state.load.is_loading() {
                state.load = LoadState::Idle;
            }
        }
    }

    /// Postal code carried by the selected village record, if the backend sent one
    pub fn selected_postal_code(&self) -> Option<String> {
        let village = self.level(GeoLevel::Village);
        let id = village.selected_id.as_deref()?;
        village
            .options
            .iter()
            .find(|o| o.id == id)?
            .raw_str(POSTAL_CODE_FIELD)
            .map(str::to_string)
    }

    /// Mirror selections into form fields; unselected levels are removed
    pub fn write_to_fields(&self, fields: &mut FieldMap) {
        for state in &self.levels {
            let field = state.level.field_id();
            match (&state.selected_id, &state.selected_label) {
                (Some(id), label) => fields.set(
                    field,
                    FieldValue::Geo {
                        id: id.clone(),
                        label: label.clone().unwrap_or_default(),
                    },
                ),
                (None, _) => {
                    fields.remove(field);
                }
            }
        }
    }
}

// ============================================================================
// CHAIN (async driver)
// ============================================================================

/// What coordinate seeding managed to fill in
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeedReport {
    pub postal_code: Option<String>,
    pub matched: Vec<GeoLevel>,
}

pub struct DependentSelectorChain {
    resolver: Arc<dyn GeoHierarchyResolver>,
    state: Mutex<SelectionState>,
}

impl DependentSelectorChain {
    pub fn new(resolver: Arc<dyn GeoHierarchyResolver>, language: Language) -> Self {
        DependentSelectorChain {
            resolver,
            state: Mutex::new(SelectionState::new(language)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SelectionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Copy of the current state for rendering
    pub fn snapshot(&self) -> SelectionState {
        self.lock().clone()
    }

    pub fn options(&self, level: GeoLevel) -> Vec<GeoOption> {
        self.lock().level(level).options.clone()
    }

    pub fn selected_id(&self, level: GeoLevel) -> Option<String> {
        self.lock().level(level).selected_id.clone()
    }

    pub fn begin_root_load(&self) -> FetchTicket {
        self.lock().begin_root_load()
    }

    pub fn begin_select(&self, level: GeoLevel, option_id: &str) -> Result<Option<FetchTicket>> {
        self.lock().begin_select(level, option_id)
    }

    pub fn complete_fetch(&self, ticket: &FetchTicket, result: Result<Vec<GeoOption>>) -> FetchOutcome {
        self.lock().complete_fetch(ticket, result)
    }

    /// Resolve a ticket and apply the result; stale results are discarded
    pub async fn fetch(&self, ticket: FetchTicket) -> FetchOutcome {
        let result = self
            .resolver
            .resolve(ticket.level, ticket.parent_id.as_deref())
            .await;
        self.complete_fetch(&ticket, result)
    }

    /// Fetch the state list
    pub async fn load_root(&self) -> FetchOutcome {
        let ticket = self.begin_root_load();
        self.fetch(ticket).await
    }

    /// Select an option and resolve the level below it
    pub async fn select_level(&self, level: GeoLevel, option_id: &str) -> Result<FetchOutcome> {
        let ticket = self.begin_select(level, option_id)?;
        match ticket {
            Some(ticket) => Ok(self.fetch(ticket).await),
            None => Ok(FetchOutcome::NoChild),
        }
    }

    pub fn begin_refresh(&self, level: GeoLevel) -> Option<FetchTicket> {
        self.lock().begin_refresh(level)
    }

    /// Retry a level after a failed fetch
    pub async fn refresh(&self, level: GeoLevel) -> Option<FetchOutcome> {
        let ticket = self.begin_refresh(level)?;
        Some(self.fetch(ticket).await)
    }

    /// Cancel in-flight fetches and supersede their epochs
    pub fn teardown(&self) {
        self.lock().teardown();
        self.resolver.cancel_pending();
    }

    pub fn write_to_fields(&self, fields: &mut FieldMap) {
        self.lock().write_to_fields(fields);
    }

    /// Fill the postal code from the selected village, else `fallback`
    ///
    /// A value already in the field is never overwritten. Returns whether
    /// anything was written.
    pub fn prefill_postal_code(&self, fields: &mut FieldMap, fallback: Option<&str>) -> bool {
        if fields.get(POSTAL_CODE_FIELD).is_some_and(|v| !v.is_blank()) {
            return false;
        }
        let code = self
            .lock()
            .selected_postal_code()
            .or_else(|| fallback.map(str::to_string));

        match code {
            Some(code) => {
                fields.set_text(POSTAL_CODE_FIELD, code);
                true
            }
            None => false,
        }
    }

    /// Get a fix and seed from it; never fails
    pub async fn seed_from_device(&self, location: &dyn DeviceLocation) -> SeedReport {
        match location.current_position().await {
            Ok(coords) => self.seed_from_coordinates(location, coords).await,
            Err(e) => {
                warn!(error = %e, "location unavailable, leaving geo fields for manual entry");
                SeedReport::default()
            }
        }
    }

    /// Best-effort prefill of state and district from a coordinate fix
    ///
    /// Geocoding or matching failures leave the levels unset.
    pub async fn seed_from_coordinates(&self, location: &dyn DeviceLocation, coords: Coordinates) -> SeedReport {
        let place = match location.reverse_geocode(coords).await {
            Ok(place) => place,
            Err(e) => {
                warn!(error = %e, "reverse geocoding failed");
                return SeedReport::default();
            }
        };

        let mut report = SeedReport {
            postal_code: place.postal_code.clone(),
            matched: Vec::new(),
        };

        if self.options(GeoLevel::State).is_empty() {
            self.load_root().await;
        }

        let Some(state_id) = self.match_and_select(GeoLevel::State, place.region.as_deref()).await else {
            return report;
        };
        report.matched.push(GeoLevel::State);

        // The user may have picked another state while districts loaded
        if self.selected_id(GeoLevel::State).as_deref() != Some(state_id.as_str()) {
            return report;
        }

        if self.match_and_select(GeoLevel::District, place.subregion.as_deref()).await.is_some() {
            report.matched.push(GeoLevel::District);
        }

        report
    }

    async fn match_and_select(&self, level: GeoLevel, name: Option<&str>) -> Option<String> {
        let name = name?;
        let option = self.options(level).into_iter().find(|o| o.fuzzy_matches(name));

        let Some(option) = option else {
            debug!(level = %level, name, "no geo match for geocoded name");
            return None;
        };

        match self.select_level(level, &option.id).await {
            Ok(_) => Some(option.id),
            Err(e) => {
                debug!(level = %level, error = %e, "seeded selection rejected");
                None
            }
        }
    }
}
