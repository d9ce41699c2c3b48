// 🧭 Wizard Controller - ordered, gated, branching steps
//
// States: one per step, `Completing` while the terminal confirm is running,
// and `Completed`. Forward moves need the gate; backward moves follow the
// path actually visited, so arriving through a branch returns through it.

use crate::error::{Result, WizardError};
use crate::form::{FieldMap, FieldValue};
use crate::validation::{StepId, StepValidationGate, ValidationError};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Picks the successor of a step from the current answers
pub type BranchFn = fn(&FieldMap) -> StepId;

// ============================================================================
// STEP
// ============================================================================

#[derive(Debug, Clone)]
pub struct Step {
    pub id: StepId,
    pub title: &'static str,
    /// Fields this step owns, in display order
    pub fields: Vec<&'static str>,
    pub branch: Option<BranchFn>,
}

impl Step {
    pub fn new(id: StepId, title: &'static str) -> Self {
        Step {
            id,
            title,
            fields: Vec::new(),
            branch: None,
        }
    }

    pub fn fields(mut self, fields: &[&'static str]) -> Self {
        self.fields = fields.to_vec();
        self
    }

    pub fn branch(mut self, branch: BranchFn) -> Self {
        self.branch = Some(branch);
        self
    }
}

// ============================================================================
// POSITION & TRANSITIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Step(StepId),
    /// Terminal confirm accepted; completion sequence running
    Completing(StepId),
    Completed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Gate failed; nothing changed
    Blocked(Vec<ValidationError>),
    Moved { from: StepId, to: StepId },
    /// Terminal confirm accepted: run the completion sequence now
    Completing,
    /// Completion already ran for this session
    AlreadyCompleted,
    /// Request not applicable in the current position
    Ignored,
}

// ============================================================================
// SESSION
// ============================================================================

/// Everything one mounted screen knows about its wizard
#[derive(Debug, Clone)]
pub struct WizardSession {
    steps: Vec<Step>,
    position: Position,
    fields: FieldMap,
    /// Step id → has ever passed validation
    passed: HashMap<StepId, bool>,
    /// Steps visited to reach the current one, current last
    visited: Vec<StepId>,
    completed_once: bool,
}

impl WizardSession {
    pub fn new(steps: Vec<Step>) -> Result<Self> {
        let first = steps
            .first()
            .map(|s| s.id)
            .ok_or_else(|| WizardError::Validation("wizard has no steps".to_string()))?;

        Ok(WizardSession {
            steps,
            position: Position::Step(first),
            fields: FieldMap::new(),
            passed: HashMap::new(),
            visited: vec![first],
            completed_once: false,
        })
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut FieldMap {
        &mut self.fields
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn visited(&self) -> &[StepId] {
        &self.visited
    }

    /// Answers to submit: fields owned by a step off the visited path are left out
    ///
    /// Backing out of a branch keeps its answers for a return visit, but
    /// they never reach the backend. Fields no step owns pass through.
    pub fn submission_fields(&self) -> FieldMap {
        let mut fields = self.fields.clone();
        for step in self.steps.iter().filter(|s| !self.visited.contains(&s.id)) {
            for field in &step.fields {
                if !self.visited_owner(field) {
                    fields.remove(field);
                }
            }
        }
        fields
    }

    fn visited_owner(&self, field: &str) -> bool {
        self.visited
            .iter()
            .filter_map(|id| self.step(*id))
            .any(|s| s.fields.iter().any(|f| *f == field))
    }

    pub fn has_passed(&self, step: StepId) -> bool {
        self.passed.get(step).copied().unwrap_or(false)
    }

    pub fn is_completed(&self) -> bool {
        self.position == Position::Completed
    }

    pub fn step(&self, id: StepId) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    fn index_of(&self, id: StepId) -> Option<usize> {
        self.steps.iter().position(|s| s.id == id)
    }

    /// Successor chosen by the branch fn, else the next step in sequence
    fn successor(&self, id: StepId) -> Option<StepId> {
        let index = self.index_of(id)?;
        let step = &self.steps[index];
        match step.branch {
            Some(branch) => Some(branch(&self.fields)),
            None => self.steps.get(index + 1).map(|s| s.id),
        }
    }
}

// ============================================================================
// CONTROLLER
// ============================================================================

pub struct WizardController {
    session: WizardSession,
    gate: StepValidationGate,
}

impl WizardController {
    pub fn new(steps: Vec<Step>, gate: StepValidationGate) -> Result<Self> {
        Ok(WizardController {
            session: WizardSession::new(steps)?,
            gate,
        })
    }

    pub fn session(&self) -> &WizardSession {
        &self.session
    }

    pub fn gate(&self) -> &StepValidationGate {
        &self.gate
    }

    pub fn fields(&self) -> &FieldMap {
        &self.session.fields
    }

    pub fn fields_mut(&mut self) -> &mut FieldMap {
        &mut self.session.fields
    }

    pub fn submission_fields(&self) -> FieldMap {
        self.session.submission_fields()
    }

    pub fn set_field(&mut self, field: &str, value: FieldValue) {
        self.session.fields.set(field, value);
    }

    /// Step currently shown (the terminal step while completing)
    pub fn current_step(&self) -> Option<&Step> {
        match self.session.position {
            Position::Step(id) | Position::Completing(id) => self.session.step(id),
            Position::Completed => None,
        }
    }

    /// Live enable/disable for the "Next" control
    pub fn can_go_next(&self) -> bool {
        match self.session.position {
            Position::Step(id) => self.gate.is_valid(id, &self.session.fields),
            _ => false,
        }
    }

    pub fn validate_current(&self) -> Vec<ValidationError> {
        match self.session.position {
            Position::Step(id) => self.gate.validate(id, &self.session.fields).err().unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    pub fn go_next(&mut self) -> Transition {
        let current = match self.session.position {
            Position::Step(id) => id,
            Position::Completing(_) => return Transition::Ignored,
            Position::Completed => return Transition::AlreadyCompleted,
        };

        if let Err(errors) = self.gate.validate(current, &self.session.fields) {
            debug!(step = current, errors = errors.len(), "next blocked by validation");
            return Transition::Blocked(errors);
        }
        self.session.passed.insert(current, true);

        match self.session.successor(current) {
            Some(next) if self.session.index_of(next).is_some() => {
                self.session.visited.push(next);
                self.session.position = Position::Step(next);
                debug!(from = current, to = next, "wizard moved");
                Transition::Moved { from: current, to: next }
            }
            Some(unknown) => {
                warn!(step = current, target = unknown, "branch points at an unknown step");
                Transition::Ignored
            }
            None if self.session.completed_once => Transition::AlreadyCompleted,
            None => {
                self.session.position = Position::Completing(current);
                info!(step = current, "terminal step confirmed");
                Transition::Completing
            }
        }
    }

    /// Close out the completion sequence started by `Transition::Completing`
    ///
    /// On failure the session returns to the terminal step for another try.
    pub fn finish_completion(&mut self, succeeded: bool) {
        let Position::Completing(terminal) = self.session.position else {
            return;
        };

        if succeeded {
            self.session.completed_once = true;
            self.session.position = Position::Completed;
            info!("wizard completed");
        } else {
            self.session.position = Position::Step(terminal);
        }
    }

    pub fn go_back(&mut self) -> Transition {
        match self.session.position {
            Position::Completing(_) => Transition::Ignored,
            Position::Completed => {
                // Reopen the terminal step; completion will not fire again
                let last = self.session.visited.last().copied();
                match last {
                    Some(step) => {
                        self.session.position = Position::Step(step);
                        Transition::Moved { from: step, to: step }
                    }
                    None => Transition::Ignored,
                }
            }
            Position::Step(current) => {
                if self.session.visited.len() < 2 {
                    return Transition::Ignored;
                }
                self.session.visited.pop();
                let previous = self.session.visited[self.session.visited.len() - 1];
                self.session.position = Position::Step(previous);
                Transition::Moved { from: current, to: previous }
            }
        }
    }

    /// Jump allowed only to a visited step whose predecessors all still pass
    pub fn can_jump_to(&self, target: StepId) -> bool {
        if !matches!(self.session.position, Position::Step(_)) {
            return false;
        }
        let Some(at) = self.session.visited.iter().position(|s| *s == target) else {
            return false;
        };

        self.session.visited[..at]
            .iter()
            .all(|step| self.gate.is_valid(*step, &self.session.fields))
    }

    /// Silently ignored when `can_jump_to` is false
    pub fn jump_to(&mut self, target: StepId) -> Transition {
        let Position::Step(current) = self.session.position else {
            return Transition::Ignored;
        };
        if !self.can_jump_to(target) {
            debug!(target, "jump rejected");
            return Transition::Ignored;
        }

        if let Some(at) = self.session.visited.iter().position(|s| *s == target) {
            self.session.visited.truncate(at + 1);
        }
        self.session.position = Position::Step(target);
        Transition::Moved { from: current, to: target }
    }
}
