//! Daily agenda planning model.
//!
//! # Responsibility
//! - Describe projects, goals and free-form targets chosen for a day.
//! - Own the day-score rule derived from per-target scores.
//!
//! # Invariants
//! - An agenda has exactly `AGENDA_SLOTS` slots, addressed `1..=3`.
//! - A slot score is one of `0`, `0.5`, `1`, or unset.
//! - `day_score` = sum of set scores / number of slots with a target;
//!   `None` when no slot has a target.

use crate::model::record::ModelValidationError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const AGENDA_SLOTS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub project_id: i64,
    pub display_string: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goal {
    pub goal_id: i64,
    pub display_string: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub target_id: String,
    pub target_name: String,
    pub goal_id: Option<i64>,
}

/// Self-assessed outcome for one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetScore {
    Missed,
    Partial,
    Hit,
}

impl TargetScore {
    pub fn value(self) -> f64 {
        match self {
            Self::Missed => 0.0,
            Self::Partial => 0.5,
            Self::Hit => 1.0,
        }
    }

    pub fn from_value(value: f64) -> Result<Self, ModelValidationError> {
        if value == 0.0 {
            Ok(Self::Missed)
        } else if value == 0.5 {
            Ok(Self::Partial)
        } else if value == 1.0 {
            Ok(Self::Hit)
        } else {
            Err(ModelValidationError::InvalidScore(value))
        }
    }
}

/// One of the three planned targets for a day.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgendaSlot {
    pub project_id: Option<i64>,
    pub goal_id: Option<i64>,
    pub target_id: Option<String>,
    pub score: Option<TargetScore>,
}

impl AgendaSlot {
    pub fn has_target(&self) -> bool {
        self.target_id.is_some()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyAgenda {
    pub date: NaiveDate,
    pub slots: [AgendaSlot; AGENDA_SLOTS],
    pub day_score: Option<f64>,
    pub notes: Option<String>,
}

impl DailyAgenda {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            slots: Default::default(),
            day_score: None,
            notes: None,
        }
    }

    /// Returns the slot for a 1-based slot number.
    pub fn slot(&self, slot_number: usize) -> Result<&AgendaSlot, ModelValidationError> {
        let index = slot_index(slot_number)?;
        Ok(&self.slots[index])
    }

    pub fn slot_mut(&mut self, slot_number: usize) -> Result<&mut AgendaSlot, ModelValidationError> {
        let index = slot_index(slot_number)?;
        Ok(&mut self.slots[index])
    }

    /// Sets or clears one slot score and recomputes `day_score`.
    pub fn set_score(
        &mut self,
        slot_number: usize,
        score: Option<TargetScore>,
    ) -> Result<Option<f64>, ModelValidationError> {
        self.slot_mut(slot_number)?.score = score;
        self.recompute_day_score();
        Ok(self.day_score)
    }

    pub fn compute_day_score(&self) -> Option<f64> {
        let targeted: Vec<&AgendaSlot> = self.slots.iter().filter(|slot| slot.has_target()).collect();
        if targeted.is_empty() {
            return None;
        }
        let total: f64 = targeted
            .iter()
            .filter_map(|slot| slot.score.map(TargetScore::value))
            .sum();
        Some(total / targeted.len() as f64)
    }

    pub fn recompute_day_score(&mut self) {
        self.day_score = self.compute_day_score();
    }
}

fn slot_index(slot_number: usize) -> Result<usize, ModelValidationError> {
    if (1..=AGENDA_SLOTS).contains(&slot_number) {
        Ok(slot_number - 1)
    } else {
        Err(ModelValidationError::InvalidSlot(slot_number))
    }
}

#[cfg(test)]
mod tests {
    use super::{AgendaSlot, DailyAgenda, TargetScore};
    use crate::model::record::ModelValidationError;
    use chrono::NaiveDate;

    fn agenda_with_targets(count: usize) -> DailyAgenda {
        let mut agenda = DailyAgenda::new(NaiveDate::from_ymd_opt(2025, 11, 2).unwrap());
        for (index, slot) in agenda.slots.iter_mut().take(count).enumerate() {
            *slot = AgendaSlot {
                project_id: Some(1),
                goal_id: None,
                target_id: Some(format!("target-{index}")),
                score: None,
            };
        }
        agenda
    }

    #[test]
    fn day_score_is_none_without_targets() {
        let mut agenda = agenda_with_targets(0);
        assert_eq!(agenda.set_score(1, Some(TargetScore::Hit)).unwrap(), None);
    }

    #[test]
    fn unscored_targets_count_toward_denominator() {
        let mut agenda = agenda_with_targets(3);
        agenda.set_score(1, Some(TargetScore::Hit)).unwrap();
        let score = agenda.set_score(2, Some(TargetScore::Partial)).unwrap();
        assert_eq!(score, Some(0.5));
    }

    #[test]
    fn score_on_empty_slot_is_ignored_by_average() {
        let mut agenda = agenda_with_targets(2);
        agenda.set_score(3, Some(TargetScore::Hit)).unwrap();
        let score = agenda.set_score(1, Some(TargetScore::Hit)).unwrap();
        assert_eq!(score, Some(0.5));
    }

    #[test]
    fn out_of_range_slot_is_rejected() {
        let mut agenda = agenda_with_targets(1);
        assert_eq!(
            agenda.set_score(4, None).unwrap_err(),
            ModelValidationError::InvalidSlot(4)
        );
    }

    #[test]
    fn score_values_are_restricted() {
        assert_eq!(TargetScore::from_value(0.5).unwrap(), TargetScore::Partial);
        assert!(TargetScore::from_value(0.75).is_err());
    }
}
