//! SRS stage model.
//!
//! A system is an ordered run of stages from "unlocking" (lesson pending)
//! through "starting" and "passing" to "burning" (terminal). A synthetic
//! locked stage at [`LOCKED_STAGE`] precedes them for subjects that have
//! not been unlocked yet.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use sea_orm::{DatabaseConnection, DbErr, EntityTrait, Set, TransactionTrait};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::api::types::ApiSrsSystem;
use crate::entity::srs_system::{ActiveModel, Entity as SrsSystemRow, Model};
use crate::entity::subject::LOCKED_STAGE;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SrsError {
    #[error("SRS system {id} has no stages")]
    Empty { id: i64 },

    #[error("SRS system {id}: stage positions must be contiguous and increasing (saw {previous} then {position})")]
    NonContiguous {
        id: i64,
        previous: i64,
        position: i64,
    },

    #[error("SRS system {id}: {role} position {position} is not a stage")]
    MissingRole {
        id: i64,
        role: &'static str,
        position: i64,
    },

    #[error("SRS system {id}: unlocking stage must have a zero interval")]
    UnlockingInterval { id: i64 },

    #[error("SRS system {id}: stage roles out of order")]
    RoleOrder { id: i64 },

    #[error("SRS system {id}: stored stages are unreadable: {message}")]
    Storage { id: i64, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SrsStage {
    pub position: i64,
    pub interval_secs: i64,
}

impl SrsStage {
    pub fn interval(&self) -> Duration {
        Duration::seconds(self.interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrsSystem {
    pub id: i64,
    pub name: String,
    pub unlocking: i64,
    pub starting: i64,
    pub passing: i64,
    pub burning: i64,
    /// Sorted by position, locked stage first.
    stages: Vec<SrsStage>,
}

impl SrsSystem {
    /// Build and validate a system from its real stages (without the locked stage).
    pub fn new(
        id: i64,
        name: impl Into<String>,
        unlocking: i64,
        starting: i64,
        passing: i64,
        burning: i64,
        mut stages: Vec<SrsStage>,
    ) -> Result<Self, SrsError> {
        stages.sort_by_key(|s| s.position);
        stages.retain(|s| s.position != LOCKED_STAGE);

        let first = stages.first().ok_or(SrsError::Empty { id })?;
        let mut previous = first.position;
        for stage in stages.iter().skip(1) {
            if stage.position != previous + 1 {
                return Err(SrsError::NonContiguous {
                    id,
                    previous,
                    position: stage.position,
                });
            }
            previous = stage.position;
        }

        for (role, position) in [
            ("unlocking", unlocking),
            ("starting", starting),
            ("passing", passing),
            ("burning", burning),
        ] {
            if !stages.iter().any(|s| s.position == position) {
                return Err(SrsError::MissingRole { id, role, position });
            }
        }
        if !(unlocking < starting && starting <= passing && passing <= burning) {
            return Err(SrsError::RoleOrder { id });
        }
        if stages
            .iter()
            .any(|s| s.position == unlocking && s.interval_secs != 0)
        {
            return Err(SrsError::UnlockingInterval { id });
        }

        stages.insert(
            0,
            SrsStage {
                position: LOCKED_STAGE,
                interval_secs: 0,
            },
        );

        Ok(Self {
            id,
            name: name.into(),
            unlocking,
            starting,
            passing,
            burning,
            stages,
        })
    }

    pub fn from_api(id: i64, api: &ApiSrsSystem) -> Result<Self, SrsError> {
        let stages = api
            .stages
            .iter()
            .map(|s| SrsStage {
                position: s.position,
                interval_secs: s.interval_secs(),
            })
            .collect();
        Self::new(
            id,
            api.name.clone(),
            api.unlocking_stage_position,
            api.starting_stage_position,
            api.passing_stage_position,
            api.burning_stage_position,
            stages,
        )
    }

    pub fn from_model(model: &Model) -> Result<Self, SrsError> {
        let stages: Vec<SrsStage> =
            serde_json::from_value(model.stages.clone()).map_err(|e| SrsError::Storage {
                id: model.id,
                message: e.to_string(),
            })?;
        Self::new(
            model.id,
            model.name.clone(),
            model.unlocking_position,
            model.starting_position,
            model.passing_position,
            model.burning_position,
            stages,
        )
    }

    pub fn to_active_model(&self) -> ActiveModel {
        let real: Vec<&SrsStage> = self
            .stages
            .iter()
            .filter(|s| s.position != LOCKED_STAGE)
            .collect();
        ActiveModel {
            id: Set(self.id),
            name: Set(self.name.clone()),
            unlocking_position: Set(self.unlocking),
            starting_position: Set(self.starting),
            passing_position: Set(self.passing),
            burning_position: Set(self.burning),
            stages: Set(serde_json::to_value(real).unwrap_or_default()),
        }
    }

    pub fn stages(&self) -> &[SrsStage] {
        &self.stages
    }

    // ─── Predicates ─────────────────────────────────────────────────────────

    pub fn is_locked(&self, position: i64) -> bool {
        position == LOCKED_STAGE
    }

    pub fn is_initial(&self, position: i64) -> bool {
        position == self.unlocking
    }

    pub fn is_completed(&self, position: i64) -> bool {
        position == self.burning
    }

    pub fn is_passed(&self, position: i64) -> bool {
        position >= self.passing
    }

    /// In the review cycle: past the lesson, not burned.
    pub fn is_started(&self, position: i64) -> bool {
        position >= self.starting && position < self.burning
    }

    pub fn initial_stage(&self) -> i64 {
        self.unlocking
    }

    pub fn first_started_stage(&self) -> i64 {
        self.starting
    }

    pub fn completed_stage(&self) -> i64 {
        self.burning
    }

    /// Interval attached to `position`, zero for unknown positions.
    pub fn interval(&self, position: i64) -> Duration {
        self.stages
            .iter()
            .find(|s| s.position == position)
            .map(SrsStage::interval)
            .unwrap_or_else(Duration::zero)
    }

    // ─── Transitions ────────────────────────────────────────────────────────

    fn index_at_or_below(&self, position: i64) -> usize {
        self.stages
            .iter()
            .rposition(|s| s.position <= position)
            .unwrap_or(0)
    }

    fn index_of(&self, position: i64) -> usize {
        self.index_at_or_below(position)
    }

    /// Stage reached after answering with `incorrect` wrong answers in total.
    ///
    /// Zero incorrect answers advance one stage, capped at burning. Otherwise
    /// the item drops `(incorrect + 1) / 2` stages, twice that from a passed
    /// stage, never below starting once started and never below unlocking
    /// before that. Stages at or past burning are terminal and come back
    /// unchanged.
    pub fn next_stage(&self, current: i64, incorrect: u32) -> i64 {
        if current >= self.burning {
            return current;
        }
        let index = self.index_at_or_below(current) as i64;
        let penalty = i64::from(incorrect.saturating_add(1) / 2);

        let target = if incorrect == 0 {
            index + 1
        } else if self.is_passed(current) {
            index - 2 * penalty
        } else {
            index - penalty
        };

        let floor_position = if current >= self.starting {
            self.starting
        } else {
            self.unlocking
        };
        let floor = self.index_of(floor_position) as i64;
        let ceiling = self.index_of(self.burning) as i64;

        self.stages[target.clamp(floor, ceiling) as usize].position
    }

    /// When an item answered at `answered_at` becomes due again.
    ///
    /// `None` when the resulting stage is terminal.
    pub fn next_review_at(
        &self,
        current: i64,
        incorrect: u32,
        answered_at: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let next = self.next_stage(current, incorrect);
        if self.is_completed(next) {
            return None;
        }
        Some(answered_at + self.interval(next))
    }
}

/// All known systems, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct SrsRegistry {
    systems: HashMap<i64, SrsSystem>,
}

impl SrsRegistry {
    pub fn from_systems(systems: impl IntoIterator<Item = SrsSystem>) -> Self {
        Self {
            systems: systems.into_iter().map(|s| (s.id, s)).collect(),
        }
    }

    /// Load every stored system, skipping (and logging) unreadable rows.
    pub async fn load(db: &DatabaseConnection) -> Result<Self, DbErr> {
        let rows = SrsSystemRow::find().all(db).await?;
        let systems = rows.iter().filter_map(|row| match SrsSystem::from_model(row) {
            Ok(system) => Some(system),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping invalid SRS system");
                None
            }
        });
        Ok(Self::from_systems(systems))
    }

    /// Replace every stored system with `systems` in one transaction.
    pub async fn replace_stored(db: &DatabaseConnection, systems: &[SrsSystem]) -> Result<(), DbErr> {
        let txn = db.begin().await?;
        SrsSystemRow::delete_many().exec(&txn).await?;
        if !systems.is_empty() {
            SrsSystemRow::insert_many(systems.iter().map(SrsSystem::to_active_model))
                .exec_without_returning(&txn)
                .await?;
        }
        txn.commit().await
    }

    pub fn get(&self, id: i64) -> Option<&SrsSystem> {
        self.systems.get(&id)
    }

    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Nine-stage system: 0 lesson, 1-4 apprentice, 5-6 guru, 7 master,
    /// 8 enlightened, 9 burned.
    fn standard() -> SrsSystem {
        let intervals = [0, 4, 8, 23, 47, 167, 335, 719, 2879, 0];
        let stages = intervals
            .iter()
            .enumerate()
            .map(|(i, hours)| SrsStage {
                position: i as i64,
                interval_secs: hours * 3_600,
            })
            .collect();
        SrsSystem::new(1, "standard", 0, 1, 5, 9, stages).expect("valid system")
    }

    #[test]
    fn zero_incorrect_advances_and_caps_at_burned() {
        let srs = standard();
        assert_eq!(srs.next_stage(0, 0), 1);
        assert_eq!(srs.next_stage(4, 0), 5);
        assert_eq!(srs.next_stage(8, 0), 9);
        assert_eq!(srs.next_stage(9, 0), 9);
        assert_eq!(srs.next_stage(LOCKED_STAGE, 0), 0);
    }

    #[test]
    fn zero_incorrect_is_monotonic_everywhere() {
        let srs = standard();
        for stage in srs.stages().iter().map(|s| s.position) {
            assert!(srs.next_stage(stage, 0) >= stage);
        }
    }

    #[test]
    fn stages_past_burning_stay_put() {
        let stages = (0..=10)
            .map(|position| SrsStage {
                position,
                interval_secs: if position == 0 || position >= 9 { 0 } else { 3_600 },
            })
            .collect();
        let srs = SrsSystem::new(2, "extended", 0, 1, 5, 9, stages).expect("valid system");

        for stage in srs.stages().iter().map(|s| s.position) {
            assert!(srs.next_stage(stage, 0) >= stage, "stage {stage} went backwards");
        }
        assert_eq!(srs.next_stage(10, 0), 10);
        assert_eq!(srs.next_stage(10, 4), 10);
        assert_eq!(srs.next_stage(9, 2), 9);
        assert_eq!(srs.next_stage(8, 0), 9);
    }

    #[test]
    fn incorrect_answers_regress_proportionally() {
        let srs = standard();
        assert_eq!(srs.next_stage(4, 1), 3);
        assert_eq!(srs.next_stage(4, 3), 2);
        // Passed stages drop twice as far.
        assert_eq!(srs.next_stage(7, 1), 5);
        assert_eq!(srs.next_stage(8, 3), 4);
    }

    #[test]
    fn started_items_never_drop_below_starting() {
        let srs = standard();
        for stage in 1..=9 {
            for incorrect in 0..20 {
                assert!(srs.next_stage(stage, incorrect) >= srs.first_started_stage());
            }
        }
    }

    #[test]
    fn unstarted_items_never_drop_below_unlocking() {
        let srs = standard();
        assert_eq!(srs.next_stage(0, 5), 0);
    }

    #[test]
    fn predicates_bound_the_state_machine() {
        let srs = standard();
        assert!(srs.is_initial(0));
        assert!(srs.is_completed(9));
        assert!(srs.is_passed(5));
        assert!(!srs.is_passed(4));
        assert!(srs.is_started(1));
        assert!(!srs.is_started(9));
        assert!(srs.is_locked(LOCKED_STAGE));
    }

    #[test]
    fn next_review_uses_the_new_stage_interval() {
        let srs = standard();
        let now = Utc::now();
        assert_eq!(srs.next_review_at(1, 0, now), Some(now + Duration::hours(8)));
        assert_eq!(srs.next_review_at(8, 0, now), None);
    }

    #[test]
    fn validation_rejects_broken_tables() {
        let stage = |position, interval_secs| SrsStage {
            position,
            interval_secs,
        };
        assert_eq!(
            SrsSystem::new(2, "gap", 0, 1, 1, 3, vec![stage(0, 0), stage(1, 1), stage(3, 0)]),
            Err(SrsError::NonContiguous {
                id: 2,
                previous: 1,
                position: 3
            })
        );
        assert_eq!(
            SrsSystem::new(3, "lesson interval", 0, 1, 1, 2, vec![stage(0, 5), stage(1, 1), stage(2, 0)]),
            Err(SrsError::UnlockingInterval { id: 3 })
        );
        assert!(matches!(
            SrsSystem::new(4, "no burn", 0, 1, 1, 7, vec![stage(0, 0), stage(1, 1)]),
            Err(SrsError::MissingRole { role: "burning", .. })
        ));
        assert_eq!(
            SrsSystem::new(5, "empty", 0, 1, 1, 2, Vec::new()),
            Err(SrsError::Empty { id: 5 })
        );
    }

    #[test]
    fn storage_round_trip_drops_the_locked_stage() {
        let srs = standard();
        let active = srs.to_active_model();
        let model = Model {
            id: srs.id,
            name: srs.name.clone(),
            unlocking_position: srs.unlocking,
            starting_position: srs.starting,
            passing_position: srs.passing,
            burning_position: srs.burning,
            stages: active.stages.clone().unwrap(),
        };
        let restored = SrsSystem::from_model(&model).expect("restore");
        assert_eq!(restored, srs);
    }
}
