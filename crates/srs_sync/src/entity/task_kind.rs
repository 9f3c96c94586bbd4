//! Closed registry of task kinds.
//!
//! Every kind carries its default queue priority and whether it is a
//! collection-style fetch that should be enqueued at most once.

use serde::{Deserialize, Serialize};

/// All task kinds known to the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaskKind {
    GetUser,
    GetSrsSystems,
    ReportSessionItem,
    SubmitStudyMaterial,
    GetSubjects,
    GetAssignments,
    GetPatchedAssignments,
    GetPatchedStudyMaterials,
    GetReviewStatistics,
    GetPatchedReviewStatistics,
    GetStudyMaterials,
    GetSummary,
    GetLevelProgression,
}

impl TaskKind {
    /// Every kind, in priority order.
    pub const ALL: [TaskKind; 13] = [
        TaskKind::GetUser,
        TaskKind::GetSrsSystems,
        TaskKind::ReportSessionItem,
        TaskKind::SubmitStudyMaterial,
        TaskKind::GetSubjects,
        TaskKind::GetAssignments,
        TaskKind::GetPatchedAssignments,
        TaskKind::GetPatchedStudyMaterials,
        TaskKind::GetReviewStatistics,
        TaskKind::GetPatchedReviewStatistics,
        TaskKind::GetStudyMaterials,
        TaskKind::GetSummary,
        TaskKind::GetLevelProgression,
    ];

    /// Stable tag stored in the `kind` column.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::GetUser => "get_user",
            TaskKind::GetSrsSystems => "get_srs_systems",
            TaskKind::ReportSessionItem => "report_session_item",
            TaskKind::SubmitStudyMaterial => "submit_study_material",
            TaskKind::GetSubjects => "get_subjects",
            TaskKind::GetAssignments => "get_assignments",
            TaskKind::GetPatchedAssignments => "get_patched_assignments",
            TaskKind::GetPatchedStudyMaterials => "get_patched_study_materials",
            TaskKind::GetReviewStatistics => "get_review_statistics",
            TaskKind::GetPatchedReviewStatistics => "get_patched_review_statistics",
            TaskKind::GetStudyMaterials => "get_study_materials",
            TaskKind::GetSummary => "get_summary",
            TaskKind::GetLevelProgression => "get_level_progression",
        }
    }

    /// Default queue priority. Lower runs first.
    #[must_use]
    pub fn priority(self) -> i32 {
        match self {
            TaskKind::GetUser => 2,
            TaskKind::GetSrsSystems => 10,
            TaskKind::ReportSessionItem => 15,
            TaskKind::SubmitStudyMaterial => 16,
            TaskKind::GetSubjects => 20,
            TaskKind::GetAssignments
            | TaskKind::GetPatchedAssignments
            | TaskKind::GetPatchedStudyMaterials => 21,
            TaskKind::GetReviewStatistics | TaskKind::GetPatchedReviewStatistics => 22,
            TaskKind::GetStudyMaterials => 23,
            TaskKind::GetSummary => 25,
            TaskKind::GetLevelProgression => 26,
        }
    }

    /// Mutations carry user data and must never be collapsed.
    #[must_use]
    pub fn is_mutation(self) -> bool {
        matches!(
            self,
            TaskKind::ReportSessionItem | TaskKind::SubmitStudyMaterial
        )
    }

    /// Only `GetUser` may run while the API state merely asks for a user refresh.
    #[must_use]
    pub fn runs_on_user_data_state(self) -> bool {
        matches!(self, TaskKind::GetUser)
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        TaskKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| format!("Unknown task kind: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_round_trips_through_from_str() {
        for kind in TaskKind::ALL {
            assert_eq!(kind.to_string().parse::<TaskKind>(), Ok(kind));
        }
    }

    #[test]
    fn from_str_accepts_dashes_and_case() {
        assert_eq!(
            "Get-Summary".parse::<TaskKind>(),
            Ok(TaskKind::GetSummary)
        );
        assert!("download_audio".parse::<TaskKind>().is_err());
    }

    #[test]
    fn all_is_sorted_by_priority() {
        let priorities: Vec<i32> = TaskKind::ALL.iter().map(|k| k.priority()).collect();
        let mut sorted = priorities.clone();
        sorted.sort();
        assert_eq!(priorities, sorted);
    }

    #[test]
    fn user_fetch_outranks_mutations() {
        assert!(TaskKind::GetUser.priority() < TaskKind::ReportSessionItem.priority());
        assert!(TaskKind::ReportSessionItem.is_mutation());
        assert!(!TaskKind::GetAssignments.is_mutation());
    }
}
