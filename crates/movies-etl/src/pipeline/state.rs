//! Pipeline run states and their legal transitions

use serde::{Deserialize, Serialize};

/// Where a run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    #[default]
    Idle,
    Extracting,
    Transforming,
    Validating,
    Loading,
    Committed,
    Failed,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::Extracting => "extracting",
            PipelineState::Transforming => "transforming",
            PipelineState::Validating => "validating",
            PipelineState::Loading => "loading",
            PipelineState::Committed => "committed",
            PipelineState::Failed => "failed",
        }
    }

    /// Whether `next` may follow `self`
    pub fn can_transition_to(&self, next: PipelineState) -> bool {
        use PipelineState::*;

        matches!(
            (self, next),
            (Idle, Extracting)
                | (Extracting, Transforming)
                | (Extracting, Failed)
                | (Transforming, Validating)
                | (Transforming, Failed)
                | (Validating, Loading)
                | (Validating, Idle)
                | (Loading, Committed)
                | (Loading, Failed)
        )
    }

    /// `Committed` and `Failed` end a run
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Committed | PipelineState::Failed)
    }

    /// A phase that does work and gets timed
    pub fn is_phase(&self) -> bool {
        matches!(
            self,
            PipelineState::Extracting
                | PipelineState::Transforming
                | PipelineState::Validating
                | PipelineState::Loading
        )
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PipelineState::*;

    const ALL: [PipelineState; 7] = [Idle, Extracting, Transforming, Validating, Loading, Committed, Failed];

    #[test]
    fn test_happy_path_is_legal() {
        let path = [Idle, Extracting, Transforming, Validating, Loading, Committed];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_validation_soft_stop_returns_to_idle() {
        assert!(Validating.can_transition_to(Idle));
        assert!(!Validating.can_transition_to(Failed));
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for state in [Committed, Failed] {
            assert!(state.is_terminal());
            assert!(ALL.iter().all(|next| !state.can_transition_to(*next)));
        }
    }

    #[test]
    fn test_phases_cannot_be_skipped() {
        assert!(!Idle.can_transition_to(Loading));
        assert!(!Extracting.can_transition_to(Validating));
        assert!(!Transforming.can_transition_to(Committed));
        assert!(!Idle.can_transition_to(Failed));
    }
}
