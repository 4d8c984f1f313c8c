//! Mutable state of one comparison, owned by the orchestrator for its lifetime.

use facevote_core::{Stage, Vote};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Stage cursor. Only moves forward; an early stop jumps straight to `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RunState {
    Original,
    Cropped,
    Aligned,
    Done,
}

impl RunState {
    /// The stage whose votes are currently being collected.
    pub fn stage(self) -> Option<Stage> {
        match self {
            RunState::Original => Some(Stage::Original),
            RunState::Cropped => Some(Stage::Cropped),
            RunState::Aligned => Some(Stage::Aligned),
            RunState::Done => None,
        }
    }

    fn next(self) -> Self {
        match self {
            RunState::Original => RunState::Cropped,
            RunState::Cropped => RunState::Aligned,
            RunState::Aligned | RunState::Done => RunState::Done,
        }
    }
}

#[derive(Debug)]
pub struct ComparisonRun {
    id: Uuid,
    votes: Vec<Vote>,
    state: RunState,
    crop_success: Option<bool>,
    align_success: Option<bool>,
    started: Instant,
    oracle_calls: usize,
    stopped_early: bool,
}

impl ComparisonRun {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            votes: Vec::new(),
            state: RunState::Original,
            crop_success: None,
            align_success: None,
            started: Instant::now(),
            oracle_calls: 0,
            stopped_early: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn votes(&self) -> &[Vote] {
        &self.votes
    }

    /// Append a vote for the current stage. Votes for any other stage, or
    /// after the run is done, are dropped.
    pub fn push(&mut self, vote: Vote) {
        if self.state.stage() != Some(vote.stage()) {
            tracing::error!(
                state = ?self.state,
                stage = %vote.stage(),
                oracle = %vote.source(),
                "dropping out-of-stage vote"
            );
            return;
        }
        self.votes.push(vote);
    }

    pub fn extend(&mut self, votes: impl IntoIterator<Item = Vote>) {
        for vote in votes {
            self.push(vote);
        }
    }

    pub fn advance(&mut self) {
        self.state = self.state.next();
    }

    /// Terminate after the current stage; no later stage will run.
    pub fn stop_early(&mut self) {
        self.stopped_early = true;
        self.state = RunState::Done;
    }

    pub fn stopped_early(&self) -> bool {
        self.stopped_early
    }

    pub fn record_preprocessing(&mut self, stage: Stage, ok: bool) {
        match stage {
            Stage::Cropped => self.crop_success = Some(ok),
            Stage::Aligned => self.align_success = Some(ok),
            Stage::Original => {}
        }
    }

    /// `None` when the Cropped stage never ran.
    pub fn crop_success(&self) -> Option<bool> {
        self.crop_success
    }

    /// `None` when the Aligned stage never ran.
    pub fn align_success(&self) -> Option<bool> {
        self.align_success
    }

    pub fn count_oracle_calls(&mut self, n: usize) {
        self.oracle_calls += n;
    }

    pub fn oracle_calls(&self) -> usize {
        self.oracle_calls
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facevote_core::Outcome;

    fn vote(stage: Stage) -> Vote {
        Vote::cast("qwen".into(), Outcome::Same, 1.0, stage, "t")
    }

    #[test]
    fn test_state_progression() {
        let mut run = ComparisonRun::new(Uuid::new_v4());
        assert_eq!(run.state(), RunState::Original);
        run.advance();
        assert_eq!(run.state(), RunState::Cropped);
        run.advance();
        run.advance();
        assert_eq!(run.state(), RunState::Done);
        run.advance();
        assert_eq!(run.state(), RunState::Done);
    }

    #[test]
    fn test_early_stop_jumps_to_done() {
        let mut run = ComparisonRun::new(Uuid::new_v4());
        run.stop_early();
        assert_eq!(run.state(), RunState::Done);
        assert!(run.stopped_early());
    }

    #[test]
    fn test_out_of_stage_votes_dropped() {
        let mut run = ComparisonRun::new(Uuid::new_v4());
        run.push(vote(Stage::Original));
        run.push(vote(Stage::Aligned));
        assert_eq!(run.votes().len(), 1);

        run.stop_early();
        run.push(vote(Stage::Original));
        assert_eq!(run.votes().len(), 1);
    }

    #[test]
    fn test_preprocessing_flags() {
        let mut run = ComparisonRun::new(Uuid::new_v4());
        assert_eq!(run.crop_success(), None);
        run.record_preprocessing(Stage::Cropped, false);
        run.record_preprocessing(Stage::Aligned, true);
        assert_eq!(run.crop_success(), Some(false));
        assert_eq!(run.align_success(), Some(true));
    }
}
