use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::domain::errors::{DomainError, Result};
use crate::domain::value_objects::PlaybackState;

/// Transitions kept for diagnostics
const HISTORY_LIMIT: usize = 64;

/// State transition record
#[derive(Debug, Clone)]
pub struct StateTransition {
    pub from: PlaybackState,
    pub to: PlaybackState,
    pub timestamp: Instant,
    pub reason: Option<String>,
}

/// Domain entity guarding the playback state machine
#[derive(Debug)]
pub struct PlaybackLifecycle {
    current_state: PlaybackState,
    state_history: VecDeque<StateTransition>,
    transition_count: usize,
    load_attempts: u32,
    playing_since: Option<Instant>,
}

impl PlaybackLifecycle {
    pub fn new() -> Self {
        Self {
            current_state: PlaybackState::Idle,
            state_history: VecDeque::new(),
            transition_count: 0,
            load_attempts: 0,
            playing_since: None,
        }
    }

    pub fn current_state(&self) -> PlaybackState {
        self.current_state
    }

    pub fn load_attempts(&self) -> u32 {
        self.load_attempts
    }

    pub fn transition_count(&self) -> usize {
        self.transition_count
    }

    pub fn last_transition(&self) -> Option<&StateTransition> {
        self.state_history.back()
    }

    pub fn history(&self) -> impl Iterator<Item = &StateTransition> {
        self.state_history.iter()
    }

    /// Time spent in the current Playing stretch
    pub fn playing_for(&self) -> Option<Duration> {
        self.playing_since.map(|start| start.elapsed())
    }

    /// Begin a new load attempt
    pub fn transition_to_connecting(&mut self) -> Result<()> {
        self.record_transition(PlaybackState::Connecting, None, "connect")?;
        self.load_attempts += 1;
        Ok(())
    }

    pub fn transition_to_ready(&mut self) -> Result<()> {
        self.record_transition(PlaybackState::Ready, None, "mark ready")
    }

    pub fn transition_to_playing(&mut self) -> Result<()> {
        self.record_transition(PlaybackState::Playing, None, "play")?;
        self.playing_since = Some(Instant::now());
        Ok(())
    }

    pub fn transition_to_paused(&mut self) -> Result<()> {
        self.record_transition(PlaybackState::Paused, None, "pause")
    }

    pub fn transition_to_errored(&mut self, reason: String) -> Result<()> {
        self.record_transition(PlaybackState::Errored, Some(reason), "fail")
    }

    /// Teardown; already idle is a no-op
    pub fn transition_to_idle(&mut self, reason: Option<String>) -> Result<()> {
        if self.current_state == PlaybackState::Idle {
            return Ok(());
        }
        self.record_transition(PlaybackState::Idle, reason, "tear down")
    }

    fn record_transition(
        &mut self,
        new_state: PlaybackState,
        reason: Option<String>,
        action: &'static str,
    ) -> Result<()> {
        if !self.current_state.can_transition_to(new_state) {
            return Err(DomainError::InvalidTransition {
                state: self.current_state,
                action,
            });
        }

        if new_state != PlaybackState::Playing {
            self.playing_since = None;
        }

        let transition = StateTransition {
            from: self.current_state,
            to: new_state,
            timestamp: Instant::now(),
            reason,
        };

        if self.state_history.len() == HISTORY_LIMIT {
            self.state_history.pop_front();
        }
        self.state_history.push_back(transition);
        self.transition_count += 1;
        self.current_state = new_state;
        Ok(())
    }
}

impl Default for PlaybackLifecycle {
    fn default() -> Self {
        Self::new()
    }
}
