//! Auto-Start Decision Engine
//!
//! Turns the activity stream into at most one run prompt per movement
//! episode. Movement must stay above the trigger threshold for the whole
//! debounce delay, and prompts are spaced by a cooldown period.
//!
//! The engine never reads a clock. Every operation takes the current
//! instant, and the owner is expected to call [`AutoStartEngine::poll`] once
//! [`AutoStartEngine::next_deadline`] has passed.

use crate::ActivitySample;
use std::time::Duration;
use tokio::time::Instant;

/// Configuration for the decision engine
#[derive(Debug, Clone)]
pub struct AutoStartConfig {
    /// Intensity above which a sample counts towards an episode. Distinct
    /// from the monitor's own movement threshold.
    pub trigger_threshold: f64,
    /// Continuous movement required before a trigger attempt
    pub debounce: Duration,
    /// Minimum time between two prompts
    pub cooldown: Duration,
}

impl Default for AutoStartConfig {
    fn default() -> Self {
        Self {
            trigger_threshold: 0.3,
            debounce: Duration::from_millis(3000),
            cooldown: Duration::from_millis(30000),
        }
    }
}

/// Where the current movement episode stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpisodeState {
    /// No sustained movement
    Idle,
    /// Movement started at `started_at`; the debounce timer fires at `deadline`
    MovementPending { started_at: Instant, deadline: Instant },
    /// The episode has been resolved; waits for movement to stop
    Triggered { started_at: Instant },
}

/// Result of a trigger attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// Cooldown satisfied: notify the user and ask for confirmation
    Prompt,
    /// A prompt was shown too recently; nothing happens
    CooledDown { remaining: Duration },
}

#[derive(Debug)]
pub struct AutoStartEngine {
    config: AutoStartConfig,
    state: EpisodeState,
    last_trigger: Option<Instant>,
    intensity: f64,
    awaiting_confirmation: bool,
    active: bool,
}

impl AutoStartEngine {
    pub fn new(config: AutoStartConfig) -> Self {
        Self {
            config,
            state: EpisodeState::Idle,
            last_trigger: None,
            intensity: 0.0,
            awaiting_confirmation: false,
            active: false,
        }
    }

    pub fn config(&self) -> &AutoStartConfig {
        &self.config
    }

    /// Bind the engine to a live monitoring session
    pub fn activate(&mut self) {
        self.active = true;
    }

    /// Session teardown: cancel any pending timer and return to idle.
    /// The last-trigger instant is kept so the cooldown spans sessions.
    pub fn deactivate(&mut self) {
        if matches!(self.state, EpisodeState::MovementPending { .. }) {
            tracing::debug!("Pending auto-start cancelled by monitor shutdown");
        }
        self.active = false;
        self.state = EpisodeState::Idle;
        self.awaiting_confirmation = false;
        self.intensity = 0.0;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn state(&self) -> EpisodeState {
        self.state
    }

    /// Latest intensity seen
    pub fn intensity(&self) -> f64 {
        self.intensity
    }

    /// An episode is in progress (pending or already resolved)
    pub fn movement_detected(&self) -> bool {
        !matches!(self.state, EpisodeState::Idle)
    }

    /// A debounce timer is armed and the prompt has not been issued yet
    pub fn awaiting_confirmation(&self) -> bool {
        self.awaiting_confirmation
    }

    pub fn last_trigger(&self) -> Option<Instant> {
        self.last_trigger
    }

    /// When the armed debounce timer fires, if one is armed
    pub fn next_deadline(&self) -> Option<Instant> {
        match self.state {
            EpisodeState::MovementPending { deadline, .. } => Some(deadline),
            _ => None,
        }
    }

    /// Feed one activity sample.
    ///
    /// A debounce timer that expired before `now` fires first, so a late
    /// sample cannot cancel an episode that already qualified.
    pub fn on_sample(&mut self, sample: &ActivitySample, now: Instant) -> Option<TriggerOutcome> {
        if !self.active {
            return None;
        }

        let fired = self.poll(now);
        self.intensity = sample.intensity;
        let above = sample.intensity > self.config.trigger_threshold;

        match (self.state, above) {
            (EpisodeState::Idle, true) => {
                let deadline = now + self.config.debounce;
                self.state = EpisodeState::MovementPending {
                    started_at: now,
                    deadline,
                };
                self.awaiting_confirmation = true;
                tracing::debug!(intensity = sample.intensity, "Movement detected, auto-start armed");
            }
            (EpisodeState::MovementPending { started_at, .. }, false) => {
                self.state = EpisodeState::Idle;
                self.awaiting_confirmation = false;
                tracing::debug!(
                    "Movement stopped after {:?}, auto-start cancelled",
                    now.saturating_duration_since(started_at)
                );
            }
            (EpisodeState::Triggered { .. }, false) => {
                self.state = EpisodeState::Idle;
                tracing::debug!("Movement episode ended");
            }
            _ => {}
        }

        fired
    }

    /// Fire the debounce timer if it is due
    pub fn poll(&mut self, now: Instant) -> Option<TriggerOutcome> {
        let EpisodeState::MovementPending { started_at, deadline } = self.state else {
            return None;
        };

        if !self.active {
            // Timer outlived its session
            self.state = EpisodeState::Idle;
            self.awaiting_confirmation = false;
            return None;
        }
        if now < deadline {
            return None;
        }

        let outcome = self.trigger_auto_start(now);
        self.state = match outcome {
            TriggerOutcome::Prompt => EpisodeState::Triggered { started_at },
            // Suppressed episodes go back to idle; continued movement re-arms
            TriggerOutcome::CooledDown { .. } => EpisodeState::Idle,
        };
        Some(outcome)
    }

    /// Attempt a trigger now, subject to the cooldown.
    ///
    /// Clears the awaiting-confirmation flag either way. Only a `Prompt`
    /// outcome moves the last-trigger instant.
    pub fn trigger_auto_start(&mut self, now: Instant) -> TriggerOutcome {
        self.awaiting_confirmation = false;

        if let Some(last) = self.last_trigger {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.config.cooldown {
                let remaining = self.config.cooldown - elapsed;
                tracing::debug!("Auto-start suppressed, cooldown has {:?} left", remaining);
                return TriggerOutcome::CooledDown { remaining };
            }
        }

        self.last_trigger = Some(now);
        tracing::info!("Sustained movement detected, prompting for auto-start");
        TriggerOutcome::Prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(intensity: f64) -> ActivitySample {
        ActivitySample {
            raw_magnitude: intensity * 0.3,
            smoothed_magnitude: intensity * 0.3,
            intensity,
            is_moving: intensity * 0.3 > 0.1,
            timestamp_ms: 0,
        }
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn engine() -> AutoStartEngine {
        let mut engine = AutoStartEngine::new(AutoStartConfig::default());
        engine.activate();
        engine
    }

    /// Run one episode of continuous movement starting at `start`, with a
    /// sample every second for `seconds`, then a still sample. Returns the
    /// outcomes produced along the way.
    fn episode(engine: &mut AutoStartEngine, start: Instant, seconds: u64) -> Vec<TriggerOutcome> {
        let mut outcomes = Vec::new();
        for s in 0..=seconds {
            outcomes.extend(engine.on_sample(&sample(1.0), start + ms(s * 1000)));
            outcomes.extend(engine.poll(start + ms(s * 1000)));
        }
        outcomes.extend(engine.on_sample(&sample(0.0), start + ms(seconds * 1000 + 1000)));
        outcomes
    }

    #[test]
    fn test_onset_arms_single_timer() {
        let mut engine = engine();
        let t0 = Instant::now();

        assert_eq!(engine.on_sample(&sample(1.0), t0), None);
        assert_eq!(engine.next_deadline(), Some(t0 + ms(3000)));
        assert!(engine.awaiting_confirmation());
        assert!(engine.movement_detected());

        // Continued movement keeps the original deadline
        engine.on_sample(&sample(0.9), t0 + ms(1000));
        assert_eq!(engine.next_deadline(), Some(t0 + ms(3000)));
    }

    #[test]
    fn test_sustained_movement_triggers_at_debounce() {
        let mut engine = engine();
        let t0 = Instant::now();

        engine.on_sample(&sample(1.0), t0);
        engine.on_sample(&sample(1.0), t0 + ms(1000));
        engine.on_sample(&sample(1.0), t0 + ms(2000));
        assert_eq!(engine.poll(t0 + ms(2999)), None);

        assert_eq!(engine.poll(t0 + ms(3000)), Some(TriggerOutcome::Prompt));
        assert_eq!(engine.last_trigger(), Some(t0 + ms(3000)));
        assert!(!engine.awaiting_confirmation());
        assert_eq!(engine.next_deadline(), None);
        assert!(matches!(engine.state(), EpisodeState::Triggered { .. }));
    }

    #[test]
    fn test_drop_before_debounce_cancels() {
        let mut engine = engine();
        let t0 = Instant::now();

        engine.on_sample(&sample(1.0), t0);
        assert_eq!(engine.on_sample(&sample(0.2), t0 + ms(2999)), None);

        assert_eq!(engine.state(), EpisodeState::Idle);
        assert_eq!(engine.next_deadline(), None);
        assert!(!engine.awaiting_confirmation());
        assert_eq!(engine.poll(t0 + ms(3000)), None);
        assert_eq!(engine.poll(t0 + ms(60000)), None);
        assert_eq!(engine.last_trigger(), None);
    }

    #[test]
    fn test_threshold_is_strict() {
        let mut engine = engine();
        let t0 = Instant::now();

        engine.on_sample(&sample(0.3), t0);
        assert_eq!(engine.state(), EpisodeState::Idle);

        engine.on_sample(&sample(0.31), t0);
        assert!(matches!(engine.state(), EpisodeState::MovementPending { .. }));
    }

    #[test]
    fn test_late_sample_fires_expired_timer_first() {
        let mut engine = engine();
        let t0 = Instant::now();

        engine.on_sample(&sample(1.0), t0);
        // No poll happened; the still sample arrives after the deadline
        let outcome = engine.on_sample(&sample(0.0), t0 + ms(3500));

        assert_eq!(outcome, Some(TriggerOutcome::Prompt));
        assert_eq!(engine.state(), EpisodeState::Idle);
    }

    #[test]
    fn test_one_trigger_per_episode() {
        let mut engine = engine();
        let t0 = Instant::now();

        // Forty seconds of continuous movement, well past the cooldown
        let outcomes = episode(&mut engine, t0, 40);
        assert_eq!(outcomes, vec![TriggerOutcome::Prompt]);
    }

    #[test]
    fn test_cooldown_suppresses_second_episode() {
        let mut engine = engine();
        let t0 = Instant::now();

        assert_eq!(episode(&mut engine, t0, 4), vec![TriggerOutcome::Prompt]);

        // Second episode qualifies 20 s after the first trigger
        let second = episode(&mut engine, t0 + ms(20000), 4);
        assert_eq!(second, vec![TriggerOutcome::CooledDown { remaining: ms(10000) }]);
        assert_eq!(engine.last_trigger(), Some(t0 + ms(3000)));
    }

    #[test]
    fn test_episodes_after_cooldown_each_prompt() {
        let mut engine = engine();
        let t0 = Instant::now();

        assert_eq!(episode(&mut engine, t0, 4), vec![TriggerOutcome::Prompt]);
        // Triggers at t0+3 s and t0+33 s: exactly one cooldown apart
        assert_eq!(episode(&mut engine, t0 + ms(30000), 4), vec![TriggerOutcome::Prompt]);
        assert_eq!(engine.last_trigger(), Some(t0 + ms(33000)));
    }

    #[test]
    fn test_trigger_auto_start_is_noop_within_cooldown() {
        let mut engine = engine();
        let t0 = Instant::now();

        assert_eq!(engine.trigger_auto_start(t0), TriggerOutcome::Prompt);
        for offset in [1, 15000, 29999] {
            assert!(matches!(
                engine.trigger_auto_start(t0 + ms(offset)),
                TriggerOutcome::CooledDown { .. }
            ));
        }
        assert_eq!(engine.last_trigger(), Some(t0));
        assert_eq!(engine.trigger_auto_start(t0 + ms(30000)), TriggerOutcome::Prompt);
    }

    #[test]
    fn test_deactivate_cancels_pending_timer() {
        let mut engine = engine();
        let t0 = Instant::now();

        engine.on_sample(&sample(1.0), t0);
        engine.deactivate();

        assert_eq!(engine.next_deadline(), None);
        assert_eq!(engine.poll(t0 + ms(5000)), None);
        assert!(!engine.awaiting_confirmation());

        // Samples are ignored until the engine is bound to a session again
        assert_eq!(engine.on_sample(&sample(1.0), t0 + ms(6000)), None);
        assert_eq!(engine.state(), EpisodeState::Idle);
    }

    #[test]
    fn test_suppressed_episode_rearms_and_prompts_after_cooldown() {
        let mut engine = engine();
        let t0 = Instant::now();

        assert_eq!(episode(&mut engine, t0, 4), vec![TriggerOutcome::Prompt]);

        // Movement resumes inside the cooldown and never stops
        let mut outcomes = Vec::new();
        for s in 10..=60 {
            outcomes.extend(engine.on_sample(&sample(1.0), t0 + ms(s * 1000)));
            outcomes.extend(engine.poll(t0 + ms(s * 1000)));
        }

        // Suppressed every debounce period (13 s to 31 s) until the cooldown lapses
        let suppressed = outcomes
            .iter()
            .filter(|o| matches!(o, TriggerOutcome::CooledDown { .. }))
            .count();
        assert_eq!(suppressed, 7);
        assert_eq!(outcomes.last(), Some(&TriggerOutcome::Prompt));
        assert_eq!(
            outcomes.iter().filter(|o| **o == TriggerOutcome::Prompt).count(),
            1
        );
        assert_eq!(engine.last_trigger(), Some(t0 + ms(34000)));
        assert!(matches!(engine.state(), EpisodeState::Triggered { .. }));
    }

    #[test]
    fn test_cooled_down_timer_returns_to_idle() {
        let mut engine = engine();
        let t0 = Instant::now();

        assert_eq!(engine.trigger_auto_start(t0), TriggerOutcome::Prompt);
        engine.on_sample(&sample(1.0), t0 + ms(1000));

        assert!(matches!(engine.poll(t0 + ms(4000)), Some(TriggerOutcome::CooledDown { .. })));
        assert_eq!(engine.state(), EpisodeState::Idle);
        assert_eq!(engine.next_deadline(), None);

        // The next above-threshold sample arms a fresh debounce
        engine.on_sample(&sample(1.0), t0 + ms(5000));
        assert_eq!(engine.next_deadline(), Some(t0 + ms(8000)));
    }

    #[test]
    fn test_cooldown_survives_restart() {
        let mut engine = engine();
        let t0 = Instant::now();

        assert_eq!(episode(&mut engine, t0, 4), vec![TriggerOutcome::Prompt]);
        engine.deactivate();
        engine.activate();

        let outcomes = episode(&mut engine, t0 + ms(10000), 4);
        assert!(matches!(outcomes.as_slice(), [TriggerOutcome::CooledDown { .. }]));
    }
}
