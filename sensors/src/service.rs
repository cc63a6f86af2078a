//! Auto-start service
//!
//! Runs the activity monitor and the decision engine on one task. The
//! engine is registered with the monitor as an ordinary observer that
//! forwards samples over a channel, so unregistering it (or the monitor
//! shutting down) closes the channel and disarms any pending trigger.

use crate::autostart::{AutoStartConfig, AutoStartEngine, TriggerOutcome};
use crate::monitor::ActivityMonitor;
use crate::recording::{RunRecord, RunSink};
use crate::{ActivityObserver, ActivitySample, ObserverId, Result, SensorError};
use pacer_hal::{ConfirmationPrompt, MotionPlatform, Notifier, PromptRequest, PromptResponse};
use serde::Serialize;
use std::future::Future;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::time::{sleep_until, Instant};

/// Observer name the engine registers under
pub const ENGINE_OBSERVER: &str = "auto-start";

pub const DETECTED_TITLE: &str = "Auto-start activated";
pub const DETECTED_BODY: &str = "Physical activity detected. Start tracking?";
pub const PROMPT_TITLE: &str = "Auto-start detected";
pub const PROMPT_BODY: &str = "Physical activity detected. Do you want to start tracking your run?";
pub const STARTED_TITLE: &str = "Tracking started";
pub const STARTED_BODY: &str = "Your running session has begun. Go!";
pub const COMPLETED_TITLE: &str = "Session complete";

/// Body of the notification sent when a run is closed
pub fn completed_body(run: &RunRecord) -> String {
    format!(
        "Distance: {:.2} km, time: {}:{:02}",
        run.distance,
        run.duration / 60,
        run.duration % 60
    )
}

#[derive(Debug, Clone)]
pub struct ServiceOptions {
    /// Owner of the runs this service starts
    pub user_id: String,
    /// Deliver system notifications; the confirmation prompt is shown either way
    pub notifications_enabled: bool,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            user_id: "current-user".to_string(),
            notifications_enabled: true,
        }
    }
}

/// Diagnostic snapshot of the service
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AutoStartStatus {
    pub is_monitoring: bool,
    pub movement_detected: bool,
    pub intensity: f64,
    pub awaiting_confirmation: bool,
}

/// Forwards samples from the monitor to the engine's task
struct EngineObserver {
    tx: mpsc::UnboundedSender<ActivitySample>,
}

impl ActivityObserver for EngineObserver {
    fn on_activity_sample(&mut self, sample: &ActivitySample) -> Result<()> {
        self.tx
            .send(*sample)
            .map_err(|_| SensorError::ObserverClosed(ENGINE_OBSERVER.to_string()))
    }
}

pub struct AutoStartService<P: MotionPlatform> {
    monitor: ActivityMonitor<P>,
    engine: AutoStartEngine,
    notifier: Box<dyn Notifier>,
    prompt: Box<dyn ConfirmationPrompt>,
    sink: Box<dyn RunSink>,
    options: ServiceOptions,
    samples: Option<mpsc::UnboundedReceiver<ActivitySample>>,
}

impl<P: MotionPlatform> AutoStartService<P> {
    pub fn new(
        monitor: ActivityMonitor<P>,
        config: AutoStartConfig,
        notifier: Box<dyn Notifier>,
        prompt: Box<dyn ConfirmationPrompt>,
        sink: Box<dyn RunSink>,
        options: ServiceOptions,
    ) -> Self {
        Self {
            monitor,
            engine: AutoStartEngine::new(config),
            notifier,
            prompt,
            sink,
            options,
            samples: None,
        }
    }

    fn observer_id() -> ObserverId {
        ObserverId::new(ENGINE_OBSERVER)
    }

    /// Register the engine with the monitor. Returns false when the sensor
    /// is unavailable or permission is denied.
    pub async fn start(&mut self) -> bool {
        if self.is_monitoring() {
            return true;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        if !self
            .monitor
            .start_detection(Self::observer_id(), Box::new(EngineObserver { tx }))
            .await
        {
            tracing::warn!("Auto-start monitoring could not start");
            return false;
        }

        self.engine.activate();
        self.samples = Some(rx);
        tracing::info!("Auto-start monitoring started for {}", self.options.user_id);
        true
    }

    /// Unregister the engine and cancel any pending trigger
    pub fn stop(&mut self) {
        self.monitor.stop_detection(Some(&Self::observer_id()));
        self.samples = None;
        if self.engine.is_active() {
            self.engine.deactivate();
            tracing::info!("Auto-start monitoring stopped");
        }
    }

    pub fn is_monitoring(&self) -> bool {
        self.samples.is_some() && self.engine.is_active()
    }

    pub fn status(&self) -> AutoStartStatus {
        AutoStartStatus {
            is_monitoring: self.is_monitoring(),
            movement_detected: self.engine.movement_detected(),
            intensity: self.engine.intensity(),
            awaiting_confirmation: self.engine.awaiting_confirmation(),
        }
    }

    pub fn engine(&self) -> &AutoStartEngine {
        &self.engine
    }

    pub fn monitor(&self) -> &ActivityMonitor<P> {
        &self.monitor
    }

    /// Access to the monitor, e.g. to register more observers
    pub fn monitor_mut(&mut self) -> &mut ActivityMonitor<P> {
        &mut self.monitor
    }

    /// Drive monitoring until `shutdown` completes or the sensor stream ends.
    ///
    /// Monitoring is left running on shutdown; call [`stop`](Self::stop) to
    /// release the sensor.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        if !self.is_monitoring() {
            return Err(SensorError::NotMonitoring);
        }

        tokio::pin!(shutdown);

        loop {
            let deadline = self.engine.next_deadline();

            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested");
                    break;
                }

                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if let Some(outcome) = self.engine.poll(Instant::now()) {
                        self.handle_outcome(outcome).await;
                    }
                }

                sample = self.monitor.next_sample() => {
                    if sample.is_none() {
                        tracing::warn!("Motion samples stopped, ending auto-start monitoring");
                    }
                    self.drain_samples().await;
                    if !self.is_monitoring() {
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    /// Feed every forwarded sample to the engine
    async fn drain_samples(&mut self) {
        loop {
            let next = match self.samples.as_mut() {
                Some(rx) => rx.try_recv(),
                None => return,
            };

            match next {
                Ok(sample) => {
                    if let Some(outcome) = self.engine.on_sample(&sample, Instant::now()) {
                        self.handle_outcome(outcome).await;
                    }
                }
                Err(TryRecvError::Empty) => return,
                Err(TryRecvError::Disconnected) => {
                    tracing::debug!("Engine observer unregistered");
                    self.stop();
                    return;
                }
            }
        }
    }

    async fn handle_outcome(&mut self, outcome: TriggerOutcome) {
        match outcome {
            TriggerOutcome::Prompt => self.resolve_prompt().await,
            TriggerOutcome::CooledDown { remaining } => {
                tracing::debug!("Movement episode resolved without prompt ({:?} cooldown left)", remaining);
            }
        }
    }

    /// Attempt a trigger right away, subject to the cooldown
    pub async fn trigger_auto_start(&mut self) -> TriggerOutcome {
        let outcome = self.engine.trigger_auto_start(Instant::now());
        self.handle_outcome(outcome).await;
        outcome
    }

    async fn notify(&self, title: &str, body: &str) {
        if !self.options.notifications_enabled {
            return;
        }
        if let Err(e) = self.notifier.notify(title, body).await {
            tracing::warn!("Notification '{}' failed: {}", title, e);
        }
    }

    async fn resolve_prompt(&mut self) {
        self.notify(DETECTED_TITLE, DETECTED_BODY).await;

        let request = PromptRequest::new(PROMPT_TITLE, PROMPT_BODY).with_labels("Yes, start", "No");
        match self.prompt.confirm(&request).await {
            PromptResponse::Accepted => {
                tracing::info!("Auto-start confirmed by user");
                let run = RunRecord::new_active(&self.options.user_id);
                match self.sink.start_run(run) {
                    Ok(()) => self.notify(STARTED_TITLE, STARTED_BODY).await,
                    Err(e) => tracing::error!("Failed to start run: {}", e),
                }
            }
            PromptResponse::Declined => tracing::info!("Auto-start cancelled by user"),
            PromptResponse::Dismissed => tracing::info!("Auto-start prompt dismissed"),
        }
    }
}

impl<P: MotionPlatform> Drop for AutoStartService<P> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::MonitorConfig;
    use crate::recording::RunStatus;
    use pacer_hal::{AccelerometerReading, HalError, ScriptedPlatform, ScriptedPrompt};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct MemorySink {
        runs: Arc<Mutex<Vec<RunRecord>>>,
    }

    impl RunSink for MemorySink {
        fn start_run(&mut self, run: RunRecord) -> Result<()> {
            self.runs.lock().unwrap().push(run);
            Ok(())
        }
    }

    struct BrokenSink;

    impl RunSink for BrokenSink {
        fn start_run(&mut self, _run: RunRecord) -> Result<()> {
            Err(SensorError::Recording("disk full".to_string()))
        }
    }

    #[derive(Clone, Default)]
    struct CapturingNotifier {
        titles: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl Notifier for CapturingNotifier {
        async fn notify(&self, title: &str, _body: &str) -> std::result::Result<(), HalError> {
            self.titles.lock().unwrap().push(title.to_string());
            if self.fail {
                return Err(HalError::CommunicationError("no notification daemon".to_string()));
            }
            Ok(())
        }
    }

    fn running(ticks: usize) -> Vec<AccelerometerReading> {
        vec![AccelerometerReading::new(0.0, 0.0, 1.3); ticks]
    }

    struct Harness {
        service: AutoStartService<ScriptedPlatform>,
        prompt: ScriptedPrompt,
        notifier: CapturingNotifier,
        sink: MemorySink,
    }

    fn harness(platform: ScriptedPlatform, response: PromptResponse, notifications_enabled: bool) -> Harness {
        let prompt = ScriptedPrompt::always(response);
        let notifier = CapturingNotifier::default();
        let sink = MemorySink::default();

        let service = AutoStartService::new(
            ActivityMonitor::new(platform, MonitorConfig::default()),
            AutoStartConfig::default(),
            Box::new(notifier.clone()),
            Box::new(prompt.clone()),
            Box::new(sink.clone()),
            ServiceOptions {
                user_id: "runner-1".to_string(),
                notifications_enabled,
            },
        );

        Harness {
            service,
            prompt,
            notifier,
            sink,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sustained_running_starts_a_run() {
        let mut h = harness(ScriptedPlatform::new(running(5)), PromptResponse::Accepted, true);

        assert!(h.service.start().await);
        h.service.run_until(std::future::pending()).await.unwrap();

        assert_eq!(h.prompt.times_asked(), 1);
        assert_eq!(h.prompt.asked()[0].title, PROMPT_TITLE);

        let runs = h.sink.runs.lock().unwrap().clone();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Active);
        assert!(runs[0].route.is_empty());
        assert_eq!(runs[0].user_id, "runner-1");

        assert_eq!(
            *h.notifier.titles.lock().unwrap(),
            vec![DETECTED_TITLE.to_string(), STARTED_TITLE.to_string()]
        );

        // The trace ran out, which ends the session
        assert!(!h.service.is_monitoring());
        assert!(!h.service.monitor().platform().is_subscribed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_declined_prompt_starts_nothing() {
        let mut h = harness(ScriptedPlatform::new(running(5)), PromptResponse::Declined, true);

        assert!(h.service.start().await);
        h.service.run_until(std::future::pending()).await.unwrap();

        assert_eq!(h.prompt.times_asked(), 1);
        assert!(h.sink.runs.lock().unwrap().is_empty());
        assert_eq!(*h.notifier.titles.lock().unwrap(), vec![DETECTED_TITLE.to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dismissed_prompt_behaves_like_decline() {
        let mut h = harness(ScriptedPlatform::new(running(5)), PromptResponse::Dismissed, true);

        h.service.start().await;
        h.service.run_until(std::future::pending()).await.unwrap();

        assert_eq!(h.prompt.times_asked(), 1);
        assert!(h.sink.runs.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_notifications_disabled_still_prompts() {
        let mut h = harness(ScriptedPlatform::new(running(5)), PromptResponse::Accepted, false);

        h.service.start().await;
        h.service.run_until(std::future::pending()).await.unwrap();

        assert_eq!(h.prompt.times_asked(), 1);
        assert_eq!(h.sink.runs.lock().unwrap().len(), 1);
        assert!(h.notifier.titles.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_brief_movement_never_prompts() {
        // One light step, then standing still: cancelled after a second
        let mut readings = vec![AccelerometerReading::new(0.0, 0.0, 1.15)];
        readings.extend(vec![AccelerometerReading::new(0.0, 0.0, 1.0); 8]);
        let mut h = harness(ScriptedPlatform::new(readings), PromptResponse::Accepted, true);

        h.service.start().await;
        h.service.run_until(std::future::pending()).await.unwrap();

        assert_eq!(h.prompt.times_asked(), 0);
        assert!(h.notifier.titles.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_pending_trigger() {
        let mut h = harness(ScriptedPlatform::new(running(20)), PromptResponse::Accepted, true);

        h.service.start().await;
        h.service
            .run_until(tokio::time::sleep(Duration::from_millis(1500)))
            .await
            .unwrap();

        let status = h.service.status();
        assert!(status.is_monitoring);
        assert!(status.movement_detected);
        assert!(status.awaiting_confirmation);
        assert_eq!(status.intensity, 1.0);

        h.service.stop();
        assert_eq!(
            h.service.status(),
            AutoStartStatus {
                is_monitoring: false,
                movement_detected: false,
                intensity: 0.0,
                awaiting_confirmation: false,
            }
        );
        assert!(!h.service.monitor().platform().is_subscribed());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(h.prompt.times_asked(), 0);
        assert!(h.service.run_until(std::future::pending()).await.is_err());
    }

    #[tokio::test]
    async fn test_unavailable_sensor_does_not_monitor() {
        let mut h = harness(ScriptedPlatform::unavailable(), PromptResponse::Accepted, true);

        assert!(!h.service.start().await);
        assert!(!h.service.status().is_monitoring);
        assert!(matches!(
            h.service.run_until(std::future::pending()).await,
            Err(SensorError::NotMonitoring)
        ));
    }

    #[tokio::test]
    async fn test_start_twice_keeps_one_subscription() {
        let mut h = harness(ScriptedPlatform::new(vec![]), PromptResponse::Accepted, true);

        assert!(h.service.start().await);
        assert!(h.service.start().await);
        assert_eq!(h.service.monitor().platform().subscribe_calls(), 1);
        assert_eq!(h.service.monitor().status().observer_count, 1);
    }

    #[tokio::test]
    async fn test_manual_trigger_respects_cooldown() {
        let mut h = harness(ScriptedPlatform::new(vec![]), PromptResponse::Declined, true);
        h.service.start().await;

        assert_eq!(h.service.trigger_auto_start().await, TriggerOutcome::Prompt);
        assert!(matches!(
            h.service.trigger_auto_start().await,
            TriggerOutcome::CooledDown { .. }
        ));
        assert_eq!(h.prompt.times_asked(), 1);
    }

    #[tokio::test]
    async fn test_delivery_failures_are_not_fatal() {
        let prompt = ScriptedPrompt::always(PromptResponse::Accepted);
        let notifier = CapturingNotifier {
            fail: true,
            ..Default::default()
        };

        let mut service = AutoStartService::new(
            ActivityMonitor::new(ScriptedPlatform::new(vec![]), MonitorConfig::default()),
            AutoStartConfig::default(),
            Box::new(notifier.clone()),
            Box::new(prompt.clone()),
            Box::new(BrokenSink),
            ServiceOptions::default(),
        );

        service.start().await;
        assert_eq!(service.trigger_auto_start().await, TriggerOutcome::Prompt);

        // The prompt is still shown; "run started" is skipped after the sink fails
        assert_eq!(prompt.times_asked(), 1);
        assert_eq!(*notifier.titles.lock().unwrap(), vec![DETECTED_TITLE.to_string()]);
    }

    #[test]
    fn test_completed_body_formats_time() {
        let mut run = RunRecord::new_active("u");
        run.distance = 5.237;
        run.duration = 1505;
        assert_eq!(completed_body(&run), "Distance: 5.24 km, time: 25:05");
    }
}
