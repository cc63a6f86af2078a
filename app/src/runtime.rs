// Auto-start service wiring shared by the daemon and the CLI

use crate::config::AppConfig;
use anyhow::Result;
use pacer_hal::{ConfirmationPrompt, MotionPlatform, Notifier};
use pacer_sensors::monitor::ActivityMonitor;
use pacer_sensors::recording::RunJournal;
use pacer_sensors::service::AutoStartService;
use pacer_sensors::{LoggingObserver, ObserverId};
use std::future::Future;
use std::path::Path;

/// Observer that logs every classified sample at debug level
const ACTIVITY_LOG: &str = "activity-log";

/// Monitor `platform` until `shutdown` resolves or the sensor stops.
///
/// Accepted prompts are journaled under the configured data directory.
/// Returns `Ok(false)` when monitoring could not start because the sensor is
/// missing or permission was denied.
pub async fn run_service<P, F>(
    config: &AppConfig,
    platform: P,
    notifier: Box<dyn Notifier>,
    prompt: Box<dyn ConfirmationPrompt>,
    shutdown: F,
) -> Result<bool>
where
    P: MotionPlatform,
    F: Future<Output = ()>,
{
    let journal = RunJournal::new(Path::new(&config.data_directory))?;
    tracing::info!("Run journal at {:?}", journal.path());

    let monitor = ActivityMonitor::new(platform, config.monitor_config());
    let mut service = AutoStartService::new(
        monitor,
        config.auto_start_config(),
        notifier,
        prompt,
        Box::new(journal),
        config.service_options(),
    );

    if !service.start().await {
        tracing::warn!("Motion sensor unavailable or permission denied; auto-start is inactive");
        return Ok(false);
    }

    service
        .monitor_mut()
        .start_detection(ObserverId::new(ACTIVITY_LOG), Box::new(LoggingObserver))
        .await;

    service.run_until(shutdown).await?;

    let status = service.status();
    tracing::debug!(
        movement = status.movement_detected,
        intensity = status.intensity,
        "Final auto-start status"
    );

    service.monitor_mut().stop_detection(None);
    service.stop();
    Ok(true)
}
