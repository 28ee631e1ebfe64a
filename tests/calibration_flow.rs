use anyhow::Result;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;

use eyegaze_lib::calibration::{CalibrationSession, CalibrationStatus};
use eyegaze_lib::positioning::ScreenGeometry;
use eyegaze_lib::settings::CalibrationConfig;
use eyegaze_lib::tracker::{
    ClientMode, RecordingTarget, ScriptedOutcome, SimulatedTracker, TargetEvent, TrackerCommand,
    TrackerControl,
};

struct Harness {
    tracker: Arc<SimulatedTracker>,
    target: RecordingTarget,
    session: CalibrationSession,
}

fn harness(script: Vec<ScriptedOutcome>) -> Result<Harness> {
    let tracker = Arc::new(SimulatedTracker::with_script(script));
    tracker.activate(ClientMode::Push)?;
    let target = RecordingTarget::new();
    let session = CalibrationSession::new(CalibrationConfig::default(), tracker.clone())?
        .with_target(Box::new(target.clone()))
        .with_rng(StdRng::seed_from_u64(11));
    Ok(Harness {
        tracker,
        target,
        session,
    })
}

/// Ticks the session on virtual time until `done` holds.
async fn drive_until<F>(session: &mut CalibrationSession, mut done: F) -> bool
where
    F: FnMut(&CalibrationSession) -> bool,
{
    for _ in 0..20_000 {
        session.tick();
        if done(session) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

fn count(commands: &[TrackerCommand], wanted: fn(&TrackerCommand) -> bool) -> usize {
    commands.iter().filter(|c| wanted(c)).count()
}

fn is_point_start(command: &TrackerCommand) -> bool {
    matches!(command, TrackerCommand::PointStart(..))
}

#[tokio::test(start_paused = true)]
async fn resamples_flagged_points_until_valid() -> Result<()> {
    let Harness {
        tracker,
        target,
        mut session,
    } = harness(vec![
        ScriptedOutcome::Invalid { flagged: 2 },
        ScriptedOutcome::Invalid { flagged: 1 },
        ScriptedOutcome::Valid,
    ])?;

    session.start()?;
    assert!(session.is_busy());
    assert!(drive_until(&mut session, |s| s.status().is_terminal()).await);

    assert_eq!(session.status(), CalibrationStatus::Succeeded);
    assert!(session.succeeded());
    assert!(!session.is_busy());
    assert_eq!(session.attempts(), 2);
    assert_eq!(session.state().resamples, 3);
    assert_eq!(session.snapshot().prompt(), "Calibration successful: Continue");

    let commands = tracker.commands();
    assert_eq!(count(&commands, is_point_start), 12);
    assert_eq!(count(&commands, |c| *c == TrackerCommand::PointEnd), 12);
    assert!(!commands.contains(&TrackerCommand::Abort));
    assert_eq!(target.shown_points().len(), 12);
    assert_eq!(target.events().last(), Some(&TargetEvent::Hidden));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn points_are_presented_with_spacing() -> Result<()> {
    let Harness {
        tracker,
        mut session,
        ..
    } = harness(Vec::new())?;

    session.start()?;
    let begun = tokio::time::Instant::now();
    assert!(
        drive_until(&mut session, |s| matches!(
            s.status(),
            CalibrationStatus::Sampling { .. }
        ))
        .await
    );
    assert!(begun.elapsed() >= Duration::from_millis(250));

    // Sampling starts only after the start delay.
    assert_eq!(count(&tracker.commands(), is_point_start), 0);
    assert!(drive_until(&mut session, |_| count(&tracker.commands(), is_point_start) == 1).await);
    assert!(!tracker.commands().contains(&TrackerCommand::PointEnd));

    assert!(drive_until(&mut session, |s| s.status().is_terminal()).await);
    assert_eq!(session.status(), CalibrationStatus::Succeeded);
    assert_eq!(session.attempts(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn aborts_when_too_many_points_need_resampling() -> Result<()> {
    let Harness {
        tracker,
        target,
        mut session,
    } = harness(vec![ScriptedOutcome::Invalid { flagged: 4 }; 3])?;

    session.start()?;
    assert!(drive_until(&mut session, |s| s.status().is_terminal()).await);

    assert_eq!(session.status(), CalibrationStatus::Aborted);
    assert_eq!(session.attempts(), 1);
    assert!(session.state().queue.is_empty());
    assert!(!session.is_busy());
    assert_eq!(tracker.commands().last(), Some(&TrackerCommand::Abort));
    assert_eq!(target.shown_points().len(), 9);
    assert_eq!(session.snapshot().prompt(), "Calibration failed: Recalibrate");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn aborts_after_attempt_limit() -> Result<()> {
    let Harness {
        tracker,
        mut session,
        ..
    } = harness(vec![ScriptedOutcome::Invalid { flagged: 1 }; 3])?;

    session.start()?;
    assert!(drive_until(&mut session, |s| s.status().is_terminal()).await);

    assert_eq!(session.status(), CalibrationStatus::Aborted);
    assert_eq!(session.attempts(), 3);
    assert_eq!(count(&tracker.commands(), is_point_start), 11);
    assert!(!tracker.is_calibrating());

    // Nothing fires after the abort.
    let before = tracker.commands().len();
    tokio::time::sleep(Duration::from_secs(5)).await;
    session.tick();
    assert_eq!(tracker.commands().len(), before);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn restart_ignores_timers_from_earlier_run() -> Result<()> {
    let Harness {
        tracker,
        target,
        mut session,
    } = harness(Vec::new())?;

    session.start()?;
    assert!(
        drive_until(&mut session, |s| matches!(
            s.status(),
            CalibrationStatus::Sampling { .. }
        ))
        .await
    );

    session.reset();
    assert_eq!(session.status(), CalibrationStatus::Idle);
    assert!(tracker.commands().contains(&TrackerCommand::Abort));

    let restart_at = tracker.commands().len();
    let shown_before = target.shown_points().len();
    session.start()?;
    assert!(drive_until(&mut session, |s| s.status().is_terminal()).await);
    assert_eq!(session.status(), CalibrationStatus::Succeeded);

    let after = &tracker.commands()[restart_at..];
    assert_eq!(count(after, is_point_start), 9);
    assert_eq!(count(after, |c| *c == TrackerCommand::PointEnd), 9);
    assert_eq!(target.shown_points().len() - shown_before, 9);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn succeeded_session_needs_reset_before_recalibrating() -> Result<()> {
    let Harness {
        tracker,
        mut session,
        ..
    } = harness(Vec::new())?;

    session.start()?;
    assert!(drive_until(&mut session, |s| s.status().is_terminal()).await);
    assert!(session.start().is_err());

    session.reset();
    assert_eq!(tracker.commands().last(), Some(&TrackerCommand::Clear));
    assert_eq!(session.snapshot().prompt(), "Click to calibrate");
    session.start()?;
    assert_eq!(session.status(), CalibrationStatus::GeneratingPoints);
    Ok(())
}

#[tokio::test]
async fn configuration_errors_are_reported() -> Result<()> {
    let tracker = Arc::new(SimulatedTracker::new());

    let mut no_target = CalibrationSession::new(CalibrationConfig::default(), tracker.clone())?;
    assert!(no_target.start().is_err());

    let mut inactive = CalibrationSession::new(CalibrationConfig::default(), tracker.clone())?
        .with_target(Box::new(RecordingTarget::new()));
    assert!(inactive.start().is_err());
    assert_eq!(inactive.status(), CalibrationStatus::Idle);

    let zero_screen = CalibrationConfig {
        screen: ScreenGeometry::new(0, 0),
        ..CalibrationConfig::default()
    };
    assert!(CalibrationSession::new(zero_screen, tracker.clone()).is_err());

    assert!(tracker.commands().is_empty());
    Ok(())
}
