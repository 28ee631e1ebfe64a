use anyhow::Result;
use std::sync::{Arc, Mutex};
use std::thread;

use eyegaze_lib::calibration::{CalibrationSession, CalibrationStatus};
use eyegaze_lib::models::CalibrationResult;
use eyegaze_lib::settings::CalibrationConfig;
use eyegaze_lib::tracker::{
    CalibrationHandler, ClientMode, RecordingTarget, SimulatedTracker, TrackerControl,
};

const PRODUCERS: usize = 8;
const CALLBACKS_PER_PRODUCER: usize = 2_000;

fn running_session() -> Result<CalibrationSession> {
    let tracker = Arc::new(SimulatedTracker::new());
    tracker.activate(ClientMode::Push)?;
    let mut session = CalibrationSession::new(CalibrationConfig::default(), tracker)?
        .with_target(Box::new(RecordingTarget::new()));
    session.start()?;
    // Consume the tracker's start acknowledgement.
    assert_eq!(session.tick(), 1);
    Ok(session)
}

#[tokio::test]
async fn callbacks_from_many_threads_apply_once_in_delivery_order() -> Result<()> {
    let mut session = running_session()?;
    let inbox = session.inbox();

    // Stamping and delivering under one lock fixes a single global delivery order.
    let delivery = Arc::new(Mutex::new(0u64));

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|_| {
            let inbox = inbox.clone();
            let delivery = Arc::clone(&delivery);
            thread::spawn(move || {
                for _ in 0..CALLBACKS_PER_PRODUCER {
                    let mut next = delivery.lock().unwrap();
                    inbox.on_calibration_progress(*next as f64);
                    *next += 1;
                }
            })
        })
        .collect();

    // This thread is the only one that ever runs session work.
    let mut applied = 0;
    loop {
        let finished = producers.iter().all(|p| p.is_finished());
        applied += session.tick();
        if finished {
            applied += session.tick();
            break;
        }
        thread::yield_now();
    }
    for producer in producers {
        producer.join().unwrap();
    }

    let total = PRODUCERS * CALLBACKS_PER_PRODUCER;
    assert_eq!(applied, total);
    assert_eq!(*delivery.lock().unwrap(), total as u64);

    let expected: Vec<f64> = (0..total).map(|n| n as f64).collect();
    assert_eq!(session.state().progress_history, expected);
    assert_eq!(session.snapshot().progress, (total - 1) as f64);
    assert!(session.status().is_running());
    Ok(())
}

#[tokio::test]
async fn result_delivered_from_another_thread_is_applied_on_tick() -> Result<()> {
    let mut session = running_session()?;
    let inbox = session.inbox();

    thread::spawn(move || {
        inbox.on_calibration_processing();
        inbox.on_calibration_result(CalibrationResult {
            valid: true,
            points: Vec::new(),
            average_error_deg: 0.5,
        });
    })
    .join()
    .unwrap();

    // Nothing changes until the driver ticks.
    assert_eq!(session.status(), CalibrationStatus::GeneratingPoints);
    assert_eq!(session.tick(), 2);
    assert_eq!(session.status(), CalibrationStatus::Succeeded);
    assert_eq!(session.tick(), 0);
    Ok(())
}
