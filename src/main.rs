use chrono::{Local, NaiveDateTime, Timelike};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use wristband_sync::domain::calculations;
use wristband_sync::infrastructure::logging::init_logger;
use wristband_sync::prelude::*;

/// Days printed from the collected history
const REPORT_DAYS: usize = 7;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = match SettingsService::new() {
        Ok(service) => service.get().clone(),
        Err(e) => {
            eprintln!("Failed to load settings, using defaults: {}", e);
            Settings::default()
        }
    };

    let _logging_guard = init_logger(&settings.log_settings)?;
    info!("Starting Wristband Sync");

    let (transport_tx, transport_rx) = mpsc::unbounded_channel();
    let band = SimulatedWristband::with_sample_data(transport_tx);
    let protocol =
        WristbandProtocol::with_parts(band, ProfileTable::default(), settings.protocol.clone());

    let event_log = Arc::new(EventLog::new());
    protocol.subscribe(event_log.clone());

    let (observer, mut events) = ChannelObserver::channel();
    protocol.subscribe(Arc::new(observer));
    let event_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match &event {
                WristbandEvent::Error { .. } => warn!("{}", event),
                WristbandEvent::DebugMessage(_) => {}
                _ => info!("{}", event),
            }
        }
    });

    let now = Local::now().naive_local();
    let mut service = SyncService::new(protocol, transport_rx);
    let result = service.sync_once(&settings.user, now).await;
    // Dropping the protocol closes the event channel
    drop(service);
    let _ = event_task.await;

    match result {
        Ok(steps) => print_report(&steps, &settings.user, now),
        Err(e) => error!("Sync failed: {:#}", e),
    }

    println!();
    println!("Event log:");
    for record in event_log.records() {
        let marker = if record.is_error { "!" } else { " " };
        println!("{} {}", marker, record.message);
    }

    Ok(())
}

fn print_report(steps: &StepsData, user: &UserProfile, now: NaiveDateTime) {
    let mut days = steps.history_list(now.date());
    for day in &mut days {
        let count = u32::try_from(day.steps).unwrap_or(0);
        day.distance = i64::from(calculations::steps_to_meters(user.distance_per_step, count));
    }

    let age = calculations::age(&user.date_of_birth, now.date());
    if let (Some(today), Ok(age)) = (days.first_mut(), age) {
        today.calories_burned = calculations::steps_to_calories(
            steps.steps_today(),
            age,
            user.weight,
            user.height,
            &user.gender,
            now.hour(),
            now.minute(),
        );
    }

    println!(
        "Collected {} step(s), {} minute(s) of exercise",
        steps.total_steps_walked(),
        steps.total_exercise_time()
    );
    for day in days.iter().take(REPORT_DAYS) {
        println!("  {}", day.format_compact());
    }
}
