use super::*;
use chrono::NaiveDate;

fn at(hour: u32, minute: u32, second: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 10, 19)
        .expect("date")
        .and_hms_opt(hour, minute, second)
        .expect("time")
}

fn running(engine: &TimerEngine) -> u64 {
    engine.run_generation().expect("timer should be running")
}

#[test]
fn countdown_is_monotonic_and_stops_at_zero() {
    let mut engine = TimerEngine::new();
    engine.start_countdown(3, None);
    let generation = running(&engine);

    let mut seen = Vec::new();
    for _ in 0..6 {
        engine.tick(generation);
        seen.push(engine.state().expect("state").remaining_seconds);
    }
    assert_eq!(seen, vec![2, 1, 0, 0, 0, 0]);
    let state = engine.state().expect("state");
    assert_eq!(state.status, TimerStatus::TimeUp);
    assert_eq!(engine.run_generation(), None);
}

#[test]
fn pausing_halts_decrement_until_resumed() {
    let mut engine = TimerEngine::new();
    engine.start_countdown(10, None);
    let generation = running(&engine);
    assert_eq!(engine.tick(generation), TickOutcome::Decremented);

    engine.set_paused(true);
    assert_eq!(engine.run_generation(), None);
    assert_eq!(engine.tick(generation), TickOutcome::Ignored);
    assert_eq!(engine.state().expect("state").remaining_seconds, 9);

    engine.toggle_pause();
    let resumed = running(&engine);
    assert_ne!(resumed, generation, "resuming installs a fresh driver");
    assert_eq!(engine.tick(generation), TickOutcome::Ignored);
    assert_eq!(engine.tick(resumed), TickOutcome::Decremented);
    assert_eq!(engine.state().expect("state").remaining_seconds, 8);
}

#[test]
fn restarting_invalidates_previous_generation() {
    let mut engine = TimerEngine::new();
    engine.start_countdown(100, None);
    let first = running(&engine);
    engine.start_countdown(50, None);
    let second = running(&engine);

    assert_eq!(engine.tick(first), TickOutcome::Ignored);
    assert_eq!(engine.tick(second), TickOutcome::Decremented);
    assert_eq!(engine.state().expect("state").remaining_seconds, 49);
}

#[test]
fn event_mode_expires_into_waiting_not_alarm() {
    let mut engine = TimerEngine::new();
    engine.start_event(NaiveTime::from_hms_opt(10, 0, 0).expect("time"), at(9, 59, 58));
    let generation = running(&engine);
    let state = engine.state().expect("state");
    assert!(state.is_event_mode);
    assert_eq!(state.remaining_seconds, 2);

    engine.tick(generation);
    assert_eq!(engine.tick(generation), TickOutcome::Expired);
    assert_eq!(engine.state().expect("state").status, TimerStatus::Waiting);
}

#[test]
fn event_target_earlier_than_now_rolls_to_next_day() {
    let target = parse_event_target("08:30").expect("target");
    assert_eq!(event_countdown_seconds(target, at(9, 0, 0)), 23 * 3600 + 30 * 60);
    assert_eq!(event_countdown_seconds(target, at(8, 0, 0)), 30 * 60);
    assert_eq!(event_countdown_seconds(target, at(8, 30, 0)), 0);
}

#[test]
fn rejects_malformed_event_targets() {
    assert!(parse_event_target("25:00").is_err());
    assert!(parse_event_target("noon").is_err());
    assert!(parse_event_target("").is_err());
    assert!(parse_event_target(" 18:45 ").is_ok());
}

#[test]
fn stop_is_idempotent_and_clears_active_agenda() {
    let mut engine = TimerEngine::new();
    let id = engine.add_agenda(None, 300, "Sermon".into(), "Pastor".into(), 1_000);
    engine.start_agenda(id).expect("start");
    assert_eq!(engine.state().expect("state").active_agenda_id, Some(id));

    engine.stop();
    let once = engine.clone();
    engine.stop();
    assert_eq!(engine, once);
    assert_eq!(engine.state(), None);
    assert_eq!(engine.agenda().len(), 1, "stop keeps the agenda list");
}

#[test]
fn add_minute_bumps_live_countdown_only_for_active_item() {
    let mut engine = TimerEngine::new();
    let active = engine.add_agenda(None, 120, "Worship".into(), String::new(), 1_000);
    let other = engine.add_agenda(None, 60, "Notices".into(), String::new(), 1_000);
    engine.start_agenda(active).expect("start");
    let generation = running(&engine);
    engine.tick(generation);

    engine.add_minute(other).expect("other");
    assert_eq!(engine.state().expect("state").remaining_seconds, 119);
    assert_eq!(engine.agenda()[1].duration_seconds, 120);

    engine.add_minute(active).expect("active");
    assert_eq!(engine.state().expect("state").remaining_seconds, 179);
    assert_eq!(engine.agenda()[0].duration_seconds, 180);
    assert_eq!(engine.run_generation(), Some(generation));
}

#[test]
fn add_minute_revives_an_expired_active_countdown() {
    let mut engine = TimerEngine::new();
    let id = engine.add_agenda(None, 1, "Prayer".into(), String::new(), 1_000);
    engine.start_agenda(id).expect("start");
    let generation = running(&engine);
    assert_eq!(engine.tick(generation), TickOutcome::Expired);

    engine.add_minute(id).expect("add minute");
    let state = engine.state().expect("state");
    assert_eq!(state.status, TimerStatus::Counting);
    assert_eq!(state.remaining_seconds, 60);
    assert!(engine.run_generation().is_some_and(|next| next != generation));
}

#[test]
fn add_minute_rejects_durations_that_would_overflow() {
    let mut engine = TimerEngine::new();
    let id = engine.add_agenda(Some(AgendaId(7)), u64::MAX, "x".into(), String::new(), 1_000);
    let before = engine.clone();
    assert_eq!(engine.add_minute(id), Err(TimerError::DurationOverflow(id)));
    assert_eq!(engine, before);

    let near_max = engine.add_agenda(None, u64::MAX - 90, "y".into(), String::new(), 1_000);
    engine.start_agenda(near_max).expect("start");
    engine.add_minute(near_max).expect("room for one minute");
    let live = engine.clone();
    assert_eq!(
        engine.add_minute(near_max),
        Err(TimerError::DurationOverflow(near_max))
    );
    assert_eq!(engine, live, "rejected extension leaves agenda and countdown alone");
}

#[test]
fn agenda_ids_stay_unique_after_the_largest_id() {
    let mut engine = TimerEngine::new();
    let max = engine.add_agenda(Some(AgendaId(i64::MAX)), 60, "A".into(), String::new(), 1_000);
    let next = engine.add_agenda(None, 60, "B".into(), String::new(), 1_000);
    let after = engine.add_agenda(None, 60, "C".into(), String::new(), 1_000);
    assert_eq!(max, AgendaId(i64::MAX));
    assert_ne!(next, max);
    assert_ne!(after, max);
    assert_ne!(after, next);
}

#[test]
fn agenda_ids_are_unique_even_within_one_millisecond() {
    let mut engine = TimerEngine::new();
    let first = engine.add_agenda(None, 60, "A".into(), String::new(), 5_000);
    let second = engine.add_agenda(None, 60, "B".into(), String::new(), 5_000);
    let requested = engine.add_agenda(Some(first), 60, "C".into(), String::new(), 5_000);
    assert_eq!(first, AgendaId(5_000));
    assert_eq!(second, AgendaId(5_001));
    assert_eq!(requested, AgendaId(5_002));

    let explicit = engine.add_agenda(Some(AgendaId(42)), 60, "D".into(), String::new(), 5_000);
    assert_eq!(explicit, AgendaId(42));
}

#[test]
fn edit_and_delete_report_unknown_items() {
    let mut engine = TimerEngine::new();
    let id = engine.add_agenda(None, 60, "Old".into(), "Ann".into(), 1);
    engine
        .edit_agenda(
            id,
            AgendaEdit {
                label: Some("New".into()),
                ..AgendaEdit::default()
            },
        )
        .expect("edit");
    assert_eq!(engine.agenda()[0].label, "New");
    assert_eq!(engine.agenda()[0].anchor, "Ann");
    assert_eq!(engine.agenda()[0].duration_seconds, 60);

    assert_eq!(
        engine.delete_agenda(AgendaId(999)),
        Err(TimerError::UnknownAgendaItem(AgendaId(999)))
    );
    assert_eq!(
        engine.edit_agenda(AgendaId(999), AgendaEdit::default()),
        Err(TimerError::UnknownAgendaItem(AgendaId(999)))
    );
}

#[test]
fn deleting_active_item_keeps_countdown_running() {
    let mut engine = TimerEngine::new();
    let id = engine.add_agenda(None, 60, "Talk".into(), String::new(), 1);
    engine.start_agenda(id).expect("start");
    engine.delete_agenda(id).expect("delete");

    let state = engine.state().expect("state");
    assert_eq!(state.active_agenda_id, None);
    assert_eq!(state.remaining_seconds, 60);
    assert!(engine.run_generation().is_some());
}

#[test]
fn zero_second_countdown_is_immediately_time_up() {
    let mut engine = TimerEngine::new();
    engine.start_countdown(0, None);
    let state = engine.state().expect("zero is an active state");
    assert_eq!(state.remaining_seconds, 0);
    assert_eq!(state.status, TimerStatus::TimeUp);
    assert_eq!(engine.run_generation(), None);
}

#[tokio::test(start_paused = true)]
async fn tick_driver_replaces_previous_task() {
    let (tx, mut rx) = tokio::sync::mpsc::channel(8);
    let weak = tx.downgrade();
    let mut driver = TickDriver::new(Duration::from_secs(1));

    driver.sync(Some(1), &weak);
    driver.sync(Some(2), &weak);
    assert_eq!(driver.active_generation(), Some(2));

    tokio::time::advance(Duration::from_millis(1_500)).await;
    let Some(Command::Tick { generation }) = rx.recv().await else {
        panic!("expected a tick");
    };
    assert_eq!(generation, 2);
    assert!(rx.try_recv().is_err(), "only one driver may be ticking");

    driver.sync(None, &weak);
    assert_eq!(driver.active_generation(), None);
    tokio::time::advance(Duration::from_secs(3)).await;
    assert!(rx.try_recv().is_err());
}
