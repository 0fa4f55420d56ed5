//! Countdown state machine, agenda bookkeeping and the tick driver.
//!
//! States: idle (no countdown) -> counting -> {paused <-> counting} -> expired.
//! `stop` returns to idle from anywhere. Each transition into a running
//! countdown gets a fresh generation; ticks stamped with any other generation
//! are ignored.

use std::time::Duration;

use chrono::{Duration as ChronoDuration, NaiveDateTime, NaiveTime};
use shared::{
    domain::{AgendaId, TimerTheme},
    protocol::{AgendaItem, TimerState, TimerStatus},
};
use thiserror::Error;
use tokio::{
    sync::mpsc::WeakSender,
    task::JoinHandle,
    time::{interval_at, Instant},
};
use tracing::debug;

use crate::Command;

pub const ADD_MINUTE_SECONDS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimerError {
    #[error("agenda item {0} does not exist")]
    UnknownAgendaItem(AgendaId),
    #[error("event target '{0}' is not a valid HH:MM time")]
    InvalidEventTarget(String),
    #[error("agenda item {0} cannot be extended any further")]
    DurationOverflow(AgendaId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Ignored,
    Decremented,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Countdown {
    remaining_seconds: u64,
    is_paused: bool,
    is_event_mode: bool,
    active_agenda_id: Option<AgendaId>,
    status: TimerStatus,
}

impl Countdown {
    fn running(&self) -> bool {
        self.status == TimerStatus::Counting && !self.is_paused
    }

    fn expire_if_done(&mut self) {
        if self.remaining_seconds == 0 && self.status == TimerStatus::Counting {
            self.status = if self.is_event_mode {
                TimerStatus::Waiting
            } else {
                TimerStatus::TimeUp
            };
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgendaEdit {
    pub duration_seconds: Option<u64>,
    pub label: Option<String>,
    pub anchor: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimerEngine {
    countdown: Option<Countdown>,
    theme: TimerTheme,
    agenda: Vec<AgendaItem>,
    last_agenda_id: i64,
    generation: u64,
}

impl TimerEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` means no timer is set.
    pub fn state(&self) -> Option<TimerState> {
        self.countdown.as_ref().map(|countdown| TimerState {
            remaining_seconds: countdown.remaining_seconds,
            is_paused: countdown.is_paused,
            is_event_mode: countdown.is_event_mode,
            theme: self.theme,
            active_agenda_id: countdown.active_agenda_id,
            status: countdown.status,
        })
    }

    pub fn agenda(&self) -> &[AgendaItem] {
        &self.agenda
    }

    pub fn theme(&self) -> TimerTheme {
        self.theme
    }

    /// Generation the tick driver must carry, or `None` when nothing should tick.
    pub fn run_generation(&self) -> Option<u64> {
        self.countdown
            .as_ref()
            .filter(|countdown| countdown.running())
            .map(|_| self.generation)
    }

    pub fn start_countdown(&mut self, seconds: u64, agenda_id: Option<AgendaId>) {
        self.install(Countdown {
            remaining_seconds: seconds,
            is_paused: false,
            is_event_mode: false,
            active_agenda_id: agenda_id,
            status: TimerStatus::Counting,
        });
    }

    /// Counts down to the next occurrence of `target` after `now`.
    pub fn start_event(&mut self, target: NaiveTime, now: NaiveDateTime) {
        self.install(Countdown {
            remaining_seconds: event_countdown_seconds(target, now),
            is_paused: false,
            is_event_mode: true,
            active_agenda_id: None,
            status: TimerStatus::Counting,
        });
    }

    fn install(&mut self, mut countdown: Countdown) {
        countdown.expire_if_done();
        self.generation += 1;
        self.countdown = Some(countdown);
    }

    pub fn stop(&mut self) {
        self.countdown = None;
    }

    pub fn set_paused(&mut self, paused: bool) {
        let Some(countdown) = self.countdown.as_mut() else {
            return;
        };
        if countdown.status != TimerStatus::Counting || countdown.is_paused == paused {
            return;
        }
        countdown.is_paused = paused;
        if !paused {
            self.generation += 1;
        }
    }

    pub fn toggle_pause(&mut self) {
        if let Some(paused) = self.countdown.as_ref().map(|countdown| countdown.is_paused) {
            self.set_paused(!paused);
        }
    }

    pub fn set_theme(&mut self, theme: TimerTheme) {
        self.theme = theme;
    }

    pub fn tick(&mut self, generation: u64) -> TickOutcome {
        if generation != self.generation {
            return TickOutcome::Ignored;
        }
        let Some(countdown) = self.countdown.as_mut().filter(|countdown| countdown.running())
        else {
            return TickOutcome::Ignored;
        };
        countdown.remaining_seconds = countdown.remaining_seconds.saturating_sub(1);
        countdown.expire_if_done();
        if countdown.status == TimerStatus::Counting {
            TickOutcome::Decremented
        } else {
            TickOutcome::Expired
        }
    }

    /// Appends an agenda item. A requested id that is already taken is
    /// replaced by a fresh timestamp-derived one.
    pub fn add_agenda(
        &mut self,
        requested: Option<AgendaId>,
        duration_seconds: u64,
        label: String,
        anchor: String,
        now_millis: i64,
    ) -> AgendaId {
        let id = self.allocate_agenda_id(requested, now_millis);
        self.agenda.push(AgendaItem {
            id,
            duration_seconds,
            label,
            anchor,
        });
        id
    }

    fn allocate_agenda_id(&mut self, requested: Option<AgendaId>, now_millis: i64) -> AgendaId {
        if let Some(id) = requested.filter(|id| !self.agenda_id_taken(*id)) {
            self.last_agenda_id = self.last_agenda_id.max(id.0);
            return id;
        }
        let next = AgendaId(now_millis.max(self.last_agenda_id.saturating_add(1)));
        if !self.agenda_id_taken(next) {
            self.last_agenda_id = next.0;
            return next;
        }
        // Only reachable once ids hit i64::MAX; reuse the lowest free one.
        (1..=i64::MAX)
            .map(AgendaId)
            .find(|id| !self.agenda_id_taken(*id))
            .unwrap_or(next)
    }

    fn agenda_id_taken(&self, id: AgendaId) -> bool {
        self.agenda.iter().any(|item| item.id == id)
    }

    pub fn edit_agenda(&mut self, id: AgendaId, edit: AgendaEdit) -> Result<(), TimerError> {
        let item = self.agenda_item_mut(id)?;
        if let Some(duration_seconds) = edit.duration_seconds {
            item.duration_seconds = duration_seconds;
        }
        if let Some(label) = edit.label {
            item.label = label;
        }
        if let Some(anchor) = edit.anchor {
            item.anchor = anchor;
        }
        Ok(())
    }

    /// Removes the item. A countdown started from it keeps running but is no
    /// longer attributed to it.
    pub fn delete_agenda(&mut self, id: AgendaId) -> Result<(), TimerError> {
        let before = self.agenda.len();
        self.agenda.retain(|item| item.id != id);
        if self.agenda.len() == before {
            return Err(TimerError::UnknownAgendaItem(id));
        }
        if let Some(countdown) = self
            .countdown
            .as_mut()
            .filter(|countdown| countdown.active_agenda_id == Some(id))
        {
            countdown.active_agenda_id = None;
        }
        Ok(())
    }

    pub fn start_agenda(&mut self, id: AgendaId) -> Result<(), TimerError> {
        let duration = self.agenda_item_mut(id)?.duration_seconds;
        self.start_countdown(duration, Some(id));
        Ok(())
    }

    /// "+1 minute": always extends the stored duration, and extends the live
    /// countdown only when this item is the active one.
    pub fn add_minute(&mut self, id: AgendaId) -> Result<(), TimerError> {
        let extend = |seconds: u64| {
            seconds
                .checked_add(ADD_MINUTE_SECONDS)
                .ok_or(TimerError::DurationOverflow(id))
        };
        let duration = extend(self.agenda_item_mut(id)?.duration_seconds)?;
        let remaining = self
            .countdown
            .as_ref()
            .filter(|countdown| countdown.active_agenda_id == Some(id))
            .map(|countdown| extend(countdown.remaining_seconds))
            .transpose()?;

        self.agenda_item_mut(id)?.duration_seconds = duration;
        let (Some(remaining), Some(countdown)) = (remaining, self.countdown.as_mut()) else {
            return Ok(());
        };
        countdown.remaining_seconds = remaining;
        if countdown.status != TimerStatus::Counting {
            countdown.status = TimerStatus::Counting;
            self.generation += 1;
        }
        Ok(())
    }

    fn agenda_item_mut(&mut self, id: AgendaId) -> Result<&mut AgendaItem, TimerError> {
        self.agenda
            .iter_mut()
            .find(|item| item.id == id)
            .ok_or(TimerError::UnknownAgendaItem(id))
    }
}

pub fn parse_event_target(raw: &str) -> Result<NaiveTime, TimerError> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|_| TimerError::InvalidEventTarget(raw.to_string()))
}

/// Seconds from `now` until the next `target` wall-clock time; a target
/// earlier than `now` rolls over to the next day.
pub fn event_countdown_seconds(target: NaiveTime, now: NaiveDateTime) -> u64 {
    let mut at = now.date().and_time(target);
    if at < now {
        at += ChronoDuration::days(1);
    }
    (at - now).num_seconds().max(0) as u64
}

/// Owns the single task that turns wall time into `Tick` commands.
pub(crate) struct TickDriver {
    period: Duration,
    active: Option<(u64, JoinHandle<()>)>,
}

impl TickDriver {
    pub(crate) fn new(period: Duration) -> Self {
        Self {
            period,
            active: None,
        }
    }

    /// Makes the running driver match `generation`: stops it for `None`,
    /// replaces it when the generation moved on, leaves it alone otherwise.
    pub(crate) fn sync(&mut self, generation: Option<u64>, commands: &WeakSender<Command>) {
        let current = self.active.as_ref().map(|(generation, _)| *generation);
        if current == generation {
            return;
        }
        self.stop();
        if let Some(generation) = generation {
            self.install(generation, commands.clone());
        }
    }

    fn install(&mut self, generation: u64, commands: WeakSender<Command>) {
        let period = self.period;
        let first_tick = Instant::now() + period;
        let handle = tokio::spawn(async move {
            let mut ticks = interval_at(first_tick, period);
            loop {
                ticks.tick().await;
                let Some(commands) = commands.upgrade() else {
                    break;
                };
                if commands.send(Command::Tick { generation }).await.is_err() {
                    break;
                }
            }
        });
        debug!(generation, "tick driver installed");
        self.active = Some((generation, handle));
    }

    pub(crate) fn stop(&mut self) {
        if let Some((generation, handle)) = self.active.take() {
            handle.abort();
            debug!(generation, "tick driver stopped");
        }
    }

    #[cfg(test)]
    pub(crate) fn active_generation(&self) -> Option<u64> {
        self.active.as_ref().map(|(generation, _)| *generation)
    }
}

impl Drop for TickDriver {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
#[path = "tests/timer_tests.rs"]
mod tests;
