//! The single authoritative presentation record.
//!
//! Intents are applied to a copy of the current state and committed only on
//! success, so a rejected intent never leaves a half-applied store behind.

use std::collections::HashSet;

use chrono::{Local, NaiveDateTime};
use shared::{
    error::{ApiError, ErrorCode},
    protocol::{
        BackgroundSource, Intent, Layer, PresentationContent, PresentationSnapshot,
        PresentationStyle, StylePatch,
    },
};
use thiserror::Error;

use crate::timer::{parse_event_target, AgendaEdit, TickOutcome, TimerEngine, TimerError};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum IntentError {
    #[error(transparent)]
    Timer(#[from] TimerError),
    #[error("layer '{id}' is invalid: {reason}")]
    InvalidLayer { id: String, reason: String },
    #[error("layer id '{0}' is used more than once")]
    DuplicateLayer(String),
    #[error("background {0} url must not be empty")]
    EmptyBackgroundUrl(&'static str),
}

impl IntentError {
    pub fn api_error(&self) -> ApiError {
        let code = match self {
            IntentError::Timer(TimerError::UnknownAgendaItem(_)) => ErrorCode::NotFound,
            _ => ErrorCode::Validation,
        };
        ApiError::new(code, self.to_string())
    }
}

/// Local wall time plus epoch millis, captured once per intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WallClock {
    pub local: NaiveDateTime,
    pub epoch_millis: i64,
}

impl WallClock {
    pub fn now() -> Self {
        let now = Local::now();
        Self {
            local: now.naive_local(),
            epoch_millis: now.timestamp_millis(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Applied {
    pub snapshot: PresentationSnapshot,
    /// `false` when the intent was valid but left the state as it was.
    pub changed: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct StoreState {
    timer: TimerEngine,
    content: PresentationContent,
    style: PresentationStyle,
}

impl StoreState {
    fn apply(&mut self, intent: Intent, clock: &WallClock) -> Result<(), IntentError> {
        match intent {
            Intent::SetTimer { seconds, agenda_id } => {
                if let Some(id) = agenda_id {
                    if !self.timer.agenda().iter().any(|item| item.id == id) {
                        return Err(TimerError::UnknownAgendaItem(id).into());
                    }
                }
                self.timer.start_countdown(seconds, agenda_id);
            }
            Intent::StartEvent { target } => {
                let target = parse_event_target(&target)?;
                self.timer.start_event(target, clock.local);
            }
            Intent::StopTimer => self.timer.stop(),
            Intent::SetPaused { paused } => self.timer.set_paused(paused),
            Intent::TogglePause => self.timer.toggle_pause(),
            Intent::SetTheme { theme } => self.timer.set_theme(theme),
            Intent::AddAgenda {
                id,
                duration_seconds,
                label,
                anchor,
            } => {
                self.timer.add_agenda(
                    id,
                    duration_seconds,
                    label.trim().to_string(),
                    anchor.trim().to_string(),
                    clock.epoch_millis,
                );
            }
            Intent::EditAgenda {
                id,
                duration_seconds,
                label,
                anchor,
            } => {
                let edit = AgendaEdit {
                    duration_seconds,
                    label: label.map(|label| label.trim().to_string()),
                    anchor: anchor.map(|anchor| anchor.trim().to_string()),
                };
                self.timer.edit_agenda(id, edit)?;
            }
            Intent::DeleteAgenda { id } => self.timer.delete_agenda(id)?,
            Intent::StartAgenda { id } => self.timer.start_agenda(id)?,
            Intent::AddMinute { id } => self.timer.add_minute(id)?,
            Intent::SetContent { content } => {
                if let PresentationContent::CustomLayers { layers } = &content {
                    validate_layers(layers)?;
                }
                self.content = content;
            }
            Intent::ClearContent => self.content = PresentationContent::None,
            Intent::SetStyle { patch } => apply_style_patch(&mut self.style, patch)?,
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct PresentationStore {
    revision: u64,
    state: StoreState,
}

impl PresentationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn apply(&mut self, intent: Intent, clock: &WallClock) -> Result<Applied, IntentError> {
        let mut next = self.state.clone();
        next.apply(intent, clock)?;

        let changed = next != self.state;
        if changed {
            self.state = next;
            self.revision += 1;
        }
        Ok(Applied {
            snapshot: self.snapshot(),
            changed,
        })
    }

    /// Applies one tick of the driver stamped `generation`. Returns the new
    /// snapshot only when the countdown actually moved.
    pub fn tick(&mut self, generation: u64) -> Option<PresentationSnapshot> {
        match self.state.timer.tick(generation) {
            TickOutcome::Ignored => None,
            TickOutcome::Decremented | TickOutcome::Expired => {
                self.revision += 1;
                Some(self.snapshot())
            }
        }
    }

    pub fn run_generation(&self) -> Option<u64> {
        self.state.timer.run_generation()
    }

    pub fn snapshot(&self) -> PresentationSnapshot {
        PresentationSnapshot {
            revision: self.revision,
            timer: self.state.timer.state(),
            agenda: self.state.timer.agenda().to_vec(),
            content: self.state.content.clone(),
            style: self.state.style.clone(),
        }
    }
}

fn validate_layers(layers: &[Layer]) -> Result<(), IntentError> {
    let mut seen = HashSet::new();
    for layer in layers {
        let invalid = |reason: &str| IntentError::InvalidLayer {
            id: layer.id.clone(),
            reason: reason.to_string(),
        };

        if layer.id.trim().is_empty() {
            return Err(invalid("id must not be empty"));
        }
        if !seen.insert(layer.id.as_str()) {
            return Err(IntentError::DuplicateLayer(layer.id.clone()));
        }
        if !(0.0..=100.0).contains(&layer.position_x) || !(0.0..=100.0).contains(&layer.position_y)
        {
            return Err(invalid("position must be within 0..=100"));
        }
        if let Some(width) = layer.style.width_percent {
            if !(width > 0.0 && width <= 100.0) {
                return Err(invalid("widthPercent must be within (0, 100]"));
            }
        }
        if let Some(scale) = layer.style.font_scale {
            if !(scale.is_finite() && scale > 0.0) {
                return Err(invalid("fontScale must be positive"));
            }
        }
    }
    Ok(())
}

fn apply_style_patch(style: &mut PresentationStyle, patch: StylePatch) -> Result<(), IntentError> {
    if let Some(color) = patch.background_color {
        style.background_color = color;
    }
    if let Some(color) = patch.text_color {
        style.text_color = color;
    }
    if let Some(font) = patch.font_family {
        style.font_family = font;
    }

    match patch.background {
        None => {}
        Some(BackgroundSource::Color) => {
            style.background_image_url = None;
            style.background_video_url = None;
            style.background_transform = None;
        }
        Some(BackgroundSource::Image(url)) => {
            if url.trim().is_empty() {
                return Err(IntentError::EmptyBackgroundUrl("image"));
            }
            style.background_image_url = Some(url);
            style.background_video_url = None;
        }
        Some(BackgroundSource::Video(url)) => {
            if url.trim().is_empty() {
                return Err(IntentError::EmptyBackgroundUrl("video"));
            }
            style.background_video_url = Some(url);
            style.background_image_url = None;
        }
    }

    if let Some(transform) = patch.background_transform {
        style.background_transform = Some(transform);
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
