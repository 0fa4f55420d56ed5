//! Projection of snapshots per display mode and best-effort fan-out.

use std::{collections::HashMap, sync::Arc};

use shared::{
    domain::{DisplayMode, EndpointId, NavigationCoords, SessionId},
    protocol::{DisplayFrame, MobileData, PresentationSnapshot, Projection, ServerFrame},
};
use tracing::{debug, warn};

use crate::{
    registry::{DeliveryError, DisplayRegistry, FrameSink},
    sessions::RemoteSessions,
};

/// The one place the audience-screen timer rule lives: a `general` display
/// sees the timer only in event mode. Controllers also get the agenda.
pub fn project(snapshot: &PresentationSnapshot, mode: DisplayMode) -> Projection {
    let timer = match mode {
        DisplayMode::General => snapshot
            .timer
            .clone()
            .filter(|timer| timer.is_event_mode),
        DisplayMode::Speaker | DisplayMode::Controller => snapshot.timer.clone(),
    };
    Projection {
        revision: snapshot.revision,
        mode,
        timer,
        content: snapshot.content.clone(),
        style: snapshot.style.clone(),
        agenda: (mode == DisplayMode::Controller).then(|| snapshot.agenda.clone()),
    }
}

/// What mobile sessions see: the controller view, wrapped for `mobile-data`.
pub fn mobile_state(snapshot: &PresentationSnapshot) -> ServerFrame {
    ServerFrame::MobileData(MobileData::PresentationState(project(
        snapshot,
        DisplayMode::Controller,
    )))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
    pub closed_displays: Vec<EndpointId>,
    pub closed_sessions: Vec<SessionId>,
}

/// Pushes `snapshot` to every display and session. A failing endpoint is
/// recorded and skipped; closed ones are reported so the caller can prune.
pub fn broadcast(
    snapshot: &PresentationSnapshot,
    displays: &DisplayRegistry,
    sessions: &RemoteSessions,
) -> BroadcastReport {
    let mut report = BroadcastReport::default();
    let mut frames_by_mode: HashMap<DisplayMode, Vec<DisplayFrame>> = HashMap::new();

    for (endpoint, sink) in displays.iter() {
        let frames = frames_by_mode
            .entry(endpoint.mode)
            .or_insert_with(|| project(snapshot, endpoint.mode).frames());
        let result = frames
            .iter()
            .try_for_each(|frame| sink.deliver(ServerFrame::Display(frame.clone())));
        match result {
            Ok(()) => report.delivered += 1,
            Err(err) => {
                report.failed += 1;
                log_failure(err, "display", &endpoint.id);
                if err == DeliveryError::Closed {
                    report.closed_displays.push(endpoint.id);
                }
            }
        }
    }

    if !sessions.is_empty() {
        let frame = mobile_state(snapshot);
        for (id, sink) in sessions.sinks() {
            match sink.deliver(frame.clone()) {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    report.failed += 1;
                    log_failure(err, "session", &id);
                    if err == DeliveryError::Closed {
                        report.closed_sessions.push(id);
                    }
                }
            }
        }
    }

    report
}

/// `mobile-connected` / `mobile-disconnected` go to controller displays only.
pub fn notify_controllers(displays: &DisplayRegistry, frame: &ServerFrame) -> usize {
    deliver_each(
        displays
            .iter()
            .filter(|(endpoint, _)| endpoint.mode == DisplayMode::Controller)
            .map(|(endpoint, sink)| (endpoint.id, sink)),
        frame,
    )
}

/// Operator navigation for sessions that opted into following it.
pub fn send_sync(sessions: &RemoteSessions, coords: &NavigationCoords) -> usize {
    deliver_each(
        sessions.sync_sinks(),
        &ServerFrame::MobileSync(coords.clone()),
    )
}

fn deliver_each<'a, K: std::fmt::Display>(
    targets: impl Iterator<Item = (K, &'a Arc<dyn FrameSink>)>,
    frame: &ServerFrame,
) -> usize {
    let mut delivered = 0;
    for (id, sink) in targets {
        match sink.deliver(frame.clone()) {
            Ok(()) => delivered += 1,
            Err(err) => log_failure(err, "endpoint", &id),
        }
    }
    delivered
}

fn log_failure(err: DeliveryError, target: &str, id: &dyn std::fmt::Display) {
    match err {
        DeliveryError::Closed => debug!(target_kind = target, id = %id, "skipping closed endpoint"),
        DeliveryError::Full => warn!(target_kind = target, id = %id, "endpoint queue full, frame dropped"),
    }
}

#[cfg(test)]
#[path = "tests/broadcast_tests.rs"]
mod tests;
