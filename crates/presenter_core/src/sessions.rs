//! Remote mobile sessions and the translation of their actions.

use std::sync::Arc;

use shared::{
    domain::{RemoteDevice, SessionId},
    error::ActionError,
    protocol::{ChapterQuery, Intent, MobileAction, PresentRequest, RawAction},
};
use thiserror::Error;

use crate::registry::FrameSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    /// Has sent at least one valid action.
    Active,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("session {0} is not connected")]
    UnknownSession(SessionId),
    #[error(transparent)]
    Action(#[from] ActionError),
}

/// Read-only scripture requests answered on the requesting socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptureQuery {
    Books,
    Chapter(ChapterQuery),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    Intent(Intent),
    Query(ScriptureQuery),
    Present(PresentRequest),
    SyncChanged(bool),
}

struct Session {
    device: RemoteDevice,
    state: SessionState,
    sync: bool,
    sink: Arc<dyn FrameSink>,
}

/// Connected mobile sessions in connection order. All sessions are peers.
#[derive(Default)]
pub struct RemoteSessions {
    sessions: Vec<Session>,
}

impl RemoteSessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_connect(&mut self, device: RemoteDevice, sink: Arc<dyn FrameSink>) {
        self.sessions.retain(|session| session.device.id != device.id);
        self.sessions.push(Session {
            device,
            state: SessionState::Connected,
            sync: false,
            sink,
        });
    }

    pub fn on_disconnect(&mut self, id: SessionId) -> Option<RemoteDevice> {
        let index = self
            .sessions
            .iter()
            .position(|session| session.device.id == id)?;
        Some(self.sessions.remove(index).device)
    }

    /// Validates `raw` and maps it onto the shared intent vocabulary, or onto
    /// a query/present request that bypasses the store.
    pub fn on_action(
        &mut self,
        id: SessionId,
        raw: &RawAction,
    ) -> Result<ActionOutcome, SessionError> {
        let session = self
            .sessions
            .iter_mut()
            .find(|session| session.device.id == id)
            .ok_or(SessionError::UnknownSession(id))?;
        let action = MobileAction::parse(raw)?;
        session.state = SessionState::Active;

        let outcome = match action {
            MobileAction::GetBooks => ActionOutcome::Query(ScriptureQuery::Books),
            MobileAction::GetChapter(query) => ActionOutcome::Query(ScriptureQuery::Chapter(query)),
            MobileAction::Present(request) => ActionOutcome::Present(request),
            MobileAction::SetTimer(payload) => ActionOutcome::Intent(Intent::SetTimer {
                seconds: payload.time,
                agenda_id: None,
            }),
            MobileAction::StopTimer => ActionOutcome::Intent(Intent::StopTimer),
            MobileAction::SetPaused(payload) => ActionOutcome::Intent(Intent::SetPaused {
                paused: payload.paused,
            }),
            MobileAction::TogglePause => ActionOutcome::Intent(Intent::TogglePause),
            MobileAction::AddAgenda(payload) => ActionOutcome::Intent(Intent::AddAgenda {
                id: payload.id,
                duration_seconds: payload.time,
                label: payload.agenda,
                anchor: payload.anchor,
            }),
            MobileAction::DeleteAgenda(item) => {
                ActionOutcome::Intent(Intent::DeleteAgenda { id: item.id })
            }
            MobileAction::EditAgenda(payload) => ActionOutcome::Intent(Intent::EditAgenda {
                id: payload.id,
                duration_seconds: payload.time,
                label: payload.agenda,
                anchor: payload.anchor,
            }),
            MobileAction::StartAgenda(item) => {
                ActionOutcome::Intent(Intent::StartAgenda { id: item.id })
            }
            MobileAction::AddMinute(item) => ActionOutcome::Intent(Intent::AddMinute { id: item.id }),
            MobileAction::SetSync(payload) => {
                session.sync = payload.enabled;
                ActionOutcome::SyncChanged(payload.enabled)
            }
        };
        Ok(outcome)
    }

    pub fn state(&self, id: SessionId) -> Option<SessionState> {
        self.find(id).map(|session| session.state)
    }

    pub fn sink(&self, id: SessionId) -> Option<&Arc<dyn FrameSink>> {
        self.find(id).map(|session| &session.sink)
    }

    pub fn devices(&self) -> Vec<RemoteDevice> {
        self.sessions
            .iter()
            .map(|session| session.device.clone())
            .collect()
    }

    pub fn sinks(&self) -> impl Iterator<Item = (SessionId, &Arc<dyn FrameSink>)> {
        self.sessions
            .iter()
            .map(|session| (session.device.id, &session.sink))
    }

    /// Sessions that asked to follow operator navigation.
    pub fn sync_sinks(&self) -> impl Iterator<Item = (SessionId, &Arc<dyn FrameSink>)> {
        self.sessions
            .iter()
            .filter(|session| session.sync)
            .map(|session| (session.device.id, &session.sink))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn find(&self, id: SessionId) -> Option<&Session> {
        self.sessions.iter().find(|session| session.device.id == id)
    }
}

#[cfg(test)]
#[path = "tests/sessions_tests.rs"]
mod tests;
