use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::{
    domain::{AgendaId, DisplayMode, NavigationCoords, RemoteDevice, SessionId, TimerTheme},
    error::{ActionError, ApiError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimerStatus {
    /// Running or paused; see `is_paused`.
    Counting,
    /// Duration countdown reached zero.
    TimeUp,
    /// Event countdown reached zero; displays fall back to their idle look.
    Waiting,
}

/// Live countdown. Absence of a `TimerState` means no timer is set; zero
/// remaining seconds is a valid active state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    pub remaining_seconds: u64,
    pub is_paused: bool,
    pub is_event_mode: bool,
    pub theme: TimerTheme,
    pub active_agenda_id: Option<AgendaId>,
    pub status: TimerStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgendaItem {
    pub id: AgendaId,
    pub duration_seconds: u64,
    pub label: String,
    pub anchor: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    Text,
    Image,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerStyle {
    /// Text layers: size relative to the canvas height.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_scale: Option<f64>,
    /// Image layers: width as a percentage of the canvas width.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width_percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
}

/// One paintable layer. Positions are percentages of the canvas so every
/// display lays it out the same way regardless of resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layer {
    pub id: String,
    pub kind: LayerKind,
    pub content: String,
    pub position_x: f64,
    pub position_y: f64,
    #[serde(default)]
    pub style: LayerStyle,
}

/// What is on air. Layer order is paint order: later layers draw on top.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum PresentationContent {
    #[default]
    None,
    Bible {
        title: String,
        body: String,
    },
    Custom {
        title: String,
        body: String,
    },
    CustomLayers {
        layers: Vec<Layer>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackgroundTransform {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresentationStyle {
    pub background_color: String,
    pub text_color: String,
    pub font_family: String,
    pub background_image_url: Option<String>,
    pub background_video_url: Option<String>,
    pub background_transform: Option<BackgroundTransform>,
}

impl Default for PresentationStyle {
    fn default() -> Self {
        Self {
            background_color: "#000000".into(),
            text_color: "#ffffff".into(),
            font_family: "Inter".into(),
            background_image_url: None,
            background_video_url: None,
            background_transform: None,
        }
    }
}

/// Background media. Picking one kind replaces whichever was active before.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "url", rename_all = "snake_case")]
pub enum BackgroundSource {
    Color,
    Image(String),
    Video(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StylePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<BackgroundSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_transform: Option<BackgroundTransform>,
}

/// Complete presentation state at one revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresentationSnapshot {
    pub revision: u64,
    pub timer: Option<TimerState>,
    pub agenda: Vec<AgendaItem>,
    pub content: PresentationContent,
    pub style: PresentationStyle,
}

/// Mode-specific view of a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Projection {
    pub revision: u64,
    pub mode: DisplayMode,
    pub timer: Option<TimerState>,
    pub content: PresentationContent,
    pub style: PresentationStyle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agenda: Option<Vec<AgendaItem>>,
}

impl Projection {
    /// Splits the projection into the per-kind messages of the display channel.
    pub fn frames(&self) -> Vec<DisplayFrame> {
        let mut messages = vec![
            DisplayMessage::Timer(self.timer.clone()),
            DisplayMessage::Content(self.content.clone()),
            DisplayMessage::Style(self.style.clone()),
        ];
        if let Some(agenda) = &self.agenda {
            messages.push(DisplayMessage::Agenda(agenda.clone()));
        }
        messages
            .into_iter()
            .map(|message| DisplayFrame {
                revision: self.revision,
                message,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum DisplayMessage {
    Timer(Option<TimerState>),
    Content(PresentationContent),
    Style(PresentationStyle),
    Agenda(Vec<AgendaItem>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayFrame {
    pub revision: u64,
    pub message: DisplayMessage,
}

/// A request to mutate presentation or timer state, from the local
/// controller or relayed from a mobile session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum Intent {
    SetTimer {
        seconds: u64,
        #[serde(default)]
        agenda_id: Option<AgendaId>,
    },
    StartEvent {
        target: String,
    },
    StopTimer,
    SetPaused {
        paused: bool,
    },
    TogglePause,
    SetTheme {
        theme: TimerTheme,
    },
    AddAgenda {
        #[serde(default)]
        id: Option<AgendaId>,
        duration_seconds: u64,
        label: String,
        #[serde(default)]
        anchor: String,
    },
    EditAgenda {
        id: AgendaId,
        #[serde(default)]
        duration_seconds: Option<u64>,
        #[serde(default)]
        label: Option<String>,
        #[serde(default)]
        anchor: Option<String>,
    },
    DeleteAgenda {
        id: AgendaId,
    },
    StartAgenda {
        id: AgendaId,
    },
    AddMinute {
        id: AgendaId,
    },
    SetContent {
        content: PresentationContent,
    },
    ClearContent,
    SetStyle {
        patch: StylePatch,
    },
}

impl Intent {
    pub fn name(&self) -> &'static str {
        match self {
            Intent::SetTimer { .. } => "set-timer",
            Intent::StartEvent { .. } => "start-event",
            Intent::StopTimer => "stop-timer",
            Intent::SetPaused { .. } => "set-paused",
            Intent::TogglePause => "toggle-pause",
            Intent::SetTheme { .. } => "set-theme",
            Intent::AddAgenda { .. } => "add-agenda",
            Intent::EditAgenda { .. } => "edit-agenda",
            Intent::DeleteAgenda { .. } => "delete-agenda",
            Intent::StartAgenda { .. } => "start-agenda",
            Intent::AddMinute { .. } => "add-minute",
            Intent::SetContent { .. } => "set-content",
            Intent::ClearContent => "clear-content",
            Intent::SetStyle { .. } => "set-style",
        }
    }
}

/// Untyped `mobile-action` body as it arrives on the socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawAction {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

impl RawAction {
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterQuery {
    pub version: String,
    #[serde(rename = "bookId", alias = "bookIndex")]
    pub book_index: u32,
    /// 1-based.
    pub chapter: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresentRequest {
    pub indices: Vec<u32>,
    pub version: String,
    pub book_index: u32,
    pub chapter_index: u32,
}

impl PresentRequest {
    pub fn coords(&self) -> NavigationCoords {
        NavigationCoords::new(self.version.clone(), self.book_index, self.chapter_index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetTimerPayload {
    pub time: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetPausedPayload {
    pub paused: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddAgendaPayload {
    #[serde(rename = "_id", alias = "id", default)]
    pub id: Option<AgendaId>,
    pub time: u64,
    pub agenda: String,
    #[serde(default)]
    pub anchor: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditAgendaPayload {
    #[serde(rename = "_id", alias = "id")]
    pub id: AgendaId,
    #[serde(default)]
    pub time: Option<u64>,
    #[serde(default)]
    pub agenda: Option<String>,
    #[serde(default)]
    pub anchor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgendaRef {
    #[serde(alias = "_id")]
    pub id: AgendaId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetSyncPayload {
    pub enabled: bool,
}

/// Closed vocabulary of mobile actions, validated from a [`RawAction`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MobileAction {
    GetBooks,
    GetChapter(ChapterQuery),
    Present(PresentRequest),
    SetTimer(SetTimerPayload),
    StopTimer,
    SetPaused(SetPausedPayload),
    TogglePause,
    AddAgenda(AddAgendaPayload),
    DeleteAgenda(AgendaRef),
    EditAgenda(EditAgendaPayload),
    StartAgenda(AgendaRef),
    AddMinute(AgendaRef),
    SetSync(SetSyncPayload),
}

impl MobileAction {
    pub fn parse(raw: &RawAction) -> Result<Self, ActionError> {
        let action = match raw.kind.as_str() {
            "bible-get-books" => MobileAction::GetBooks,
            "bible-get-chapter" => {
                let query: ChapterQuery = payload(raw)?;
                if query.chapter == 0 {
                    return Err(malformed(raw, "chapter numbers start at 1"));
                }
                MobileAction::GetChapter(query)
            }
            "bible-present" => MobileAction::Present(payload(raw)?),
            "set-timer" => MobileAction::SetTimer(payload(raw)?),
            "stop-timer" => MobileAction::StopTimer,
            "set-paused" => MobileAction::SetPaused(payload(raw)?),
            "toggle-pause" => MobileAction::TogglePause,
            "add-agenda" => MobileAction::AddAgenda(payload(raw)?),
            "delete-agenda" => MobileAction::DeleteAgenda(payload(raw)?),
            "edit-agenda" => MobileAction::EditAgenda(payload(raw)?),
            "start-agenda" => MobileAction::StartAgenda(payload(raw)?),
            "add-minute" => MobileAction::AddMinute(payload(raw)?),
            "set-sync" => MobileAction::SetSync(payload(raw)?),
            other => return Err(ActionError::UnknownType(other.to_string())),
        };
        Ok(action)
    }
}

fn payload<T: DeserializeOwned>(raw: &RawAction) -> Result<T, ActionError> {
    if raw.payload.is_null() {
        return Err(malformed(raw, "missing payload"));
    }
    serde_json::from_value(raw.payload.clone()).map_err(|err| malformed(raw, err.to_string()))
}

fn malformed(raw: &RawAction, reason: impl Into<String>) -> ActionError {
    ActionError::MalformedPayload {
        kind: raw.kind.clone(),
        reason: reason.into(),
    }
}

/// Local controller verse selection commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum VerseSelection {
    /// Replace the selection with exactly these indices.
    Set { indices: Vec<u32> },
    /// Plain click: select only this verse.
    Click { index: u32 },
    /// Ctrl/cmd click: add or remove this verse.
    Toggle { index: u32 },
    /// Shift click: contiguous range from the current selection to this verse.
    Extend { index: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookInfo {
    pub name: String,
    pub abbrev: String,
    pub chapters: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum MobileData {
    BibleBooks(Vec<BookInfo>),
    BibleChapter(Vec<String>),
    PresentationState(Projection),
    Error(ApiError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub ip: String,
    pub port: u16,
    pub devices: Vec<RemoteDevice>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientFrame {
    MobileAction(RawAction),
    Intent(Intent),
    Navigate(NavigationCoords),
    SelectVerses(VerseSelection),
    Present(PresentRequest),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerFrame {
    Display(DisplayFrame),
    MobileData(MobileData),
    MobileSync(NavigationCoords),
    MobileConnected(RemoteDevice),
    MobileDisconnected { id: SessionId },
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
