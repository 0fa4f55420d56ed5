//! Presentation state synchronization engine.
//!
//! One actor task owns the store, the display registry, the remote sessions,
//! the navigation resolver and the tick driver. Everything else talks to it
//! through [`PresenterHandle`], which only enqueues commands, so intents from
//! every source are applied strictly in arrival order.

use std::{sync::Arc, time::Duration};

use shared::{
    domain::{
        DisplayEndpoint, DisplayMode, EndpointId, NavigationCoords, RemoteDevice, SessionId,
        Transport,
    },
    error::ActionError,
    protocol::{
        Intent, MobileData, PresentRequest, PresentationSnapshot, RawAction, ServerFrame,
        VerseSelection,
    },
};
use thiserror::Error;
use tokio::sync::{
    mpsc::{self, WeakSender},
    oneshot,
};
use tracing::{debug, info, warn};

pub mod broadcast;
pub mod registry;
pub mod scripture;
pub mod sessions;
pub mod store;
pub mod timer;

use broadcast::{broadcast, mobile_state, notify_controllers, project, send_sync};
use registry::{ChannelSink, DisplayRegistry, FrameSink};
use scripture::{
    BookSummary, FetchOutcome, FetchTicket, NavigationResolver, PresentOutcome, ScriptureLookup,
};
use sessions::{ActionOutcome, RemoteSessions, ScriptureQuery, SessionError};
use store::{IntentError, PresentationStore, WallClock};
use timer::TickDriver;

const COMMAND_QUEUE: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenterConfig {
    pub tick_interval: Duration,
    /// Per-endpoint outbound frame queue.
    pub queue_capacity: usize,
    /// Chapter count reported for books the lookup has no count for.
    pub default_chapter_count: u32,
}

impl Default for PresenterConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            queue_capacity: 64,
            default_chapter_count: 150,
        }
    }
}

#[derive(Debug, Error)]
pub enum PresenterError {
    #[error("presenter has shut down")]
    Closed,
    #[error("intent rejected: {0}")]
    Rejected(#[from] IntentError),
}

/// A registered display and the frames addressed to it.
#[derive(Debug)]
pub struct DisplayAttachment {
    pub id: EndpointId,
    pub mode: DisplayMode,
    pub frames: mpsc::Receiver<ServerFrame>,
}

#[derive(Debug)]
pub struct SessionAttachment {
    pub id: SessionId,
    pub frames: mpsc::Receiver<ServerFrame>,
}

pub(crate) enum Command {
    Apply {
        intent: Intent,
        reply: oneshot::Sender<Result<PresentationSnapshot, IntentError>>,
    },
    Tick {
        generation: u64,
    },
    RegisterDisplay {
        mode: DisplayMode,
        transport: Transport,
        reply: oneshot::Sender<DisplayAttachment>,
    },
    UnregisterDisplay {
        id: EndpointId,
    },
    ConnectSession {
        address: String,
        reply: oneshot::Sender<SessionAttachment>,
    },
    DisconnectSession {
        id: SessionId,
    },
    MobileAction {
        session: SessionId,
        action: RawAction,
    },
    Navigate {
        coords: NavigationCoords,
    },
    SelectVerses {
        selection: VerseSelection,
    },
    Present {
        request: PresentRequest,
    },
    FetchCompleted {
        ticket: FetchTicket,
        verses: Vec<String>,
    },
    BooksLoaded {
        books: Vec<BookSummary>,
    },
    Devices {
        reply: oneshot::Sender<Vec<RemoteDevice>>,
    },
    Snapshot {
        reply: oneshot::Sender<PresentationSnapshot>,
    },
}

/// Cloneable front door to the presenter actor. The actor stops once every
/// handle is dropped.
#[derive(Clone)]
pub struct PresenterHandle {
    commands: mpsc::Sender<Command>,
}

impl PresenterHandle {
    pub async fn apply(&self, intent: Intent) -> Result<PresentationSnapshot, PresenterError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Apply { intent, reply }).await?;
        Ok(rx.await.map_err(|_| PresenterError::Closed)??)
    }

    pub async fn navigate(&self, coords: NavigationCoords) -> Result<(), PresenterError> {
        self.send(Command::Navigate { coords }).await
    }

    pub async fn select_verses(&self, selection: VerseSelection) -> Result<(), PresenterError> {
        self.send(Command::SelectVerses { selection }).await
    }

    /// Navigates if needed and shows `request.indices` once the chapter is in.
    pub async fn present(&self, request: PresentRequest) -> Result<(), PresenterError> {
        self.send(Command::Present { request }).await
    }

    pub async fn register_display(
        &self,
        mode: DisplayMode,
    ) -> Result<DisplayAttachment, PresenterError> {
        self.register_display_with(mode, Transport::Local).await
    }

    pub async fn register_display_with(
        &self,
        mode: DisplayMode,
        transport: Transport,
    ) -> Result<DisplayAttachment, PresenterError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::RegisterDisplay {
            mode,
            transport,
            reply,
        })
        .await?;
        rx.await.map_err(|_| PresenterError::Closed)
    }

    pub async fn unregister_display(&self, id: EndpointId) -> Result<(), PresenterError> {
        self.send(Command::UnregisterDisplay { id }).await
    }

    pub async fn connect_session(
        &self,
        address: impl Into<String>,
    ) -> Result<SessionAttachment, PresenterError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::ConnectSession {
            address: address.into(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| PresenterError::Closed)
    }

    pub async fn disconnect_session(&self, id: SessionId) -> Result<(), PresenterError> {
        self.send(Command::DisconnectSession { id }).await
    }

    pub async fn mobile_action(
        &self,
        session: SessionId,
        action: RawAction,
    ) -> Result<(), PresenterError> {
        self.send(Command::MobileAction { session, action }).await
    }

    pub async fn server_devices(&self) -> Result<Vec<RemoteDevice>, PresenterError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Devices { reply }).await?;
        rx.await.map_err(|_| PresenterError::Closed)
    }

    pub async fn snapshot(&self) -> Result<PresentationSnapshot, PresenterError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot { reply }).await?;
        rx.await.map_err(|_| PresenterError::Closed)
    }

    async fn send(&self, command: Command) -> Result<(), PresenterError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| PresenterError::Closed)
    }
}

pub struct Presenter {
    store: PresentationStore,
    displays: DisplayRegistry,
    sessions: RemoteSessions,
    resolver: NavigationResolver,
    ticks: TickDriver,
    lookup: Arc<dyn ScriptureLookup>,
    config: PresenterConfig,
    commands: WeakSender<Command>,
    next_endpoint: i64,
}

impl Presenter {
    /// Starts the actor on the current tokio runtime.
    pub fn spawn(lookup: Arc<dyn ScriptureLookup>, config: PresenterConfig) -> PresenterHandle {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE);
        let presenter = Presenter {
            store: PresentationStore::new(),
            displays: DisplayRegistry::new(),
            sessions: RemoteSessions::new(),
            resolver: NavigationResolver::new(),
            ticks: TickDriver::new(config.tick_interval),
            lookup,
            config,
            commands: tx.downgrade(),
            next_endpoint: 1,
        };
        tokio::spawn(presenter.run(rx));
        PresenterHandle { commands: tx }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        self.load_books();
        while let Some(command) = commands.recv().await {
            self.handle(command);
        }
        self.ticks.stop();
        info!("presenter stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Apply { intent, reply } => {
                let result = self.apply_intent(intent);
                let _ = reply.send(result);
            }
            Command::Tick { generation } => {
                if let Some(snapshot) = self.store.tick(generation) {
                    self.publish(&snapshot);
                }
                self.sync_ticks();
            }
            Command::RegisterDisplay {
                mode,
                transport,
                reply,
            } => self.register_display(mode, transport, reply),
            Command::UnregisterDisplay { id } => {
                if self.displays.unregister(id).is_some() {
                    info!(endpoint_id = %id, "display unregistered");
                }
            }
            Command::ConnectSession { address, reply } => self.connect_session(address, reply),
            Command::DisconnectSession { id } => self.disconnect_session(id),
            Command::MobileAction { session, action } => self.mobile_action(session, action),
            Command::Navigate { coords } => {
                if let Some(ticket) = self.resolver.navigate(coords) {
                    self.begin_fetch(ticket);
                }
            }
            Command::SelectVerses { selection } => match self.resolver.select(selection) {
                Some(intent) => self.apply_resolved(intent),
                None => debug!("verse selection ignored, no chapter loaded"),
            },
            Command::Present { request } => self.present(request),
            Command::FetchCompleted { ticket, verses } => {
                let stamp = ticket.stamp;
                match self.resolver.complete_fetch(ticket, verses) {
                    FetchOutcome::Discarded => debug!(stamp, "discarded superseded chapter fetch"),
                    FetchOutcome::Loaded { verses } => debug!(stamp, verses, "chapter loaded"),
                    FetchOutcome::Presented(intent) => self.apply_resolved(intent),
                }
            }
            Command::BooksLoaded { books } => {
                info!(books = books.len(), "scripture books loaded");
                self.resolver.set_books(books);
            }
            Command::Devices { reply } => {
                let _ = reply.send(self.sessions.devices());
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.store.snapshot());
            }
        }
    }

    fn apply_intent(&mut self, intent: Intent) -> Result<PresentationSnapshot, IntentError> {
        let name = intent.name();
        let result = self.store.apply(intent, &WallClock::now());
        match &result {
            Ok(applied) if applied.changed => {
                debug!(intent = name, revision = applied.snapshot.revision, "intent applied");
                self.publish(&applied.snapshot);
            }
            Ok(_) => debug!(intent = name, "intent left state unchanged"),
            Err(err) => warn!(intent = name, error = %err, "intent rejected"),
        }
        self.sync_ticks();
        result.map(|applied| applied.snapshot)
    }

    fn apply_resolved(&mut self, intent: Intent) {
        // Rejections are already logged by apply_intent.
        let _ = self.apply_intent(intent);
    }

    fn sync_ticks(&mut self) {
        self.ticks
            .sync(self.store.run_generation(), &self.commands);
    }

    fn publish(&mut self, snapshot: &PresentationSnapshot) {
        let report = broadcast(snapshot, &self.displays, &self.sessions);
        debug!(
            revision = snapshot.revision,
            delivered = report.delivered,
            failed = report.failed,
            "snapshot broadcast"
        );
        for id in report.closed_displays {
            self.displays.unregister(id);
            info!(endpoint_id = %id, "pruned closed display");
        }
        for id in report.closed_sessions {
            self.disconnect_session(id);
        }
    }

    fn register_display(
        &mut self,
        mode: DisplayMode,
        transport: Transport,
        reply: oneshot::Sender<DisplayAttachment>,
    ) {
        let id = EndpointId(self.next_endpoint);
        self.next_endpoint += 1;

        let (tx, frames) = mpsc::channel(self.config.queue_capacity);
        let sink: Arc<dyn FrameSink> = Arc::new(ChannelSink::new(tx));
        for frame in project(&self.store.snapshot(), mode).frames() {
            let _ = sink.deliver(ServerFrame::Display(frame));
        }
        if mode == DisplayMode::Controller {
            for device in self.sessions.devices() {
                let _ = sink.deliver(ServerFrame::MobileConnected(device));
            }
        }

        let endpoint = DisplayEndpoint {
            id,
            mode,
            transport,
        };
        self.displays.register(endpoint, sink);
        if reply.send(DisplayAttachment { id, mode, frames }).is_err() {
            self.displays.unregister(id);
            return;
        }
        info!(endpoint_id = %id, ?mode, "display registered");
    }

    fn connect_session(&mut self, address: String, reply: oneshot::Sender<SessionAttachment>) {
        let device = RemoteDevice {
            id: SessionId::new(),
            address,
        };
        let id = device.id;

        let (tx, frames) = mpsc::channel(self.config.queue_capacity);
        let sink: Arc<dyn FrameSink> = Arc::new(ChannelSink::new(tx));
        let _ = sink.deliver(mobile_state(&self.store.snapshot()));

        if reply.send(SessionAttachment { id, frames }).is_err() {
            return;
        }
        self.sessions.on_connect(device.clone(), sink);
        notify_controllers(&self.displays, &ServerFrame::MobileConnected(device.clone()));
        info!(session_id = %id, address = %device.address, "mobile session connected");
    }

    fn disconnect_session(&mut self, id: SessionId) {
        if let Some(device) = self.sessions.on_disconnect(id) {
            notify_controllers(&self.displays, &ServerFrame::MobileDisconnected { id });
            info!(session_id = %id, address = %device.address, "mobile session disconnected");
        }
    }

    fn mobile_action(&mut self, session: SessionId, action: RawAction) {
        let outcome = match self.sessions.on_action(session, &action) {
            Ok(outcome) => outcome,
            Err(SessionError::UnknownSession(id)) => {
                debug!(session_id = %id, "action from unknown session");
                return;
            }
            Err(SessionError::Action(err @ ActionError::UnknownType(_))) => {
                warn!(session_id = %session, error = %err, "ignoring mobile action");
                return;
            }
            Err(SessionError::Action(err)) => {
                warn!(session_id = %session, error = %err, "dropping mobile action");
                self.reply_error(session, MobileData::Error((&err).into()));
                return;
            }
        };

        match outcome {
            ActionOutcome::Intent(intent) => {
                if let Err(err) = self.apply_intent(intent) {
                    self.reply_error(session, MobileData::Error(err.api_error()));
                }
            }
            ActionOutcome::Query(query) => self.spawn_query(session, query),
            ActionOutcome::Present(request) => self.present(request),
            ActionOutcome::SyncChanged(enabled) => {
                debug!(session_id = %session, enabled, "mobile sync changed");
                if let (true, Some(coords), Some(sink)) = (
                    enabled,
                    self.resolver.current(),
                    self.sessions.sink(session),
                ) {
                    let _ = sink.deliver(ServerFrame::MobileSync(coords.clone()));
                }
            }
        }
    }

    fn reply_error(&self, session: SessionId, data: MobileData) {
        if let Some(sink) = self.sessions.sink(session) {
            let _ = sink.deliver(ServerFrame::MobileData(data));
        }
    }

    fn present(&mut self, request: PresentRequest) {
        match self.resolver.present(request) {
            PresentOutcome::Show(intent) => self.apply_resolved(intent),
            PresentOutcome::Queued => debug!("selection queued behind in-flight fetch"),
            PresentOutcome::Navigate(ticket) => self.begin_fetch(ticket),
        }
    }

    /// Navigation changed: take stale verses off air, tell followers and
    /// fetch the new chapter.
    fn begin_fetch(&mut self, ticket: FetchTicket) {
        self.apply_resolved(Intent::ClearContent);
        send_sync(&self.sessions, &ticket.coords);

        let lookup = self.lookup.clone();
        let commands = self.commands.clone();
        tokio::spawn(async move {
            let coords = &ticket.coords;
            let verses = match lookup
                .chapter(&coords.version, coords.book_index, coords.chapter_number())
                .await
            {
                Ok(verses) => verses,
                Err(err) => {
                    warn!(version = %coords.version, book = coords.book_index, chapter = coords.chapter_number(), error = %err, "chapter fetch failed");
                    Vec::new()
                }
            };
            if let Some(commands) = commands.upgrade() {
                let _ = commands
                    .send(Command::FetchCompleted { ticket, verses })
                    .await;
            }
        });
    }

    fn spawn_query(&self, session: SessionId, query: ScriptureQuery) {
        let Some(sink) = self.sessions.sink(session).cloned() else {
            return;
        };
        let lookup = self.lookup.clone();
        let default_chapter_count = self.config.default_chapter_count;
        tokio::spawn(async move {
            let data = match query {
                ScriptureQuery::Books => {
                    let books = lookup.books().await.unwrap_or_else(|err| {
                        warn!(error = %err, "book list lookup failed");
                        Vec::new()
                    });
                    MobileData::BibleBooks(
                        books
                            .into_iter()
                            .map(|book| book.into_info(default_chapter_count))
                            .collect(),
                    )
                }
                ScriptureQuery::Chapter(query) => {
                    let verses = lookup
                        .chapter(&query.version, query.book_index, query.chapter)
                        .await
                        .unwrap_or_else(|err| {
                            warn!(error = %err, "chapter lookup failed");
                            Vec::new()
                        });
                    MobileData::BibleChapter(verses)
                }
            };
            if let Err(err) = sink.deliver(ServerFrame::MobileData(data)) {
                debug!(session_id = %session, error = %err, "query response not delivered");
            }
        });
    }

    fn load_books(&self) {
        let lookup = self.lookup.clone();
        let commands = self.commands.clone();
        tokio::spawn(async move {
            match lookup.books().await {
                Ok(books) => {
                    if let Some(commands) = commands.upgrade() {
                        let _ = commands.send(Command::BooksLoaded { books }).await;
                    }
                }
                Err(err) => warn!(error = %err, "could not load scripture books"),
            }
        });
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
