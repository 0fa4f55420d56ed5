//! WebSocket bridges between socket peers and the presenter actor.

use std::{net::SocketAddr, sync::Arc};

use axum::extract::ws::{Message, WebSocket};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use presenter_core::{PresenterError, PresenterHandle};
use shared::{
    domain::{DisplayMode, Transport},
    protocol::{ClientFrame, ServerFrame},
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::app_state::AppState;

async fn forward_frames(
    frames: mpsc::Receiver<ServerFrame>,
    mut sender: SplitSink<WebSocket, Message>,
) {
    let mut frames = ReceiverStream::new(frames);
    while let Some(frame) = frames.next().await {
        let text = match serde_json::to_string(&frame) {
            Ok(text) => text,
            Err(error) => {
                warn!(%error, "failed to encode frame");
                continue;
            }
        };
        if sender.send(Message::Text(text)).await.is_err() {
            break;
        }
    }
}

pub(crate) async fn display_connection(
    state: Arc<AppState>,
    socket: WebSocket,
    mode: DisplayMode,
    peer: Option<SocketAddr>,
) {
    let transport = match peer {
        Some(addr) if !addr.ip().is_loopback() => Transport::Remote,
        _ => Transport::Local,
    };
    let attachment = match state.presenter.register_display_with(mode, transport).await {
        Ok(attachment) => attachment,
        Err(error) => {
            warn!(%error, "display registration failed");
            return;
        }
    };
    let id = attachment.id;

    let (sender, mut receiver) = socket.split();
    let send_task = tokio::spawn(forward_frames(attachment.frames, sender));

    while let Some(Ok(message)) = receiver.next().await {
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        if mode != DisplayMode::Controller {
            debug!(endpoint_id = %id, "display endpoints do not send commands");
            continue;
        }
        let frame = match serde_json::from_str::<ClientFrame>(&text) {
            Ok(frame) => frame,
            Err(error) => {
                warn!(endpoint_id = %id, %error, "unreadable controller frame");
                continue;
            }
        };
        match dispatch_controller(&state.presenter, frame).await {
            Ok(()) => {}
            Err(PresenterError::Closed) => break,
            Err(PresenterError::Rejected(error)) => {
                debug!(endpoint_id = %id, %error, "controller intent rejected")
            }
        }
    }

    send_task.abort();
    let _ = state.presenter.unregister_display(id).await;
}

async fn dispatch_controller(
    presenter: &PresenterHandle,
    frame: ClientFrame,
) -> Result<(), PresenterError> {
    match frame {
        ClientFrame::Intent(intent) => presenter.apply(intent).await.map(|_| ()),
        ClientFrame::Navigate(coords) => presenter.navigate(coords).await,
        ClientFrame::SelectVerses(selection) => presenter.select_verses(selection).await,
        ClientFrame::Present(request) => presenter.present(request).await,
        ClientFrame::MobileAction(action) => {
            debug!(kind = %action.kind, "mobile actions belong on /mobile");
            Ok(())
        }
    }
}

pub(crate) async fn mobile_connection(state: Arc<AppState>, socket: WebSocket, address: String) {
    let attachment = match state.presenter.connect_session(address.clone()).await {
        Ok(attachment) => attachment,
        Err(error) => {
            warn!(%error, %address, "mobile session rejected");
            return;
        }
    };
    let id = attachment.id;

    let (sender, mut receiver) = socket.split();
    let send_task = tokio::spawn(forward_frames(attachment.frames, sender));

    while let Some(Ok(message)) = receiver.next().await {
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        match serde_json::from_str::<ClientFrame>(&text) {
            Ok(ClientFrame::MobileAction(action)) => {
                if state.presenter.mobile_action(id, action).await.is_err() {
                    break;
                }
            }
            Ok(_) => debug!(session_id = %id, "mobile sessions only send mobile-action"),
            Err(error) => warn!(session_id = %id, %error, "unreadable mobile frame"),
        }
    }

    send_task.abort();
    let _ = state.presenter.disconnect_session(id).await;
    debug!(session_id = %id, "mobile socket closed");
}
