use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use futures::{SinkExt, StreamExt};
use shared::{
    domain::DisplayMode,
    protocol::{ClientFrame, DisplayMessage, MobileData, ServerFrame, ServerInfo},
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::debug;
use url::Url;

const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// `ws(s)://.../display?mode=<mode>` for an `http(s)://` server url.
pub fn display_url(server_url: &str, mode: DisplayMode) -> Result<Url> {
    let mut url = Url::parse(server_url)
        .with_context(|| format!("invalid server url '{server_url}'"))?;
    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => bail!("server_url must start with http:// or https://, got {other}://"),
    };
    url.set_scheme(scheme)
        .map_err(|_| anyhow!("cannot switch {server_url} to {scheme}"))?;
    url.set_path("/display");
    url.set_query(Some(&format!("mode={}", mode_name(mode))));
    Ok(url)
}

fn mode_name(mode: DisplayMode) -> &'static str {
    match mode {
        DisplayMode::Speaker => "speaker",
        DisplayMode::General => "general",
        DisplayMode::Controller => "controller",
    }
}

pub async fn fetch_info(server_url: &str) -> Result<ServerInfo> {
    let url = Url::parse(server_url)
        .and_then(|base| base.join("/server-info"))
        .with_context(|| format!("invalid server url '{server_url}'"))?;
    let info = reqwest::get(url)
        .await
        .context("server-info request failed")?
        .error_for_status()?
        .json::<ServerInfo>()
        .await
        .context("server-info returned unexpected json")?;
    Ok(info)
}

/// Connects as a controller, sends one frame and closes once the server
/// has read it.
pub async fn send_frame(server_url: &str, frame: &ClientFrame) -> Result<()> {
    let url = display_url(server_url, DisplayMode::Controller)?;
    let (mut socket, _) = connect_async(url.as_str())
        .await
        .with_context(|| format!("failed to connect websocket: {url}"))?;

    socket
        .send(Message::Text(serde_json::to_string(frame)?))
        .await
        .context("failed to send frame")?;
    socket.close(None).await.context("failed to close socket")?;

    // Drain until the server acknowledges the close.
    let drained = tokio::time::timeout(CLOSE_GRACE, async {
        while let Some(Ok(_)) = socket.next().await {}
    })
    .await;
    if drained.is_err() {
        debug!("server did not acknowledge close in time");
    }
    Ok(())
}

pub async fn watch(server_url: &str, mode: DisplayMode) -> Result<()> {
    let url = display_url(server_url, mode)?;
    let (socket, _) = connect_async(url.as_str())
        .await
        .with_context(|| format!("failed to connect websocket: {url}"))?;
    let (_, mut reader) = socket.split();

    while let Some(message) = reader.next().await {
        match message.context("websocket read failed")? {
            Message::Text(text) => match serde_json::from_str::<ServerFrame>(&text) {
                Ok(frame) => println!("{}", describe(&frame)),
                Err(_) => println!("{text}"),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }
    Ok(())
}

/// One-line human summary of a server frame.
pub fn describe(frame: &ServerFrame) -> String {
    match frame {
        ServerFrame::Display(display) => {
            let detail = match &display.message {
                DisplayMessage::Timer(None) => "timer hidden".to_string(),
                DisplayMessage::Timer(Some(timer)) => format!(
                    "timer {}{}{}",
                    clock(timer.remaining_seconds),
                    if timer.is_paused { " paused" } else { "" },
                    if timer.is_event_mode { " (event)" } else { "" },
                ),
                DisplayMessage::Content(content) => {
                    format!("content {}", compact(content))
                }
                DisplayMessage::Style(style) => format!("style {}", compact(style)),
                DisplayMessage::Agenda(items) => {
                    let items: Vec<String> = items
                        .iter()
                        .map(|item| {
                            format!("#{} {} {}", item.id, item.label, clock(item.duration_seconds))
                        })
                        .collect();
                    format!("agenda [{}]", items.join(", "))
                }
            };
            format!("[rev {}] {detail}", display.revision)
        }
        ServerFrame::MobileData(MobileData::Error(error)) => {
            format!("error {:?}: {}", error.code, error.message)
        }
        ServerFrame::MobileData(data) => format!("mobile-data {}", compact(data)),
        ServerFrame::MobileSync(coords) => format!(
            "sync {} book {} chapter {}",
            coords.version,
            coords.book_index,
            coords.chapter_number()
        ),
        ServerFrame::MobileConnected(device) => {
            format!("phone connected {} ({})", device.address, device.id)
        }
        ServerFrame::MobileDisconnected { id } => format!("phone disconnected {id}"),
    }
}

fn clock(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

fn compact<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "<unprintable>".into())
}

#[cfg(test)]
#[path = "tests/client_tests.rs"]
mod tests;
