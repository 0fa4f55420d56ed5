use std::{net::IpAddr, sync::Arc};

use presenter_core::PresenterHandle;
use storage::ScriptureDb;
use tokio::net::UdpSocket;

pub(crate) struct AppState {
    pub(crate) presenter: PresenterHandle,
    pub(crate) scripture: Arc<ScriptureDb>,
    /// Host shown to operators so phones on the LAN can connect.
    pub(crate) host: String,
    pub(crate) port: u16,
}

impl AppState {
    pub(crate) fn new(
        presenter: PresenterHandle,
        scripture: Arc<ScriptureDb>,
        host: String,
        port: u16,
    ) -> Self {
        Self {
            presenter,
            scripture,
            host,
            port,
        }
    }
}

/// Address of the interface used for outbound traffic. Connecting a UDP
/// socket sends nothing; it only makes the OS pick a route.
pub(crate) async fn detect_lan_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").await.ok()?;
    socket.connect("192.0.2.1:9").await.ok()?;
    let ip = socket.local_addr().ok()?.ip();
    (!ip.is_unspecified()).then_some(ip)
}
