use super::*;
use shared::{
    domain::{SessionId, Transport},
    protocol::ServerFrame,
};

fn endpoint(id: i64, mode: DisplayMode) -> DisplayEndpoint {
    DisplayEndpoint {
        id: EndpointId(id),
        mode,
        transport: Transport::Local,
    }
}

fn sink() -> (Arc<dyn FrameSink>, mpsc::Receiver<ServerFrame>) {
    let (tx, rx) = mpsc::channel(4);
    (Arc::new(ChannelSink::new(tx)), rx)
}

#[test]
fn lists_by_mode_in_registration_order() {
    let mut registry = DisplayRegistry::new();
    registry.register(endpoint(1, DisplayMode::General), sink().0);
    registry.register(endpoint(2, DisplayMode::Speaker), sink().0);
    registry.register(endpoint(3, DisplayMode::General), sink().0);

    let general: Vec<_> = registry
        .list_by_mode(DisplayMode::General)
        .into_iter()
        .map(|endpoint| endpoint.id)
        .collect();
    assert_eq!(general, vec![EndpointId(1), EndpointId(3)]);
    assert!(registry.list_by_mode(DisplayMode::Controller).is_empty());
}

#[test]
fn double_registration_replaces_in_place() {
    let mut registry = DisplayRegistry::new();
    assert!(!registry.register(endpoint(1, DisplayMode::General), sink().0));
    registry.register(endpoint(2, DisplayMode::Speaker), sink().0);
    assert!(registry.register(endpoint(1, DisplayMode::Speaker), sink().0));

    assert_eq!(registry.len(), 2);
    let speakers: Vec<_> = registry
        .list_by_mode(DisplayMode::Speaker)
        .into_iter()
        .map(|endpoint| endpoint.id)
        .collect();
    assert_eq!(speakers, vec![EndpointId(1), EndpointId(2)]);
}

#[test]
fn unregistering_unknown_id_is_a_noop() {
    let mut registry = DisplayRegistry::new();
    registry.register(endpoint(1, DisplayMode::General), sink().0);
    assert_eq!(registry.unregister(EndpointId(9)), None);
    assert_eq!(
        registry.unregister(EndpointId(1)),
        Some(endpoint(1, DisplayMode::General))
    );
    assert_eq!(registry.unregister(EndpointId(1)), None);
    assert!(registry.is_empty());
}

#[test]
fn channel_sink_reports_full_and_closed() {
    let (tx, rx) = mpsc::channel(1);
    let sink = ChannelSink::new(tx);
    let frame = ServerFrame::MobileDisconnected {
        id: SessionId::new(),
    };

    assert_eq!(sink.deliver(frame.clone()), Ok(()));
    assert_eq!(sink.deliver(frame.clone()), Err(DeliveryError::Full));
    drop(rx);
    assert_eq!(sink.deliver(frame), Err(DeliveryError::Closed));
}
