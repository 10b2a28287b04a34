//! Subscriber sessions against the in-process realtime hub.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use trackview_core::asset_connection::channel_name;
use trackview_core::{
    Accuracy, LocationUpdate, Resolution, SessionState, Subscriber, SubscriberConfig,
    TrackingError,
};
use trackview_env::EnvError;
use trackview_sim::{Route, SimPublisher, SimRealtime};

fn balanced() -> Resolution {
    Resolution::new(Accuracy::Balanced, 1000, 1.0)
}

fn subscriber(hub: &SimRealtime) -> Subscriber<SimRealtime> {
    Subscriber::new(
        Arc::new(hub.connect()),
        SubscriberConfig::default().with_client_id("web-1"),
    )
}

fn recorder<T: Clone + Send + 'static>() -> (Arc<Mutex<Vec<T>>>, Arc<dyn Fn(T) + Send + Sync>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, Arc::new(move |value: T| sink.lock().unwrap().push(value)))
}

async fn online_publisher(hub: &SimRealtime, tracking_id: &str) -> SimPublisher {
    let mut publisher = SimPublisher::new(hub, tracking_id, Route::default(), balanced());
    publisher.go_online().await.unwrap();
    publisher
}

fn publish_fix(publisher: &mut SimPublisher, secs: u64) -> LocationUpdate {
    publisher.record_fix(Duration::from_secs(secs));
    let update = publisher.take_update().unwrap();
    publisher.publish(&update).unwrap();
    update
}

#[tokio::test]
async fn test_late_subscriber_sees_publisher_and_last_fix() {
    let hub = SimRealtime::new();
    let mut publisher = online_publisher(&hub, "van-7").await;
    publish_fix(&mut publisher, 0);
    let latest = publish_fix(&mut publisher, 1);

    let subscriber = subscriber(&hub);
    let asset = subscriber.get("van-7", None);
    let (statuses, on_status) = recorder::<bool>();
    let (locations, on_location) = recorder::<LocationUpdate>();
    asset.add_status_listener(on_status);
    asset.add_location_listener(on_location);
    asset.start().await.unwrap();

    assert_eq!(*statuses.lock().unwrap(), vec![true]);
    assert_eq!(*locations.lock().unwrap(), vec![latest]);
    assert_eq!(asset.state().await, SessionState::Started);
}

#[tokio::test]
async fn test_stop_leaves_presence_once() {
    let hub = SimRealtime::new();
    let subscriber = subscriber(&hub);
    let asset = subscriber.start("van-7", Some(balanced())).await.unwrap();
    let name = channel_name("van-7");
    assert_eq!(hub.members(&name).len(), 1);

    asset.stop().await.unwrap();
    asset.stop().await.unwrap();

    assert!(hub.members(&name).is_empty());
    assert_eq!(hub.stats().leaves, 1);
    assert_eq!(hub.stats().releases, 1);
    assert_eq!(hub.handler_count(&name), 0);
}

#[tokio::test]
async fn test_change_request_reaches_publisher_and_comes_back() {
    let hub = SimRealtime::new();
    let mut publisher = online_publisher(&hub, "van-7").await;
    let subscriber = subscriber(&hub);
    let asset = subscriber.get("van-7", Some(balanced()));
    let (resolutions, on_resolution) = recorder::<Resolution>();
    let (intervals, on_interval) = recorder::<u64>();
    asset.add_resolution_listener(on_resolution);
    asset.add_location_update_interval_listener(on_interval);
    asset.start().await.unwrap();

    let faster = Resolution::new(Accuracy::High, 250, 0.5);
    asset.send_change_request(faster).await.unwrap();
    assert!(publisher.sync_resolution().await.unwrap());

    assert_eq!(publisher.resolution(), faster);
    assert_eq!(resolutions.lock().unwrap().last(), Some(&faster));
    assert_eq!(*intervals.lock().unwrap(), vec![1000, 250]);
}

#[tokio::test]
async fn test_dropped_publisher_goes_offline_then_online() {
    let hub = SimRealtime::new();
    let mut publisher = online_publisher(&hub, "van-7").await;
    let subscriber = subscriber(&hub);
    let asset = subscriber.get("van-7", None);
    let (statuses, on_status) = recorder::<bool>();
    asset.add_status_listener(on_status);
    asset.start().await.unwrap();

    publisher.drop_connection();
    publisher.record_fix(Duration::from_secs(1));
    let update = publisher.take_update().unwrap();
    assert_eq!(publisher.publish(&update), Err(EnvError::ConnectionClosed));
    publisher.go_online().await.unwrap();

    assert_eq!(*statuses.lock().unwrap(), vec![true, false, true]);
}

#[tokio::test]
async fn test_rejected_enter_leaves_no_handlers() {
    let hub = SimRealtime::new();
    hub.fail_next_enter(EnvError::rejected("presence not permitted"));
    let subscriber = subscriber(&hub);
    let asset = subscriber.get("van-7", None);

    let result = asset.start().await;

    assert!(matches!(result, Err(TrackingError::Transport(EnvError::Rejected(_)))));
    assert_eq!(asset.state().await, SessionState::Initialized);
    assert_eq!(hub.handler_count(&channel_name("van-7")), 0);

    // A second attempt goes through normally
    asset.start().await.unwrap();
    assert_eq!(asset.state().await, SessionState::Started);
}

#[tokio::test]
async fn test_assets_only_see_their_own_channel() {
    let hub = SimRealtime::new();
    let mut van = online_publisher(&hub, "van-7").await;
    let mut truck = online_publisher(&hub, "truck-2").await;
    let subscriber = subscriber(&hub);

    let (van_seen, on_van) = recorder::<LocationUpdate>();
    let (truck_seen, on_truck) = recorder::<LocationUpdate>();
    subscriber.get("van-7", None).add_location_listener(on_van);
    subscriber.get("truck-2", None).add_location_listener(on_truck);
    subscriber.start("van-7", None).await.unwrap();
    subscriber.start("truck-2", None).await.unwrap();

    let van_update = publish_fix(&mut van, 1);
    publish_fix(&mut truck, 1);
    publish_fix(&mut truck, 2);

    assert_eq!(*van_seen.lock().unwrap(), vec![van_update]);
    assert_eq!(truck_seen.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_close_stops_every_asset() {
    let hub = SimRealtime::new();
    let subscriber = subscriber(&hub);
    let van = subscriber.start("van-7", None).await.unwrap();
    let truck = subscriber.start("truck-2", None).await.unwrap();

    subscriber.close().await.unwrap();

    assert_eq!(van.state().await, SessionState::Stopped);
    assert_eq!(truck.state().await, SessionState::Stopped);
    assert_eq!(hub.stats().leaves, 2);
}
