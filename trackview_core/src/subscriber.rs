//! Subscriber - the multi-asset session object.

use crate::asset::Asset;
use crate::config::SubscriberConfig;
use crate::error::Result;
use crate::types::Resolution;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error};
use trackview_env::{ChannelOptions, ClientId, RealtimeClient};

/// Relays location updates for any number of tracked assets over one
/// realtime client.
///
/// # Usage
///
/// ```ignore
/// let subscriber = Subscriber::new(client, SubscriberConfig::default().with_client_id("web-1"));
/// let asset = subscriber.get("van-7", None);
/// asset.add_location_listener(Arc::new(|update| println!("{:?}", update.location)));
/// asset.start().await?;
/// ```
pub struct Subscriber<C: RealtimeClient> {
    client: Arc<C>,
    config: SubscriberConfig,
    assets: Mutex<HashMap<String, Arc<Asset<C>>>>,
}

impl<C: RealtimeClient> Subscriber<C> {
    pub fn new(client: Arc<C>, config: SubscriberConfig) -> Self {
        Self {
            client,
            config,
            assets: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &SubscriberConfig {
        &self.config
    }

    /// Returns the asset for `tracking_id`, creating it on first use.
    ///
    /// `resolution` only applies when the asset is created.
    pub fn get(&self, tracking_id: &str, resolution: Option<Resolution>) -> Arc<Asset<C>> {
        let mut assets = self.assets.lock().unwrap_or_else(PoisonError::into_inner);
        let asset = assets.entry(tracking_id.to_string()).or_insert_with(|| {
            debug!(tracking_id, "creating asset");
            Arc::new(Asset::new(
                Arc::clone(&self.client),
                self.config.client_id.as_deref().map(ClientId::new),
                tracking_id,
                ChannelOptions {
                    rewind: self.config.rewind,
                },
                resolution,
            ))
        });
        Arc::clone(asset)
    }

    /// Gets and starts the asset for `tracking_id`.
    pub async fn start(
        &self,
        tracking_id: &str,
        resolution: Option<Resolution>,
    ) -> Result<Arc<Asset<C>>> {
        let asset = self.get(tracking_id, resolution);
        asset.start().await?;
        Ok(asset)
    }

    pub fn tracking_ids(&self) -> Vec<String> {
        let assets = self.assets.lock().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<String> = assets.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Stops every asset, then closes the client.
    ///
    /// All assets are stopped even if one fails; the first failure is returned.
    pub async fn close(&self) -> Result<()> {
        let assets: Vec<Arc<Asset<C>>> = self
            .assets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        let mut first_error = None;
        for asset in assets {
            if let Err(err) = asset.stop().await {
                error!(tracking_id = asset.tracking_id(), error = %err, "failed to stop asset");
                first_error.get_or_insert(err);
            }
        }
        self.client.close().await;

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset_connection::SessionState;
    use crate::error::TrackingError;
    use crate::testutil::{Call, RecordingClient};
    use trackview_env::EnvError;

    fn subscriber(client: &Arc<RecordingClient>) -> Subscriber<RecordingClient> {
        Subscriber::new(
            client.clone(),
            SubscriberConfig::default().with_client_id("web-1"),
        )
    }

    #[test]
    fn test_get_returns_same_asset() {
        let client = RecordingClient::shared();
        let subscriber = subscriber(&client);

        let first = subscriber.get("van-7", None);
        let second = subscriber.get("van-7", None);
        let other = subscriber.get("truck-2", None);

        assert!(Arc::ptr_eq(&first, &second));
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(subscriber.tracking_ids(), vec!["truck-2", "van-7"]);
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_assets_are_independent() {
        let client = RecordingClient::shared();
        let subscriber = subscriber(&client);

        let van = subscriber.start("van-7", None).await.unwrap();
        let truck = subscriber.start("truck-2", None).await.unwrap();
        van.stop().await.unwrap();

        assert_eq!(van.state().await, SessionState::Stopped);
        assert_eq!(truck.state().await, SessionState::Started);
    }

    #[tokio::test]
    async fn test_missing_client_id_is_configuration_error() {
        let client = RecordingClient::shared();
        let subscriber = Subscriber::new(client.clone(), SubscriberConfig::default());

        let result = subscriber.start("van-7", None).await;

        assert!(matches!(result, Err(TrackingError::MissingClientId)));
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_close_stops_assets_then_client() {
        let client = RecordingClient::shared();
        let subscriber = subscriber(&client);
        subscriber.start("van-7", None).await.unwrap();
        client.fail_leave(EnvError::rejected("leave refused"));

        let result = subscriber.close().await;

        assert!(matches!(result, Err(TrackingError::Transport(_))));
        assert_eq!(client.calls().last(), Some(&Call::Close));
    }
}
