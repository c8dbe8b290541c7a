//! Message-passing front end for the cache controller.
//!
//! The foreground application never touches the controller directly. It
//! holds a [`ControlClient`], sends request envelopes over a channel and
//! awaits the reply on a oneshot. Activation notices arrive on a broadcast
//! subscription.

use crate::controller::CacheController;
use crate::error::{CacheError, Result};
use crate::network::Network;
use crate::protocol::{ControlCommand, ControlRequest, ControlResponse, Notification};
use crate::storage::CacheStorage;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

struct Envelope {
    request: ControlRequest,
    reply: oneshot::Sender<ControlResponse>,
}

/// Cloneable handle used by foreground instances
#[derive(Clone)]
pub struct ControlClient {
    requests: mpsc::Sender<Envelope>,
    notifications: broadcast::Sender<Notification>,
}

impl ControlClient {
    pub async fn request(&self, request: ControlRequest) -> Result<ControlResponse> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(Envelope { request, reply })
            .await
            .map_err(|_| CacheError::Closed)?;
        response.await.map_err(|_| CacheError::Closed)
    }

    pub async fn send(&self, command: ControlCommand) -> Result<ControlResponse> {
        self.request(ControlRequest::new(command)).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }
}

/// Run the command loop until every client is dropped
pub fn serve<N, S>(controller: Arc<CacheController<N, S>>) -> (ControlClient, JoinHandle<()>)
where
    N: Network + 'static,
    S: CacheStorage + 'static,
{
    let (requests, mut inbox) = mpsc::channel::<Envelope>(32);
    let client = ControlClient {
        requests,
        notifications: controller.notifications(),
    };

    let handle = tokio::spawn(async move {
        while let Some(Envelope { request, reply }) = inbox.recv().await {
            let response = controller.handle_command(request).await;
            if reply.send(response).is_err() {
                tracing::debug!("Control client went away before the reply");
            }
        }
        tracing::debug!("Cache control loop stopped");
    });

    (client, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::http::Response;
    use crate::network::MemoryNetwork;
    use crate::protocol::ResponsePayload;
    use crate::storage::MemoryCacheStorage;

    fn controller() -> Arc<CacheController<MemoryNetwork>> {
        let network = MemoryNetwork::new();
        network.route("/", Response::ok("<html>"));
        let config = CacheConfig::new("app", "v3").with_precache_urls(["/"]);
        Arc::new(CacheController::new(config, network, MemoryCacheStorage::new()).unwrap())
    }

    #[tokio::test]
    async fn test_request_reply() {
        let (client, _task) = serve(controller());

        let response = client
            .request(ControlRequest::new(ControlCommand::GetCacheVersion).with_action("v"))
            .await
            .unwrap();
        assert!(response.success);
        assert_eq!(response.action.as_deref(), Some("v"));
        assert_eq!(
            response.payload,
            ResponsePayload::Version {
                version: "v3".into()
            }
        );
    }

    #[tokio::test]
    async fn test_skip_waiting_notifies_every_client() {
        let controller = controller();
        let (client, _task) = serve(controller.clone());
        let other = client.clone();
        let mut first = client.subscribe();
        let mut second = other.subscribe();

        controller.install().await.unwrap();
        client.send(ControlCommand::SkipWaiting).await.unwrap();

        assert!(matches!(
            first.recv().await.unwrap(),
            Notification::ServiceActivated { .. }
        ));
        assert!(matches!(
            second.recv().await.unwrap(),
            Notification::ServiceActivated { .. }
        ));
    }

    #[tokio::test]
    async fn test_loop_stops_when_clients_drop() {
        let (client, task) = serve(controller());
        drop(client);
        task.await.unwrap();
    }
}
