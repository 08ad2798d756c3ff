//! SSH agent protocol binding and socket server.

use std::io;
use std::os::unix::fs::PermissionsExt as _;
use std::path::Path;
use std::sync::Arc;

use futures::{SinkExt as _, TryStreamExt as _};
use ssh_agent_lib::agent::Session;
use ssh_agent_lib::codec::Codec;
use ssh_agent_lib::error::AgentError;
use ssh_agent_lib::proto::{
    AddIdentity, AddIdentityConstrained, Identity, RemoveIdentity, Request, Response, SignRequest,
};
use ssh_key::Signature;
use tokio::net::{UnixListener, UnixStream};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::agent::KeyAgent;

/// One client connection's view of the agent.
///
/// Sessions are cheap clones over a shared [`KeyAgent`]; all state lives in
/// the agent.
#[derive(Clone, Debug)]
pub struct AgentSession {
    agent: Arc<KeyAgent>,
}

impl AgentSession {
    pub fn new(agent: Arc<KeyAgent>) -> Self {
        Self { agent }
    }
}

#[ssh_agent_lib::async_trait]
impl Session for AgentSession {
    async fn request_identities(&mut self) -> Result<Vec<Identity>, AgentError> {
        let identities: Vec<Identity> = self
            .agent
            .list()
            .into_iter()
            .map(|key| Identity {
                pubkey: key.key.into(),
                comment: key.comment,
            })
            .collect();
        debug!(count = identities.len(), "request_identities");
        Ok(identities)
    }

    async fn sign(&mut self, request: SignRequest) -> Result<Signature, AgentError> {
        Ok(self.agent.sign(&request.pubkey, &request.data)?)
    }

    async fn add_identity(&mut self, _identity: AddIdentity) -> Result<(), AgentError> {
        Ok(self.agent.add()?)
    }

    async fn add_identity_constrained(
        &mut self,
        _identity: AddIdentityConstrained,
    ) -> Result<(), AgentError> {
        Ok(self.agent.add()?)
    }

    async fn remove_identity(&mut self, identity: RemoveIdentity) -> Result<(), AgentError> {
        Ok(self.agent.remove(&identity.pubkey)?)
    }

    async fn remove_all_identities(&mut self) -> Result<(), AgentError> {
        self.agent.remove_all();
        Ok(())
    }

    async fn lock(&mut self, key: String) -> Result<(), AgentError> {
        let key = Zeroizing::new(key);
        Ok(self.agent.lock(key.as_bytes())?)
    }

    async fn unlock(&mut self, key: String) -> Result<(), AgentError> {
        let key = Zeroizing::new(key);
        Ok(self.agent.unlock(key.as_bytes())?)
    }
}

/// Bind the agent socket at `path`, owner-only.
///
/// A stale socket left behind by a previous run is removed first.
pub fn bind(path: &Path) -> io::Result<UnixListener> {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "removed stale agent socket"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    let listener = UnixListener::bind(path)?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(listener)
}

/// Serve the agent protocol on a single connection until the client hangs up.
///
/// Safe to call concurrently for separate connections, including while
/// [`serve`] is running.
pub async fn serve_one(agent: Arc<KeyAgent>, stream: UnixStream) -> Result<(), AgentError> {
    let mut adapter = Framed::new(stream, Codec::<Request, Response>::default());
    let mut session = AgentSession::new(agent);
    while let Some(request) = adapter.try_next().await? {
        let response = match session.handle(request).await {
            Ok(response) => response,
            Err(AgentError::ExtensionFailure) => Response::ExtensionFailure,
            Err(e) => {
                debug!("agent request failed: {e}");
                Response::Failure
            }
        };
        adapter.send(response).await?;
    }
    Ok(())
}

/// Accept connections on `listener` and serve each in its own task.
///
/// Runs until `shutdown` is cancelled or accepting fails.  Cancellation
/// closes the listener; connections already accepted are left to finish and
/// are waited for before returning.
pub async fn serve(agent: Arc<KeyAgent>, listener: UnixListener, shutdown: CancellationToken) {
    let connections = TaskTracker::new();

    let mut accept_loop = {
        let connections = connections.clone();
        tokio::spawn(async move {
            loop {
                let stream = match listener.accept().await {
                    Ok((stream, _addr)) => stream,
                    Err(e) => {
                        warn!("agent listener stopped: {e}");
                        return;
                    }
                };
                let agent = Arc::clone(&agent);
                connections.spawn(async move {
                    if let Err(e) = serve_one(agent, stream).await {
                        debug!("agent connection ended with error: {e}");
                    }
                });
            }
        })
    };

    let cancelled = tokio::select! {
        () = shutdown.cancelled() => true,
        _ = &mut accept_loop => false,
    };
    if cancelled {
        info!("shutdown requested; closing agent listener");
        // Dropping the aborted task drops the listener with it.
        accept_loop.abort();
        let _ = accept_loop.await;
    }

    connections.close();
    if !connections.is_empty() {
        debug!(active = connections.len(), "waiting for agent connections to finish");
    }
    connections.wait().await;
}
