//! Shared handle to the current device session.
//!
//! Both the on-demand reconciliation path and the sync scheduler hold a clone
//! of the same [`DeviceLink`]. Either side may disconnect or reconnect without
//! coordinating with the other; a caller that already took the session keeps
//! using it until its own operation finishes.

use crate::device::source::{DeviceConnector, DeviceError, DeviceSession, DeviceTarget};
use crate::device::types::UserDirectory;
use std::sync::{Arc, RwLock};

struct Connected {
    endpoint: String,
    session: Arc<dyn DeviceSession>,
    directory: Arc<UserDirectory>,
}

#[derive(Clone, Default)]
pub struct DeviceLink {
    inner: Arc<RwLock<Option<Connected>>>,
}

impl std::fmt::Debug for DeviceLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceLink")
            .field("endpoint", &self.endpoint())
            .finish()
    }
}

impl DeviceLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session and load the user directory.
    ///
    /// A failure to list users is not fatal: the session is kept and names
    /// resolve to "Unknown". Any previous session is closed first.
    pub async fn connect(
        &self,
        connector: &dyn DeviceConnector,
        target: &DeviceTarget,
    ) -> Result<usize, DeviceError> {
        self.disconnect().await;

        let session = connector.connect(target).await?;
        let directory: UserDirectory = match session.list_users().await {
            Ok(users) => users.into_iter().collect(),
            Err(e) => {
                tracing::warn!(endpoint = %target.endpoint(), "Error loading users: {e}");
                UserDirectory::new()
            }
        };
        let user_count = directory.len();

        tracing::info!(
            endpoint = %target.endpoint(),
            users = user_count,
            "Connected to device"
        );

        *self.write() = Some(Connected {
            endpoint: target.endpoint(),
            session,
            directory: Arc::new(directory),
        });

        Ok(user_count)
    }

    /// Close the current session, if any.
    pub async fn disconnect(&self) {
        let previous = self.write().take();
        if let Some(connected) = previous {
            if let Err(e) = connected.session.close().await {
                tracing::warn!(endpoint = %connected.endpoint, "Error closing device session: {e}");
            } else {
                tracing::info!(endpoint = %connected.endpoint, "Disconnected from device");
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.read().is_some()
    }

    /// The current session, or `None` when disconnected.
    pub fn session(&self) -> Option<Arc<dyn DeviceSession>> {
        self.read().as_ref().map(|c| Arc::clone(&c.session))
    }

    /// Users loaded when the current session was opened.
    pub fn directory(&self) -> Arc<UserDirectory> {
        self.read()
            .as_ref()
            .map(|c| Arc::clone(&c.directory))
            .unwrap_or_default()
    }

    pub fn endpoint(&self) -> Option<String> {
        self.read().as_ref().map(|c| c.endpoint.clone())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Option<Connected>> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Option<Connected>> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}
