//! Pre-boot pipeline.
//!
//! Runs before every start and restart reaches the environment. Steps are
//! ordered; some abort the boot, the rest only log.

use super::PowerError;
use crate::server::Server;
use std::path::Path;
use tracing::{debug, warn};

impl Server {
    pub(crate) async fn on_before_start(&self) -> Result<(), PowerError> {
        debug!(server = %self.id(), "syncing server configuration with control plane");
        self.sync().await.map_err(PowerError::SyncFailed)?;

        if self.is_suspended() {
            return Err(PowerError::Suspended);
        }

        self.sync_with_environment();

        if self.disk_space() <= 0 {
            // Unlimited: refresh usage in the background, never block boot on it.
            let filesystem = self.filesystem().clone();
            let id = self.id();
            tokio::spawn(async move {
                if !filesystem.has_space_available(true).await {
                    warn!(server = %id, "disk usage recalculation reported no space");
                }
            });
        } else {
            self.publish_daemon_message("Checking server disk space usage, this could take a few seconds...");
            self.filesystem()
                .has_space_err(false)
                .await
                .map_err(PowerError::DiskSpaceExceeded)?;
        }

        self.publish_daemon_message("Updating process configuration files...");
        self.update_configuration_files().await;

        if self.daemon_config().check_permissions_on_boot {
            self.publish_daemon_message("Ensuring file permissions are set correctly, this could take a few seconds...");
            self.filesystem()
                .chown(Path::new("/"))
                .await
                .map_err(PowerError::Permission)?;
        }

        Ok(())
    }
}
