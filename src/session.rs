//! Hardware session management.
//!
//! A [`MotionSession`] owns one connected MotionLink, the ConfigTransport it
//! was loaded through, and the [`Topology`] read at connect time. It is the
//! only place a link is opened or closed; the state machine holds at most one
//! session at a time.
//!
//! ## Lifecycle
//!
//! - **`establish`**: open and log in, query the firmware version, load the topology.
//! - **`reload_topology`**: build a fresh topology and swap it in whole.
//! - **`close`**: release the link.
//!
//! Managers and orchestrators handed out by a session share its link and a
//! snapshot of its topology.

use crate::config::{FtsConfig, TopologyConfig};
use crate::error::{FtsError, FtsResult};
use crate::hardware::capabilities::{ConfigTransport, MotionLink};
use crate::motion::{AbortFlag, GatheringSettings, MotionGroupManager, ScanOrchestrator};
use crate::topology::Topology;
use std::sync::Arc;
use tracing::{info, warn};

/// One connected controller session.
pub struct MotionSession {
    link: Arc<dyn MotionLink>,
    transport: Arc<dyn ConfigTransport>,
    topology: Arc<Topology>,
    firmware: String,
}

impl MotionSession {
    /// Connect, authenticate and load the topology.
    ///
    /// On failure after the link was opened, the link is closed again.
    pub async fn establish(
        link: Arc<dyn MotionLink>,
        transport: Arc<dyn ConfigTransport>,
        config: &FtsConfig,
    ) -> FtsResult<Self> {
        let controller = &config.controller;
        link.open(&controller.host, controller.port, controller.timeout())
            .await
            .map_err(|f| FtsError::hardware(&controller.host, "OpenInstrument", f))?;

        match Self::bring_up(&link, transport.as_ref(), config).await {
            Ok((firmware, topology)) => {
                info!(host = %controller.host, %firmware, "motion session established");
                Ok(Self {
                    link,
                    transport,
                    topology: Arc::new(topology),
                    firmware,
                })
            }
            Err(e) => {
                if let Err(close_err) = link.close().await {
                    warn!(error = %close_err, "closing link after failed bring-up");
                }
                Err(e)
            }
        }
    }

    async fn bring_up(
        link: &Arc<dyn MotionLink>,
        transport: &dyn ConfigTransport,
        config: &FtsConfig,
    ) -> FtsResult<(String, Topology)> {
        let controller = &config.controller;
        link.login(&controller.username, &controller.password)
            .await
            .map_err(|f| FtsError::hardware("controller", "Login", f))?;
        let firmware = link
            .firmware_version()
            .await
            .map_err(|f| FtsError::hardware("controller", "FirmwareVersionGet", f))?;
        let topology = Topology::load(transport, link.as_ref(), &config.topology).await?;
        Ok((firmware, topology))
    }

    /// Controller firmware version.
    pub fn firmware(&self) -> &str {
        &self.firmware
    }

    /// Current topology snapshot.
    pub fn topology(&self) -> &Arc<Topology> {
        &self.topology
    }

    /// Configuration transport of this session.
    pub fn transport(&self) -> &Arc<dyn ConfigTransport> {
        &self.transport
    }

    /// Group operations over the current topology.
    pub fn group_manager(&self) -> MotionGroupManager {
        MotionGroupManager::new(self.link.clone(), self.topology.clone())
    }

    /// Scan orchestrator over the current topology.
    pub fn scan_orchestrator(&self, gathering: GatheringSettings, abort: AbortFlag) -> ScanOrchestrator {
        ScanOrchestrator::new(self.link.clone(), self.topology.clone(), gathering, abort)
    }

    /// Reload the topology. The old topology stays in place if loading fails.
    pub async fn reload_topology(&mut self, config: &TopologyConfig) -> FtsResult<()> {
        let topology = Topology::load(self.transport.as_ref(), self.link.as_ref(), config).await?;
        self.topology = Arc::new(topology);
        info!("topology reloaded");
        Ok(())
    }

    /// Release the link.
    pub async fn close(&self) -> FtsResult<()> {
        self.link
            .close()
            .await
            .map_err(|f| FtsError::hardware("controller", "CloseInstrument", f))?;
        info!("motion session closed");
        Ok(())
    }
}
