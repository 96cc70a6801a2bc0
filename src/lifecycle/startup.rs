//! Live resources of one successful startup.
//!
//! # Responsibilities
//! - Own the response socket and device set opened during startup
//! - Tear them down in order: persist settings, close devices, close socket
//!
//! # Design Decisions
//! - `teardown` consumes the context, so a torn-down run cannot be reused
//! - Every resource is optional; a run that failed before opening anything
//!   tears down cleanly

use crate::devices::{HomeBuilder, HomeSet};
use crate::net::{DatagramBootstrap, ResponseSocket};
use crate::system::SystemControl;

/// Resources owned by the current supervisor iteration.
#[derive(Debug)]
pub struct RunContext {
    system: SystemControl,
    socket: Option<ResponseSocket>,
    homes: Option<HomeSet>,
}

impl RunContext {
    pub fn new(system: SystemControl) -> Self {
        Self {
            system,
            socket: None,
            homes: None,
        }
    }

    pub fn iteration(&self) -> u64 {
        self.system.iteration()
    }

    pub fn system(&self) -> &SystemControl {
        &self.system
    }

    pub fn socket(&self) -> Option<&ResponseSocket> {
        self.socket.as_ref()
    }

    pub fn set_socket(&mut self, socket: ResponseSocket) {
        self.socket = Some(socket);
    }

    pub fn set_homes(&mut self, homes: HomeSet) {
        self.homes = Some(homes);
    }

    pub async fn teardown(mut self, homes: &dyn HomeBuilder, datagram: &dyn DatagramBootstrap) {
        match self.system.persist_if_changed() {
            Ok(true) => tracing::debug!(iteration = self.iteration(), "Changed settings saved at teardown"),
            Ok(false) => {}
            Err(e) => tracing::warn!(error = %e, "Could not persist settings at teardown"),
        }

        if let Some(set) = self.homes.take() {
            homes.close_all(set).await;
        }
        if let Some(socket) = self.socket.take() {
            datagram.close(socket).await;
        }
        tracing::debug!(iteration = self.iteration(), "Run context torn down");
    }
}
