//! Protocol variants
//!
//! AJP13 connections are usable as soon as they are open. AJP14 connections
//! must log in first. The pool calls [`ProtocolVariant::logon`] on every new
//! connection and never hands out one whose logon failed.

use ajp_wire::{Negotiation, Protocol};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::WorkerConfig;
use crate::connection::Connection;
use crate::error::{ConnectorError, Result};
use crate::handshake::Handshake;

/// Per-variant connection setup
#[async_trait]
pub trait ProtocolVariant: Send + Sync {
    /// Variant spoken on connections this setup prepares
    fn protocol(&self) -> Protocol;

    /// Make a freshly opened connection ready for exchanges
    async fn logon(&self, conn: &mut Connection) -> Result<()>;
}

/// Plain AJP13, no setup
#[derive(Debug, Clone, Copy, Default)]
pub struct Ajp13Variant;

#[async_trait]
impl ProtocolVariant for Ajp13Variant {
    fn protocol(&self) -> Protocol {
        Protocol::Ajp13
    }

    async fn logon(&self, _conn: &mut Connection) -> Result<()> {
        Ok(())
    }
}

/// AJP14 with a login handshake on every new connection
#[derive(Debug, Clone)]
pub struct Ajp14Variant {
    secret_key: String,
    web_server_name: String,
    negotiation: Negotiation,
    login_deadline: Option<Duration>,
}

impl Ajp14Variant {
    /// Login settings from a worker configuration
    pub fn new(config: &WorkerConfig) -> Result<Self> {
        let secret_key = config
            .secret_key
            .clone()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ConnectorError::Config("ajp14 requires a secret key".to_string()))?;
        Ok(Self {
            secret_key,
            web_server_name: config.web_server_name.clone(),
            negotiation: Negotiation(config.negotiation),
            login_deadline: config.login_deadline(),
        })
    }
}

#[async_trait]
impl ProtocolVariant for Ajp14Variant {
    fn protocol(&self) -> Protocol {
        Protocol::Ajp14
    }

    async fn logon(&self, conn: &mut Connection) -> Result<()> {
        Handshake::new(&self.secret_key, &self.web_server_name, self.negotiation)
            .with_deadline(self.login_deadline)
            .run(conn)
            .await
            .map(|_| ())
    }
}

/// Setup matching the configured protocol
pub fn for_config(config: &WorkerConfig) -> Result<Arc<dyn ProtocolVariant>> {
    Ok(match config.protocol {
        Protocol::Ajp13 => Arc::new(Ajp13Variant),
        Protocol::Ajp14 => Arc::new(Ajp14Variant::new(config)?),
    })
}
