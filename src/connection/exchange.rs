//! Certificate bootstrap over the untrusted channel
//!
//! ```text
//! Device                                  Desktop (insecure port)
//!   |-------- setup {os, device, app} ------->|
//!   |-------- signCertificate {csr, dest} --->|
//!   |<------- config (maybe empty) -----------|   store config, drop channel
//!   |            or                           |
//!   |<------- error "not implemented" --------|   old desktop:
//!   |-------- signCertificate (one-way) ----->|   resend, drop channel
//! ```
//!
//! Dropping the channel makes the listener observe a disconnect, which
//! schedules a reconnect that takes the secure path.

use bytes::Bytes;
use link_shared::link::NOT_IMPLEMENTED;
use link_shared::state_machine::LinkEvent;
use link_shared::{CertificateRequest, SetupPayload};
use serde_json::Value;
use tracing::{error, info, warn};

use super::worker::{Command, LinkWorker};
use crate::transport::TransportError;

impl LinkWorker {
    pub(super) fn do_certificate_exchange(&mut self) {
        let setup = SetupPayload::insecure(
            &self.identity.os,
            &self.identity.device,
            &self.identity.app,
        );

        info!(step = "Connect insecurely", "Opening bootstrap channel");
        self.trusted = false;
        self.open_transport(self.config.insecure_port, &setup, None, false);
    }

    /// Called once the bootstrap channel is up
    pub(super) fn request_signed_certificate(&mut self) {
        let csr = match self.credentials.create_certificate_signing_request() {
            Ok(csr) => csr,
            Err(e) => {
                error!(step = "Generate CSR", "Failed to generate CSR: {:#}", e);
                self.failed_attempts += 1;
                self.release_client();
                return;
            }
        };

        let request = CertificateRequest::new(csr, self.credentials.certificate_directory_path());
        let request = match request.to_json() {
            Ok(request) => Bytes::from(request),
            Err(e) => {
                error!("Failed to encode certificate request: {}", e);
                self.release_client();
                return;
            }
        };

        let Some(client) = &self.client else {
            return;
        };
        info!(step = "Getting cert from desktop", "Requesting signed certificate");
        let response = client.request_response(request.clone());
        let generation = self.generation;
        let commands = self.commands.clone();
        tokio::spawn(async move {
            let result = response.await;
            if let Some(commands) = commands.upgrade() {
                let _ = commands.send(Command::CertificateResponse {
                    generation,
                    request,
                    result,
                });
            }
        });

        self.failed_attempts = 0;
    }

    pub(super) fn on_certificate_response(
        &mut self,
        request: Bytes,
        result: Result<Bytes, TransportError>,
    ) {
        match result {
            Ok(body) => {
                if !body.is_empty() {
                    match serde_json::from_slice::<Value>(&body) {
                        Ok(config) => {
                            if let Err(e) = self.credentials.store_connection_config(&config) {
                                error!("Failed to store connection config: {:#}", e);
                            }
                        }
                        Err(e) => warn!("Desktop sent an unreadable config: {}", e),
                    }
                }
                info!("Certificate exchange complete.");
                self.release_client();
            }
            Err(e @ TransportError::Protocol(_)) => {
                let message = e.payload_message().unwrap_or_default();
                if message == NOT_IMPLEMENTED {
                    self.send_legacy_certificate_request(request);
                } else {
                    error!(
                        "Desktop failed to provide certificates. Error from desktop:\n{}",
                        message
                    );
                }
            }
            Err(e) => error!("Error during certificate exchange: {}", e),
        }
    }

    /// Desktop predates request/response certificate signing
    fn send_legacy_certificate_request(&mut self, request: Bytes) {
        info!(step = "Sending fallback certificate request", "Desktop is outdated, resending one-way");
        if let Some(client) = &self.client {
            if let Err(e) = client.fire_and_forget(request) {
                warn!("Fallback certificate request not sent: {}", e);
            }
        }
        self.release_client();
    }

    /// Tear down the bootstrap channel so the next start goes secure
    pub(super) fn release_client(&mut self) {
        if let Some(client) = self.client.take() {
            client.disconnect();
        }
        if !self.is_open {
            // No open session left to report the teardown
            self.generation += 1;
            self.transition(LinkEvent::ConnectionLost);
            self.schedule_reconnect();
        }
    }
}
