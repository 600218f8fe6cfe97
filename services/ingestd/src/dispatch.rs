//! Decoder dispatch.
//!
//! Resolves the originating device through the directory and routes the
//! payload to the decoder its model capability names. A known device must
//! decode with its own protocol or fail explicitly — there is no silent
//! fallback to another decoder. Traffic from unknown devices runs through
//! an explicit, ordered, configurable list of identity-extracting decoders
//! before being given up on; an all-miss is a normal outcome
//! (`Ok(None)`), not an error.

use crate::decoders::{self, DecodeError};
use crate::store::{DeviceDirectory, StoreError};
use rastro_protocol::{DecoderKind, NormalizedTelemetry, SourceType, capability_for};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("decoder {kind} failed for model {model_id}: {source}")]
    DecoderFailed {
        model_id: String,
        kind: DecoderKind,
        #[source]
        source: DecodeError,
    },
    #[error(transparent)]
    Directory(#[from] StoreError),
}

pub struct Dispatcher {
    directory: Arc<dyn DeviceDirectory>,
    fallback: Vec<DecoderKind>,
}

impl Dispatcher {
    pub fn new(directory: Arc<dyn DeviceDirectory>, fallback: Vec<DecoderKind>) -> Self {
        Dispatcher {
            directory,
            fallback,
        }
    }

    /// Decode a candidate payload.
    ///
    /// Returns `Ok(None)` when no decoder produced a result — expected for
    /// unrecognized traffic and never aborts the audit pipeline.
    pub async fn dispatch(
        &self,
        payload: &[u8],
        declared_serial: Option<&str>,
        source: SourceType,
    ) -> Result<Option<NormalizedTelemetry>, DispatchError> {
        if let Some(serial) = declared_serial.filter(|s| !s.is_empty()) {
            if let Some(device) = self.directory.find_by_serial_number(serial).await? {
                let Some(cap) = capability_for(&device.model_id) else {
                    debug!(
                        serial,
                        model_id = %device.model_id,
                        "no capability entry for model; leaving message undecoded"
                    );
                    return Ok(None);
                };
                let telemetry = decoders::run_decoder(cap.decoder, source, payload, serial)
                    .map_err(|e| DispatchError::DecoderFailed {
                        model_id: device.model_id.clone(),
                        kind: cap.decoder,
                        source: e,
                    })?;
                return Ok(Some(telemetry));
            }
        }

        // Unknown device: try the identity-extracting decoders
        // speculatively. Only a result that recovered a device identity
        // from the payload itself counts.
        for kind in &self.fallback {
            match decoders::run_decoder(*kind, source, payload, declared_serial.unwrap_or("")) {
                Ok(telemetry) if !telemetry.device_serial_number.is_empty() => {
                    debug!(
                        decoder = %kind,
                        serial = %telemetry.device_serial_number,
                        "fallback decoder recovered device identity"
                    );
                    return Ok(Some(telemetry));
                }
                Ok(_) => {
                    debug!(decoder = %kind, "fallback decoder produced no identity; skipping");
                }
                Err(e) => {
                    debug!(decoder = %kind, error = %e, "fallback decoder miss");
                }
            }
        }
        Ok(None)
    }
}
