//! Snapshot capture.
//!
//! The capture script copies the page's document model into JSON in one
//! evaluation, after the readiness session reported the content stable (or
//! gave up on it settling). Validation and synced-reference substitution
//! happen on this side, in [`Snapshot::from_capture`].

use larkdown::{Snapshot, SnapshotLimits};
use serde_json::Value;
use tracing::{debug, info};

use crate::channel::RemoteChannel;
use crate::error::{ExtractError, TransportError};
use crate::scripts;

/// Take one snapshot of the document model
pub async fn capture_snapshot<C: RemoteChannel + ?Sized>(
    channel: &C,
    limits: SnapshotLimits,
) -> Result<Snapshot, ExtractError> {
    let value = match channel.evaluate(scripts::CAPTURE).await {
        Ok(value) => value,
        Err(TransportError::Script(message)) => return Err(ExtractError::Content(message)),
        Err(e) => return Err(e.into()),
    };

    // The script returns JSON text; a channel may also hand back the object
    let capture = match value {
        Value::String(text) => serde_json::from_str::<Value>(&text)
            .map_err(|e| ExtractError::Content(format!("capture is not JSON: {}", e)))?,
        Value::Null => return Err(ExtractError::Content("capture returned nothing".to_string())),
        other => other,
    };

    let snapshot = Snapshot::from_capture(&capture, limits)
        .map_err(|e| ExtractError::Content(e.to_string()))?;

    debug!(
        "Captured {} blocks, {} sheets, {} capture warnings",
        snapshot.block_count(),
        snapshot.sheets.len(),
        snapshot.capture_warnings.len()
    );
    info!("Captured {:?}", snapshot.title);
    Ok(snapshot)
}
