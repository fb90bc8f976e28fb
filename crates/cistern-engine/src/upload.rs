//! Upload state machine
//!
//! `Planning → FrameOpen → ShardsInFlight → Finalizing → {Done | Failed |
//! Cancelled}`. Each shard job reads its plaintext slice, encrypts it at its
//! own offset, registers it with the bridge (which assigns a mirror), and
//! pushes the ciphertext. A failed push retries against a freshly assigned
//! mirror until the budget runs out, which fails the whole session. A
//! cancelled session never finalizes; its frame is abandoned.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicU32;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::sync::CancellationToken;

use cistern_bridge::types::{FinalizeFrame, RegisterShard};
use cistern_bridge::{BridgeClient, MirrorClient};
use cistern_core::config::TransferConfig;
use cistern_core::{ShardStatus, TransferError, TransferOutcome, UploadResult};
use cistern_crypto::{encrypt_at, shard_hash, EncryptionInfo};

use crate::planner::plan_shards;
use crate::pool::{drive_shards, or_cancelled, race_stop, Stop};
use crate::progress::ProgressMeter;
use crate::session::{ShardTable, UploadEvents, Uploader};

pub(crate) struct UploadRequest {
    pub bridge: BridgeClient,
    pub mirrors: MirrorClient,
    pub config: TransferConfig,
    pub bucket_id: String,
    pub source: PathBuf,
    /// Obfuscated file name recorded on the bridge
    pub name: String,
    pub encryption: Arc<EncryptionInfo>,
    pub events: Arc<dyn UploadEvents>,
}

/// Create the session and return its handle immediately; the transfer runs
/// on background tasks.
pub(crate) fn start(request: UploadRequest) -> Uploader {
    let cancel = CancellationToken::new();
    let fraction_bp = Arc::new(AtomicU32::new(0));

    let driver_cancel = cancel.clone();
    let driver_fraction = fraction_bp.clone();
    let driver = tokio::spawn(async move {
        let events = request.events.clone();
        match run(request, &driver_cancel, driver_fraction).await {
            Ok(Some(result)) => {
                tracing::info!(file = %result.file_id, "upload finished");
                events.on_finish(&result);
                TransferOutcome::Done(result)
            }
            Ok(None) => {
                tracing::info!("upload cancelled");
                events.on_cancel();
                TransferOutcome::Cancelled
            }
            Err(error) if driver_cancel.is_cancelled() => {
                // Cancellation wins over a concurrent failure
                tracing::info!(error = %error, "upload cancelled during failure");
                events.on_cancel();
                TransferOutcome::Cancelled
            }
            Err(error) => {
                let reason = error.to_string();
                tracing::warn!(reason = %reason, "upload failed");
                events.on_fail(&reason);
                TransferOutcome::Failed(reason)
            }
        }
    });

    Uploader::new(cancel, fraction_bp, driver)
}

async fn run(
    request: UploadRequest,
    cancel: &CancellationToken,
    fraction_bp: Arc<AtomicU32>,
) -> Result<Option<UploadResult>, TransferError> {
    // ── Planning ─────────────────────────────────────────────────────────
    let metadata = tokio::fs::metadata(&request.source).await?;
    if !metadata.is_file() {
        return Err(TransferError::resource(format!(
            "source is not a regular file: {}",
            request.source.display()
        )));
    }
    let plan = plan_shards(metadata.len())?;
    tracing::debug!(
        source = %request.source.display(),
        size = plan.file_size,
        shards = plan.count,
        shard_size = plan.shard_size,
        "upload planned"
    );
    request.events.on_begin(plan.file_size);

    let table = Arc::new(ShardTable::new((0..plan.count).map(|i| plan.span(i))));
    let meter = Arc::new(ProgressMeter::new(
        plan.file_size,
        request.config.progress_min_delta,
        fraction_bp,
    ));

    // ── FrameOpen ────────────────────────────────────────────────────────
    let frame = match or_cancelled(cancel, request.bridge.open_frame())
        .await
        .map_err(TransferError::from)?
    {
        Some(frame) => frame,
        None => return Ok(None),
    };

    // ── ShardsInFlight ───────────────────────────────────────────────────
    let abort = CancellationToken::new();
    let error = {
        let bridge = request.bridge.clone();
        let mirrors = request.mirrors.clone();
        let source = request.source.clone();
        let encryption = request.encryption.clone();
        let events = request.events.clone();
        let worker_table = table.clone();
        let worker_meter = meter.clone();
        let worker_cancel = cancel.clone();
        let worker_abort = abort.clone();
        let frame_id = frame.id.clone();
        let retries = request.config.shard_retries;

        let job = move |index: u64| {
            let ctx = ShardCtx {
                bridge: bridge.clone(),
                mirrors: mirrors.clone(),
                source: source.clone(),
                encryption: encryption.clone(),
                events: events.clone(),
                table: worker_table.clone(),
                meter: worker_meter.clone(),
                cancel: worker_cancel.clone(),
                abort: worker_abort.clone(),
                frame_id: frame_id.clone(),
                retries,
            };
            push_shard(ctx, index)
        };
        drive_shards(
            table.len(),
            request.config.push_concurrency,
            cancel,
            &abort,
            job,
        )
        .await
    };

    if cancel.is_cancelled() {
        request.bridge.abandon_frame(&frame.id).await;
        return Ok(None);
    }
    if let Some(error) = error {
        request.bridge.abandon_frame(&frame.id).await;
        return Err(error);
    }

    let hashes = if table.all_done() {
        table.ordered_hashes()
    } else {
        None
    }
    .ok_or_else(|| TransferError::resource("internal: shard table incomplete after dispatch"))?;

    // ── Finalizing ───────────────────────────────────────────────────────
    let finalize = FinalizeFrame {
        frame: frame.id.clone(),
        name: request.name.clone(),
        index: request.encryption.index.clone(),
        hashes,
    };
    let record = match or_cancelled(
        cancel,
        request.bridge.finalize_frame(&request.bucket_id, &finalize),
    )
    .await
    .map_err(TransferError::from)?
    {
        Some(record) => record,
        None => {
            request.bridge.abandon_frame(&frame.id).await;
            return Ok(None);
        }
    };

    Ok(Some(UploadResult {
        file_id: record.id,
        content_hash: record.content_hash,
    }))
}

struct ShardCtx {
    bridge: BridgeClient,
    mirrors: MirrorClient,
    source: PathBuf,
    encryption: Arc<EncryptionInfo>,
    events: Arc<dyn UploadEvents>,
    table: Arc<ShardTable>,
    meter: Arc<ProgressMeter>,
    cancel: CancellationToken,
    abort: CancellationToken,
    frame_id: String,
    retries: u32,
}

async fn push_shard(ctx: ShardCtx, index: u64) -> Result<(), TransferError> {
    let (offset, size) = ctx.table.span(index);
    ctx.table.set_status(index, ShardStatus::InFlight);

    let (hash, body) = match prepare_shard(&ctx, offset, size).await {
        Ok(prepared) => prepared,
        Err(error) => {
            ctx.table.set_status(index, ShardStatus::Failed);
            return Err(error);
        }
    };
    ctx.table.set_hash(index, hash.clone());

    let attempts = ctx.retries.max(1);
    let mut last_error: Option<TransferError> = None;

    for attempt in 1..=attempts {
        match try_push(&ctx, index, &hash, size, body.clone()).await {
            Ok(Ok(())) => {
                ctx.table.set_status(index, ShardStatus::Done);
                if let Some(fraction) = ctx.meter.add(size) {
                    ctx.events.on_progress(fraction);
                }
                tracing::debug!(shard = index, attempt, "shard pushed");
                return Ok(());
            }
            Ok(Err(error)) if error.is_retryable() => {
                tracing::warn!(
                    shard = index,
                    attempt,
                    error = %error,
                    "push attempt failed; will retry against a fresh mirror"
                );
                last_error = Some(error);
            }
            Ok(Err(error)) => {
                ctx.table.set_status(index, ShardStatus::Failed);
                return Err(error);
            }
            Err(Stop::Cancelled) | Err(Stop::Aborted) => {
                ctx.table.set_status(index, ShardStatus::Pending);
                return Ok(());
            }
        }
    }

    ctx.table.set_status(index, ShardStatus::Failed);
    let last = last_error.expect("at least one attempt ran");
    Err(TransferError::Network(format!(
        "shard {index}: retry budget exhausted after {attempts} attempts: {last}"
    )))
}

/// Read the plaintext slice and produce (ciphertext hash, ciphertext body).
async fn prepare_shard(
    ctx: &ShardCtx,
    offset: u64,
    size: u64,
) -> Result<(String, Bytes), TransferError> {
    let plaintext = read_slice(&ctx.source, offset, size).await?;
    let ciphertext = encrypt_at(&ctx.encryption.key, &ctx.encryption.iv, offset, &plaintext)
        .map_err(|e| TransferError::Crypto(e.to_string()))?;
    let hash = shard_hash(&ciphertext);
    Ok((hash, Bytes::from(ciphertext)))
}

/// One register+push attempt. Registration assigns this attempt's mirror.
async fn try_push(
    ctx: &ShardCtx,
    index: u64,
    hash: &str,
    size: u64,
    body: Bytes,
) -> Result<Result<(), TransferError>, Stop> {
    let register = RegisterShard {
        index,
        hash: hash.to_string(),
        size,
    };
    let pointer = match race_stop(
        &ctx.cancel,
        &ctx.abort,
        ctx.bridge.register_shard(&ctx.frame_id, &register),
    )
    .await?
    {
        Ok(pointer) => pointer,
        Err(error) => return Ok(Err(error.into())),
    };

    match race_stop(
        &ctx.cancel,
        &ctx.abort,
        ctx.mirrors.push_shard(&pointer, body),
    )
    .await?
    {
        Ok(()) => Ok(Ok(())),
        Err(error) => Ok(Err(error.into())),
    }
}

async fn read_slice(path: &Path, offset: u64, size: u64) -> Result<Vec<u8>, TransferError> {
    let mut file = tokio::fs::File::open(path).await?;
    file.seek(SeekFrom::Start(offset)).await?;
    let mut buf = vec![0u8; size as usize];
    file.read_exact(&mut buf).await?;
    Ok(buf)
}
