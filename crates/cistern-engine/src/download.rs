//! Download state machine
//!
//! `Resolving → Fetching → Assembling → {Done | Failed | Cancelled}`. The
//! pointer list is paged from the bridge and validated; each shard job pulls
//! from its mirror (one alternate-source retry on transport or integrity
//! failure), verifies the hash, optionally decrypts at its offset, and
//! writes positionally into a `.cistern-part` temp file. Shard completion
//! order is irrelevant; the temp file is renamed into place only once every
//! index has a confirmed verified write. Cancellation and failure remove
//! the partial output.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicU32;
use std::sync::Arc;

use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use cistern_bridge::types::{FileInfo, Pointer};
use cistern_bridge::{BridgeClient, MirrorClient};
use cistern_core::config::TransferConfig;
use cistern_core::{DownloadResult, ShardStatus, TransferError, TransferOutcome};
use cistern_crypto::{content_hash, decrypt_at, shard_hash, EncryptionInfo, MasterSecret};

use crate::pool::{drive_shards, or_cancelled, race_stop};
use crate::progress::ProgressMeter;
use crate::session::{DownloadEvents, Downloader, ShardTable};

pub(crate) struct DownloadRequest {
    pub bridge: BridgeClient,
    pub mirrors: MirrorClient,
    pub config: TransferConfig,
    pub bucket_id: String,
    pub file_id: String,
    pub destination: PathBuf,
    pub overwrite: bool,
    /// Apply the keystream per shard; when false the raw encrypted bytes
    /// are written
    pub decrypt: bool,
    /// Optional whole-file content hash to verify as the last step
    pub expected_hash: Option<String>,
    pub master: MasterSecret,
    pub events: Arc<dyn DownloadEvents>,
}

/// Create the session and return its handle immediately; the transfer runs
/// on background tasks.
pub(crate) fn start(request: DownloadRequest) -> Downloader {
    let cancel = CancellationToken::new();
    let fraction_bp = Arc::new(AtomicU32::new(0));

    let driver_cancel = cancel.clone();
    let driver_fraction = fraction_bp.clone();
    let driver = tokio::spawn(async move {
        let events = request.events.clone();
        match run(request, &driver_cancel, driver_fraction).await {
            Ok(Some(result)) => {
                tracing::info!(bytes = result.bytes_written, "download finished");
                events.on_finish(&result);
                TransferOutcome::Done(result)
            }
            Ok(None) => {
                tracing::info!("download cancelled");
                events.on_cancel();
                TransferOutcome::Cancelled
            }
            Err(error) if driver_cancel.is_cancelled() => {
                // Cancellation wins over a concurrent failure
                tracing::info!(error = %error, "download cancelled during failure");
                events.on_cancel();
                TransferOutcome::Cancelled
            }
            Err(error) => {
                let reason = error.to_string();
                tracing::warn!(reason = %reason, "download failed");
                events.on_fail(&reason);
                TransferOutcome::Failed(reason)
            }
        }
    });

    Downloader::new(cancel, fraction_bp, driver)
}

async fn run(
    request: DownloadRequest,
    cancel: &CancellationToken,
    fraction_bp: Arc<AtomicU32>,
) -> Result<Option<DownloadResult>, TransferError> {
    // ── Resolving ────────────────────────────────────────────────────────
    if !request.overwrite && tokio::fs::try_exists(&request.destination).await? {
        return Err(TransferError::resource(format!(
            "destination exists: {}",
            request.destination.display()
        )));
    }

    let info = match or_cancelled(
        cancel,
        request.bridge.file_info(&request.bucket_id, &request.file_id),
    )
    .await
    .map_err(TransferError::from)?
    {
        Some(info) => info,
        None => return Ok(None),
    };

    let pointers = match resolve_pointers(&request, cancel).await? {
        Some(pointers) => pointers,
        None => return Ok(None),
    };
    let total = validate_pointers(&info, &pointers)?;
    tracing::debug!(
        file = %request.file_id,
        size = total,
        shards = pointers.len(),
        "download resolved"
    );
    request.events.on_begin(total);

    let encryption = if request.decrypt {
        let info = EncryptionInfo::for_index(&request.master, &request.bucket_id, &info.index)
            .map_err(|e| TransferError::Crypto(e.to_string()))?;
        Some(Arc::new(info))
    } else {
        None
    };

    // ── Fetching ─────────────────────────────────────────────────────────
    if let Some(parent) = request.destination.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let part = part_path(&request.destination);
    let file = tokio::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&part)
        .await?;
    let out = Arc::new(tokio::sync::Mutex::new(file));

    let pointers = Arc::new(pointers);
    let table = Arc::new(ShardTable::new(pointers.iter().scan(0u64, |offset, p| {
        let start = *offset;
        *offset += p.size;
        Some((start, p.size))
    })));
    let meter = Arc::new(ProgressMeter::new(
        total,
        request.config.progress_min_delta,
        fraction_bp,
    ));

    let abort = CancellationToken::new();
    let error = {
        let mirrors = request.mirrors.clone();
        let events = request.events.clone();
        let worker_pointers = pointers.clone();
        let worker_table = table.clone();
        let worker_meter = meter.clone();
        let worker_out = out.clone();
        let worker_encryption = encryption.clone();
        let worker_cancel = cancel.clone();
        let worker_abort = abort.clone();

        let job = move |index: u64| {
            let ctx = ShardCtx {
                mirrors: mirrors.clone(),
                events: events.clone(),
                pointers: worker_pointers.clone(),
                table: worker_table.clone(),
                meter: worker_meter.clone(),
                out: worker_out.clone(),
                encryption: worker_encryption.clone(),
                cancel: worker_cancel.clone(),
                abort: worker_abort.clone(),
            };
            pull_shard(ctx, index)
        };
        drive_shards(
            table.len(),
            request.config.pull_concurrency,
            cancel,
            &abort,
            job,
        )
        .await
    };

    if cancel.is_cancelled() {
        remove_part(&part).await;
        return Ok(None);
    }
    if let Some(error) = error {
        remove_part(&part).await;
        return Err(error);
    }
    if !table.all_done() {
        remove_part(&part).await;
        return Err(TransferError::resource(
            "internal: shard table incomplete after dispatch",
        ));
    }

    // ── Assembling ───────────────────────────────────────────────────────
    match assemble(&request, out, &part, &pointers, total).await {
        Ok(result) => Ok(Some(result)),
        Err(error) => {
            remove_part(&part).await;
            Err(error)
        }
    }
}

async fn resolve_pointers(
    request: &DownloadRequest,
    cancel: &CancellationToken,
) -> Result<Option<Vec<Pointer>>, TransferError> {
    let page_size = request.config.pointer_page_size.max(1);
    let mut pointers = Vec::new();

    loop {
        let page = match or_cancelled(
            cancel,
            request.bridge.list_pointers(
                &request.bucket_id,
                &request.file_id,
                pointers.len() as u64,
                page_size,
            ),
        )
        .await
        .map_err(TransferError::from)?
        {
            Some(page) => page,
            None => return Ok(None),
        };

        let short = (page.len() as u64) < page_size;
        pointers.extend(page);
        if short {
            break;
        }
    }

    Ok(Some(pointers))
}

/// A pointer set is usable only if it tiles the whole file: contiguous
/// indices from zero, sizes summing to the recorded file size.
fn validate_pointers(info: &FileInfo, pointers: &[Pointer]) -> Result<u64, TransferError> {
    if pointers.is_empty() {
        return Err(TransferError::Protocol(format!(
            "file {} has no pointers",
            info.id
        )));
    }

    let mut total = 0u64;
    for (position, pointer) in pointers.iter().enumerate() {
        if pointer.index != position as u64 {
            return Err(TransferError::Protocol(format!(
                "pointer list is not contiguous: expected index {position}, got {}",
                pointer.index
            )));
        }
        if pointer.size == 0 || pointer.hash.is_empty() {
            return Err(TransferError::Protocol(format!(
                "pointer {position} is malformed"
            )));
        }
        total += pointer.size;
    }

    if total != info.size {
        return Err(TransferError::Protocol(format!(
            "pointer sizes sum to {total}, file record says {}",
            info.size
        )));
    }

    Ok(total)
}

struct ShardCtx {
    mirrors: MirrorClient,
    events: Arc<dyn DownloadEvents>,
    pointers: Arc<Vec<Pointer>>,
    table: Arc<ShardTable>,
    meter: Arc<ProgressMeter>,
    out: Arc<tokio::sync::Mutex<tokio::fs::File>>,
    encryption: Option<Arc<EncryptionInfo>>,
    cancel: CancellationToken,
    abort: CancellationToken,
}

async fn pull_shard(ctx: ShardCtx, index: u64) -> Result<(), TransferError> {
    let pointer = ctx.pointers[index as usize].clone();
    ctx.table.set_status(index, ShardStatus::InFlight);

    // Primary mirror, then the alternate replica if the pointer carries one.
    // Exactly one extra source: transport and integrity failures alike get
    // a single second chance, never a silent loop.
    let mut sources = vec![pointer.url.clone()];
    if let Some(alt) = &pointer.alt_url {
        sources.push(alt.clone());
    }

    let mut last_error: Option<TransferError> = None;
    let mut accepted = None;

    for url in &sources {
        match race_stop(
            &ctx.cancel,
            &ctx.abort,
            ctx.mirrors.pull_from(url, &pointer.token),
        )
        .await
        {
            Err(_stop) => {
                ctx.table.set_status(index, ShardStatus::Pending);
                return Ok(());
            }
            Ok(Err(error)) => {
                let error = TransferError::from(error);
                tracing::warn!(shard = index, url = %url, error = %error, "pull attempt failed");
                last_error = Some(error);
            }
            Ok(Ok(bytes)) => {
                if bytes.len() as u64 != pointer.size {
                    tracing::warn!(
                        shard = index,
                        url = %url,
                        got = bytes.len(),
                        expected = pointer.size,
                        "shard size mismatch"
                    );
                    last_error = Some(TransferError::Integrity(format!(
                        "shard {index}: size mismatch from {url}"
                    )));
                    continue;
                }
                if shard_hash(&bytes) != pointer.hash {
                    tracing::warn!(shard = index, url = %url, "shard hash mismatch");
                    last_error = Some(TransferError::Integrity(format!(
                        "shard {index}: hash mismatch from {url}"
                    )));
                    continue;
                }
                accepted = Some(bytes);
                break;
            }
        }
    }

    let bytes = match accepted {
        Some(bytes) => bytes,
        None => {
            ctx.table.set_status(index, ShardStatus::Failed);
            return Err(last_error.expect("at least one source was tried"));
        }
    };

    let (offset, _) = ctx.table.span(index);
    let data = match &ctx.encryption {
        Some(encryption) => {
            match decrypt_at(&encryption.key, &encryption.iv, offset, &bytes) {
                Ok(plaintext) => plaintext,
                Err(e) => {
                    ctx.table.set_status(index, ShardStatus::Failed);
                    return Err(TransferError::Crypto(e.to_string()));
                }
            }
        }
        None => bytes.to_vec(),
    };

    // Positional write: seek-and-write never touches other shards' regions
    {
        let mut file = ctx.out.lock().await;
        if let Err(error) = write_at(&mut file, offset, &data).await {
            ctx.table.set_status(index, ShardStatus::Failed);
            return Err(error.into());
        }
    }

    ctx.table.set_hash(index, pointer.hash.clone());
    ctx.table.set_status(index, ShardStatus::Done);
    if let Some(fraction) = ctx.meter.add(pointer.size) {
        ctx.events.on_progress(fraction);
    }
    tracing::debug!(shard = index, "shard fetched");
    Ok(())
}

async fn assemble(
    request: &DownloadRequest,
    out: Arc<tokio::sync::Mutex<tokio::fs::File>>,
    part: &Path,
    pointers: &[Pointer],
    total: u64,
) -> Result<DownloadResult, TransferError> {
    {
        let file = out.lock().await;
        file.sync_all().await?;
    }
    drop(out);

    let hashes: Vec<&str> = pointers.iter().map(|p| p.hash.as_str()).collect();
    let computed = content_hash(&hashes)
        .map_err(|e| TransferError::Protocol(format!("combining shard hashes: {e}")))?;

    if let Some(expected) = &request.expected_hash {
        if !expected.eq_ignore_ascii_case(&computed) {
            return Err(TransferError::Integrity(format!(
                "content hash mismatch: expected {expected}, computed {computed}"
            )));
        }
    }

    tokio::fs::rename(part, &request.destination).await?;

    Ok(DownloadResult {
        bytes_written: total,
        content_hash: computed,
    })
}

async fn write_at(
    file: &mut tokio::fs::File,
    offset: u64,
    data: &[u8],
) -> std::io::Result<()> {
    file.seek(SeekFrom::Start(offset)).await?;
    file.write_all(data).await
}

fn part_path(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    destination.with_file_name(format!("{name}.cistern-part"))
}

async fn remove_part(part: &Path) {
    if let Err(error) = tokio::fs::remove_file(part).await {
        if error.kind() != std::io::ErrorKind::NotFound {
            tracing::debug!(part = %part.display(), error = %error, "partial output not removed");
        }
    }
}
