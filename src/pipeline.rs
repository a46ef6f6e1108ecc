//! Per-category posting cycle: select pending records, download, validate,
//! fingerprint, dedup, and upload.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use image::GenericImageView;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::cache::HashCache;
use crate::chat_client::{ChatClient, MediaItem, MediaKind};
use crate::model::{SendOutcome, StatusUpdate, TgResponse, WallpaperRecord};
use crate::shutdown::ShutdownSignal;
use crate::store::{sample_random, StoreGateway};

const MIN_FREE_BYTES: u64 = 100 * 1024 * 1024;
const MAX_DOWNLOAD_ATTEMPTS: u32 = 3;
const DOWNLOAD_RETRY_DELAYS: [Duration; 3] =
    [Duration::from_secs(2), Duration::from_secs(4), Duration::from_secs(8)];
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_DIMENSION_SUM: u32 = 10_000;
const MAX_ASPECT_RATIO: f64 = 20.0;
const THUMBNAIL_TRIGGER_BYTES: u64 = 9 * 1024 * 1024;
const THUMBNAIL_MAX_DIM: u32 = 320;
const THUMBNAIL_BUDGET_BYTES: u64 = 150 * 1024;
const THUMBNAIL_FALLBACK_BUDGET_BYTES: u64 = 100 * 1024;
const THUMBNAIL_HARD_CAP_BYTES: u64 = 1024 * 1024;
const PREVIEW_TO_HD_GAP: Duration = Duration::from_secs(3);
const HD_SEND_SPACING: Duration = Duration::from_millis(500);
const SAMPLE_SIZE: usize = 3;

struct BatchItem {
    record: WallpaperRecord,
    path: PathBuf,
    thumbnail: Option<PathBuf>,
    sha256: String,
}

pub struct Pipeline {
    store: Arc<dyn StoreGateway>,
    hash_cache: Arc<HashCache>,
    chat: ChatClient,
    http: reqwest::Client,
    cache_dir: PathBuf,
    shutdown: ShutdownSignal,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn StoreGateway>,
        hash_cache: Arc<HashCache>,
        chat: ChatClient,
        cache_dir: PathBuf,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            store,
            hash_cache,
            chat,
            http: reqwest::Client::builder()
                .timeout(DOWNLOAD_TIMEOUT)
                .build()
                .expect("reqwest client builder never fails with this config"),
            cache_dir,
            shutdown,
        }
    }

    /// Runs one posting cycle for `category` against `group_id`.
    pub async fn run_once(&self, category: &str, group_id: i64) {
        if self.shutdown.requested() {
            return;
        }

        let pending = match self.store.query_pending(category, 64).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, category, "failed to query pending wallpapers");
                return;
            }
        };
        if pending.is_empty() {
            return;
        }
        let sampled = sample_random(pending, SAMPLE_SIZE);

        let mut downloaded_files = Vec::new();
        let mut batch = Vec::new();

        for record in sampled {
            if self.shutdown.requested() {
                break;
            }
            match self.process_item(record, &mut downloaded_files).await {
                ItemOutcome::Batched(item) => batch.push(item),
                ItemOutcome::Terminal => {}
            }
        }

        if batch.is_empty() {
            info!(category, "no unique candidates this cycle");
            self.cleanup_files(&downloaded_files).await;
            return;
        }

        self.send_batch(group_id, batch).await;
        self.cleanup_files(&downloaded_files).await;
    }

    async fn process_item(
        &self,
        record: WallpaperRecord,
        downloaded_files: &mut Vec<PathBuf>,
    ) -> ItemOutcome {
        let id = record.wallpaper_id.clone();
        let extension = Path::new(&record.image_url)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("jpg")
            .to_string();
        let path = self.cache_dir.join(format!("{id}_{}.{extension}", record.created_at));

        if let Err(reason) = self.download(&record.image_url, &path).await {
            self.fail(&record, None, reason).await;
            return ItemOutcome::Terminal;
        }
        downloaded_files.push(path.clone());

        if let Err(reason) = validate_dimensions(&path) {
            self.fail(&record, None, reason.to_string()).await;
            return ItemOutcome::Terminal;
        }

        let thumbnail = match std::fs::metadata(&path) {
            Ok(meta) if meta.len() > THUMBNAIL_TRIGGER_BYTES => {
                match generate_thumbnail(&path) {
                    Ok(thumb_path) => {
                        downloaded_files.push(thumb_path.clone());
                        Some(thumb_path)
                    }
                    Err(e) => {
                        warn!(id = %id, error = %e, "thumbnail generation failed, continuing without one");
                        None
                    }
                }
            }
            _ => None,
        };

        let sha256 = match hash_file(&path) {
            Ok(hash) => hash,
            Err(e) => {
                self.fail(&record, None, format!("Hashing failed: {e}")).await;
                return ItemOutcome::Terminal;
            }
        };

        match self.hash_cache.lookup(&sha256).await {
            Ok(Some(matched_id)) => {
                self.skip(&record, matched_id).await;
                return ItemOutcome::Terminal;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(id = %id, error = %e, "hash cache lookup failed, falling back to store");
            }
        }

        match self.store.find_by_sha256(&sha256).await {
            Ok(Some(matched)) => {
                self.skip(&record, matched.wallpaper_id).await;
                return ItemOutcome::Terminal;
            }
            Ok(None) => {}
            Err(e) => {
                // fail-open: quota exhaustion on the dedup query must never
                // permanently stall the pipeline.
                warn!(id = %id, error = %e, "store dedup query failed, proceeding as unique");
            }
        }

        ItemOutcome::Batched(BatchItem {
            record,
            path,
            thumbnail,
            sha256,
        })
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<(), String> {
        if let Ok(available) = fs2::available_space(&self.cache_dir) {
            if available < MIN_FREE_BYTES {
                return Err("Download failed".into());
            }
        }

        for attempt in 0..MAX_DOWNLOAD_ATTEMPTS {
            if attempt > 0 {
                let _ = self
                    .shutdown
                    .sleep(DOWNLOAD_RETRY_DELAYS[attempt as usize - 1])
                    .await;
            }
            if self.try_download(url, dest).await.is_ok() {
                return Ok(());
            }
            let _ = tokio::fs::remove_file(dest).await;
        }
        Err("Download failed".into())
    }

    /// Streams the body chunk by chunk instead of buffering the whole
    /// response, so large originals never balloon memory.
    async fn try_download(&self, url: &str, dest: &Path) -> Result<(), ()> {
        use tokio::io::AsyncWriteExt;
        let response = self.http.get(url).send().await.map_err(|_| ())?;
        let response = response.error_for_status().map_err(|_| ())?;
        let mut stream = response.bytes_stream();
        let mut file = tokio::fs::File::create(dest).await.map_err(|_| ())?;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|_| ())?;
            file.write_all(&chunk).await.map_err(|_| ())?;
        }
        Ok(())
    }

    async fn send_batch(&self, group_id: i64, batch: Vec<BatchItem>) {
        let media_items: Vec<MediaItem<'_>> = batch
            .iter()
            .map(|item| MediaItem {
                path: &item.path,
                thumbnail: item.thumbnail.as_deref(),
            })
            .collect();
        let upload_started = now_secs();

        let preview_result = self
            .chat
            .send_media_group(group_id, &media_items, MediaKind::Photo)
            .await;
        let preview_messages = match preview_result {
            Ok(messages) => messages,
            Err(e) => {
                for item in &batch {
                    self.fail(&item.record, None, format!("preview upload failed: {e}"))
                        .await;
                }
                return;
            }
        };

        if self.shutdown.sleep(PREVIEW_TO_HD_GAP).await.is_err() {
            return;
        }

        for (idx, item) in batch.into_iter().enumerate() {
            if idx > 0 {
                if self.shutdown.sleep(HD_SEND_SPACING).await.is_err() {
                    return;
                }
            }
            let preview_outcome = preview_messages.get(idx).map(|m| SendOutcome {
                message_id: Some(m.message_id),
                date: Some(m.date),
                success: true,
            });
            let hd_result = self
                .chat
                .send_document(group_id, &item.path, item.thumbnail.as_deref())
                .await;
            let hd_outcome = match &hd_result {
                Ok(m) => SendOutcome {
                    message_id: Some(m.message_id),
                    date: Some(m.date),
                    success: true,
                },
                Err(_) => SendOutcome {
                    message_id: None,
                    date: None,
                    success: false,
                },
            };
            let tg = TgResponse {
                group_id,
                album_size: 1,
                upload_time: upload_started,
                preview: preview_outcome.clone(),
                hd: Some(hd_outcome.clone()),
            };

            let preview_ok = preview_outcome.map(|p| p.success).unwrap_or(false);
            if preview_ok && hd_outcome.success {
                self.store
                    .update_status(
                        &item.record.wallpaper_id,
                        StatusUpdate::Posted {
                            sha256: item.sha256.clone(),
                            tg,
                        },
                    )
                    .await
                    .ok();
                self.hash_cache
                    .insert(&item.sha256, &item.record.wallpaper_id)
                    .await
                    .ok();
            } else {
                let reason = if !preview_ok {
                    "preview upload failed".to_string()
                } else {
                    "HD upload failed".to_string()
                };
                self.store
                    .update_status(
                        &item.record.wallpaper_id,
                        StatusUpdate::Failed {
                            sha256: Some(item.sha256.clone()),
                            reason,
                            tg: Some(tg),
                        },
                    )
                    .await
                    .ok();
            }
        }
    }

    async fn fail(&self, record: &WallpaperRecord, sha256: Option<String>, reason: String) {
        self.store
            .update_status(
                &record.wallpaper_id,
                StatusUpdate::Failed {
                    sha256,
                    reason,
                    tg: None,
                },
            )
            .await
            .ok();
    }

    async fn skip(&self, record: &WallpaperRecord, matched_wallpaper_id: String) {
        self.store
            .update_status(
                &record.wallpaper_id,
                StatusUpdate::Skipped {
                    matched_wallpaper_id,
                    tg: None,
                },
            )
            .await
            .ok();
    }

    async fn cleanup_files(&self, files: &[PathBuf]) {
        for file in files {
            let _ = tokio::fs::remove_file(file).await;
        }
    }
}

enum ItemOutcome {
    Batched(BatchItem),
    Terminal,
}

fn validate_dimensions(path: &Path) -> Result<(), &'static str> {
    let img = image::open(path).map_err(|_| "Invalid dimensions for Telegram")?;
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return Err("Invalid dimensions for Telegram");
    }
    if width + height > MAX_DIMENSION_SUM {
        return Err("Invalid dimensions for Telegram");
    }
    let (max, min) = if width > height {
        (width as f64, height as f64)
    } else {
        (height as f64, width as f64)
    };
    if max / min > MAX_ASPECT_RATIO {
        return Err("Invalid dimensions for Telegram");
    }
    Ok(())
}

/// Fits the image within 320x320, progressively lowering JPEG quality from
/// 85 (step 10) until the encoded size is within budget or quality hits 20;
/// if still over the 1 MiB hard cap, retries once at half the resolution
/// targeting a tighter 100 KiB budget before giving up.
fn generate_thumbnail(path: &Path) -> Result<PathBuf, String> {
    let img = image::open(path).map_err(|e| e.to_string())?;
    let resized = img.resize(
        THUMBNAIL_MAX_DIM,
        THUMBNAIL_MAX_DIM,
        image::imageops::FilterType::Lanczos3,
    );
    let rgb = resized.to_rgb8();

    let thumb_path = path.with_file_name(format!(
        "{}_thumb.jpg",
        path.file_stem().and_then(|s| s.to_str()).unwrap_or("thumb")
    ));

    let mut quality = 85i32;
    let mut encoded = encode_jpeg(&rgb, quality as u8)?;
    while encoded.len() as u64 > THUMBNAIL_BUDGET_BYTES && quality > 20 {
        quality -= 10;
        encoded = encode_jpeg(&rgb, quality as u8)?;
    }

    if encoded.len() as u64 > THUMBNAIL_HARD_CAP_BYTES {
        encoded = shrink_to_fallback_budget(&resized)?;
        if encoded.len() as u64 > THUMBNAIL_FALLBACK_BUDGET_BYTES {
            return Err("thumbnail over fallback size cap even at reduced resolution".into());
        }
    }

    std::fs::write(&thumb_path, &encoded).map_err(|e| e.to_string())?;
    Ok(thumb_path)
}

/// Second encoding pass at half the linear resolution, targeting the 100
/// KiB fallback budget rather than the normal 150 KiB one.
fn shrink_to_fallback_budget(resized: &image::DynamicImage) -> Result<Vec<u8>, String> {
    let half_dim = (THUMBNAIL_MAX_DIM / 2).max(1);
    let smaller = resized.resize(half_dim, half_dim, image::imageops::FilterType::Lanczos3);
    let rgb = smaller.to_rgb8();

    let mut quality = 70i32;
    let mut encoded = encode_jpeg(&rgb, quality as u8)?;
    while encoded.len() as u64 > THUMBNAIL_FALLBACK_BUDGET_BYTES && quality > 20 {
        quality -= 10;
        encoded = encode_jpeg(&rgb, quality as u8)?;
    }
    Ok(encoded)
}

fn encode_jpeg(rgb: &image::RgbImage, quality: u8) -> Result<Vec<u8>, String> {
    let mut buf = Vec::new();
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality);
    encoder
        .encode(rgb.as_raw(), rgb.width(), rgb.height(), image::ColorType::Rgb8)
        .map_err(|e| e.to_string())?;
    Ok(buf)
}

fn hash_file(path: &Path) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_secs() as i64
}
