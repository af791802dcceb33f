//! Download Engine (C5): parallel, retried, checksum-verified archive
//! fetches into the shared cache (§4.5).

use anyhow::{bail, Context};
use fs_err as fs;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("downloaded archive for {domain} failed checksum verification")]
    ChecksumMismatch { domain: String },
    #[error("failed to download {domain} after retrying: {source}")]
    Exhausted {
        domain: String,
        #[source]
        source: anyhow::Error,
    },
}

#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub domain: String,
    pub url: String,
    pub integrity: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DownloadedArchive {
    pub domain: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy)]
pub struct DownloadPolicy {
    pub max_retries: u32,
    pub initial_retry_delay_ms: u64,
    pub max_concurrent: usize,
}

impl Default for DownloadPolicy {
    fn default() -> Self {
        DownloadPolicy {
            max_retries: 3,
            initial_retry_delay_ms: 1000,
            max_concurrent: 32,
        }
    }
}

/// Downloads every request into `cache_dir`, skipping any whose checkpoint
/// entry already names a verified file on disk (§3's checkpoint, §4.5's
/// resume step).
pub fn download_all(
    requests: &[DownloadRequest],
    cache_dir: &Path,
    policy: DownloadPolicy,
    already_downloaded: impl Fn(&str) -> Option<PathBuf> + Sync,
) -> anyhow::Result<Vec<DownloadedArchive>> {
    fs::create_dir_all(cache_dir).context("Failed to create download cache directory")?;

    let pool_size = policy
        .max_concurrent
        .min(rayon::current_num_threads())
        .min(requests.len().max(1))
        .max(1);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(pool_size)
        .build()
        .context("Failed to build download worker pool")?;

    let pb = ProgressBar::new(requests.len() as u64).with_style(
        ProgressStyle::default_bar()
            .template("Downloading {bar} {pos:>3}/{len:3} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    let start = Instant::now();

    let results = pool.install(|| {
        requests
            .par_iter()
            .map(|request| {
                if let Some(path) = already_downloaded(&request.domain) {
                    debug!("Resuming from checkpoint for {}", request.domain);
                    pb.inc(1);
                    return Ok(DownloadedArchive {
                        domain: request.domain.clone(),
                        path,
                    });
                }
                pb.set_message(request.domain.clone());
                let path = download_one(request, cache_dir, policy)?;
                pb.inc(1);
                Ok(DownloadedArchive {
                    domain: request.domain.clone(),
                    path,
                })
            })
            .collect::<anyhow::Result<Vec<DownloadedArchive>>>()
    })?;

    pb.finish_and_clear();
    info!(
        "Downloaded {} package(s) in {:.1}s",
        results.len(),
        start.elapsed().as_secs_f32()
    );
    Ok(results)
}

/// The deterministic cache path a (domain, url) pair downloads to — shared
/// by `download_one` and `already_cached` so a resume check and an actual
/// download can never disagree on where the file lives.
fn target_path_for(cache_dir: &Path, domain: &str, url: &str) -> PathBuf {
    let file_name = url
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{domain}.archive"));
    cache_dir.join(format!("{}-{}", sanitize(domain), file_name))
}

/// Returns the already-downloaded archive for this exact (domain, url) pair
/// if the shared cache already has it, so a resumed install doesn't pay for
/// the network round trip again (§4.5).
pub fn already_cached(cache_dir: &Path, domain: &str, url: &str) -> Option<PathBuf> {
    let path = target_path_for(cache_dir, domain, url);
    path.is_file().then_some(path)
}

fn download_one(
    request: &DownloadRequest,
    cache_dir: &Path,
    policy: DownloadPolicy,
) -> anyhow::Result<PathBuf> {
    let target_path = target_path_for(cache_dir, &request.domain, &request.url);

    let mut delay = Duration::from_millis(policy.initial_retry_delay_ms);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match fetch_and_verify(request, &target_path, cache_dir) {
            Ok(()) => return Ok(target_path),
            Err(err) if is_checksum_mismatch(&err) => {
                let _ = fs::remove_file(&target_path);
                return Err(err);
            }
            Err(err) if attempt <= policy.max_retries => {
                warn!(
                    "Download of {} failed (attempt {}/{}), retrying in {:?}: {}",
                    request.domain,
                    attempt,
                    policy.max_retries + 1,
                    delay,
                    err
                );
                sleep(delay);
                delay *= 2;
            }
            Err(err) => {
                return Err(DownloadError::Exhausted {
                    domain: request.domain.clone(),
                    source: err,
                }
                .into())
            }
        }
    }
}

fn fetch_and_verify(
    request: &DownloadRequest,
    target_path: &Path,
    cache_dir: &Path,
) -> anyhow::Result<()> {
    let response = crate::env_config::http_agent()
        .get(&request.url)
        .call()
        .with_context(|| format!("Failed to request {}", request.url))?;
    let mut temp_file =
        NamedTempFile::new_in(cache_dir).context("Failed to create download temp file")?;
    let mut hasher = Sha256::new();
    {
        let mut reader = response.into_reader();
        let mut buffer = [0u8; 64 * 1024];
        loop {
            let read = io::Read::read(&mut reader, &mut buffer)?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
            io::Write::write_all(&mut temp_file, &buffer[..read])?;
        }
    }
    if let Some(expected) = &request.integrity {
        let actual = format!("{:x}", hasher.finalize());
        if &actual != expected {
            bail!(DownloadError::ChecksumMismatch {
                domain: request.domain.clone()
            });
        }
    }
    temp_file
        .persist(target_path)
        .context("Failed to move downloaded archive into place")?;
    Ok(())
}

fn is_checksum_mismatch(err: &anyhow::Error) -> bool {
    err.downcast_ref::<DownloadError>()
        .map(|e| matches!(e, DownloadError::ChecksumMismatch { .. }))
        .unwrap_or(false)
}

fn sanitize(domain: &str) -> String {
    domain.chars().map(|c| if c.is_ascii_alphanumeric() { c } else { '_' }).collect()
}
