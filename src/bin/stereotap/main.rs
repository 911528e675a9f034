//! stereotap CLI entrypoint.
//!
//! Wires the capture library to real devices: starts a session against the
//! selected source, writes every emitted chunk to disk, and prints one JSON
//! metadata line per chunk on stdout. Everything else (status, diagnostics)
//! goes to stderr or the debug log so stdout stays machine-readable.

use anyhow::{Context, Result};
use crossbeam_channel::bounded;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use stereotap::audio::{CaptureSession, EncodedChunk};
use stereotap::config::AppConfig;
use stereotap::{init_logging, init_telemetry, log_debug, log_file_path};

/// One stdout line per emitted chunk.
#[derive(Serialize)]
struct ChunkRecord<'a> {
    seq: usize,
    frames: usize,
    sample_rate: u32,
    channels: u16,
    bytes: usize,
    path: &'a str,
}

fn main() -> Result<()> {
    let config = AppConfig::parse_args()?;
    init_logging(&config);
    init_telemetry(&config);

    if config.list_sources {
        for name in CaptureSession::list_sources()? {
            println!("{name}");
        }
        return Ok(());
    }

    fs::create_dir_all(&config.out_dir).with_context(|| {
        format!(
            "failed to create output directory '{}'",
            config.out_dir.display()
        )
    })?;

    let (chunk_tx, chunk_rx) = bounded::<EncodedChunk>(8);
    let out_dir = config.out_dir.clone();
    let writer = thread::spawn(move || write_chunks(&out_dir, chunk_rx));

    let mut session = CaptureSession::new(
        config.capture_config(),
        config.segmentation_policy(),
        chunk_tx,
    );
    session.start(config.source.as_deref())?;
    if config.mic {
        session.set_mic_enabled(true, config.mic_device.as_deref())?;
    }

    eprintln!(
        "capturing for {}s into '{}' (log: {})",
        config.seconds,
        config.out_dir.display(),
        log_file_path().display()
    );

    let level = session.level_handle();
    let deadline = Instant::now() + Duration::from_secs(config.seconds);
    while Instant::now() < deadline {
        thread::sleep(Duration::from_millis(500));
        if config.log_timings {
            log_debug(&format!("level={}", level.get()));
        }
    }

    session.stop();
    drop(session);

    let written = writer
        .join()
        .map_err(|_| anyhow::anyhow!("chunk writer thread panicked"))??;
    eprintln!("wrote {written} chunks");
    Ok(())
}

/// Drain the chunk channel to disk, printing one metadata line per chunk.
/// Runs until every sender is gone, so a stopped session ends it cleanly.
fn write_chunks(out_dir: &Path, rx: crossbeam_channel::Receiver<EncodedChunk>) -> Result<usize> {
    let mut seq = 0usize;
    for chunk in rx {
        let path = chunk_path(out_dir, seq);
        fs::write(&path, &chunk.data)
            .with_context(|| format!("failed to write chunk '{}'", path.display()))?;
        let path_str = path.to_string_lossy();
        let record = ChunkRecord {
            seq,
            frames: chunk.frame_count,
            sample_rate: chunk.sample_rate,
            channels: chunk.channel_count,
            bytes: chunk.data.len(),
            path: path_str.as_ref(),
        };
        println!("{}", serde_json::to_string(&record)?);
        seq += 1;
    }
    Ok(seq)
}

fn chunk_path(out_dir: &Path, seq: usize) -> PathBuf {
    out_dir.join(format!("seg-{seq:04}.wav"))
}
