/**
 * ============================================================================
 * RECORDING STORAGE MODULE
 * ============================================================================
 *
 * PURPOSE: Scratch space for intermediates and the session report sidecar
 *
 * FUNCTIONALITY:
 * - One uniquely named scratch directory per recorder
 * - Paths for the intermediate video-only and audio assets
 * - Scratch usage in bytes
 * - JSON sidecar next to the final output
 *
 * FILE STRUCTURE:
 * {scratch_root}/
 * └── syncrec_1736956800_a1b2c3/
 *     ├── video_only.mp4   # Intermediate, format-dependent extension
 *     └── audio.wav        # Intermediate, float32 PCM
 *
 * {output}.mp4
 * {output}.json            # SessionReport sidecar
 *
 * ============================================================================
 */

use crate::error::Result;
use crate::recording::types::{OutputFormat, SessionReport};
use chrono::Utc;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

// Generate a unique scratch directory name
pub fn generate_scratch_id() -> String {
    let timestamp = Utc::now().timestamp();
    let random_suffix: String = (0..6)
        .map(|_| {
            let byte: u8 = rand::random();
            format!("{:x}", byte)
        })
        .collect();
    format!("syncrec_{}_{}", timestamp, random_suffix)
}

#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
    preserve: bool,
}

impl ScratchDir {
    // Create under `root`, or under the system temp dir
    pub fn create(root: Option<&Path>) -> Result<Self> {
        let root = root
            .map(Path::to_path_buf)
            .unwrap_or_else(std::env::temp_dir);
        let path = root.join(generate_scratch_id());
        std::fs::create_dir_all(&path)?;

        log::info!("Created scratch directory {:?}", path);
        Ok(Self {
            path,
            preserve: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn video_path(&self, format: OutputFormat) -> PathBuf {
        self.path.join(format!("video_only.{}", format.extension()))
    }

    pub fn audio_path(&self) -> PathBuf {
        self.path.join("audio.wav")
    }

    // Keep the directory on drop (intermediates needed for inspection)
    pub fn preserve(&mut self) {
        self.preserve = true;
    }

    pub fn is_preserved(&self) -> bool {
        self.preserve
    }

    // Remove every file inside, keeping the directory itself
    pub fn clear(&mut self) -> Result<()> {
        if !self.path.exists() {
            std::fs::create_dir_all(&self.path)?;
        }

        for entry in std::fs::read_dir(&self.path)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                std::fs::remove_dir_all(&path)?;
            } else {
                std::fs::remove_file(&path)?;
            }
        }

        self.preserve = false;
        Ok(())
    }

    // Total bytes currently held in scratch
    pub fn total_bytes(&self) -> u64 {
        if !self.path.exists() {
            return 0;
        }

        WalkDir::new(&self.path)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| e.metadata().ok())
            .map(|m| m.len())
            .sum()
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if self.preserve {
            log::warn!("Keeping scratch directory {:?} for inspection", self.path);
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("Failed to remove scratch directory {:?}: {}", self.path, e);
            }
        }
    }
}

// Path of the sidecar for a finished output: same stem, .json
pub fn report_path(output: &Path) -> PathBuf {
    output.with_extension("json")
}

// Save the session report next to its output
pub fn save_report(report: &SessionReport) -> Result<PathBuf> {
    let path = report_path(&report.output);
    let contents = serde_json::to_string_pretty(report)?;
    std::fs::write(&path, contents)?;

    log::info!("Saved session report to {:?}", path);
    Ok(path)
}

pub fn load_report(path: &Path) -> Result<SessionReport> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

// Move a finished file into place; copy + remove across filesystems
pub fn move_file(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    if std::fs::rename(from, to).is_err() {
        std::fs::copy(from, to)?;
        std::fs::remove_file(from)?;
    }
    Ok(())
}
