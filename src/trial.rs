//! Local trial-period check against a first-run stamp file.
//!
//! Any read or parse failure allows use. Fail-open is deliberate: a
//! corrupt stamp must never lock out a paying user, and the
//! subscription service is the real authority once the user signs in.

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

use crate::constants::config as cfg;

const TRIAL_PERIOD: Duration = Duration::from_secs(14 * 24 * 60 * 60);

pub struct TrialStamp {
    path: PathBuf,
}

impl TrialStamp {
    pub fn new() -> Self {
        let mut dir = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        dir.push(cfg::APP_DIR);
        Self {
            path: dir.join("first_run"),
        }
    }

    #[cfg(test)]
    fn at(dir: &std::path::Path) -> Self {
        Self {
            path: dir.join("first_run"),
        }
    }

    /// Whether the trial is still active as of `now`
    pub fn is_active(&self, now: SystemTime) -> bool {
        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if let Err(e) = self.write_stamp(now) {
                    warn!(error = ?e, "Failed to write first-run stamp");
                }
                info!("Trial started");
                return true;
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Unreadable trial stamp, allowing");
                return true;
            }
        };
        let first_run_secs: u64 = match contents.trim().parse() {
            Ok(v) => v,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Malformed trial stamp, allowing");
                return true;
            }
        };
        let first_run = UNIX_EPOCH + Duration::from_secs(first_run_secs);
        match now.duration_since(first_run) {
            // The stamp only has second resolution, so judge elapsed time
            // at second granularity too
            Ok(elapsed) => elapsed.as_secs() <= TRIAL_PERIOD.as_secs(),
            // Stamp is in the future; clock changed, allow
            Err(_) => true,
        }
    }

    fn write_stamp(&self, now: SystemTime) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context(format!(
                "Failed to create data directory: {}",
                parent.display()
            ))?;
        }
        let secs = now
            .duration_since(UNIX_EPOCH)
            .context("System clock before epoch")?
            .as_secs();
        fs::write(&self.path, secs.to_string())
            .context(format!("Failed to write stamp to {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_run_starts_trial_and_stamps() {
        let dir = tempfile::tempdir().unwrap();
        let stamp = TrialStamp::at(dir.path());
        let now = SystemTime::now();
        assert!(stamp.is_active(now));
        assert!(dir.path().join("first_run").exists());
        // Still active on re-check with the stamp present
        assert!(stamp.is_active(now));
    }

    #[test]
    fn trial_expires_after_period() {
        let dir = tempfile::tempdir().unwrap();
        let stamp = TrialStamp::at(dir.path());
        let start = SystemTime::now();
        assert!(stamp.is_active(start));
        assert!(stamp.is_active(start + TRIAL_PERIOD));
        assert!(!stamp.is_active(start + TRIAL_PERIOD + Duration::from_secs(1)));
    }

    #[test]
    fn expiry_boundary_ignores_sub_second_drift() {
        let dir = tempfile::tempdir().unwrap();
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        fs::write(dir.path().join("first_run"), secs.to_string()).unwrap();
        let stamp = TrialStamp::at(dir.path());
        let start = UNIX_EPOCH + Duration::from_secs(secs);
        // A fractional second past the period still reads as the same
        // whole second as the stamp's resolution allows
        assert!(stamp.is_active(start + TRIAL_PERIOD + Duration::from_millis(900)));
        assert!(!stamp.is_active(start + TRIAL_PERIOD + Duration::from_secs(1)));
    }

    #[test]
    fn malformed_stamp_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("first_run"), "last tuesday").unwrap();
        let stamp = TrialStamp::at(dir.path());
        assert!(stamp.is_active(SystemTime::now()));
    }

    #[test]
    fn future_stamp_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        let future = SystemTime::now() + Duration::from_secs(3600);
        let secs = future.duration_since(UNIX_EPOCH).unwrap().as_secs();
        fs::write(dir.path().join("first_run"), secs.to_string()).unwrap();
        let stamp = TrialStamp::at(dir.path());
        assert!(stamp.is_active(SystemTime::now()));
    }
}
