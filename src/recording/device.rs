/**
 * ============================================================================
 * DEVICE LEASE MODULE
 * ============================================================================
 *
 * PURPOSE: Exclusive ownership of audio input devices within the process
 *
 * A live session and the standalone self-test both want the same microphone.
 * Whoever holds the lease owns the device; a second acquire fails with
 * DeviceBusy until the holder drops its lease.
 *
 * ============================================================================
 */

use crate::error::{RecorderError, Result};
use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::sync::Mutex;

static HELD_DEVICES: Lazy<Mutex<HashSet<usize>>> = Lazy::new(|| Mutex::new(HashSet::new()));

#[derive(Debug)]
pub struct DeviceLease {
    index: usize,
}

impl DeviceLease {
    pub fn acquire(index: usize) -> Result<Self> {
        let mut held = HELD_DEVICES.lock().unwrap_or_else(|e| e.into_inner());
        if !held.insert(index) {
            log::warn!("Audio device {} requested while already in use", index);
            return Err(RecorderError::DeviceBusy(index));
        }
        log::debug!("Leased audio device {}", index);
        Ok(Self { index })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_held(index: usize) -> bool {
        HELD_DEVICES
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&index)
    }
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        HELD_DEVICES
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.index);
        log::debug!("Released audio device {}", self.index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Indices well outside anything a real host enumerates, one per test
    #[test]
    fn test_second_acquire_is_busy() {
        let lease = DeviceLease::acquire(70_001).unwrap();
        assert_eq!(lease.index(), 70_001);
        assert!(matches!(
            DeviceLease::acquire(70_001),
            Err(RecorderError::DeviceBusy(70_001))
        ));
    }

    #[test]
    fn test_drop_releases() {
        {
            let _lease = DeviceLease::acquire(70_002).unwrap();
            assert!(DeviceLease::is_held(70_002));
        }
        assert!(!DeviceLease::is_held(70_002));
        assert!(DeviceLease::acquire(70_002).is_ok());
    }

    #[test]
    fn test_distinct_devices_do_not_conflict() {
        let _a = DeviceLease::acquire(70_003).unwrap();
        let _b = DeviceLease::acquire(70_004).unwrap();
    }
}
