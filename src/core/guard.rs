//! Raw mode guard
//!
//! [`RawModeGuard`] switches a terminal into raw mode and restores the saved
//! mode when released or dropped, so every exit path of the owning scope,
//! including early returns and unwinding panics, leaves the terminal as it
//! was found. At most one guard may be live per device in this process.
//!
//! Live guards are kept in a process-wide registry together with their saved
//! mode, so [`restore_all`] can put every captured terminal back from a
//! signal or panic hook (see [`hooks`](super::hooks)).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use tracing::{info, warn};

use super::device::{DeviceError, DeviceId, Result, TerminalDevice};

/// A saved mode that can be put back once
trait Restore: Send + Sync {
    /// `Ok(false)` when already restored
    fn restore(&self) -> Result<bool>;
}

struct SavedMode<D: TerminalDevice> {
    device: Arc<D>,
    mode: Mutex<Option<D::Mode>>,
}

impl<D: TerminalDevice> SavedMode<D> {
    fn is_pending(&self) -> bool {
        self.mode
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl<D: TerminalDevice> Restore for SavedMode<D> {
    fn restore(&self) -> Result<bool> {
        let saved = self
            .mode
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match saved {
            Some(mode) => self.device.set_mode(&mode).map(|()| true),
            None => Ok(false),
        }
    }
}

type Registry = HashMap<DeviceId, Arc<dyn Restore>>;

/// Devices currently held in raw mode by this process
static LIVE_DEVICES: OnceLock<Mutex<Registry>> = OnceLock::new();

fn live_devices() -> MutexGuard<'static, Registry> {
    LIVE_DEVICES
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

/// Whether a raw-mode guard is currently live for `id`
pub fn is_device_captured(id: DeviceId) -> bool {
    live_devices().contains_key(&id)
}

/// Restore every terminal held by a live guard and unregister it.
///
/// Meant for signal and panic hooks. The guards stay alive but report
/// inactive afterwards, and their own release becomes a no-op. Returns the
/// number of terminals restored.
pub fn restore_all() -> usize {
    restore_where(|_| true)
}

pub(crate) fn restore_where(filter: impl Fn(DeviceId) -> bool) -> usize {
    // Taken out of the registry before restoring so no lock is held
    // across device calls
    let targets: Vec<(DeviceId, Arc<dyn Restore>)> = {
        let mut live = live_devices();
        let ids: Vec<DeviceId> = live.keys().copied().filter(|id| filter(*id)).collect();
        ids.into_iter()
            .filter_map(|id| live.remove(&id).map(|slot| (id, slot)))
            .collect()
    };

    let mut restored = 0;
    for (id, slot) in targets {
        match slot.restore() {
            Ok(true) => {
                info!(device = %id, "Restored terminal mode from hook");
                restored += 1;
            }
            Ok(false) => {}
            Err(e) => warn!(device = %id, "Failed to restore terminal mode from hook: {}", e),
        }
    }
    restored
}

/// Scoped raw-mode acquisition
pub struct RawModeGuard<D: TerminalDevice> {
    device: Arc<D>,
    id: DeviceId,
    /// Mode to restore, shared with the registry; empty once released
    saved: Arc<SavedMode<D>>,
}

impl<D: TerminalDevice> RawModeGuard<D> {
    /// Save the current mode of `device` and switch it to raw mode
    pub fn acquire(device: Arc<D>) -> Result<Self> {
        if !device.is_interactive() {
            return Err(DeviceError::NotInteractive);
        }

        let id = device.device_id();
        let saved = Arc::new(SavedMode {
            device: Arc::clone(&device),
            mode: Mutex::new(None),
        });
        {
            let mut live = live_devices();
            if live.contains_key(&id) {
                return Err(DeviceError::Conflict);
            }
            live.insert(id, Arc::clone(&saved) as Arc<dyn Restore>);
        }

        let mode = match device.query_mode() {
            Ok(mode) => mode,
            Err(e) => {
                live_devices().remove(&id);
                return Err(e);
            }
        };

        let raw = device.raw_mode(&mode);
        if let Err(e) = device.set_mode(&raw) {
            // A partial update must not leave the terminal half raw
            if let Err(rollback) = device.set_mode(&mode) {
                warn!(device = %id, "Failed to roll back terminal mode: {}", rollback);
            }
            live_devices().remove(&id);
            return Err(e);
        }

        *saved.mode.lock().unwrap_or_else(PoisonError::into_inner) = Some(mode);
        info!(device = %id, "Entered raw mode");
        Ok(Self { device, id, saved })
    }

    /// Restore the saved mode. Only the first call does anything.
    ///
    /// The device is unregistered even when restoring fails.
    pub fn release(&self) -> Result<()> {
        let result = self.saved.restore();
        {
            let mut live = live_devices();
            // A later guard may already own this id after a hook restored ours
            let mine = Arc::as_ptr(&self.saved) as *const ();
            let ours = live
                .get(&self.id)
                .map_or(false, |slot| Arc::as_ptr(slot) as *const () == mine);
            if ours {
                live.remove(&self.id);
            }
        }

        match result {
            Ok(true) => {
                info!(device = %self.id, "Restored terminal mode");
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(e) => {
                warn!(device = %self.id, "Failed to restore terminal mode: {}", e);
                Err(e)
            }
        }
    }

    /// True until the guard has been released
    pub fn is_active(&self) -> bool {
        self.saved.is_pending()
    }

    pub fn device_id(&self) -> DeviceId {
        self.id
    }

    pub fn device(&self) -> &Arc<D> {
        &self.device
    }
}

impl<D: TerminalDevice> Drop for RawModeGuard<D> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("Terminal mode not restored on drop: {}", e);
        }
    }
}
