//! Device lifecycle: ordered acquisition, registration, rollback-safe
//! teardown.
//!
//! Every resource acquired during [`Device::bring_up`] is recorded in an
//! explicit ledger as it is acquired. Rollback and shutdown both walk that
//! ledger in strict reverse, so they release exactly what was acquired and
//! never infer acquisition from a field's default value. A failure at any
//! step therefore leaks nothing, and no half-built device is ever exposed to
//! the host.

use parking_lot::Mutex;
use thiserror::Error;

use super::Device;
use crate::config::{ConfigError, VolumeConfig};
use crate::constants::{HOST_SECTOR_SHIFT, MINORS_PER_DISK, SECTOR_SIZE_MAX};
use crate::host::{HostSubsystem, RegistrationError};
use crate::store::{AllocError, RamStore};

/// Lifecycle states of a device.
///
/// Forward path: `Uninitialized → AllocatingStore → RegisteringDevice →
/// Ready → Stopping → Stopped`. Any pre-`Ready` failure ends in `Failed`
/// after rollback. `Stopped` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    AllocatingStore,
    RegisteringDevice,
    Ready,
    Stopping,
    Stopped,
    Failed,
}

impl LifecycleState {
    fn may_advance_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Uninitialized, AllocatingStore)
                | (AllocatingStore, RegisteringDevice)
                | (RegisteringDevice, Ready)
                | (Ready, Stopping)
                | (Stopping, Stopped)
                | (Uninitialized | AllocatingStore | RegisteringDevice, Failed)
        )
    }
}

/// Advances the state machine, asserting the edge is legal.
fn transition(name: &str, from: LifecycleState, to: LifecycleState) -> LifecycleState {
    assert!(
        from.may_advance_to(to),
        "illegal lifecycle transition {from:?} -> {to:?}"
    );
    log::debug!("{name}: lifecycle {from:?} -> {to:?}");

    to
}

/// Initialization failed. The device ends in `Failed` with every acquired
/// resource released; no partial device is exposed to the host.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InitError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("backing store allocation failed: {0}")]
    Alloc(#[from] AllocError),
    #[error("host registration failed: {0}")]
    Registration(#[from] RegistrationError),
}

/// One entry in the acquisition ledger, pushed as its step succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Store,
    Driver,
    Disk,
    Queue,
    Published,
}

/// Everything acquired so far during init, plus the order it was acquired
/// in. Release walks the ledger in reverse; an entry is the only proof of
/// acquisition the release path trusts.
struct Acquisitions<H: HostSubsystem> {
    ledger: Vec<Step>,
    store: Option<RamStore>,
    driver: Option<H::DriverId>,
    disk: Option<H::Disk>,
    queue: Option<H::Queue>,
}

impl<H: HostSubsystem> Acquisitions<H> {
    fn new() -> Self {
        Self {
            ledger: Vec::new(),
            store: None,
            driver: None,
            disk: None,
            queue: None,
        }
    }

    /// Releases every ledger entry in strict reverse acquisition order.
    /// Serves both rollback and shutdown; the ledger's contents are the only
    /// difference between the two.
    fn release_all(mut self, host: &H, name: &str) {
        while let Some(step) = self.ledger.pop() {
            match step {
                Step::Published => {
                    let disk = self.disk.as_mut().expect("ledger: published without disk");
                    host.unpublish_disk(disk);
                }
                Step::Queue => {
                    let queue = self.queue.take().expect("ledger: queue missing");
                    host.release_queue(queue);
                }
                Step::Disk => {
                    let disk = self.disk.take().expect("ledger: disk missing");
                    host.release_disk(disk);
                }
                Step::Driver => {
                    let driver = self.driver.take().expect("ledger: driver missing");
                    host.unregister_driver(driver, name);
                }
                Step::Store => {
                    drop(self.store.take().expect("ledger: store missing"));
                }
            }
        }

        assert!(self.store.is_none());
        assert!(self.driver.is_none());
        assert!(self.disk.is_none());
        assert!(self.queue.is_none());
    }
}

/// Rolls back a failed init and lands in `Failed`.
fn roll_back<H: HostSubsystem>(
    host: &H,
    name: &str,
    state: LifecycleState,
    acquired: Acquisitions<H>,
    err: InitError,
) -> InitError {
    log::error!("{name}: init failed, rolling back: {err}");
    acquired.release_all(host, name);
    let _ = transition(name, state, LifecycleState::Failed);

    err
}

impl<H: HostSubsystem> Device<H> {
    /// Brings up a device: validates configuration, allocates the backing
    /// store, registers with the host, and publishes the disk.
    ///
    /// On any failure the acquired prefix is released in reverse order and
    /// the error is returned; nothing leaks and the host never sees a
    /// half-built device. Not safe to run concurrently with itself or with
    /// [`Device::tear_down`].
    pub fn bring_up(host: &H, config: &VolumeConfig) -> Result<Self, InitError> {
        let mut state = LifecycleState::Uninitialized;

        if let Err(err) = config.validate() {
            log::error!("{}: rejected configuration: {err}", config.name);
            let _ = transition(&config.name, state, LifecycleState::Failed);
            return Err(InitError::Config(err));
        }

        let name = config.name.clone();
        let capacity_bytes = config.capacity_bytes();
        let mut acquired = Acquisitions::new();

        state = transition(&name, state, LifecycleState::AllocatingStore);

        // Align the store to the widest power of two dividing the sector
        // size; sector sizes need only be multiples of the host unit.
        let align_shift = config
            .sector_size
            .trailing_zeros()
            .min(SECTOR_SIZE_MAX.trailing_zeros());
        let align = 1usize << align_shift;

        match RamStore::allocate(capacity_bytes as usize, align) {
            Ok(store) => {
                acquired.store = Some(store);
                acquired.ledger.push(Step::Store);
            }
            Err(err) => {
                // Nothing acquired yet; rollback releases nothing.
                return Err(roll_back(host, &name, state, acquired, err.into()));
            }
        }

        state = transition(&name, state, LifecycleState::RegisteringDevice);

        match host.register_driver(&name) {
            Ok(driver) => {
                acquired.driver = Some(driver);
                acquired.ledger.push(Step::Driver);
            }
            Err(err) => return Err(roll_back(host, &name, state, acquired, err.into())),
        }

        match host.allocate_disk(MINORS_PER_DISK) {
            Ok(disk) => {
                acquired.disk = Some(disk);
                acquired.ledger.push(Step::Disk);
            }
            Err(err) => return Err(roll_back(host, &name, state, acquired, err.into())),
        }

        match host.allocate_queue() {
            Ok(queue) => {
                acquired.queue = Some(queue);
                acquired.ledger.push(Step::Queue);
            }
            Err(err) => return Err(roll_back(host, &name, state, acquired, err.into())),
        }

        {
            let queue = acquired.queue.as_mut().expect("queue just acquired");
            host.bind_queue_context(queue, &name, config.sector_size);

            let disk = acquired.disk.as_mut().expect("disk just acquired");
            host.set_capacity(disk, capacity_bytes >> HOST_SECTOR_SHIFT);
        }

        // Publishing exposes the disk; live requests may arrive once the
        // device is handed to the host, so the request lock is initialized
        // as part of assembling the device below.
        let disk_name = format!("{name}0");
        {
            let disk = acquired.disk.as_mut().expect("disk just acquired");
            host.publish_disk(disk, &disk_name);
            acquired.ledger.push(Step::Published);
        }

        state = transition(&name, state, LifecycleState::Ready);
        assert_eq!(
            acquired.ledger,
            [Step::Store, Step::Driver, Step::Disk, Step::Queue, Step::Published],
        );

        let device = Device {
            name,
            sector_size: config.sector_size,
            sector_count: config.sector_count,
            capacity_bytes,
            store: Mutex::new(acquired.store.take().expect("store acquired")),
            driver: acquired.driver.take().expect("driver acquired"),
            disk: acquired.disk.take().expect("disk acquired"),
            queue: acquired.queue.take().expect("queue acquired"),
            state,
        };
        device.assert_invariants();

        log::info!(
            "{}: disk size {} B, {} {}-B sectors",
            device.name,
            device.capacity_bytes,
            device.sector_count,
            device.sector_size,
        );

        Ok(device)
    }

    /// Tears the device down, releasing every resource in reverse
    /// acquisition order.
    ///
    /// Consumes the device, so it is callable exactly once per successful
    /// `bring_up`; rollback of a failed `bring_up` already happened inside
    /// `bring_up` itself. No new requests can start once teardown begins
    /// (callers no longer hold the device), and in-flight requests have
    /// completed (submit is synchronous and borrows the device).
    pub fn tear_down(self, host: &H) {
        self.assert_invariants();

        let Device {
            name,
            store,
            driver,
            disk,
            queue,
            state,
            ..
        } = self;

        let state = transition(&name, state, LifecycleState::Stopping);
        log::info!("{name}: shutting down");

        // `Ready` means every init step completed, so the full ledger is
        // reconstructed and released by the same reverse walk rollback uses.
        let acquired = Acquisitions::<H> {
            ledger: vec![Step::Store, Step::Driver, Step::Disk, Step::Queue, Step::Published],
            store: Some(store.into_inner()),
            driver: Some(driver),
            disk: Some(disk),
            queue: Some(queue),
        };
        acquired.release_all(host, &name);

        let _ = transition(&name, state, LifecycleState::Stopped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{FailPoint, HostEvent, MockHost};

    fn config_1_mib() -> VolumeConfig {
        VolumeConfig {
            sector_size: 512,
            sector_count: 2048,
            ..VolumeConfig::default()
        }
    }

    #[test]
    fn lifecycle_state_edges() {
        use LifecycleState::*;

        assert!(Uninitialized.may_advance_to(AllocatingStore));
        assert!(AllocatingStore.may_advance_to(RegisteringDevice));
        assert!(RegisteringDevice.may_advance_to(Ready));
        assert!(Ready.may_advance_to(Stopping));
        assert!(Stopping.may_advance_to(Stopped));
        assert!(RegisteringDevice.may_advance_to(Failed));

        // Terminal states and skips are illegal.
        assert!(!Stopped.may_advance_to(Ready));
        assert!(!Failed.may_advance_to(AllocatingStore));
        assert!(!Uninitialized.may_advance_to(Ready));
        assert!(!Ready.may_advance_to(Failed));
        assert!(!Ready.may_advance_to(Stopped));
    }

    #[test]
    fn bring_up_publishes_with_capacity_in_host_units() {
        let host = MockHost::new();
        let config = VolumeConfig {
            sector_size: 4096,
            sector_count: 2048, // 8 MiB
            ..VolumeConfig::default()
        };
        let device = Device::bring_up(&host, &config).unwrap();

        assert_eq!(device.state(), LifecycleState::Ready);
        assert_eq!(device.capacity_bytes(), 8 * 1024 * 1024);

        let events = host.events();
        // Capacity is reported in host 512-byte sectors regardless of the
        // device's 4096-byte sectors.
        assert!(events.contains(&HostEvent::SetCapacity {
            disk: 2,
            host_sectors: 16384,
        }));
        assert!(events.contains(&HostEvent::BindQueue {
            queue: 3,
            device: "xiprd".to_string(),
            sector_size: 4096,
        }));
        // The disk is published under the first minor's name.
        assert!(events.contains(&HostEvent::Publish {
            disk: 2,
            name: "xiprd0".to_string(),
        }));

        device.tear_down(&host);
        host.assert_balanced();
    }

    #[test]
    fn bring_up_rejects_config_without_touching_host() {
        let host = MockHost::new();
        let config = VolumeConfig {
            sector_count: 0,
            ..config_1_mib()
        };

        let err = Device::bring_up(&host, &config).unwrap_err();
        assert!(matches!(err, InitError::Config(ConfigError::SectorCount)));
        assert!(host.events().is_empty());
    }

    #[test]
    fn bring_up_alloc_failure_acquires_nothing() {
        let host = MockHost::new();
        // Passes numeric validation but exceeds any real allocator.
        let config = VolumeConfig {
            sector_size: 512,
            sector_count: (isize::MAX as u64 - 4096) / 512,
            ..VolumeConfig::default()
        };

        let err = Device::bring_up(&host, &config).unwrap_err();
        assert!(matches!(err, InitError::Alloc(_)));
        assert!(host.events().is_empty());
    }

    #[test]
    fn bring_up_rolls_back_driver_failure() {
        let host = MockHost::failing_at(FailPoint::RegisterDriver);
        let err = Device::bring_up(&host, &config_1_mib()).unwrap_err();

        assert_eq!(err, InitError::Registration(RegistrationError::Driver));
        // Registration never succeeded, so there is nothing to unregister.
        assert!(host.events().is_empty());
        assert_eq!(host.outstanding(), 0);
    }

    #[test]
    fn bring_up_rolls_back_disk_failure() {
        let host = MockHost::failing_at(FailPoint::AllocateDisk);
        let err = Device::bring_up(&host, &config_1_mib()).unwrap_err();

        assert_eq!(err, InitError::Registration(RegistrationError::Disk));
        assert_eq!(
            host.events(),
            vec![
                HostEvent::RegisterDriver { driver: 1 },
                HostEvent::UnregisterDriver { driver: 1 },
            ],
        );
        host.assert_balanced();
    }

    #[test]
    fn bring_up_rolls_back_queue_failure() {
        let host = MockHost::failing_at(FailPoint::AllocateQueue);
        let err = Device::bring_up(&host, &config_1_mib()).unwrap_err();

        assert_eq!(err, InitError::Registration(RegistrationError::Queue));
        assert_eq!(
            host.events(),
            vec![
                HostEvent::RegisterDriver { driver: 1 },
                HostEvent::AllocateDisk { disk: 2 },
                HostEvent::ReleaseDisk { disk: 2 },
                HostEvent::UnregisterDriver { driver: 1 },
            ],
        );
        host.assert_balanced();
    }

    #[test]
    fn tear_down_releases_in_reverse_order() {
        let host = MockHost::new();
        let device = Device::bring_up(&host, &config_1_mib()).unwrap();
        device.tear_down(&host);

        assert_eq!(
            host.events(),
            vec![
                HostEvent::RegisterDriver { driver: 1 },
                HostEvent::AllocateDisk { disk: 2 },
                HostEvent::AllocateQueue { queue: 3 },
                HostEvent::BindQueue {
                    queue: 3,
                    device: "xiprd".to_string(),
                    sector_size: 512,
                },
                HostEvent::SetCapacity {
                    disk: 2,
                    host_sectors: 2048,
                },
                HostEvent::Publish {
                    disk: 2,
                    name: "xiprd0".to_string(),
                },
                HostEvent::Unpublish { disk: 2 },
                HostEvent::ReleaseQueue { queue: 3 },
                HostEvent::ReleaseDisk { disk: 2 },
                HostEvent::UnregisterDriver { driver: 1 },
            ],
        );
        host.assert_balanced();
    }
}
