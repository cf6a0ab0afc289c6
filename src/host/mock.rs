//! Recording, failure-injecting host subsystem for tests.
//!
//! [`MockHost`] journals every call in order and can be told to refuse one
//! specific registration step, which is how the lifecycle rollback tests
//! exercise each failure path. The journal lets tests assert that every
//! acquisition has exactly one matching release, in reverse order.

use parking_lot::Mutex;

use super::{HostSubsystem, RegistrationError};

/// Which registration step the mock refuses. `None` injected means the host
/// cooperates fully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    RegisterDriver,
    AllocateDisk,
    AllocateQueue,
}

/// One journaled host call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    RegisterDriver { driver: u32 },
    UnregisterDriver { driver: u32 },
    AllocateDisk { disk: u32 },
    ReleaseDisk { disk: u32 },
    AllocateQueue { queue: u32 },
    ReleaseQueue { queue: u32 },
    BindQueue { queue: u32, device: String, sector_size: u64 },
    SetCapacity { disk: u32, host_sectors: u64 },
    Publish { disk: u32, name: String },
    Unpublish { disk: u32 },
}

impl HostEvent {
    /// `Some(true)` for acquisitions, `Some(false)` for releases, `None` for
    /// calls that move no resource.
    fn acquisition(&self) -> Option<bool> {
        match self {
            HostEvent::RegisterDriver { .. }
            | HostEvent::AllocateDisk { .. }
            | HostEvent::AllocateQueue { .. } => Some(true),
            HostEvent::UnregisterDriver { .. }
            | HostEvent::ReleaseDisk { .. }
            | HostEvent::ReleaseQueue { .. } => Some(false),
            _ => None,
        }
    }
}

/// Driver identifier handed out by [`MockHost`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockDriverId(pub u32);

/// Disk object handed out by [`MockHost`].
#[derive(Debug)]
pub struct MockDisk {
    id: u32,
    pub capacity_host_sectors: u64,
    pub published: bool,
    pub disk_name: String,
}

/// Request-queue object handed out by [`MockHost`].
#[derive(Debug)]
pub struct MockQueue {
    id: u32,
    pub context: Option<String>,
    pub sector_size: u64,
}

#[derive(Default)]
struct State {
    next_id: u32,
    journal: Vec<HostEvent>,
    fail_at: Option<FailPoint>,
}

/// In-memory host subsystem double.
#[derive(Default)]
pub struct MockHost {
    state: Mutex<State>,
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// A host that refuses the given registration step.
    pub fn failing_at(point: FailPoint) -> Self {
        let host = Self::new();
        host.state.lock().fail_at = Some(point);
        host
    }

    /// Snapshot of the call journal, in call order.
    pub fn events(&self) -> Vec<HostEvent> {
        self.state.lock().journal.clone()
    }

    /// Acquisitions minus releases. Zero means no leaked host resource.
    pub fn outstanding(&self) -> usize {
        let state = self.state.lock();
        let acquired = state
            .journal
            .iter()
            .filter(|e| e.acquisition() == Some(true))
            .count();
        let released = state
            .journal
            .iter()
            .filter(|e| e.acquisition() == Some(false))
            .count();
        assert!(released <= acquired);

        acquired - released
    }

    /// Asserts every acquisition has exactly one release and that releases
    /// happened in reverse acquisition order.
    ///
    /// # Panics
    ///
    /// Panics on a leak, a double release, or an out-of-order release.
    pub fn assert_balanced(&self) {
        let journal = self.events();

        let mut held: Vec<&HostEvent> = Vec::new();
        for event in &journal {
            match event.acquisition() {
                Some(true) => held.push(event),
                Some(false) => {
                    let acquired = held.pop().expect("release without acquisition");
                    let paired = matches!(
                        (acquired, event),
                        (
                            HostEvent::RegisterDriver { driver: a },
                            HostEvent::UnregisterDriver { driver: b }
                        ) if a == b
                    ) || matches!(
                        (acquired, event),
                        (HostEvent::AllocateDisk { disk: a }, HostEvent::ReleaseDisk { disk: b })
                            if a == b
                    ) || matches!(
                        (acquired, event),
                        (
                            HostEvent::AllocateQueue { queue: a },
                            HostEvent::ReleaseQueue { queue: b }
                        ) if a == b
                    );
                    assert!(paired, "out-of-order release: {acquired:?} vs {event:?}");
                }
                None => {}
            }
        }
        assert!(held.is_empty(), "leaked host resources: {held:?}");
    }

    fn record(&self, event: HostEvent) {
        self.state.lock().journal.push(event);
    }

    fn next_id(&self) -> u32 {
        let mut state = self.state.lock();
        state.next_id += 1;
        state.next_id
    }

    fn should_fail(&self, point: FailPoint) -> bool {
        self.state.lock().fail_at == Some(point)
    }
}

impl HostSubsystem for MockHost {
    type DriverId = MockDriverId;
    type Disk = MockDisk;
    type Queue = MockQueue;

    fn register_driver(&self, name: &str) -> Result<Self::DriverId, RegistrationError> {
        assert!(!name.is_empty());
        if self.should_fail(FailPoint::RegisterDriver) {
            return Err(RegistrationError::Driver);
        }

        let id = self.next_id();
        self.record(HostEvent::RegisterDriver { driver: id });
        Ok(MockDriverId(id))
    }

    fn allocate_disk(&self, minor_count: u32) -> Result<Self::Disk, RegistrationError> {
        assert!(minor_count > 0);
        if self.should_fail(FailPoint::AllocateDisk) {
            return Err(RegistrationError::Disk);
        }

        let id = self.next_id();
        self.record(HostEvent::AllocateDisk { disk: id });
        Ok(MockDisk {
            id,
            capacity_host_sectors: 0,
            published: false,
            disk_name: String::new(),
        })
    }

    fn allocate_queue(&self) -> Result<Self::Queue, RegistrationError> {
        if self.should_fail(FailPoint::AllocateQueue) {
            return Err(RegistrationError::Queue);
        }

        let id = self.next_id();
        self.record(HostEvent::AllocateQueue { queue: id });
        Ok(MockQueue {
            id,
            context: None,
            sector_size: 0,
        })
    }

    fn bind_queue_context(&self, queue: &mut Self::Queue, device_name: &str, sector_size: u64) {
        assert!(queue.context.is_none());
        queue.context = Some(device_name.to_string());
        queue.sector_size = sector_size;
        self.record(HostEvent::BindQueue {
            queue: queue.id,
            device: device_name.to_string(),
            sector_size,
        });
    }

    fn set_capacity(&self, disk: &mut Self::Disk, host_sectors: u64) {
        disk.capacity_host_sectors = host_sectors;
        self.record(HostEvent::SetCapacity {
            disk: disk.id,
            host_sectors,
        });
    }

    fn publish_disk(&self, disk: &mut Self::Disk, disk_name: &str) {
        assert!(!disk.published);
        disk.published = true;
        disk.disk_name = disk_name.to_string();
        self.record(HostEvent::Publish {
            disk: disk.id,
            name: disk_name.to_string(),
        });
    }

    fn unpublish_disk(&self, disk: &mut Self::Disk) {
        assert!(disk.published);
        disk.published = false;
        self.record(HostEvent::Unpublish { disk: disk.id });
    }

    fn release_queue(&self, queue: Self::Queue) {
        self.record(HostEvent::ReleaseQueue { queue: queue.id });
    }

    fn release_disk(&self, disk: Self::Disk) {
        assert!(!disk.published, "disk released while still published");
        self.record(HostEvent::ReleaseDisk { disk: disk.id });
    }

    fn unregister_driver(&self, driver: Self::DriverId, name: &str) {
        assert!(!name.is_empty());
        self.record(HostEvent::UnregisterDriver { driver: driver.0 });
    }
}
