use xiprd::host::{FailPoint, HostEvent, MockHost};
use xiprd::{ConfigError, Device, InitError, LifecycleState, RegistrationError, VolumeConfig};

fn config(sector_size: u64, sector_count: u64) -> VolumeConfig {
    VolumeConfig {
        sector_size,
        sector_count,
        ..VolumeConfig::default()
    }
}

#[test]
fn full_lifecycle_is_balanced() {
    let host = MockHost::new();
    let device = Device::bring_up(&host, &config(512, 2048)).unwrap();

    assert_eq!(device.state(), LifecycleState::Ready);
    assert_eq!(device.name(), "xiprd");
    assert_eq!(device.sector_size(), 512);
    assert_eq!(device.sector_count(), 2048);
    assert_eq!(device.capacity_bytes(), 1024 * 1024);

    device.tear_down(&host);

    assert_eq!(host.outstanding(), 0);
    host.assert_balanced();
}

#[test]
fn init_failure_at_each_step_leaks_nothing() {
    for fail_point in [
        FailPoint::RegisterDriver,
        FailPoint::AllocateDisk,
        FailPoint::AllocateQueue,
    ] {
        let host = MockHost::failing_at(fail_point);
        let err = Device::bring_up(&host, &config(512, 2048)).unwrap_err();

        assert!(
            matches!(err, InitError::Registration(_)),
            "{fail_point:?}: {err:?}"
        );
        assert_eq!(host.outstanding(), 0, "{fail_point:?} leaked");
        host.assert_balanced();
    }
}

#[test]
fn queue_failure_releases_earlier_steps_exactly_once() {
    let host = MockHost::failing_at(FailPoint::AllocateQueue);
    let err = Device::bring_up(&host, &config(512, 2048)).unwrap_err();
    assert_eq!(err, InitError::Registration(RegistrationError::Queue));

    let events = host.events();
    let releases = |matcher: fn(&HostEvent) -> bool| events.iter().filter(|e| matcher(e)).count();

    // Driver and disk were acquired before the failing step; each is
    // released exactly once, the queue never was acquired so never released.
    assert_eq!(releases(|e| matches!(e, HostEvent::UnregisterDriver { .. })), 1);
    assert_eq!(releases(|e| matches!(e, HostEvent::ReleaseDisk { .. })), 1);
    assert_eq!(releases(|e| matches!(e, HostEvent::ReleaseQueue { .. })), 0);
    assert_eq!(releases(|e| matches!(e, HostEvent::Unpublish { .. })), 0);
}

#[test]
fn config_rejection_reaches_no_host_call() {
    let host = MockHost::new();

    for bad in [
        config(0, 2048),
        config(512, 0),
        config(100, 2048),
        VolumeConfig {
            name: String::new(),
            ..config(512, 2048)
        },
    ] {
        let err = Device::bring_up(&host, &bad).unwrap_err();
        assert!(matches!(err, InitError::Config(_)), "{bad:?}: {err:?}");
    }
    assert!(host.events().is_empty());
}

#[test]
fn config_error_variants() {
    let host = MockHost::new();

    let err = Device::bring_up(&host, &config(768, 2048)).unwrap_err();
    assert_eq!(err, InitError::Config(ConfigError::SectorSize(768)));

    let err = Device::bring_up(&host, &config(512, 0)).unwrap_err();
    assert_eq!(err, InitError::Config(ConfigError::SectorCount));
}

#[test]
fn devices_are_independent_values() {
    // No singleton: several devices coexist against one host, each with its
    // own store and registration.
    let host = MockHost::new();

    let a = Device::bring_up(&host, &config(512, 2048)).unwrap();
    let b = Device::bring_up(
        &host,
        &VolumeConfig {
            name: "xiprd-b".to_string(),
            ..config(4096, 256)
        },
    )
    .unwrap();

    a.submit(xiprd::Request::Write {
        start_sector: 0,
        segments: vec![&[0xAA; 512]],
    })
    .unwrap();

    let mut out = [0u8; 512];
    b.submit(xiprd::Request::Read {
        start_sector: 0,
        segments: vec![&mut out],
    })
    .unwrap();
    // B never saw A's write.
    assert!(out.iter().all(|&b| b == 0));

    a.tear_down(&host);
    b.tear_down(&host);
    host.assert_balanced();
}

#[test]
fn teardown_after_failed_init_is_not_needed() {
    // A failed bring_up returns no device, so there is nothing to tear
    // down; the rollback inside bring_up already released the partial
    // acquisitions. The journal proves both halves.
    let host = MockHost::failing_at(FailPoint::AllocateDisk);
    assert!(Device::bring_up(&host, &config(512, 2048)).is_err());

    assert_eq!(host.outstanding(), 0);
    host.assert_balanced();
}
