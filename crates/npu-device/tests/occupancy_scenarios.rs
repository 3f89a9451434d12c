//! Occupancy and registry scenarios against the in-memory source
//!
//! The reference population is one RNGD device exposing four cores through
//! `npu0pe0`, `npu0pe1-2` and `npu0`.

use npu_device::sources::{MemoryDevice, MemorySource};
use npu_device::{
    Arch, CoreRange, CoreStatus, DeviceAttribute, DeviceError, DeviceMode, DeviceRegistry,
    ErrorStates, OwnerId,
};

fn four_core_source() -> MemorySource {
    MemorySource::new().with_device(
        MemoryDevice::new(0, Arch::Rngd, 4)
            .with_files(["npu0pe0", "npu0pe1-2", "npu0"])
            .expect("valid device file names"),
    )
}

fn locked_registry() -> (MemorySource, DeviceRegistry) {
    let source = four_core_source();
    source
        .hold(0, "npu0pe1-2", OwnerId::new("pid:1234"))
        .expect("file exists");
    let registry = DeviceRegistry::new(source.clone());
    (source, registry)
}

#[test]
fn test_fusion_lock_occupies_both_cores() {
    let (_source, registry) = locked_registry();
    let device = registry.get_device(0).unwrap();

    assert_eq!(device.core_status(0).unwrap(), CoreStatus::Available);
    assert_eq!(device.core_status(1).unwrap(), CoreStatus::Occupied);
    assert_eq!(device.core_status(2).unwrap(), CoreStatus::Occupied);
    assert_eq!(device.core_status(3).unwrap(), CoreStatus::Available);

    assert_eq!(device.core_occupied_owner(1).unwrap().as_str(), "pid:1234");
    assert_eq!(device.core_occupied_owner(2).unwrap().as_str(), "pid:1234");
}

#[test]
fn test_device_file_by_name() {
    let (_source, registry) = locked_registry();
    let file = registry.get_device_file_by_name("npu0pe1-2").unwrap();

    assert_eq!(file.device_index(), 0);
    assert_eq!(file.core_range(), CoreRange::Range(1, 2));
    assert_eq!(file.mode(), DeviceMode::Fusion);
}

#[test]
fn test_unknown_device_file() {
    let (_source, registry) = locked_registry();

    assert!(matches!(
        registry.get_device_file_by_name("npu9"),
        Err(DeviceError::DeviceNotFound { .. })
    ));
    assert!(matches!(
        registry.get_device_file_by_name("bogus"),
        Err(DeviceError::InvalidInput { .. })
    ));
}

#[test]
fn test_dead_device_is_unavailable() {
    let (source, registry) = locked_registry();
    source.set_alive(0, false).unwrap();
    let device = registry.get_device(0).unwrap();

    for &core in device.core_ids() {
        assert_eq!(device.core_status(core).unwrap(), CoreStatus::Unavailable);
        assert!(matches!(
            device.core_occupied_owner(core),
            Err(DeviceError::Unavailable { .. })
        ));
    }
    assert!(device
        .all_core_status()
        .unwrap()
        .iter()
        .all(|(_, s)| *s == CoreStatus::Unavailable));
}

#[test]
fn test_batch_agrees_with_single_queries() {
    let (_source, registry) = locked_registry();
    let device = registry.get_device(0).unwrap();

    let batch = device.all_core_status().unwrap();
    let cores: Vec<u8> = batch.iter().map(|(c, _)| *c).collect();
    assert_eq!(cores, vec![0, 1, 2, 3]);

    for (core, status) in batch {
        assert_eq!(device.core_status(core).unwrap(), status);
    }
}

#[test]
fn test_owner_matches_status() {
    let (_source, registry) = locked_registry();
    let device = registry.get_device(0).unwrap();

    for occ in device.occupancy().unwrap().iter() {
        match occ.status {
            CoreStatus::Occupied => assert!(device.core_occupied_owner(occ.core).is_ok()),
            CoreStatus::Available | CoreStatus::Unavailable => assert!(matches!(
                device.core_occupied_owner(occ.core),
                Err(DeviceError::Unavailable { .. })
            )),
        }
    }
}

#[test]
fn test_topology_covers_every_core() {
    let (_source, registry) = locked_registry();

    for device in registry.list_devices().unwrap() {
        for &core in device.core_ids() {
            assert!(
                device.topology().files_covering(core).next().is_some(),
                "core {core} of {device} uncovered"
            );
        }
    }
}

#[test]
fn test_files_listed_by_core_range() {
    let (_source, registry) = locked_registry();
    let device = registry.get_device(0).unwrap();
    let names: Vec<&str> = device.dev_files().iter().map(|f| f.filename()).collect();

    assert_eq!(names, vec!["npu0", "npu0pe0", "npu0pe1-2"]);
}

#[test]
fn test_overlapping_holders_pick_lowest_path() {
    let source = four_core_source();
    source.hold(0, "npu0pe1-2", OwnerId::pid(20)).unwrap();
    source.hold(0, "npu0", OwnerId::pid(10)).unwrap();
    let device = DeviceRegistry::new(source).get_device(0).unwrap();

    // "/dev/rngd/npu0" sorts before "/dev/rngd/npu0pe1-2"
    assert_eq!(device.core_occupied_owner(1).unwrap(), OwnerId::pid(10));
    let occupancy = device.occupancy().unwrap();
    assert_eq!(occupancy.owner(1).unwrap(), &OwnerId::pid(10));
    assert_eq!(occupancy.owner(3).unwrap(), &OwnerId::pid(10));
}

#[test]
fn test_release_frees_cores() {
    let (source, registry) = locked_registry();
    let device = registry.get_device(0).unwrap();
    assert_eq!(device.core_status(1).unwrap(), CoreStatus::Occupied);

    source.release(0, "npu0pe1-2").unwrap();
    assert_eq!(device.core_status(1).unwrap(), CoreStatus::Available);
}

#[test]
fn test_unreachable_source() {
    let source = four_core_source();
    source.set_unreachable(true);
    let registry = DeviceRegistry::new(source);

    assert!(matches!(
        registry.list_devices(),
        Err(DeviceError::DeviceNotFound { .. })
    ));
}

#[test]
fn test_error_states_round_trip() {
    let source = four_core_source();
    source
        .set_attribute(
            0,
            DeviceAttribute::ErrorStates,
            "AXI Post Error: 0\nPCIe Fetch Error: 3\nDevice Error: 1\n",
        )
        .unwrap();
    let device = DeviceRegistry::new(source).get_device(0).unwrap();

    let states = device.error_states().unwrap();
    let json = serde_json::to_string(&states).unwrap();
    let back: ErrorStates = serde_json::from_str(&json).unwrap();

    assert_eq!(back, states);
    assert_eq!(
        back.keys().collect::<Vec<_>>(),
        vec!["axi_post_error", "pcie_fetch_error", "device_error"]
    );
}

#[test]
fn test_performance_counters_only_bound_files() {
    let source = four_core_source();
    source.bind_counter(0, "npu0pe1-2", "perf-7").unwrap();
    let device = DeviceRegistry::new(source).get_device(0).unwrap();

    let counters = device.performance_counters().unwrap();
    assert_eq!(counters.len(), 1);
    assert_eq!(counters[0].0.filename(), "npu0pe1-2");
    assert_eq!(counters[0].1.token(), "perf-7");
}

#[test]
fn test_sensors_unsupported_without_hwmon() {
    let device = DeviceRegistry::new(four_core_source()).get_device(0).unwrap();
    assert!(device.sensors().unwrap_err().is_unsupported());
}

#[test]
fn test_concurrent_queries() {
    let (source, registry) = locked_registry();
    let device = registry.get_device(0).unwrap();

    std::thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                for _ in 0..100 {
                    let statuses = device.all_core_status().unwrap();
                    // Cores 1 and 2 share one file, so they always agree
                    assert_eq!(statuses[1].1, statuses[2].1);
                }
            });
        }
        s.spawn(|| {
            for i in 0..100 {
                if i % 2 == 0 {
                    source.release(0, "npu0pe1-2").unwrap();
                } else {
                    source.hold(0, "npu0pe1-2", OwnerId::pid(i)).unwrap();
                }
            }
        });
    });
}
