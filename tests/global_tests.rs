//! Tests for the process-wide bridge.
//!
//! The singleton is shared by every test in this binary, so the lifecycle is
//! exercised as one sequence.

use proxybind::global;
use proxybind::prelude::*;

#[derive(Debug, Clone, Copy)]
struct Counter(#[allow(dead_code)] u64);

#[test]
fn test_global_bridge_lifecycle() {
    let _ = env_logger::builder().is_test(true).try_init();

    assert_eq!(global::shutdown(), Ok(None));
    assert_eq!(global::is_initialized(), Ok(false));

    let config = BridgeConfig::new().with_abort_on_fatal(false);
    assert_eq!(global::init(config), Ok(true));
    assert_eq!(global::init(BridgeConfig::new()), Ok(false));
    assert_eq!(
        global::with_bridge(|bridge| bridge.config().abort_on_fatal),
        Ok(false)
    );

    let hash = global::with_bridge(|bridge| {
        let module = bridge.new_module("counters");
        let desc = DescriptorBuilder::<Counter>::new("Counter")
            .bitwise_copy()
            .scope(module)
            .build();
        let hash = desc.type_hash;
        bridge.register_type(desc).map(|_| hash)
    })
    .unwrap()
    .unwrap();

    let mut counter = Counter(1);
    let addr = (&mut counter as *mut Counter).cast::<u8>();
    let proxy = global::with_bridge(|bridge| bridge.bind(hash, addr, RvPolicy::Copy, None))
        .unwrap()
        .unwrap()
        .unwrap();

    let report = global::shutdown().unwrap().unwrap();
    assert_eq!(report.leaked_instances, 1);
    assert_eq!(global::is_initialized(), Ok(false));

    // First use after shutdown creates a fresh bridge.
    let fresh = global::with_bridge(|bridge| (bridge.is_alive(proxy), bridge.type_count())).unwrap();
    assert_eq!(fresh, (false, 0));
    assert!(global::shutdown().unwrap().unwrap().is_clean());
}
