//! Context and queue selection against fabricated platforms.

use colorxfer_compute::{queue_key, DeviceClass, DeviceId, DeviceQuery, MockProvider, ResourceManager};

fn workstation() -> MockProvider {
    MockProvider::new()
        .platform(
            "Vulkan",
            &[
                ("NVIDIA GeForce RTX 3060", 0x10DE, DeviceClass::Gpu),
                ("NVIDIA GeForce GTX 1080", 0x10DE, DeviceClass::Gpu),
                ("Intel(R) UHD Graphics 770", 0x8086, DeviceClass::Gpu),
                ("llvmpipe (LLVM 17.0.6, 256 bits)", 0x10005, DeviceClass::Cpu),
            ],
        )
        .platform(
            "Gl",
            &[
                ("AMD Radeon RX 7900 XT", 0x1002, DeviceClass::Gpu),
                ("Microsoft Basic Render Driver", 0x1414, DeviceClass::Cpu),
            ],
        )
}

fn manager(provider: MockProvider) -> ResourceManager<MockProvider> {
    let mut rm = ResourceManager::new(provider);
    rm.discover();
    rm
}

#[test]
fn context_devices_match_class_and_vendor() {
    let queries = [
        ("nvidia", DeviceClass::Gpu),
        ("GEFORCE", DeviceClass::Gpu),
        ("intel", DeviceClass::Gpu),
        ("radeon", DeviceClass::Gpu),
        ("llvmpipe", DeviceClass::Cpu),
        ("microsoft", DeviceClass::Cpu),
        ("", DeviceClass::Cpu),
    ];

    for (vendor, class) in queries {
        let mut rm = manager(workstation());
        let query = DeviceQuery::new(vendor, class);
        let ctx = rm
            .get_context(&query)
            .unwrap_or_else(|| panic!("no context for {query}"));
        assert!(!ctx.devices().is_empty());
        for d in ctx.devices() {
            assert_eq!(d.info.class, class, "{query}");
            let needle = vendor.to_lowercase();
            assert!(
                ctx.platform().to_lowercase().contains(&needle)
                    || d.info.vendor.to_lowercase().contains(&needle)
                    || d.info.name.to_lowercase().contains(&needle),
                "{} does not match {query}",
                d.info
            );
        }
    }
}

#[test]
fn context_groups_all_matches_of_first_platform() {
    let mut rm = manager(workstation());
    let ctx = rm.get_context(&DeviceQuery::new("geforce", DeviceClass::Gpu)).unwrap();
    assert_eq!(ctx.platform(), "Vulkan");
    assert_eq!(ctx.device_ids(), vec![DeviceId(0), DeviceId(1)]);
}

#[test]
fn no_match_is_empty_not_error() {
    let mut rm = manager(workstation());
    assert!(rm.get_context(&DeviceQuery::new("apple", DeviceClass::Gpu)).is_none());
    assert!(rm.get_context(&DeviceQuery::new("nvidia", DeviceClass::Cpu)).is_none());
    assert!(rm.context_names().is_empty());
}

#[test]
fn empty_discovery_is_not_fatal() {
    let mut rm = manager(MockProvider::new());
    assert!(rm.discovery().is_empty());
    assert!(rm.get_context(&DeviceQuery::any(DeviceClass::Gpu)).is_none());
    assert!(rm.get_command_queue("").is_none());
}

#[test]
fn fallback_chain_picks_first_available_vendor() {
    let mut rm = manager(workstation());
    let chain = ["apple", "radeon", "nvidia"];
    let (vendor, ctx) = chain
        .iter()
        .find_map(|v| rm.get_context(&DeviceQuery::new(v, DeviceClass::Gpu)).map(|c| (*v, c)))
        .unwrap();
    assert_eq!(vendor, "radeon");
    assert_eq!(ctx.platform(), "Gl");
}

#[test]
fn unopenable_devices_are_skipped() {
    let mut rm = manager(workstation().fail_open(0));
    let ctx = rm.get_context(&DeviceQuery::new("nvidia", DeviceClass::Gpu)).unwrap();
    assert_eq!(ctx.device_ids(), vec![DeviceId(1)]);

    let mut rm = manager(workstation().fail_open(4));
    assert!(rm.get_context(&DeviceQuery::new("radeon", DeviceClass::Gpu)).is_none());
}

#[test]
fn cpu_and_gpu_contexts_coexist() {
    let mut rm = manager(workstation());
    let gpu = rm.get_context(&DeviceQuery::new("nvidia", DeviceClass::Gpu)).unwrap();
    let cpu = rm.get_context(&DeviceQuery::new("llvmpipe", DeviceClass::Cpu)).unwrap();
    assert_ne!(gpu.name(), cpu.name());
    assert_eq!(rm.context_names().len(), 2);

    let named = rm
        .get_context_named(&DeviceQuery::new("intel", DeviceClass::Gpu), "active")
        .unwrap();
    assert_eq!(named.name(), "active");
    assert!(rm.context("active").is_some());
}

#[test]
fn queues_bind_to_one_device_and_are_cached() {
    let mut rm = manager(workstation());
    rm.get_context(&DeviceQuery::new("nvidia", DeviceClass::Gpu)).unwrap();

    let q = rm.get_command_queue("GTX").unwrap();
    assert_eq!(q.device.id, DeviceId(1));
    assert_eq!(q.handle().id, DeviceId(1));
    assert_eq!(q.context, "gpu:nvidia");

    let again = rm.get_command_queue("gtx").unwrap();
    assert!(std::sync::Arc::ptr_eq(&q, &again));
    assert!(rm.queue(&queue_key("gpu:nvidia", "gtx")).is_some());
}

#[test]
fn queues_are_cached_per_context() {
    let mut rm = manager(MockProvider::new().platform(
        "Vulkan",
        &[
            ("AMD Ryzen 7 7700", 0x1002, DeviceClass::Cpu),
            ("AMD Radeon RX 7600", 0x1002, DeviceClass::Gpu),
        ],
    ));
    let cpu = rm.get_context(&DeviceQuery::new("amd", DeviceClass::Cpu)).unwrap();
    let gpu = rm.get_context(&DeviceQuery::new("amd", DeviceClass::Gpu)).unwrap();

    let on_cpu = rm.get_command_queue_on(&cpu, "amd").unwrap();
    let on_gpu = rm.get_command_queue_on(&gpu, "AMD").unwrap();
    assert_eq!((on_cpu.context.as_str(), on_cpu.device.id), ("cpu:amd", DeviceId(0)));
    assert_eq!((on_gpu.context.as_str(), on_gpu.device.id), ("gpu:amd", DeviceId(1)));
    assert!(!std::sync::Arc::ptr_eq(&on_cpu, &on_gpu));
    assert!(std::sync::Arc::ptr_eq(&on_gpu, &rm.get_command_queue_on(&gpu, "amd").unwrap()));
    assert!(rm.get_command_queue_on(&cpu, "radeon").is_none());
}

#[test]
fn named_context_must_match_query() {
    let mut rm = manager(workstation());
    rm.get_context_named(&DeviceQuery::new("nvidia", DeviceClass::Gpu), "active")
        .unwrap();
    assert!(rm
        .get_context_named(&DeviceQuery::new("llvmpipe", DeviceClass::Cpu), "active")
        .is_none());
    let again = rm
        .get_context_named(&DeviceQuery::new("NVIDIA", DeviceClass::Gpu), "active")
        .unwrap();
    assert!(again.devices().iter().all(|d| d.info.class == DeviceClass::Gpu));
}
