//! End-to-end runs of the control plane against the in-memory kernel

use l4lb_control::{
    backends::load_backends, loader::MemoryTable, publish, record, run, BackendDefinition,
    ControlError, MemoryLoader, OutputFormat, RuntimeConfig,
};
use std::{net::Ipv4Addr, path::Path, time::Duration};

fn loader() -> MemoryLoader {
    MemoryLoader::new()
        .with_program("xdp_l4lb")
        .with_table("servers", 32)
        .with_interface("veth0")
}

fn config() -> RuntimeConfig {
    RuntimeConfig {
        clear_screen: false,
        ..Default::default()
    }
}

fn backends(count: usize) -> Vec<BackendDefinition> {
    (0..count)
        .map(|i| BackendDefinition::new(format!("10.1.0.{}", i + 1), format!("02:00:00:00:00:{:02x}", i)))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_scenario_report_after_kernel_update() {
    let loader = loader();
    let table = loader.table("servers").unwrap();

    let kernel = table.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        kernel.add_traffic(0, 100, 64_000);
    });

    let mut out = Vec::new();
    let summary = run(
        &loader,
        &config(),
        &[BackendDefinition::new("10.0.0.5", "aa:bb:cc:dd:ee:ff")],
        &mut out,
        tokio::time::sleep(Duration::from_millis(1500)),
    )
    .await
    .unwrap();

    assert_eq!(summary.ticks, 1);

    let rec = table.record(0).unwrap();
    assert_eq!(rec.source_address, 0x0A00_0001);
    assert_eq!(record::raw_to_address(rec.dest_address), Ipv4Addr::new(10, 0, 0, 5));
    assert_eq!(rec.link_address, [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff, 0, 0]);

    let text = String::from_utf8(out).unwrap();
    let line = text
        .lines()
        .find(|line| line.starts_with("10.0.0.5 "))
        .expect("status line for 10.0.0.5");
    assert_eq!(
        line,
        "10.0.0.5             100 pkts (        100 pps )          64 Kbytes (      0 Mbits/s )"
    );
    assert!(text.contains("Detaching program and exit"));
}

#[tokio::test(start_paused = true)]
async fn test_full_table_runs() {
    let loader = loader();
    let summary = run(
        &loader,
        &config(),
        &backends(32),
        Vec::new(),
        tokio::time::sleep(Duration::from_millis(3500)),
    )
    .await
    .unwrap();

    assert_eq!(summary.published, 32);
    assert_eq!(summary.ticks, 3);
    assert_eq!(loader.table("servers").unwrap().populated_slots(), 32);
    assert_eq!(loader.detach_calls(), 1);
}

#[tokio::test]
async fn test_oversized_table_is_rejected_and_detached() {
    let loader = loader();
    let result = run(
        &loader,
        &config(),
        &backends(33),
        Vec::new(),
        std::future::pending::<()>(),
    )
    .await;

    assert!(matches!(
        result,
        Err(ControlError::CapacityExceeded { count: 33, capacity: 32 })
    ));
    assert_eq!(loader.attach_calls(), 1);
    assert_eq!(loader.detach_calls(), 1);
    assert!(!loader.is_attached("veth0"));
}

#[tokio::test]
async fn test_unloadable_image() {
    let loader = loader().with_unloadable_image();
    let result = run(&loader, &config(), &backends(1), Vec::new(), std::future::ready(())).await;

    assert!(matches!(result, Err(ControlError::ImageLoadFailed { .. })));
    assert_eq!(loader.attach_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_json_output_per_tick() {
    let loader = loader();
    let table = loader.table("servers").unwrap();

    let kernel = table.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(100));
        loop {
            ticker.tick().await;
            kernel.add_traffic(1, 10, 12_500);
        }
    });

    let config = RuntimeConfig {
        format: OutputFormat::Json,
        interval: Duration::from_millis(1000),
        ..config()
    };

    let mut out = Vec::new();
    let summary = run(
        &loader,
        &config,
        &backends(2),
        &mut out,
        tokio::time::sleep(Duration::from_millis(2050)),
    )
    .await
    .unwrap();
    assert_eq!(summary.ticks, 2);

    let ticks: Vec<serde_json::Value> = String::from_utf8(out)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(ticks.len(), 2);

    for tick in &ticks {
        let destinations = tick["destinations"].as_array().unwrap();
        assert_eq!(destinations.len(), 32);
        assert_eq!(destinations[1]["address"], "10.1.0.2");
        assert!(destinations[1]["packet_delta"].as_u64().unwrap() > 0);
        assert_eq!(destinations[0]["packets"], 0);
    }
}

#[test]
fn test_sample_backend_file_fills_table() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../destination_samples/32_destinations.csv");
    let list = load_backends(&path).unwrap();
    assert_eq!(list.len(), 32);

    let mut table = MemoryTable::new(32);
    assert_eq!(publish(&mut table, &list).unwrap(), 32);
    assert_eq!(table.populated_slots(), 32);
}
