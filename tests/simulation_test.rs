use std::{fs, io, path::Path};

use serial_test::serial;
use vm_simulator::{
    traffic::{self, TrafficOptions},
    ConfigError, Mode, SimulationConfig, Simulator,
};

static TEST_FILE: &str = "test_simulation.txt";

fn write_input(text: &str) {
    fs::write(TEST_FILE, text).unwrap();
}

#[test]
fn demo_input() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos/input.txt");
    let config = SimulationConfig::from_file(&path).unwrap();
    assert_eq!(config.mode, Mode::Sequential);

    let mut simulator = Simulator::new(config.build_manager(None).unwrap());
    let stats = simulator.run(&config.commands, &mut io::sink()).unwrap();
    assert_eq!(stats.commands, 10);
    assert_eq!(stats.failures, 1);
    assert_eq!(stats.accesses, 4);
    assert_eq!(stats.page_faults, 1);
    assert_eq!(stats.evictions, 4);
    assert_eq!(stats.swap_ins, 1);

    let manager = simulator.manager();
    assert!(!manager.page_table().contains("p3"));
    assert_eq!(manager.page_table().process("p2").unwrap().size(), 18);
    assert_eq!(manager.check_consistency(), Ok(()));
}

#[test]
#[serial]
fn sequential_file() {
    write_input("sequential\nlru\n4\n32\n16\nC p1 16\nC p2 32\nA p1 5\nA p1 20\n");
    let config = SimulationConfig::from_file(Path::new(TEST_FILE)).unwrap();
    let mut simulator = Simulator::new(config.build_manager(None).unwrap());
    let mut out = Vec::new();
    simulator.run(&config.commands, &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();

    assert!(text.contains("==== PAGE FAULT: process p1 at address 5 ===="));
    assert!(text.contains("error: access error: p1 has no address 20"));
    assert_eq!(simulator.stats().page_faults, 1);
}

#[test]
#[serial]
fn random_file() {
    write_input("aleatorio\nfifo\n8\n64\n64\nC a 20\nC b 30\nC c 12\n");
    let config = SimulationConfig::from_file(Path::new(TEST_FILE)).unwrap();
    assert_eq!(config.mode, Mode::Random);

    let manager = config.build_manager(Some(5)).unwrap();
    let report = traffic::run(
        manager,
        config.workload(),
        TrafficOptions {
            accesses: 50,
            seed: Some(5),
        },
    )
    .unwrap();
    let pids: Vec<&str> = report.workers.iter().map(|w| w.pid.as_str()).collect();
    assert_eq!(pids, vec!["a", "b", "c"]);
    assert_eq!(report.stats.commands, 3 * 51);
}

#[test]
#[serial]
fn missing_file() {
    let _ = fs::remove_file(TEST_FILE);
    assert!(matches!(
        SimulationConfig::from_file(Path::new(TEST_FILE)),
        Err(ConfigError::Io { .. })
    ));
}
