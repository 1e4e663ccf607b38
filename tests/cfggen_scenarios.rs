//! End-to-end generator scenarios.

use std::collections::BTreeSet;
use std::sync::Arc;

use dhcp_server_mgr::cfggen::port::parse_port_alias_map;
use dhcp_server_mgr::cfggen::{DhcpServCfgGenerator, GenerateError, OptionAllowList};
use dhcp_server_mgr::config::ServerConfig;
use dhcp_server_mgr::db::memory::{row, MemoryDb};
use dhcp_server_mgr::db::{self, FieldValue, FileDb};
use dhcp_server_mgr::monitor::CheckerKind;
use serde_json::Value;

mod common;

fn generator(db: Arc<MemoryDb>) -> DhcpServCfgGenerator {
    DhcpServCfgGenerator::with_parts(
        db,
        ServerConfig::default(),
        parse_port_alias_map("Ethernet24 etp7\nEthernet28 etp8\n"),
        OptionAllowList::unassigned([60, 223]),
    )
}

/// VLAN1000 = 192.168.0.1/21; range1, range2 and range3 on etp8, a single
/// address on etp7.
fn scenario_db() -> Arc<MemoryDb> {
    let db = common::base_db();
    common::add_vlan(&db, "Vlan1000", "192.168.0.1/21", &["Ethernet24", "Ethernet28"]);
    common::enable_dhcp(&db, "Vlan1000", "192.168.0.1");
    common::add_range(&db, "range1", &["192.168.0.2", "192.168.0.5"]);
    common::add_range(&db, "range2", &["192.168.0.3", "192.168.0.6"]);
    common::add_range(&db, "range3", &["192.168.0.10"]);
    common::bind_ranges(&db, "Vlan1000|Ethernet28", &["range1", "range2", "range3"]);
    common::bind_ips(&db, "Vlan1000|Ethernet24", &["192.168.0.7"]);
    db
}

fn pools(subnet: &Value) -> BTreeSet<(String, String)> {
    subnet["pools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| {
            (
                p["pool"].as_str().unwrap().to_string(),
                p["client-class"].as_str().unwrap().to_string(),
            )
        })
        .collect()
}

#[test]
fn test_overlapping_ranges_merge_into_one_pool() {
    let generated = generator(scenario_db()).generate().unwrap();
    let config: Value = serde_json::from_str(&generated.config).unwrap();

    let subnets = config["Dhcp4"]["subnet4"].as_array().unwrap();
    assert_eq!(subnets.len(), 1);
    assert_eq!(subnets[0]["subnet"], "192.168.0.0/21");

    let expected: BTreeSet<(String, String)> = [
        ("192.168.0.2 - 192.168.0.6", "sonic-host:etp8"),
        ("192.168.0.10 - 192.168.0.10", "sonic-host:etp8"),
        ("192.168.0.7 - 192.168.0.7", "sonic-host:etp7"),
    ]
    .iter()
    .map(|(p, c)| (p.to_string(), c.to_string()))
    .collect();
    assert_eq!(pools(&subnets[0]), expected);

    let classes: Vec<&str> = config["Dhcp4"]["client-classes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert_eq!(classes, vec!["sonic-host:etp7", "sonic-host:etp8"]);
    assert_eq!(
        config["Dhcp4"]["client-classes"][1]["test"],
        "substring(relay4[1].hex, -15, 15) == 'sonic-host:etp8'"
    );

    let option_data = subnets[0]["option-data"].as_array().unwrap();
    assert_eq!(option_data[0]["name"], "routers");
    assert_eq!(option_data[0]["data"], "192.168.0.1");
    assert_eq!(option_data[1]["name"], "dhcp-server-identifier");
    assert_eq!(subnets[0]["valid-lifetime"], 900);

    assert_eq!(
        generated.used_ranges.into_iter().collect::<Vec<_>>(),
        vec!["range1", "range2", "range3"]
    );
    assert_eq!(generated.enabled_interfaces.into_iter().collect::<Vec<_>>(), vec!["Vlan1000"]);
    assert!(generated.diagnostics.is_empty(), "{:?}", generated.diagnostics);
}

#[test]
fn test_pools_of_different_ports_never_overlap() {
    let db = scenario_db();
    common::bind_ranges(&db, "Vlan1000|Ethernet24", &["range1"]);
    let generated = generator(db).generate().unwrap();
    let config: Value = serde_json::from_str(&generated.config).unwrap();

    let expected: BTreeSet<(String, String)> = [
        ("192.168.0.2 - 192.168.0.5", "sonic-host:etp7"),
        ("192.168.0.10 - 192.168.0.10", "sonic-host:etp8"),
    ]
    .iter()
    .map(|(p, c)| (p.to_string(), c.to_string()))
    .collect();
    assert_eq!(pools(&config["Dhcp4"]["subnet4"][0]), expected);
    assert!(generated
        .diagnostics
        .mentions(db::DHCP_SERVER_IPV4_PORT, "Vlan1000|Ethernet28"));
    assert_eq!(generated.diagnostics.len(), 1);
}

#[test]
fn test_port_mode_watches_port_tables() {
    let generated = generator(scenario_db()).generate().unwrap();
    let expected: BTreeSet<CheckerKind> = [
        CheckerKind::DhcpServerCfg,
        CheckerKind::DhcpPort,
        CheckerKind::DhcpRange,
        CheckerKind::Vlan,
        CheckerKind::VlanIntf,
        CheckerKind::VlanMember,
    ]
    .into_iter()
    .collect();
    assert_eq!(generated.watched_tables, expected);

    let ctx = generated.check_context();
    assert!(ctx.interfaces.contains("Vlan1000"));
    assert!(ctx.used_ranges.contains("range3"));
}

#[test]
fn test_no_enabled_interfaces_renders_empty_subnet_list() {
    let db = common::base_db();
    common::add_vlan(&db, "Vlan1000", "192.168.0.1/21", &[]);
    db.set_config_row(db::DHCP_SERVER_IPV4, "Vlan1000", row([("state", "disabled".into())]));

    let generated = generator(db).generate().unwrap();
    let config: Value = serde_json::from_str(&generated.config).unwrap();
    assert_eq!(config["Dhcp4"]["subnet4"], serde_json::json!([]));
    assert_eq!(config["Dhcp4"]["client-classes"], serde_json::json!([]));
    assert!(generated.enabled_interfaces.is_empty());
}

#[test]
fn test_generation_is_deterministic() {
    let generator = generator(scenario_db());
    let first = generator.generate().unwrap();
    let second = generator.generate().unwrap();
    assert_eq!(first.config, second.config);
    assert!(first.config.ends_with('\n'));
}

#[test]
fn test_reversed_range_is_dropped() {
    let db = scenario_db();
    common::add_range(&db, "range2", &["192.168.0.6", "192.168.0.3"]);

    let generated = generator(db).generate().unwrap();
    assert!(!generated.used_ranges.contains("range2"));
    assert!(generated.used_ranges.contains("range1"));
    assert!(generated
        .diagnostics
        .mentions(db::DHCP_SERVER_IPV4_RANGE, "range2"));

    let config: Value = serde_json::from_str(&generated.config).unwrap();
    let pools = pools(&config["Dhcp4"]["subnet4"][0]);
    assert!(pools.contains(&("192.168.0.2 - 192.168.0.5".to_string(), "sonic-host:etp8".to_string())));
}

#[test]
fn test_invalid_customized_options_never_render() {
    let db = scenario_db();
    let option = |id: &str, kind: &str, value: &str| {
        row([("id", id.into()), ("type", kind.into()), ("value", value.into())])
    };
    db.set_config_row(db::DHCP_SERVER_IPV4_CUSTOMIZED_OPTIONS, "option60", option("60", "string", "dummy,value"));
    db.set_config_row(db::DHCP_SERVER_IPV4_CUSTOMIZED_OPTIONS, "option_code1", option("1", "string", "x"));
    db.set_config_row(db::DHCP_SERVER_IPV4_CUSTOMIZED_OPTIONS, "option_wide", option("223", "uint8", "4096"));
    let long = "y".repeat(254);
    db.set_config_row(db::DHCP_SERVER_IPV4_CUSTOMIZED_OPTIONS, "option_long", option("223", "string", &long));
    db.set_config_row(
        db::DHCP_SERVER_IPV4,
        "Vlan1000",
        row([
            ("gateway", "192.168.0.1".into()),
            ("mode", "PORT".into()),
            ("state", "enabled".into()),
            (
                "customized_options",
                FieldValue::from(vec!["option60", "option_code1", "option_wide", "option_long"]),
            ),
        ]),
    );

    let generated = generator(db).generate().unwrap();
    for name in ["option_code1", "option_wide", "option_long"] {
        assert!(!generated.config.contains(name), "{name} rendered");
        assert!(generated
            .diagnostics
            .mentions(db::DHCP_SERVER_IPV4_CUSTOMIZED_OPTIONS, name));
    }
    assert!(generated.used_options.contains("option_long"));
    assert!(generated.watched_tables.contains(&CheckerKind::DhcpOption));

    let config: Value = serde_json::from_str(&generated.config).unwrap();
    let defs = config["Dhcp4"]["option-def"].as_array().unwrap();
    assert_eq!(defs.len(), 1);
    assert_eq!(defs[0]["code"], 60);
    let custom = config["Dhcp4"]["subnet4"][0]["option-data"]
        .as_array()
        .unwrap()
        .iter()
        .find(|o| o["name"] == "option60")
        .unwrap()
        .clone();
    assert_eq!(custom["data"], "dummy\\,value");
    assert_eq!(custom["always-send"], true);
    assert!(generated
        .diagnostics
        .affected_interfaces()
        .contains("Vlan1000"));
}

#[test]
fn test_rejected_port_bindings_are_reported() {
    let db = scenario_db();
    // Not a VLAN member, and a binding with both ips and ranges.
    common::bind_ips(&db, "Vlan1000|Ethernet40", &["192.168.0.20"]);
    db.set_config_row(
        db::DHCP_SERVER_IPV4_PORT,
        "Vlan1000|Ethernet24",
        row([
            ("ips", FieldValue::from(vec!["192.168.0.7"])),
            ("ranges", FieldValue::from(vec!["range1"])),
        ]),
    );

    let generated = generator(db).generate().unwrap();
    assert!(generated.diagnostics.mentions(db::DHCP_SERVER_IPV4_PORT, "Vlan1000|Ethernet40"));
    assert!(generated.diagnostics.mentions(db::DHCP_SERVER_IPV4_PORT, "Vlan1000|Ethernet24"));
    assert!(!generated.config.contains("sonic-host:etp7"));
    assert!(generated.config.contains("sonic-host:etp8"));
}

#[test]
fn test_missing_hostname_aborts() {
    let db = Arc::new(MemoryDb::new());
    let err = generator(db).generate().unwrap_err();
    assert!(matches!(err, GenerateError::MissingHostname));
}

#[test]
fn test_file_backed_generation() {
    let dir = tempfile::tempdir().unwrap();
    let files = common::files_in(dir.path());
    let config_db = dir.path().join("config_db.json");
    std::fs::write(
        &config_db,
        r#"{
            "DEVICE_METADATA": {"localhost": {"hostname": "sonic-host"}},
            "VLAN": {"Vlan1000": {"vlanid": "1000"}},
            "VLAN_INTERFACE": {"Vlan1000|192.168.0.1/21": {}},
            "VLAN_MEMBER": {"Vlan1000|Ethernet24": {"tagging_mode": "untagged"}},
            "DHCP_SERVER_IPV4": {
                "Vlan1000": {"gateway": "192.168.0.1", "mode": "PORT", "state": "enabled",
                             "customized_options": "option60"}
            },
            "DHCP_SERVER_IPV4_CUSTOMIZED_OPTIONS": {
                "option60": {"id": "60", "type": "string", "value": "dummy_value"}
            },
            "DHCP_SERVER_IPV4_PORT": {"Vlan1000|Ethernet24": {"ips": ["192.168.0.7"]}}
        }"#,
    )
    .unwrap();
    let db = Arc::new(FileDb::new(&config_db, dir.path().join("state_db.json")));

    let generator = DhcpServCfgGenerator::new(db, &ServerConfig::default(), &files).unwrap();
    let generated = generator.generate().unwrap();
    let config: Value = serde_json::from_str(&generated.config).unwrap();

    assert_eq!(
        pools(&config["Dhcp4"]["subnet4"][0]),
        [("192.168.0.7 - 192.168.0.7".to_string(), "sonic-host:etp7".to_string())]
            .into_iter()
            .collect()
    );
    assert_eq!(config["Dhcp4"]["option-def"][0]["name"], "option60");
    assert!(generated.diagnostics.is_empty());
}
