// tests/config_roundtrip.rs
// Save-then-load yields field-for-field equal data, including the
// daemon-maintained timestamps and fingerprints.

use chrono::{TimeZone, Utc};
use watchdog_agent::{ConfigStore, Configuration, Topic};

fn populated_config() -> Configuration {
    let mut cfg = Configuration {
        require_ac_power: false,
        idle_threshold_minutes: 12,
        topics: Vec::new(),
    };

    let mut fedora = Topic::new("Fedora 44 Release");
    fedora.description = "Monitor for Fedora 44 release date and announcements".into();
    fedora.search_queries = vec![
        "Fedora 44 release date".into(),
        "Fedora 44 beta announcement".into(),
    ];
    fedora.urls_to_check = vec!["https://fedoramagazine.org/".into()];
    fedora.check_interval_hours = 48;
    fedora.last_checked_at = Some(Utc.with_ymd_and_hms(2026, 8, 1, 9, 30, 0).unwrap());
    fedora.last_signal = Some("3e7a1c".into());
    fedora.last_notified_at = Some(Utc.with_ymd_and_hms(2026, 7, 30, 18, 0, 0).unwrap());
    cfg.add_topic(fedora).unwrap();

    // A topic that has never been checked: optional fields stay absent.
    let mut bios = Topic::new("HP ZBook Battery Charge Limit");
    bios.search_queries = vec!["HP ZBook G1a BIOS update battery".into()];
    bios.check_interval_hours = 72;
    cfg.add_topic(bios).unwrap();

    cfg
}

#[test]
fn roundtrip_preserves_every_field() {
    let tmp = tempfile::tempdir().unwrap();
    let store = ConfigStore::new(tmp.path().join("config.toml"));
    let cfg = populated_config();

    store.save(&cfg).unwrap();
    let loaded = store.load().unwrap();

    assert_eq!(loaded, cfg);
}

#[test]
fn never_checked_fields_stay_absent_in_the_file() {
    let tmp = tempfile::tempdir().unwrap();
    let store = ConfigStore::new(tmp.path().join("config.toml"));
    store.save(&populated_config()).unwrap();

    let text = std::fs::read_to_string(store.path()).unwrap();
    // One topic carries state keys, the untouched one must not.
    assert_eq!(text.matches("last_checked_at").count(), 1);
    assert_eq!(text.matches("last_signal").count(), 1);
}

#[test]
fn unknown_state_survives_a_second_roundtrip() {
    let tmp = tempfile::tempdir().unwrap();
    let store = ConfigStore::new(tmp.path().join("config.toml"));
    store.save(&populated_config()).unwrap();

    // A no-op load-mutate-save cycle must not lose anything.
    store.with_lock(|_cfg| ()).unwrap();
    assert_eq!(store.load().unwrap(), populated_config());
}
