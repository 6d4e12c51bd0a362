//! End-to-end synthesis scenarios.
//!
//! Each test drives a `Synthesizer` over a scratch directory with real file
//! writes, the way the CLI does.

use std::path::Path;

use serde_json::{Value, json};
use singbox_synth::SynthesisError;
use singbox_synth::config::SingBoxConfig;
use singbox_synth::config::route::RuleDirection;
use singbox_synth::generator::preferences::{
    ALLOW_LAN_KEY, CLASH_API_SECRET_KEY, CUSTOM_DIRECT_KEY, CUSTOM_PROXY_KEY,
};
use singbox_synth::generator::{
    Environment, MemorySubscriptions, Platform, SubscriptionCache, SynthesisRequest, Synthesizer,
};
use singbox_synth::store::{JsonFileStore, MemoryStore, SettingsStore};
use singbox_synth::template::{Mode, Scope};

// ============================================================================
// Fixtures
// ============================================================================

fn srv_a_payload() -> Value {
    json!({
        "outbounds": [
            {
                "tag": "srv-a",
                "type": "shadowsocks",
                "server": "203.0.113.7",
                "server_port": 8388,
                "method": "2022-blake3-aes-128-gcm",
                "password": "c2VjcmV0LXBhc3N3b3Jk"
            },
            {"tag": "auto-group", "type": "urltest", "outbounds": []}
        ]
    })
}

fn mixed_payload() -> Value {
    json!({
        "outbounds": [
            {"tag": "hk-01", "type": "vless", "server": "hk.example.com", "server_port": 443},
            {"tag": "provider-select", "type": "selector", "outbounds": ["hk-01", "jp-01"]},
            {"tag": "jp-01", "type": "trojan", "server": "jp.example.com", "server_port": 443},
            {"tag": "direct", "type": "direct"},
            {"tag": "block", "type": "block"},
            {"tag": "dns-out", "type": "dns"},
            {"tag": "provider-auto", "type": "urltest", "outbounds": ["hk-01", "jp-01"]},
            {"tag": "us-01", "type": "hysteria2", "server": "us.example.com", "server_port": 8443}
        ]
    })
}

fn subscriptions(payload: Value) -> MemorySubscriptions {
    let mut source = MemorySubscriptions::new();
    source.insert("sub-1", payload);
    source
}

fn synthesizer<S: SettingsStore>(
    settings: S,
    payload: Value,
    dir: &Path,
) -> Synthesizer<S, MemorySubscriptions> {
    Synthesizer::new(
        settings,
        subscriptions(payload),
        Environment::new(Platform::Windows, dir),
    )
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

fn group(document: &Value, tag: &str) -> Vec<String> {
    document["outbounds"]
        .as_array()
        .unwrap()
        .iter()
        .find(|o| o["tag"] == tag)
        .and_then(|o| o["outbounds"].as_array())
        .unwrap()
        .iter()
        .map(|t| t.as_str().unwrap().to_string())
        .collect()
}

fn outbound_tags(document: &Value) -> Vec<String> {
    document["outbounds"]
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["tag"].as_str().unwrap().to_string())
        .collect()
}

// ============================================================================
// Scenario
// ============================================================================

#[tokio::test]
async fn test_srv_a_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let synth = synthesizer(MemoryStore::new(), srv_a_payload(), dir.path());
    let request = SynthesisRequest::new("sub-1", "v1.12.0", Scope::Mixed, Mode::Rule);

    synth.synthesize(&request).await.unwrap();
    let document = read_json(&dir.path().join("config.json"));

    let outbounds = document["outbounds"].as_array().unwrap();
    assert_eq!(outbounds.len(), 4);
    assert_eq!(outbounds[0]["type"], "direct");
    assert_eq!(outbounds[0]["tag"], "direct");
    assert_eq!(outbounds[1]["type"], "selector");
    assert_eq!(outbounds[1]["tag"], "ExitGateway");
    assert_eq!(outbounds[1]["outbounds"], json!(["auto", "srv-a"]));
    assert_eq!(outbounds[2]["type"], "urltest");
    assert_eq!(outbounds[2]["tag"], "auto");
    assert_eq!(outbounds[2]["outbounds"], json!(["srv-a"]));

    let mut expected = srv_a_payload()["outbounds"][0].clone();
    expected["domain_resolver"] = json!("system");
    assert_eq!(outbounds[3], expected);

    assert_eq!(document["inbounds"][0]["type"], "mixed");
    assert_eq!(document["inbounds"][0]["listen"], "127.0.0.1");
    assert!(!outbound_tags(&document).contains(&"auto-group".to_string()));
}

// ============================================================================
// Properties
// ============================================================================

#[tokio::test]
async fn test_idempotent_output() {
    let dir = tempfile::tempdir().unwrap();
    let settings = JsonFileStore::open(dir.path().join("settings.json"))
        .await
        .unwrap();
    let synth = synthesizer(settings, mixed_payload(), dir.path());

    for (scope, mode, version) in [
        (Scope::Tun, Mode::Rule, "1.12.0"),
        (Scope::Mixed, Mode::Global, "1.11.3"),
    ] {
        let request = SynthesisRequest::new("sub-1", version, scope, mode);
        synth.synthesize(&request).await.unwrap();
        let first = std::fs::read(synth.output()).unwrap();
        synth.synthesize(&request).await.unwrap();
        let second = std::fs::read(synth.output()).unwrap();
        assert_eq!(first, second, "{scope}/{mode} on {version}");
    }
}

#[tokio::test]
async fn test_tag_propagation_and_classification() {
    for version in ["1.11.0", "1.12.0"] {
        let dir = tempfile::tempdir().unwrap();
        let synth = synthesizer(MemoryStore::new(), mixed_payload(), dir.path());
        let request = SynthesisRequest::new("sub-1", version, Scope::Tun, Mode::Global);
        let outcome = synth.render(&request).await.unwrap();
        let document = serde_json::to_value(&outcome.config).unwrap();

        let mut servers = vec!["hk-01", "jp-01"];
        if version == "1.11.0" {
            servers.push("dns-out");
        }
        servers.push("us-01");

        let mut selector = vec!["auto"];
        selector.extend(&servers);
        assert_eq!(group(&document, "ExitGateway"), selector, "{version}");
        assert_eq!(group(&document, "auto"), servers, "{version}");

        let tags = outbound_tags(&document);
        for control in ["provider-select", "provider-auto", "block"] {
            assert!(!tags.contains(&control.to_string()), "{control} leaked on {version}");
        }
        // The payload's own `direct` entry is dropped; only the template's remains.
        assert_eq!(tags.iter().filter(|t| *t == "direct").count(), 1);
        assert_eq!(tags.contains(&"dns-out".to_string()), version == "1.11.0");
    }
}

#[tokio::test]
async fn test_listen_address_toggles_in_both_scopes() {
    for scope in [Scope::Mixed, Scope::Tun] {
        for (allow_lan, expected) in [(true, "0.0.0.0"), (false, "127.0.0.1")] {
            let dir = tempfile::tempdir().unwrap();
            let store = MemoryStore::with_values([(ALLOW_LAN_KEY, json!(allow_lan))]);
            let synth = synthesizer(store, srv_a_payload(), dir.path());
            let request = SynthesisRequest::new("sub-1", "1.12.0", scope, Mode::Rule);

            synth.synthesize(&request).await.unwrap();
            let document = read_json(synth.output());

            let listeners: Vec<&Value> = document["inbounds"]
                .as_array()
                .unwrap()
                .iter()
                .filter(|i| i["type"] == "mixed")
                .collect();
            assert_eq!(listeners.len(), 1);
            assert_eq!(listeners[0]["listen"], expected, "{scope} allow_lan={allow_lan}");
        }
    }
}

#[tokio::test]
async fn test_listen_address_is_read_fresh() {
    let dir = tempfile::tempdir().unwrap();
    let synth = synthesizer(MemoryStore::new(), srv_a_payload(), dir.path());
    let request = SynthesisRequest::new("sub-1", "1.11.0", Scope::Mixed, Mode::Rule);

    synth.synthesize(&request).await.unwrap();
    assert_eq!(read_json(synth.output())["inbounds"][0]["listen"], "127.0.0.1");

    synth.settings().set(ALLOW_LAN_KEY, json!(true)).await.unwrap();
    synth.synthesize(&request).await.unwrap();
    assert_eq!(read_json(synth.output())["inbounds"][0]["listen"], "0.0.0.0");
}

#[tokio::test]
async fn test_unknown_version_has_no_side_effects() {
    let dir = tempfile::tempdir().unwrap();
    let synth = synthesizer(MemoryStore::new(), srv_a_payload(), dir.path());

    for version in ["v2.0.0", "1.10.7", "latest", ""] {
        let request = SynthesisRequest::new("sub-1", version, Scope::Tun, Mode::Rule);
        let err = synth.synthesize(&request).await.unwrap_err();
        assert!(
            matches!(err, SynthesisError::UnsupportedVersion { .. }),
            "{version}: {err}"
        );
    }

    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    assert_eq!(synth.settings().get(CLASH_API_SECRET_KEY).await.unwrap(), None);
}

#[tokio::test]
async fn test_failed_request_keeps_previous_config() {
    let dir = tempfile::tempdir().unwrap();
    let synth = synthesizer(MemoryStore::new(), srv_a_payload(), dir.path());

    let good = SynthesisRequest::new("sub-1", "1.12.0", Scope::Mixed, Mode::Rule);
    synth.synthesize(&good).await.unwrap();
    let before = std::fs::read(synth.output()).unwrap();

    let missing = SynthesisRequest::new("sub-2", "1.12.0", Scope::Mixed, Mode::Rule);
    let err = synth.synthesize(&missing).await.unwrap_err();
    assert!(matches!(err, SynthesisError::MissingSubscription { .. }));
    assert_eq!(std::fs::read(synth.output()).unwrap(), before);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_synthesizers_share_one_output() {
    let dir = tempfile::tempdir().unwrap();
    let fixed = || MemoryStore::with_values([(CLASH_API_SECRET_KEY, json!("fixed"))]);
    let tun = synthesizer(fixed(), mixed_payload(), dir.path());
    let mixed = synthesizer(fixed(), srv_a_payload(), dir.path());
    assert_eq!(tun.output(), mixed.output());

    let tun_request = SynthesisRequest::new("sub-1", "1.12.0", Scope::Tun, Mode::Rule);
    let mixed_request = SynthesisRequest::new("sub-1", "1.11.0", Scope::Mixed, Mode::Global);
    let expected = [
        tun.render(&tun_request).await.unwrap().config,
        mixed.render(&mixed_request).await.unwrap().config,
    ];

    for _ in 0..25 {
        let (a, b) = tokio::join!(
            tun.synthesize(&tun_request),
            mixed.synthesize(&mixed_request)
        );
        a.unwrap();
        b.unwrap();

        let written = std::fs::read_to_string(tun.output()).unwrap();
        let parsed = SingBoxConfig::from_json(&written).unwrap();
        assert!(expected.contains(&parsed));
    }

    let stray: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.ends_with(".tmp"))
        .collect();
    assert!(stray.is_empty(), "{stray:?}");
}

// ============================================================================
// Custom Rules
// ============================================================================

#[tokio::test]
async fn test_anchor_splice_appends_fragment() {
    let dir = tempfile::tempdir().unwrap();
    let store = MemoryStore::with_values([
        (
            CUSTOM_DIRECT_KEY,
            json!({"domain": [], "domain_suffix": [".corp.example", "intranet.example"], "ip_cidr": ["10.20.0.0/16"]}),
        ),
        (CUSTOM_PROXY_KEY, json!({"domain": ["chat.example"]})),
    ]);
    let synth = synthesizer(store, srv_a_payload(), dir.path());
    let request = SynthesisRequest::new("sub-1", "1.12.0", Scope::Tun, Mode::Rule);

    let outcome = synth.synthesize(&request).await.unwrap();
    assert_eq!(outcome.splice.applied, RuleDirection::ALL);

    let document = read_json(synth.output());
    let rules = document["route"]["rules"].as_array().unwrap();
    let direct = rules
        .iter()
        .find(|r| r["domain"][0] == "direct-tag.oneoh.cloud")
        .unwrap();
    assert_eq!(
        direct["domain_suffix"],
        json!([".corp.example", "intranet.example"])
    );
    assert_eq!(direct["ip_cidr"], json!(["10.20.0.0/16"]));
    assert_eq!(direct["outbound"], "direct");

    let proxy = rules
        .iter()
        .find(|r| r["domain"][0] == "proxy-tag.oneoh.cloud")
        .unwrap();
    assert_eq!(
        proxy["domain"],
        json!(["proxy-tag.oneoh.cloud", "chat.example"])
    );
    assert_eq!(proxy["outbound"], "ExitGateway");
}

#[tokio::test]
async fn test_missing_anchor_degrades_gracefully() {
    let fragments = [
        (CUSTOM_DIRECT_KEY, json!({"domain_suffix": [".corp.example"]})),
        (CUSTOM_PROXY_KEY, json!({"ip_cidr": ["192.0.2.0/24"]})),
    ];

    for (version, scope, mode) in [
        ("1.11.0", Scope::Tun, Mode::Rule),
        ("1.11.0", Scope::Mixed, Mode::Global),
        ("1.12.0", Scope::Mixed, Mode::Rule),
        ("1.12.0", Scope::Tun, Mode::Global),
    ] {
        let request = SynthesisRequest::new("sub-1", version, scope, mode);

        let plain_dir = tempfile::tempdir().unwrap();
        let plain = synthesizer(
            MemoryStore::with_values([(CLASH_API_SECRET_KEY, json!("fixed"))]),
            srv_a_payload(),
            plain_dir.path(),
        );
        let custom_dir = tempfile::tempdir().unwrap();
        let custom = synthesizer(
            MemoryStore::with_values(
                fragments
                    .iter()
                    .cloned()
                    .chain([(CLASH_API_SECRET_KEY, json!("fixed"))]),
            ),
            srv_a_payload(),
            custom_dir.path(),
        );

        let without = plain.render(&request).await.unwrap();
        let with = custom.render(&request).await.unwrap();
        assert!(with.splice.applied.is_empty());
        assert_eq!(with.splice.skipped, RuleDirection::ALL);

        // Only the cache path differs between the two scratch directories.
        let mut a = serde_json::to_value(&without.config).unwrap();
        let mut b = serde_json::to_value(&with.config).unwrap();
        a["experimental"]["cache_file"]["path"] = Value::Null;
        b["experimental"]["cache_file"]["path"] = Value::Null;
        assert_eq!(a, b, "{version} {scope}/{mode}");
    }
}

// ============================================================================
// Collaborators
// ============================================================================

#[tokio::test]
async fn test_file_backed_collaborators() {
    let dir = tempfile::tempdir().unwrap();
    let cache = SubscriptionCache::new(dir.path().join("subscriptions"));
    cache.save("sub-1", &srv_a_payload()).await.unwrap();

    let settings_path = dir.path().join("settings.json");
    let settings = JsonFileStore::open(&settings_path).await.unwrap();
    let synth = Synthesizer::new(
        settings,
        cache,
        Environment::new(Platform::MacOs, dir.path()),
    );

    let request = SynthesisRequest::new("sub-1", "1.12.0", Scope::Tun, Mode::Rule);
    synth.synthesize(&request).await.unwrap();

    let document = read_json(synth.output());
    assert_eq!(document["inbounds"][0]["stack"], "gvisor");

    let secret = document["experimental"]["clash_api"]["secret"]
        .as_str()
        .unwrap()
        .to_string();
    assert_eq!(secret.len(), 32);

    // The secret survives a restart.
    let reopened = JsonFileStore::open(&settings_path).await.unwrap();
    assert_eq!(
        reopened.get(CLASH_API_SECRET_KEY).await.unwrap(),
        Some(json!(secret))
    );
}
