//! Templates for the 1.11 line: legacy address-string DNS servers,
//! outbound-matched bootstrap lookups and the top-level fakeip block.

use std::sync::LazyLock;

use super::rule_set::{catalog, domestic};
use super::{
    Mode, SERVER_TAG_FAKEIP, SERVER_TAG_PROXY, SERVER_TAG_SYSTEM, Scope, Template,
    control_outbounds, default_log, domestic_dns_suffixes, local_suffixes, mixed_listener,
    service_suffixes, strings, tun_listener,
};
use crate::config::SingBoxConfig;
use crate::config::dns::{Dns, DnsRule, DnsServer, FakeIp, Strategy};
use crate::config::experimental::Experimental;
use crate::config::outbound::{DIRECT_TAG, EXIT_GATEWAY_TAG};
use crate::config::route::{Route, RouteRule, RuleAction};
use crate::config::version::CoreFamily;

const FAMILY: CoreFamily = CoreFamily::V1_11;

static MIXED_RULE: LazyLock<Template> = LazyLock::new(mixed_rule);
static MIXED_GLOBAL: LazyLock<Template> = LazyLock::new(mixed_global);
static TUN_RULE: LazyLock<Template> = LazyLock::new(tun_rule);
static TUN_GLOBAL: LazyLock<Template> = LazyLock::new(tun_global);

pub(super) fn template(scope: Scope, mode: Mode) -> &'static Template {
    match (scope, mode) {
        (Scope::Mixed, Mode::Rule) => &MIXED_RULE,
        (Scope::Mixed, Mode::Global) => &MIXED_GLOBAL,
        (Scope::Tun, Mode::Rule) => &TUN_RULE,
        (Scope::Tun, Mode::Global) => &TUN_GLOBAL,
    }
}

// ============================================================================
// DNS Servers
// ============================================================================

fn alibaba() -> DnsServer {
    DnsServer::legacy("alibaba", "223.6.6.6")
        .with_strategy(Strategy::Ipv4Only)
        .with_detour(DIRECT_TAG)
        .into()
}

fn tencent() -> DnsServer {
    DnsServer::legacy("tencent", "119.29.29.29")
        .with_strategy(Strategy::Ipv4Only)
        .with_detour(DIRECT_TAG)
        .into()
}

fn system() -> DnsServer {
    DnsServer::legacy(SERVER_TAG_SYSTEM, "local")
        .with_strategy(Strategy::Ipv4Only)
        .with_detour(DIRECT_TAG)
        .into()
}

fn proxy() -> DnsServer {
    DnsServer::legacy(SERVER_TAG_PROXY, "tcp://1.0.0.1")
        .with_strategy(Strategy::Ipv4Only)
        .with_detour(EXIT_GATEWAY_TAG)
        .into()
}

fn fakeip() -> DnsServer {
    DnsServer::legacy(SERVER_TAG_FAKEIP, "fakeip").into()
}

fn reject_https() -> DnsRule {
    DnsRule::reject_query_types(&["HTTPS", "SVCB"])
}

/// Lookups made by outbounds themselves (server hostnames) bootstrap
/// through a plain domestic resolver.
fn bootstrap(server: &str) -> DnsRule {
    DnsRule::to_server(server).match_outbound("any")
}

fn fakeip_answers() -> DnsRule {
    DnsRule::to_server(SERVER_TAG_FAKEIP).match_query_type(&["A", "AAAA", "CNAME"])
}

// ============================================================================
// Route Rules
// ============================================================================

fn hijack_dns() -> RouteRule {
    RouteRule::new()
        .match_protocol("dns")
        .with_action(RuleAction::HijackDns)
}

fn reject_quic() -> RouteRule {
    RouteRule::new()
        .match_protocol("quic")
        .with_action(RuleAction::Reject)
}

fn private_direct() -> RouteRule {
    RouteRule::new().match_private_ip().with_outbound(DIRECT_TAG)
}

fn domestic_direct() -> RouteRule {
    RouteRule::new()
        .match_domain_suffix(service_suffixes())
        .match_rule_set(domestic())
        .with_outbound(DIRECT_TAG)
}

fn local_direct() -> RouteRule {
    RouteRule::new()
        .match_domain_suffix(local_suffixes())
        .match_private_ip()
        .with_outbound(DIRECT_TAG)
}

fn route(rules: Vec<RouteRule>, with_rule_sets: bool) -> Route {
    Route {
        rules,
        rule_set: if with_rule_sets { catalog() } else { Vec::new() },
        final_outbound: Some(EXIT_GATEWAY_TAG.to_string()),
        auto_detect_interface: true,
    }
}

// ============================================================================
// Templates
// ============================================================================

fn mixed_rule() -> Template {
    let dns = Dns {
        servers: vec![alibaba(), proxy(), system(), tencent()],
        rules: vec![
            reject_https(),
            bootstrap("alibaba"),
            DnsRule::to_server(SERVER_TAG_PROXY).match_domain_suffix(strings(&[".github.com"])),
            DnsRule::to_server(SERVER_TAG_SYSTEM)
                .match_domain_suffix(domestic_dns_suffixes())
                .match_rule_set(domestic()),
            DnsRule::to_server(SERVER_TAG_PROXY)
                .match_rule_set(domestic())
                .invert(),
        ],
        r#final: Some(SERVER_TAG_SYSTEM.to_string()),
        strategy: Some(Strategy::Ipv4Only),
        fakeip: None,
    };

    let rules = vec![
        RouteRule::new()
            .match_inbound(&["mixed"])
            .with_action(RuleAction::Resolve),
        RouteRule::new()
            .match_inbound(&["mixed"])
            .with_action(RuleAction::Sniff),
        hijack_dns(),
        reject_quic(),
        private_direct(),
        domestic_direct(),
    ];

    let config = SingBoxConfig::builder()
        .log(default_log())
        .dns(dns)
        .inbound(mixed_listener(FAMILY))
        .route(route(rules, true))
        .experimental(Experimental::standard())
        .outbounds(control_outbounds(FAMILY, false))
        .build();
    Template::new(FAMILY, Scope::Mixed, Mode::Rule, config)
}

fn mixed_global() -> Template {
    let dns = Dns {
        servers: vec![alibaba(), proxy(), system()],
        rules: vec![reject_https(), bootstrap("alibaba")],
        r#final: Some(SERVER_TAG_PROXY.to_string()),
        strategy: Some(Strategy::Ipv4Only),
        fakeip: None,
    };

    let rules = vec![hijack_dns(), reject_quic(), local_direct()];

    let config = SingBoxConfig::builder()
        .log(default_log())
        .dns(dns)
        .inbound(mixed_listener(FAMILY))
        .route(route(rules, false))
        .experimental(Experimental::standard())
        .outbounds(control_outbounds(FAMILY, false))
        .build();
    Template::new(FAMILY, Scope::Mixed, Mode::Global, config)
}

fn tun_rule() -> Template {
    let dns = Dns {
        servers: vec![system(), alibaba(), tencent(), fakeip()],
        rules: vec![
            reject_https(),
            bootstrap("alibaba"),
            DnsRule::to_server(SERVER_TAG_FAKEIP)
                .match_domain_suffix(strings(&["github.com"]))
                .match_rule_set(strings(&["geosite-telegram"])),
            DnsRule::to_server(SERVER_TAG_SYSTEM)
                .match_domain_suffix(domestic_dns_suffixes())
                .match_rule_set(domestic()),
            fakeip_answers(),
        ],
        r#final: Some(SERVER_TAG_SYSTEM.to_string()),
        strategy: Some(Strategy::Ipv4Only),
        fakeip: Some(FakeIp::enabled()),
    };

    let rules = vec![
        RouteRule::new()
            .match_inbound(&["mixed", "tun"])
            .with_action(RuleAction::Sniff),
        hijack_dns(),
        reject_quic(),
        private_direct(),
        domestic_direct(),
    ];

    let config = SingBoxConfig::builder()
        .log(default_log())
        .dns(dns)
        .inbound(tun_listener(Mode::Rule))
        .inbound(mixed_listener(FAMILY))
        .route(route(rules, true))
        .experimental(Experimental::standard())
        .outbounds(control_outbounds(FAMILY, false))
        .build();
    Template::new(FAMILY, Scope::Tun, Mode::Rule, config)
}

fn tun_global() -> Template {
    let dns = Dns {
        servers: vec![system(), proxy(), fakeip()],
        rules: vec![reject_https(), bootstrap(SERVER_TAG_SYSTEM), fakeip_answers()],
        r#final: Some(SERVER_TAG_PROXY.to_string()),
        strategy: Some(Strategy::Ipv4Only),
        fakeip: Some(FakeIp::enabled()),
    };

    let rules = vec![
        RouteRule::new()
            .match_inbound(&["tun"])
            .with_action(RuleAction::Sniff),
        hijack_dns(),
        reject_quic(),
        local_direct(),
    ];

    let config = SingBoxConfig::builder()
        .log(default_log())
        .dns(dns)
        .inbound(tun_listener(Mode::Global))
        .inbound(mixed_listener(FAMILY))
        .route(route(rules, true))
        .experimental(Experimental::standard())
        .outbounds(control_outbounds(FAMILY, false))
        .build();
    Template::new(FAMILY, Scope::Tun, Mode::Global, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::outbound::Outbound;
    use serde_json::json;

    #[test]
    fn test_no_dhcp_resolver() {
        for scope in [Scope::Mixed, Scope::Tun] {
            for mode in [Mode::Rule, Mode::Global] {
                assert_eq!(template(scope, mode).dhcp_resolver, None);
            }
        }
    }

    #[test]
    fn test_direct_has_no_domain_resolver() {
        let t = template(Scope::Tun, Mode::Rule);
        let Some(Outbound::Direct(direct)) = t.config.outbound(DIRECT_TAG) else {
            panic!("missing direct outbound");
        };
        assert!(direct.domain_resolver.is_none());
    }

    #[test]
    fn test_mixed_rule_dns_section() {
        let value = serde_json::to_value(&template(Scope::Mixed, Mode::Rule).config).unwrap();
        let dns = &value["dns"];
        assert_eq!(dns["final"], "system");
        assert_eq!(dns["strategy"], "ipv4_only");
        assert_eq!(
            dns["servers"][1],
            json!({
                "tag": "dns_proxy",
                "address": "tcp://1.0.0.1",
                "strategy": "ipv4_only",
                "detour": "ExitGateway"
            })
        );
        assert_eq!(dns["rules"][1], json!({"outbound": ["any"], "server": "alibaba"}));
        assert!(dns.get("fakeip").is_none());
    }

    #[test]
    fn test_tun_templates_enable_fakeip() {
        for mode in [Mode::Rule, Mode::Global] {
            let dns = template(Scope::Tun, mode).config.dns.as_ref().unwrap();
            assert_eq!(dns.fakeip, Some(FakeIp::enabled()));
            assert!(dns.servers.iter().any(|s| s.tag() == SERVER_TAG_FAKEIP));
        }
    }

    #[test]
    fn test_mixed_global_has_no_rule_sets() {
        let route = template(Scope::Mixed, Mode::Global).config.route.as_ref().unwrap();
        assert!(route.rule_set.is_empty());
        assert!(route.rules.iter().all(|r| r.rule_set.is_empty()));
    }

    #[test]
    fn test_tun_rule_excludes_domestic_v6() {
        let value = serde_json::to_value(&template(Scope::Tun, Mode::Rule).config).unwrap();
        let excluded = value["inbounds"][0]["route_exclude_address"].as_array().unwrap();
        assert!(excluded.contains(&json!("240e::/20")));

        let value = serde_json::to_value(&template(Scope::Tun, Mode::Global).config).unwrap();
        let excluded = value["inbounds"][0]["route_exclude_address"].as_array().unwrap();
        assert!(!excluded.contains(&json!("240e::/20")));
    }
}
