//! Templates for the 1.12 line: typed DNS servers, a domain resolver on
//! `direct`, and the anchored user-rule slots in rule-mode TUN.

use std::sync::LazyLock;

use super::rule_set::{catalog, domestic};
use super::{
    Mode, SERVER_TAG_FAKEIP, SERVER_TAG_PROXY, SERVER_TAG_SYSTEM, Scope, Template,
    captive_domains, control_outbounds, default_log, domestic_dns_suffixes, local_suffixes,
    mixed_listener, service_suffixes, tun_listener,
};
use crate::config::SingBoxConfig;
use crate::config::dns::{Dns, DnsRule, DnsServer, Strategy};
use crate::config::experimental::Experimental;
use crate::config::outbound::{DIRECT_TAG, EXIT_GATEWAY_TAG};
use crate::config::route::{LogicalMode, Route, RouteRule, RuleAction, RuleDirection};
use crate::config::version::CoreFamily;

const FAMILY: CoreFamily = CoreFamily::V1_12;

/// Connect timeout of the DHCP-switchable resolver when it runs over UDP.
pub(crate) const RESOLVER_CONNECT_TIMEOUT: &str = "5s";

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

/// UDP form of the domestic `system` resolver.
pub(crate) fn system_udp_resolver() -> DnsServer {
    DnsServer::udp(SERVER_TAG_SYSTEM, "223.5.5.5")
        .with_port(53)
        .with_connect_timeout(RESOLVER_CONNECT_TIMEOUT)
        .udp()
}

// ============================================================================
// DNS
// ============================================================================

fn proxy() -> DnsServer {
    DnsServer::udp(SERVER_TAG_PROXY, "1.0.0.1")
        .with_port(53)
        .with_detour(EXIT_GATEWAY_TAG)
        .tcp()
}

fn alibaba() -> DnsServer {
    DnsServer::udp("alibaba", "223.6.6.6").with_port(53).udp()
}

fn alibaba_secondary() -> DnsServer {
    DnsServer::udp("alibaba_quic_dns", "223.5.5.5").with_port(53).udp()
}

fn tencent() -> DnsServer {
    DnsServer::udp("tencent", "119.29.29.29").with_port(53).udp()
}

fn reject_https() -> DnsRule {
    DnsRule::reject_query_types(&["HTTPS", "SVCB", "PTR"])
}

fn captive_to_system(count: usize, strategy: Strategy) -> DnsRule {
    DnsRule::to_server(SERVER_TAG_SYSTEM)
        .match_domain(captive_domains(count))
        .with_strategy(strategy)
}

fn fakeip_answers() -> DnsRule {
    DnsRule::to_server(SERVER_TAG_FAKEIP).match_query_type(&["A", "AAAA", "CNAME"])
}

// ============================================================================
// Route Rules
// ============================================================================

fn sniff() -> RouteRule {
    RouteRule::new().with_action(RuleAction::Sniff)
}

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

fn local_direct(captive: usize) -> RouteRule {
    let rule = RouteRule::new()
        .match_domain_suffix(local_suffixes())
        .match_private_ip()
        .with_outbound(DIRECT_TAG);
    if captive == 0 {
        rule
    } else {
        rule.match_domain(captive_domains(captive))
    }
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
        servers: vec![
            proxy(),
            alibaba(),
            alibaba_secondary(),
            DnsServer::dhcp(SERVER_TAG_SYSTEM),
            tencent(),
        ],
        rules: vec![
            reject_https(),
            captive_to_system(5, Strategy::Ipv4Only),
            DnsRule::to_server(SERVER_TAG_SYSTEM)
                .match_domain_suffix(domestic_dns_suffixes())
                .match_rule_set(domestic())
                .with_strategy(Strategy::PreferIpv4),
            DnsRule::to_server(SERVER_TAG_PROXY)
                .match_rule_set(domestic())
                .invert(),
        ],
        r#final: Some(SERVER_TAG_SYSTEM.to_string()),
        strategy: Some(Strategy::PreferIpv4),
        fakeip: None,
    };

    let rules = vec![
        sniff(),
        RouteRule::logical(
            LogicalMode::Or,
            vec![
                RouteRule::new().match_protocol("dns"),
                RouteRule::new().match_port(vec![53]),
            ],
        )
        .with_action(RuleAction::HijackDns),
        reject_quic(),
        RouteRule::new().match_private_ip().with_outbound(DIRECT_TAG),
        RouteRule::new()
            .match_domain(captive_domains(4))
            .match_domain_suffix(service_suffixes())
            .match_rule_set(domestic())
            .with_outbound(DIRECT_TAG),
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
        servers: vec![
            DnsServer::udp(SERVER_TAG_SYSTEM, "223.5.5.5").with_port(53).udp(),
            alibaba(),
            alibaba_secondary(),
            proxy(),
        ],
        rules: vec![captive_to_system(4, Strategy::PreferIpv4), reject_https()],
        r#final: Some(SERVER_TAG_PROXY.to_string()),
        strategy: Some(Strategy::PreferIpv4),
        fakeip: None,
    };

    let rules = vec![hijack_dns(), reject_quic(), local_direct(4)];

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
        servers: vec![
            system_udp_resolver(),
            DnsServer::udp(SERVER_TAG_PROXY, "1.0.0.1")
                .with_detour(EXIT_GATEWAY_TAG)
                .with_connect_timeout(RESOLVER_CONNECT_TIMEOUT)
                .tcp(),
            DnsServer::fakeip(SERVER_TAG_FAKEIP),
        ],
        rules: vec![
            reject_https(),
            DnsRule::to_server(SERVER_TAG_SYSTEM)
                .match_domain(captive_domains(5))
                .match_rule_set(domestic())
                .without_cache()
                .with_strategy(Strategy::PreferIpv4),
            fakeip_answers().with_strategy(Strategy::PreferIpv4),
        ],
        r#final: Some(SERVER_TAG_PROXY.to_string()),
        strategy: Some(Strategy::PreferIpv4),
        fakeip: None,
    };

    let rules = vec![
        sniff().match_inbound(&["mixed", "tun"]),
        hijack_dns(),
        reject_quic(),
        RouteRule::anchor(RuleDirection::Direct),
        RouteRule::anchor(RuleDirection::Proxy),
        local_direct(5).match_rule_set(domestic()),
    ];

    let config = SingBoxConfig::builder()
        .log(default_log())
        .dns(dns)
        .inbound(tun_listener(Mode::Rule))
        .inbound(mixed_listener(FAMILY))
        .route(route(rules, true))
        .experimental(Experimental::standard())
        .outbounds(control_outbounds(FAMILY, true))
        .build();
    Template::new(FAMILY, Scope::Tun, Mode::Rule, config).with_dhcp_resolver(SERVER_TAG_SYSTEM)
}

fn tun_global() -> Template {
    let dns = Dns {
        servers: vec![
            DnsServer::local(SERVER_TAG_SYSTEM),
            DnsServer::udp("alibaba_quic_dns", "223.6.6.6")
                .with_port(853)
                .quic(),
            proxy_without_port(),
            DnsServer::fakeip(SERVER_TAG_FAKEIP),
        ],
        rules: vec![reject_https(), fakeip_answers()],
        r#final: Some(SERVER_TAG_PROXY.to_string()),
        strategy: Some(Strategy::PreferIpv4),
        fakeip: None,
    };

    let rules = vec![
        sniff().match_inbound(&["tun"]),
        hijack_dns(),
        reject_quic(),
        local_direct(0),
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

fn proxy_without_port() -> DnsServer {
    DnsServer::udp(SERVER_TAG_PROXY, "1.0.0.1")
        .with_detour(EXIT_GATEWAY_TAG)
        .tcp()
}
