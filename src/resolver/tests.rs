use std::collections::HashMap;

use super::{
    EndpointCandidate, EndpointPreset, EndpointResolver, Provider, Purpose, Transport,
    resolve_endpoints,
};

fn render(candidates: &[EndpointCandidate]) -> String {
    candidates
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[test]
fn gmail_exchange_orders_starttls_then_tls_then_plain() {
    let resolution = resolve_endpoints("gmail.com", None, Purpose::Exchange);
    assert_eq!(resolution.provider, Provider::Gmail);
    insta::assert_snapshot!(
        render(&resolution.candidates),
        @"smtp.gmail.com:587/starttls, smtp.gmail.com:465/tls, gmail-smtp-in.l.google.com:25/plain, alt1.gmail-smtp-in.l.google.com:25/plain"
    );
}

#[test]
fn zoho_enumerates_every_region_on_both_ports() {
    let resolution = resolve_endpoints("zoho.in", None, Purpose::Submission);
    assert_eq!(resolution.provider, Provider::Zoho);
    insta::assert_snapshot!(
        render(&resolution.candidates),
        @"smtp.zoho.in:587/starttls, smtp.zoho.in:465/tls, smtp.zoho.com:587/starttls, smtp.zoho.com:465/tls, smtp.zoho.eu:587/starttls, smtp.zoho.eu:465/tls"
    );
}

#[test]
fn unknown_domain_gets_bounded_generic_patterns() {
    let resolver = EndpointResolver::default();
    let resolution = resolver.resolve("acme.org", None, Purpose::Exchange);
    assert_eq!(resolution.provider, Provider::Unknown);
    let hosts: Vec<&str> = resolution
        .candidates
        .iter()
        .map(|c| c.host.as_str())
        .collect();
    assert_eq!(
        hosts,
        vec![
            "mail.acme.org",
            "smtp.acme.org",
            "mx.acme.org",
            "acme.org",
            "smtp.office365.com"
        ]
    );
}

#[test]
fn generic_list_is_capped_including_mx_hosts() {
    let overrides = HashMap::new();
    let resolver = EndpointResolver::new(&overrides, 3);
    let mx = vec!["mx1.acme.org.".to_string(), "mx2.acme.org".to_string()];
    let resolution = resolver.resolve_with_mx("acme.org", None, Purpose::Exchange, &mx);
    assert_eq!(resolution.candidates.len(), 3);
    assert_eq!(resolution.candidates[0].host, "mx1.acme.org");
    assert_eq!(resolution.candidates[1].host, "mx2.acme.org");
    assert_eq!(resolution.candidates[2].host, "mail.acme.org");
}

#[test]
fn hosted_domain_inherits_provider_from_mx() {
    let mx = vec!["aspmx.l.google.com".to_string()];
    let resolution =
        EndpointResolver::default().resolve_with_mx("acme.org", None, Purpose::Exchange, &mx);
    assert_eq!(resolution.provider, Provider::Gmail);
    assert_eq!(resolution.candidates[0].host, "smtp.gmail.com");
    assert_eq!(
        resolution.candidates.last().map(|c| c.host.as_str()),
        Some("aspmx.l.google.com")
    );
}

#[test]
fn hint_wins_over_domain() {
    let resolution = resolve_endpoints("acme.org", Some(Provider::Outlook), Purpose::Submission);
    assert_eq!(resolution.provider, Provider::Outlook);
    assert!(
        resolution
            .candidates
            .iter()
            .all(|c| c.transport == Transport::ExplicitTls)
    );
}

#[test]
fn overrides_come_first_and_duplicates_are_dropped() {
    let mut overrides = HashMap::new();
    overrides.insert(
        "gmail.com".to_string(),
        EndpointPreset {
            submission: vec![
                EndpointCandidate::new("relay.internal", 2525, Transport::Plain),
                EndpointCandidate::new("SMTP.GMAIL.COM", 587, Transport::ExplicitTls),
            ],
            ..EndpointPreset::default()
        },
    );
    let resolver = EndpointResolver::new(&overrides, 6);
    let resolution = resolver.resolve("gmail.com", None, Purpose::Submission);
    let rendered = render(&resolution.candidates);
    assert_eq!(
        rendered,
        "relay.internal:2525/plain, SMTP.GMAIL.COM:587/starttls, smtp.gmail.com:465/tls"
    );
}

#[test]
fn mailbox_candidates_use_imap_ports() {
    let resolution = resolve_endpoints("example.net", None, Purpose::Mailbox);
    assert_eq!(resolution.candidates[0].port, 993);
    assert!(
        resolution
            .candidates
            .iter()
            .any(|c| c.port == 143 && c.transport == Transport::ExplicitTls)
    );
}
