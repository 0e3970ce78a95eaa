use std::cell::Cell;
use std::time::Duration;

use proptest::prelude::*;

use super::{Breakdown, CHECK_WEIGHT, Scorer};
use crate::config::Config;
use crate::dns::tests::StubResolver;
use crate::error::ErrorKind;
use crate::resolver::Provider;
use crate::smtp_verify::{Existence, VerificationMethod, VerificationResult};
use crate::validator::Address;

fn outcome(address: &str, existence: Existence, code: Option<u16>, catch_all: bool) -> VerificationResult {
    let mut result = VerificationResult::failed(
        address,
        Provider::Unknown,
        ErrorKind::NoDetermination,
        "no determination",
        Duration::ZERO,
    );
    result.smtp_code = code;
    result.catch_all_detected = catch_all;
    match existence {
        Existence::Exists | Existence::DoesNotExist | Existence::CatchAll => {
            result.method = Some(VerificationMethod::Rcpt);
            result.error = if catch_all {
                Some(ErrorKind::CatchAllDetected)
            } else {
                None
            };
            result.error_detail = None;
            result.deliverable = existence != Existence::DoesNotExist;
            result.verified = !catch_all;
        }
        Existence::Ambiguous => result.error = Some(ErrorKind::AmbiguousProtocolResponse),
        _ => {}
    }
    result.existence = existence;
    result
}

fn score_with(
    config: &Config,
    address: &str,
    stub: &StubResolver,
    verification: VerificationResult,
) -> super::ScoreResult {
    let target = Address::parse(address).expect("valid address");
    Scorer::new(config).score_with(address, &target, stub, |_, _| verification)
}

#[test]
fn all_checks_passing_scores_100() {
    let config = Config::default();
    let stub = StubResolver::with_mail_domain("acme.org", &["mx1.acme.org"]);
    let result = score_with(
        &config,
        "alice@acme.org",
        &stub,
        outcome("alice@acme.org", Existence::Exists, Some(250), false),
    );
    assert_eq!(result.score, 100);
    assert!(result.is_valid);
    assert_eq!(result.mx_hosts, vec!["mx1.acme.org"]);
    assert!(result.error.is_none());
}

#[test]
fn inconclusive_smtp_alone_keeps_address_valid() {
    let config = Config::default();
    let stub = StubResolver::with_mail_domain("acme.org", &["mx1.acme.org"]);
    let result = score_with(
        &config,
        "alice@acme.org",
        &stub,
        outcome("alice@acme.org", Existence::Indeterminate("timeout".into()), None, false),
    );
    assert_eq!(result.score, 75);
    assert_eq!(result.breakdown.smtp, 0);
    assert!(result.is_valid);
}

#[test]
fn missing_mx_and_smtp_invalidates() {
    let config = Config::default();
    let mut stub = StubResolver::default();
    stub.addresses.insert("parked.example".into());
    let result = score_with(
        &config,
        "bob@parked.example",
        &stub,
        outcome("bob@parked.example", Existence::Indeterminate("refused".into()), None, false),
    );
    assert_eq!(result.score, 50);
    assert!(!result.is_valid);
    assert_eq!(result.error, Some(ErrorKind::ResolutionFailed));
    assert!(result.notes.iter().any(|n| n.starts_with("mx:")));
}

#[test]
fn ambiguous_252_is_never_valid() {
    let config = Config::default();
    let stub = StubResolver::with_mail_domain("acme.org", &["mx1.acme.org"]);
    let result = score_with(
        &config,
        "alice@acme.org",
        &stub,
        outcome("alice@acme.org", Existence::Ambiguous, Some(252), false),
    );
    assert_eq!(result.score, 75);
    assert!(!result.is_valid);
}

#[test]
fn dns_failure_is_noted_not_raised() {
    let config = Config::default();
    let mut stub = StubResolver::with_mail_domain("acme.org", &["mx1.acme.org"]);
    stub.failing.insert("acme.org".into());
    let result = score_with(
        &config,
        "alice@acme.org",
        &stub,
        outcome("alice@acme.org", Existence::Exists, Some(250), false),
    );
    assert_eq!(result.breakdown.dns, 0);
    assert_eq!(result.breakdown.mx, 0);
    assert_eq!(result.score, 50);
    assert!(result.notes.iter().any(|n| n.starts_with("dns:")));
}

#[test]
fn malformed_address_skips_all_network_work() {
    let config = Config::default();
    let result = Scorer::new(&config).score("alice..smith@acme.org");
    assert_eq!(result.score, 0);
    assert_eq!(result.breakdown, Breakdown::default());
    assert!(!result.is_valid);
    assert!(result.verification.is_none());
    assert_eq!(result.error, Some(ErrorKind::SyntaxInvalid));
}

fn any_existence() -> impl Strategy<Value = Existence> {
    prop_oneof![
        Just(Existence::Exists),
        Just(Existence::DoesNotExist),
        Just(Existence::CatchAll),
        Just(Existence::Ambiguous),
        Just(Existence::Indeterminate("timeout".into())),
    ]
}

proptest! {
    #[test]
    fn score_is_sum_of_four_contributions(
        existence in any_existence(),
        code in prop::option::of(prop::sample::select(vec![250u16, 251, 252, 450, 550])),
        catch_all in any::<bool>(),
        has_address in any::<bool>(),
        has_mx in any::<bool>(),
    ) {
        let config = Config::default();
        let mut stub = StubResolver::default();
        if has_address {
            stub.addresses.insert("acme.org".into());
        }
        if has_mx {
            stub = StubResolver {
                addresses: stub.addresses.clone(),
                ..StubResolver::with_mail_domain("acme.org", &["mx1.acme.org"])
            };
        }
        let verification = outcome("alice@acme.org", existence.clone(), code, catch_all);
        let result = score_with(&config, "alice@acme.org", &stub, verification);

        let b = result.breakdown;
        for part in [b.regex, b.dns, b.mx, b.smtp] {
            prop_assert!(part == 0 || part == CHECK_WEIGHT);
        }
        prop_assert_eq!(result.score, b.total());
        prop_assert!(result.score <= 100);
        if existence == Existence::DoesNotExist || catch_all || code == Some(252) {
            prop_assert!(!result.is_valid);
        }
    }

    #[test]
    fn malformed_syntax_never_touches_resolver(local in "[a-z]{1,10}", domain in "[a-z]{1,10}") {
        // no '@' at all, or a domain without a dot
        let config = Config::default();
        let stub = StubResolver::default();
        let verified = Cell::new(false);
        for input in [format!("{local}{domain}"), format!("{local}@{domain}")] {
            let scorer = Scorer::new(&config);
            let result = match super::parse(&input) {
                Ok(target) => scorer.score_with(&input, &target, &stub, |_, _| {
                    verified.set(true);
                    outcome(&input, Existence::Exists, Some(250), false)
                }),
                Err(result) => result,
            };
            prop_assert_eq!(result.score, 0);
            prop_assert!(!result.is_valid);
        }
        prop_assert_eq!(stub.call_count(), 0);
        prop_assert!(!verified.get());
    }
}
