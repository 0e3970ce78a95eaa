use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::types::{EndpointCandidate, Purpose, Transport};

/// Mail providers with known infrastructure. Anything else is `Unknown` and gets
/// synthesized hostname patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Gmail,
    Outlook,
    Yahoo,
    ICloud,
    Aol,
    Zoho,
    Yandex,
    Gmx,
    Unknown,
}

const SUBMISSION_PORTS: &[(u16, Transport)] =
    &[(587, Transport::ExplicitTls), (465, Transport::ImplicitTls)];
const STARTTLS_ONLY: &[(u16, Transport)] = &[(587, Transport::ExplicitTls)];

pub(crate) struct ProviderProfile {
    pub provider: Provider,
    pub name: &'static str,
    pub domains: &'static [&'static str],
    pub mx_suffixes: &'static [&'static str],
    pub submission_hosts: &'static [&'static str],
    pub submission_ports: &'static [(u16, Transport)],
    pub exchange_hosts: &'static [&'static str],
    pub mailbox_hosts: &'static [&'static str],
    /// Hosts are per region (`.com`/`.in`/`.eu`); every region is enumerated
    /// because a wrong-region login fails silently.
    pub regional: bool,
    pub vrfy_disabled: bool,
    pub remediation: Option<&'static str>,
}

static PROFILES: &[ProviderProfile] = &[
    ProviderProfile {
        provider: Provider::Gmail,
        name: "gmail",
        domains: &["gmail.com", "googlemail.com"],
        mx_suffixes: &["google.com", "googlemail.com"],
        submission_hosts: &["smtp.gmail.com"],
        submission_ports: SUBMISSION_PORTS,
        exchange_hosts: &[
            "gmail-smtp-in.l.google.com",
            "alt1.gmail-smtp-in.l.google.com",
        ],
        mailbox_hosts: &["imap.gmail.com"],
        regional: false,
        vrfy_disabled: true,
        remediation: Some(
            "Gmail requires an app password when 2-step verification is enabled \
             (Google Account > Security > App passwords)",
        ),
    },
    ProviderProfile {
        provider: Provider::Outlook,
        name: "outlook",
        domains: &["outlook.com", "hotmail.com", "live.com", "msn.com"],
        mx_suffixes: &["outlook.com", "hotmail.com"],
        submission_hosts: &["smtp-mail.outlook.com", "smtp.office365.com"],
        submission_ports: STARTTLS_ONLY,
        exchange_hosts: &["outlook-com.olc.protection.outlook.com"],
        mailbox_hosts: &["outlook.office365.com"],
        regional: false,
        vrfy_disabled: true,
        remediation: Some(
            "Outlook accounts with two-step verification need an app password, \
             and SMTP AUTH must be enabled for the mailbox",
        ),
    },
    ProviderProfile {
        provider: Provider::Yahoo,
        name: "yahoo",
        domains: &[
            "yahoo.com",
            "ymail.com",
            "rocketmail.com",
            "yahoo.co.uk",
            "yahoo.fr",
            "yahoo.co.in",
        ],
        mx_suffixes: &["yahoodns.net"],
        submission_hosts: &["smtp.mail.yahoo.com"],
        submission_ports: SUBMISSION_PORTS,
        exchange_hosts: &["mta5.am0.yahoodns.net", "mta6.am0.yahoodns.net"],
        mailbox_hosts: &["imap.mail.yahoo.com"],
        regional: false,
        vrfy_disabled: true,
        remediation: Some("Yahoo Mail requires an app password generated in Account Security"),
    },
    ProviderProfile {
        provider: Provider::ICloud,
        name: "icloud",
        domains: &["icloud.com", "me.com", "mac.com"],
        mx_suffixes: &["icloud.com"],
        submission_hosts: &["smtp.mail.me.com"],
        submission_ports: STARTTLS_ONLY,
        exchange_hosts: &["mx01.mail.icloud.com", "mx02.mail.icloud.com"],
        mailbox_hosts: &["imap.mail.me.com"],
        regional: false,
        vrfy_disabled: true,
        remediation: Some("iCloud Mail requires an app-specific password from appleid.apple.com"),
    },
    ProviderProfile {
        provider: Provider::Aol,
        name: "aol",
        domains: &["aol.com", "aim.com"],
        mx_suffixes: &["mx-aol.mail.gm0.yahoodns.net"],
        submission_hosts: &["smtp.aol.com"],
        submission_ports: SUBMISSION_PORTS,
        exchange_hosts: &["mx-aol.mail.gm0.yahoodns.net"],
        mailbox_hosts: &["imap.aol.com"],
        regional: false,
        vrfy_disabled: true,
        remediation: Some("AOL Mail requires an app password generated in Account Security"),
    },
    ProviderProfile {
        provider: Provider::Zoho,
        name: "zoho",
        domains: &[
            "zoho.com",
            "zohomail.com",
            "zoho.in",
            "zohomail.in",
            "zoho.eu",
            "zohomail.eu",
        ],
        mx_suffixes: &["zoho.com", "zoho.in", "zoho.eu"],
        submission_hosts: &["smtp.zoho.com", "smtp.zoho.in", "smtp.zoho.eu"],
        submission_ports: SUBMISSION_PORTS,
        exchange_hosts: &["mx.zoho.com", "mx.zoho.in", "mx.zoho.eu"],
        mailbox_hosts: &["imap.zoho.com", "imap.zoho.in", "imap.zoho.eu"],
        regional: true,
        vrfy_disabled: true,
        remediation: Some(
            "Zoho requires an application-specific password when two-factor \
             authentication is on, and the account's data-center region must match",
        ),
    },
    ProviderProfile {
        provider: Provider::Yandex,
        name: "yandex",
        domains: &["yandex.com", "yandex.ru", "ya.ru"],
        mx_suffixes: &["yandex.net", "yandex.ru"],
        submission_hosts: &["smtp.yandex.com"],
        submission_ports: SUBMISSION_PORTS,
        exchange_hosts: &["mx.yandex.net"],
        mailbox_hosts: &["imap.yandex.com"],
        regional: false,
        vrfy_disabled: false,
        remediation: Some("Yandex requires an app password and IMAP/SMTP access enabled in settings"),
    },
    ProviderProfile {
        provider: Provider::Gmx,
        name: "gmx",
        domains: &["gmx.com", "gmx.net", "gmx.de", "web.de"],
        mx_suffixes: &["gmx.net", "web.de"],
        submission_hosts: &["mail.gmx.com"],
        submission_ports: SUBMISSION_PORTS,
        exchange_hosts: &["mx00.gmx.net", "mx01.gmx.net"],
        mailbox_hosts: &["imap.gmx.com"],
        regional: false,
        vrfy_disabled: false,
        remediation: Some("GMX requires POP3/IMAP access to be enabled in the account settings"),
    },
];

impl Provider {
    /// Recognises a provider by domain suffix (`mail.yahoo.co.uk` matches `yahoo.co.uk`).
    pub fn from_domain(domain: &str) -> Self {
        let domain = domain.trim().trim_end_matches('.').to_ascii_lowercase();
        PROFILES
            .iter()
            .find(|profile| profile.domains.iter().any(|d| suffix_match(&domain, d)))
            .map(|profile| profile.provider)
            .unwrap_or(Self::Unknown)
    }

    /// Recognises a provider hosting a custom domain from one of its MX hostnames.
    /// The longest matching suffix wins, so AOL's hosts inside `yahoodns.net`
    /// resolve to AOL.
    pub fn from_mx_host(host: &str) -> Self {
        let host = host.trim().trim_end_matches('.').to_ascii_lowercase();
        PROFILES
            .iter()
            .flat_map(|profile| {
                profile
                    .mx_suffixes
                    .iter()
                    .filter(|s| suffix_match(&host, s))
                    .map(move |s| (s.len(), profile.provider))
            })
            .max_by_key(|(len, _)| *len)
            .map(|(_, provider)| provider)
            .unwrap_or(Self::Unknown)
    }

    pub fn name(self) -> &'static str {
        self.profile().map(|p| p.name).unwrap_or("unknown")
    }

    pub fn is_known(self) -> bool {
        self != Self::Unknown
    }

    /// Providers that answer VRFY with 252 or 502 on purpose.
    pub fn disables_vrfy(self) -> bool {
        self.profile().is_some_and(|p| p.vrfy_disabled)
    }

    /// Provider-specific hint shown when authentication is refused.
    pub fn auth_remediation(self) -> Option<&'static str> {
        self.profile().and_then(|p| p.remediation)
    }

    pub(crate) fn profile(self) -> Option<&'static ProviderProfile> {
        PROFILES.iter().find(|p| p.provider == self)
    }

    /// Built-in candidates for `purpose`, most likely first.
    pub(crate) fn preset(self, domain: &str, purpose: Purpose) -> Vec<EndpointCandidate> {
        let Some(profile) = self.profile() else {
            return Vec::new();
        };
        let order = |hosts: &'static [&'static str]| -> Vec<&'static str> {
            if profile.regional {
                regional_order(hosts, domain)
            } else {
                hosts.to_vec()
            }
        };

        let submission = || {
            order(profile.submission_hosts)
                .into_iter()
                .flat_map(|host| {
                    profile
                        .submission_ports
                        .iter()
                        .map(move |(port, transport)| EndpointCandidate::new(host, *port, *transport))
                })
                .collect::<Vec<_>>()
        };

        match purpose {
            Purpose::Submission => submission(),
            Purpose::Exchange => {
                let mut out = submission();
                out.extend(
                    order(profile.exchange_hosts)
                        .into_iter()
                        .map(|host| EndpointCandidate::new(host, 25, Transport::Plain)),
                );
                out
            }
            Purpose::Mailbox => order(profile.mailbox_hosts)
                .into_iter()
                .map(|host| EndpointCandidate::new(host, 993, Transport::ImplicitTls))
                .collect(),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        if lower == "unknown" {
            return Ok(Self::Unknown);
        }
        PROFILES
            .iter()
            .find(|p| p.name == lower || p.domains.contains(&lower.as_str()))
            .map(|p| p.provider)
            .ok_or_else(|| format!("unknown provider '{s}'"))
    }
}

fn suffix_match(value: &str, suffix: &str) -> bool {
    value == suffix || value.ends_with(&format!(".{suffix}"))
}

/// Puts the hosts of the domain's own region first, keeping the others after.
fn regional_order(hosts: &[&'static str], domain: &str) -> Vec<&'static str> {
    let region = domain.rsplit('.').next().unwrap_or_default();
    let (mut own, others): (Vec<_>, Vec<_>) = hosts
        .iter()
        .copied()
        .partition(|host| host.rsplit('.').next() == Some(region));
    own.extend(others);
    own
}
