use crate::error::CoreResult;
use crate::redaction::rules::{RuleSet, SensitiveClass};
use regex::Regex;
use std::collections::BTreeSet;
use std::net::Ipv6Addr;

/// Unanchored so a hostname glued to other text (`host_smile1a2b3c`) still matches.
pub const DEFAULT_HOSTNAME_PATTERN: &str = r"(?i)smile[0-9a-f]{6}";

/// Kinds of literal that look like leaked real-world data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeakKind {
    IpAddress,
    MacAddress,
    Hostname,
}

/// Compiled leak detectors plus the placeholders each one tolerates.
///
/// Candidates are bounded by their neighbouring characters rather than by
/// `\b`, which treats `_` and letters as part of a word and would let
/// `gw_192.168.1.42` through.
pub struct LeakPatterns {
    dotted_run: Regex,
    ipv6_candidate: Regex,
    separated_mac: Regex,
    hex_run: Regex,
    hostnames: Vec<Regex>,
    allowed_ips: BTreeSet<String>,
    allowed_macs: BTreeSet<String>,
    allowed_hostnames: BTreeSet<String>,
}

impl LeakPatterns {
    pub fn compile(rules: &RuleSet, hostname_patterns: &[String]) -> CoreResult<Self> {
        let hostnames = hostname_patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;

        let owned = |class: SensitiveClass| {
            rules
                .placeholders_for(class)
                .into_iter()
                .map(str::to_string)
                .collect::<BTreeSet<String>>()
        };
        Ok(Self {
            dotted_run: Regex::new(r"[0-9]+(?:\.[0-9]+)+")?,
            ipv6_candidate: Regex::new(r"(?i)(?:[0-9a-f]{1,4})?(?::[0-9a-f]{0,4}){2,7}")?,
            separated_mac: Regex::new(r"[0-9A-Fa-f]{2}(?:[:-][0-9A-Fa-f]{2}){5}")?,
            hex_run: Regex::new(r"[0-9A-Fa-f]+")?,
            hostnames,
            allowed_ips: owned(SensitiveClass::IpAddress),
            allowed_macs: owned(SensitiveClass::MacAddress)
                .iter()
                .map(|m| normalize_mac(m))
                .collect(),
            allowed_hostnames: owned(SensitiveClass::Hostname),
        })
    }

    /// Every leak-shaped literal in `value` that is not a known placeholder.
    pub fn scan(&self, value: &str) -> Vec<LeakKind> {
        let mut out = Vec::new();
        if self.has_ipv4(value) || self.has_ipv6(value) {
            out.push(LeakKind::IpAddress);
        }
        if self.has_mac(value) {
            out.push(LeakKind::MacAddress);
        }
        let host_leak = self.hostnames.iter().any(|re| {
            re.find_iter(value)
                .any(|m| !self.allowed_hostnames.contains(m.as_str()))
        });
        if host_leak {
            out.push(LeakKind::Hostname);
        }
        out
    }

    /// Any run of dot-separated numbers holding four consecutive octets,
    /// unless the whole run is an allowed placeholder.
    fn has_ipv4(&self, value: &str) -> bool {
        self.dotted_run.find_iter(value).any(|m| {
            if self.allowed_ips.contains(m.as_str()) {
                return false;
            }
            let parts: Vec<&str> = m.as_str().split('.').collect();
            parts.windows(4).any(|w| w.iter().all(|p| is_octet(p)))
        })
    }

    fn has_ipv6(&self, value: &str) -> bool {
        self.ipv6_candidate.find_iter(value).any(|m| {
            m.as_str()
                .parse::<Ipv6Addr>()
                .map(|ip| !ip.is_loopback() && !self.allowed_ips.contains(m.as_str()))
                .unwrap_or(false)
        })
    }

    /// Six separated octets, or a run of exactly twelve hex digits, with no
    /// hex digit on either side.
    fn has_mac(&self, value: &str) -> bool {
        let leaked = |candidate: &str| !self.allowed_macs.contains(&normalize_mac(candidate));
        let separated = self
            .separated_mac
            .find_iter(value)
            .filter(|m| hex_bounded(value, m.start(), m.end()))
            .any(|m| leaked(m.as_str()));
        separated
            || self
                .hex_run
                .find_iter(value)
                .filter(|m| m.as_str().len() == 12)
                .any(|m| leaked(m.as_str()))
    }
}

fn is_octet(part: &str) -> bool {
    part.len() <= 3 && part.parse::<u16>().map(|n| n <= 255).unwrap_or(false)
}

fn hex_bounded(value: &str, start: usize, end: usize) -> bool {
    let before = value[..start].chars().next_back();
    let after = value[end..].chars().next();
    !before.map(|c| c.is_ascii_hexdigit()).unwrap_or(false)
        && !after.map(|c| c.is_ascii_hexdigit()).unwrap_or(false)
}

fn normalize_mac(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_hexdigit())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns() -> LeakPatterns {
        LeakPatterns::compile(
            &RuleSet::plugwise_default(),
            &[DEFAULT_HOSTNAME_PATTERN.to_string()],
        )
        .unwrap()
    }

    #[test]
    fn loopback_placeholder_is_tolerated() {
        assert!(patterns().scan("127.0.0.1").is_empty());
        assert_eq!(patterns().scan("via 192.168.1.42"), vec![LeakKind::IpAddress]);
    }

    #[test]
    fn version_strings_are_not_ips() {
        assert!(patterns().scan("3.0.15").is_empty());
        assert!(patterns().scan("2020-05-13T12:30:00+02:00").is_empty());
    }

    #[test]
    fn ipv6_literals_are_caught_except_loopback() {
        assert_eq!(patterns().scan("fe80::1ff:fe23:4567:890a"), vec![LeakKind::IpAddress]);
        assert!(patterns().scan("::1").is_empty());
    }

    #[test]
    fn separated_macs_are_caught() {
        assert_eq!(patterns().scan("AA:BB:CC:11:22:33"), vec![LeakKind::MacAddress]);
        assert_eq!(patterns().scan("aa-bb-cc-11-22-33"), vec![LeakKind::MacAddress]);
        assert!(patterns().scan("01:23:45:67:89:ab").is_empty());
    }

    #[test]
    fn bare_twelve_digit_macs_are_caught() {
        assert_eq!(patterns().scan("C493000278DA"), vec![LeakKind::MacAddress]);
        assert_eq!(patterns().scan("mac_c493000278da"), vec![LeakKind::MacAddress]);
        assert!(patterns().scan("0123456789AB").is_empty());
        // Zigbee addresses and object ids are longer runs.
        assert!(patterns().scan("000D6F000C869B61").is_empty());
        assert!(patterns().scan("a270735e4ccd45239424badc0578a2b1").is_empty());
    }

    #[test]
    fn literals_glued_to_words_are_caught() {
        assert_eq!(patterns().scan("gw_192.168.1.42"), vec![LeakKind::IpAddress]);
        assert_eq!(patterns().scan("ip192.168.1.42."), vec![LeakKind::IpAddress]);
        assert_eq!(patterns().scan("mac_AA:BB:CC:11:22:33"), vec![LeakKind::MacAddress]);
        assert_eq!(patterns().scan("host_smile1a2b3c"), vec![LeakKind::Hostname]);
        assert_eq!(patterns().scan("127.0.0.1 10.0.0.1"), vec![LeakKind::IpAddress]);
    }

    #[test]
    fn smile_hostnames_are_caught() {
        assert_eq!(patterns().scan("smile1a2b3c"), vec![LeakKind::Hostname]);
        assert!(patterns().scan("smile000000").is_empty());
        assert!(patterns().scan("smiles").is_empty());
    }
}
