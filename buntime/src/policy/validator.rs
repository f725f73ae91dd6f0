//! Schema-level policy validation (§4.4 "Validator").
//!
//! Rejects a document before it ever reaches the normalizer: wrong
//! `version`, a malformed CIDR, an out-of-range or backwards port range.
//! Rule `action` is already constrained to `{allow, deny, warn}` by
//! [`crate::policy::model::Action`]'s deserializer, so no separate check is
//! needed for that case.

use std::net::IpAddr;
use std::str::FromStr;

use buntime_shared::errors::{BuntimeError, BuntimeResult};
use ipnet::IpNet;

use crate::policy::model::PortRange;
use crate::policy::raw::RawPolicy;

/// Validate `raw` in place; does not mutate or normalize anything.
pub fn validate(raw: &RawPolicy) -> BuntimeResult<()> {
    if raw.version != 1 {
        return Err(BuntimeError::PolicyInvalid(format!(
            "unsupported policy version {}",
            raw.version
        )));
    }

    if let Some(net) = &raw.net {
        for rule in &net.rules {
            validate_cidr(&rule.cidr)?;
            parse_ports(&rule.ports)?;
        }
    }

    Ok(())
}

fn validate_cidr(cidr: &str) -> BuntimeResult<()> {
    if cidr == "0.0.0.0/0" {
        return Ok(());
    }
    IpNet::from_str(cidr)
        .map(|_| ())
        .or_else(|_| IpAddr::from_str(cidr).map(|_| ()))
        .map_err(|_| BuntimeError::PolicyInvalid(format!("malformed CIDR {cidr:?}")))
}

/// Parse a comma-separated port spec (`"80,443,8000-8100"`) into an ordered
/// list of inclusive ranges. Shared by the validator (to reject malformed
/// specs) and the normalizer (to produce the canonical `Vec<PortRange>`).
pub fn parse_ports(spec: &str) -> BuntimeResult<Vec<PortRange>> {
    let spec = spec.trim();
    if spec.is_empty() {
        return Err(BuntimeError::PolicyInvalid("empty port spec".into()));
    }
    spec.split(',')
        .map(str::trim)
        .map(|part| {
            let (from, to) = match part.split_once('-') {
                Some((a, b)) => (parse_port(a)?, parse_port(b)?),
                None => {
                    let p = parse_port(part)?;
                    (p, p)
                }
            };
            if from > to {
                return Err(BuntimeError::PolicyInvalid(format!(
                    "port range {part:?} has from > to"
                )));
            }
            Ok(PortRange { from, to })
        })
        .collect()
}

fn parse_port(s: &str) -> BuntimeResult<u16> {
    s.trim()
        .parse::<u16>()
        .map_err(|_| BuntimeError::PolicyInvalid(format!("out-of-range port {s:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::model::Action;
    use crate::policy::raw::{RawDefaults, RawNetRule, RawNetSection};

    fn base_raw() -> RawPolicy {
        RawPolicy {
            version: 1,
            plugins: Default::default(),
            defaults: RawDefaults {
                fs: Action::Allow,
                net: Action::Allow,
                exec: Action::Allow,
            },
            fs: None,
            net: None,
            exec: None,
            anti_escape: None,
            audit: None,
        }
    }

    #[test]
    fn rejects_wrong_version() {
        let mut raw = base_raw();
        raw.version = 2;
        assert!(validate(&raw).is_err());
    }

    #[test]
    fn rejects_malformed_cidr() {
        let mut raw = base_raw();
        raw.net = Some(RawNetSection {
            rules: vec![RawNetRule {
                action: Action::Allow,
                proto: crate::policy::model::Proto::Tcp,
                cidr: "not-a-cidr".into(),
                ports: "80".into(),
            }],
        });
        assert!(validate(&raw).is_err());
    }

    #[test]
    fn accepts_universal_cidr() {
        let mut raw = base_raw();
        raw.net = Some(RawNetSection {
            rules: vec![RawNetRule {
                action: Action::Allow,
                proto: crate::policy::model::Proto::Tcp,
                cidr: "0.0.0.0/0".into(),
                ports: "1-65535".into(),
            }],
        });
        assert!(validate(&raw).is_ok());
    }

    #[test]
    fn rejects_backwards_port_range() {
        assert!(parse_ports("100-50").is_err());
    }

    #[test]
    fn rejects_out_of_range_port() {
        assert!(parse_ports("70000").is_err());
    }

    #[test]
    fn parses_mixed_singles_and_ranges_in_order() {
        let ports = parse_ports("80,443,8000-8100").unwrap();
        assert_eq!(
            ports,
            vec![
                PortRange { from: 80, to: 80 },
                PortRange { from: 443, to: 443 },
                PortRange { from: 8000, to: 8100 },
            ]
        );
    }
}
