//! Pure decision function over a normalized policy (§4.6).
//!
//! Each `check_*` entry point is side-effect-free: the same `(policy,
//! request)` pair always yields the same [`Action`]. The supervisor is the
//! only caller that attaches meaning (optimistic kill vs. synchronous
//! response) to the result.

use std::net::IpAddr;
use std::str::FromStr;

use ipnet::IpNet;

use crate::policy::model::{Action, FsPerm, Policy, Proto};

/// Wraps a [`Policy`] to provide the three check entry points.
pub struct Evaluator<'a> {
    policy: &'a Policy,
}

impl<'a> Evaluator<'a> {
    pub fn new(policy: &'a Policy) -> Self {
        Self { policy }
    }

    /// §4.6 *fs*: a rule matches iff `path` begins with the rule's prefix
    /// and `perm` is in the rule's permission set.
    pub fn check_fs(&self, path: &str, perm: FsPerm) -> Action {
        let matches: Vec<Action> = self
            .policy
            .fs_rules
            .iter()
            .filter(|rule| path.starts_with(rule.path.as_str()) && rule.perms.contains(&perm))
            .map(|rule| rule.action)
            .collect();
        resolve(matches, self.policy.defaults.fs)
    }

    /// §4.6 *net*: a rule matches iff protocol, CIDR membership, and port
    /// membership all hold.
    pub fn check_net(&self, ip: IpAddr, port: u16, proto: Proto) -> Action {
        let matches: Vec<Action> = self
            .policy
            .net_rules
            .iter()
            .filter(|rule| {
                rule.proto as u8 == proto as u8
                    && cidr_contains(&rule.cidr, ip)
                    && rule.ports.iter().any(|range| range.contains(port))
            })
            .map(|rule| rule.action)
            .collect();
        resolve(matches, self.policy.defaults.net)
    }

    /// §4.6 *exec*: a rule matches iff `rule.path == path` exactly.
    pub fn check_exec(&self, path: &str) -> Action {
        let matches: Vec<Action> = self
            .policy
            .exec_rules
            .iter()
            .filter(|rule| rule.path == path)
            .map(|rule| rule.action)
            .collect();
        resolve(matches, self.policy.defaults.exec)
    }
}

/// Highest-priority action among `matches` (`Deny > Warn > Allow`), or
/// `default` if nothing matched.
fn resolve(matches: Vec<Action>, default: Action) -> Action {
    matches.into_iter().max().unwrap_or(default)
}

fn cidr_contains(cidr: &str, ip: IpAddr) -> bool {
    if cidr == "0.0.0.0/0" {
        return true;
    }
    if let Ok(net) = IpNet::from_str(cidr) {
        return net.contains(&ip);
    }
    IpAddr::from_str(cidr).map(|single| single == ip).unwrap_or(false)
}
