//! HTTP(S) proxy allow/deny interface (§1: "a virtual-ethernet pair routed
//! through a supervisor-side HTTP(S) proxy").
//!
//! The proxy implementation itself (CONNECT handling, TLS interception) is
//! out of this core's scope; only the decision interface the proxy would
//! call into is built here, backed by the same [`crate::policy::Evaluator`]
//! that answers `NET_CONNECT` checks.

use std::net::IpAddr;

use crate::policy::model::{Action, Proto};
use crate::policy::Evaluator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyVerdict {
    Allow,
    Deny,
}

/// Decision point a proxy implementation calls before forwarding a
/// CONNECT/request to `host:port`.
pub trait ProxyDecision {
    fn decide(&self, host: IpAddr, port: u16) -> ProxyVerdict;
}

/// Default implementation: delegates to the active policy's net rules,
/// always as TCP (the proxy only ever forwards TCP traffic).
pub struct PolicyBackedProxy<'a> {
    evaluator: Evaluator<'a>,
}

impl<'a> PolicyBackedProxy<'a> {
    pub fn new(evaluator: Evaluator<'a>) -> Self {
        Self { evaluator }
    }
}

impl ProxyDecision for PolicyBackedProxy<'_> {
    fn decide(&self, host: IpAddr, port: u16) -> ProxyVerdict {
        match self.evaluator.check_net(host, port, Proto::Tcp) {
            Action::Deny => ProxyVerdict::Deny,
            Action::Allow | Action::Warn => ProxyVerdict::Allow,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::model::{NetRule, Policy, PortRange};

    #[test]
    fn denies_when_policy_denies_the_destination() {
        let mut policy = Policy::open();
        policy.defaults.net = Action::Allow;
        policy.net_rules.push(NetRule {
            action: Action::Deny,
            proto: Proto::Tcp,
            cidr: "10.0.0.0/8".into(),
            ports: vec![PortRange { from: 0, to: 65535 }],
        });
        let evaluator = Evaluator::new(&policy);
        let proxy = PolicyBackedProxy::new(evaluator);
        let verdict = proxy.decide("10.1.2.3".parse().unwrap(), 443);
        assert_eq!(verdict, ProxyVerdict::Deny);
    }

    #[test]
    fn allows_destinations_not_covered_by_any_rule() {
        let policy = Policy::open();
        let evaluator = Evaluator::new(&policy);
        let proxy = PolicyBackedProxy::new(evaluator);
        let verdict = proxy.decide("93.184.216.34".parse().unwrap(), 443);
        assert_eq!(verdict, ProxyVerdict::Allow);
    }
}
