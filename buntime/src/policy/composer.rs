//! Merges an ordered list of normalized policies into one composite policy
//! (§4.5). Used whenever more than one policy is active simultaneously —
//! e.g. a base policy plus CLI-flag overrides.

use crate::policy::model::{Action, Policy};

/// Compose `policies` in order. An empty list yields [`Policy::open`].
///
/// - `plugins.*` is OR'd across inputs.
/// - `defaults.<domain>` is `deny` if any input says `deny`, else `allow`
///   (most-restrictive wins).
/// - `fs_rules`/`net_rules`/`exec_rules` are concatenated, earliest first,
///   with no deduplication.
/// - `anti_escape.deny_syscalls` and `audit.events` are set-unioned.
/// - `audit.enabled` is OR'd.
pub fn compose(policies: &[Policy]) -> Policy {
    if policies.is_empty() {
        return Policy::open();
    }

    let mut composite = Policy::open();

    for policy in policies {
        composite.plugins.namespaces |= policy.plugins.namespaces;
        composite.plugins.landlock |= policy.plugins.landlock;
        composite.plugins.seccomp |= policy.plugins.seccomp;

        composite.defaults.fs = most_restrictive(composite.defaults.fs, policy.defaults.fs);
        composite.defaults.net = most_restrictive(composite.defaults.net, policy.defaults.net);
        composite.defaults.exec = most_restrictive(composite.defaults.exec, policy.defaults.exec);

        composite.fs_rules.extend(policy.fs_rules.iter().cloned());
        composite.net_rules.extend(policy.net_rules.iter().cloned());
        composite.exec_rules.extend(policy.exec_rules.iter().cloned());

        composite
            .anti_escape
            .deny_syscalls
            .extend(policy.anti_escape.deny_syscalls.iter().cloned());
        composite.audit.events.extend(policy.audit.events.iter());
        composite.audit.enabled |= policy.audit.enabled;
    }

    composite
}

/// `deny` beats `allow` for a *default* — note this is a two-valued
/// restriction (defaults are never `warn`), unlike rule-action priority in
/// the evaluator.
fn most_restrictive(a: Action, b: Action) -> Action {
    if a == Action::Deny || b == Action::Deny {
        Action::Deny
    } else {
        Action::Allow
    }
}
