//! Environment sanitation for the worker process (§6 "Environment
//! variables").
//!
//! Every `POD_*` variable mirrors a CLI flag and must never reach the
//! worker; `WORKER_*` variables are stripped of their prefix and forwarded
//! verbatim, overriding any identically-named supervisor default.

use std::collections::BTreeMap;

use buntime_shared::constants::{SUPERVISOR_ENV_PREFIX, WORKER_ENV_PREFIX};

/// Build the environment to hand the launcher, starting from `defaults`
/// (supervisor-supplied values such as `PATH`) and applying `WORKER_*`
/// overrides found in `source`.
pub fn worker_env(
    source: impl IntoIterator<Item = (String, String)>,
    defaults: BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut env = defaults;
    for (key, value) in source {
        if let Some(stripped) = key.strip_prefix(WORKER_ENV_PREFIX) {
            env.insert(stripped.to_string(), value);
        }
    }
    env
}

/// Everything the supervisor must remove from its own environment before
/// spawning the worker: any `POD_*` variable, mirroring a CLI flag or
/// carrying the base64 policy document.
pub fn scrub_supervisor_vars(source: impl IntoIterator<Item = (String, String)>) -> BTreeMap<String, String> {
    source
        .into_iter()
        .filter(|(key, _)| !key.starts_with(SUPERVISOR_ENV_PREFIX))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_prefixed_vars_are_stripped_and_forwarded() {
        let source = vec![("WORKER_FOO".to_string(), "bar".to_string())];
        let env = worker_env(source, BTreeMap::new());
        assert_eq!(env.get("FOO"), Some(&"bar".to_string()));
        assert!(!env.contains_key("WORKER_FOO"));
    }

    #[test]
    fn worker_override_replaces_supervisor_default() {
        let mut defaults = BTreeMap::new();
        defaults.insert("PATH".to_string(), "/usr/bin".to_string());
        let source = vec![("WORKER_PATH".to_string(), "/custom/bin".to_string())];
        let env = worker_env(source, defaults);
        assert_eq!(env.get("PATH"), Some(&"/custom/bin".to_string()));
    }

    #[test]
    fn pod_prefixed_vars_are_scrubbed() {
        let source = vec![
            ("POD_ALLOW_NET".to_string(), "*".to_string()),
            ("HOME".to_string(), "/root".to_string()),
        ];
        let scrubbed = scrub_supervisor_vars(source);
        assert!(!scrubbed.contains_key("POD_ALLOW_NET"));
        assert_eq!(scrubbed.get("HOME"), Some(&"/root".to_string()));
    }
}
