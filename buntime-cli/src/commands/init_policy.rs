use std::io::Write;

use crate::cli::InitPolicyArgs;
use crate::flags::policy_from_flags;

pub fn execute(args: InitPolicyArgs) -> anyhow::Result<()> {
    let policy = policy_from_flags(&args.policy_flags)?;
    let document = serde_json::to_string_pretty(&policy)?;

    match args.output {
        Some(path) => std::fs::write(&path, document)?,
        None => {
            let mut stdout = std::io::stdout();
            stdout.write_all(document.as_bytes())?;
            stdout.write_all(b"\n")?;
        }
    }
    Ok(())
}
