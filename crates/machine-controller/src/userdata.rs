//! Node bootstrap script assembly

use machine_container::{Engine, Result};
use machine_core::OperatingSystem;

const HEREDOC_DELIMITER: &str = "MACHINE_CONTROLLER_EOF";

/// Builds the bash userdata for a node
///
/// Writes the engine's config file (and credentials file, if any), then runs
/// the engine's install script for `os`. `extra` is appended verbatim.
pub fn build_userdata(engine: &Engine, os: &OperatingSystem, extra: Option<&str>) -> Result<String> {
    let script = engine.script_for(os)?;

    let mut out = String::from("#!/bin/bash\nset -xeuo pipefail\n");
    write_file(&mut out, engine.config_file_name(), &engine.config()?);
    if let (Some(path), Some(content)) = (engine.auth_config_file_name(), engine.auth_config()?) {
        write_file(&mut out, path, &content);
    }

    if !script.trim().is_empty() {
        out.push('\n');
        out.push_str(script.trim_end());
        out.push('\n');
    }

    if let Some(extra) = extra.filter(|e| !e.trim().is_empty()) {
        out.push('\n');
        out.push_str(extra);
        if !extra.ends_with('\n') {
            out.push('\n');
        }
    }
    Ok(out)
}

fn write_file(out: &mut String, path: &str, content: &str) {
    let dir = path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or(".");
    out.push_str(&format!(
        "\nmkdir -p {dir}\ncat <<'{HEREDOC_DELIMITER}' > {path}\n{}\n{HEREDOC_DELIMITER}\n",
        content.trim_end()
    ));
}
