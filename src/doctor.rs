use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use sfci::config::SfciConfig;
use sfci_git::{Deadline, Invocation};

use crate::format::OutputFormat;

const TOOL_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Serialize)]
struct DoctorEnvelope {
    checks: Vec<DoctorCheck>,
    all_ok: bool,
}

#[derive(Serialize)]
struct DoctorCheck {
    name: String,
    status: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fix: Option<String>,
}

fn print_check(check: &DoctorCheck) {
    let prefix = match check.status.as_str() {
        "ok" => "[OK]",
        "fail" => "[FAIL]",
        _ => "[???]",
    };
    println!("{} {}", prefix, check.message);
    if let Some(fix) = &check.fix {
        println!("       {fix}");
    }
}

/// Check that the external tools are installed and the config parses.
pub fn run(format: OutputFormat, config_path: &Path) -> Result<()> {
    let checks = vec![
        check_tool("git", "https://git-scm.com/downloads"),
        check_tool("gh", "https://cli.github.com/"),
        check_tool("sf", "npm install --global @salesforce/cli"),
        check_tool("npm", "https://nodejs.org/en/download"),
        check_config(config_path),
    ];
    let all_ok = checks.iter().all(|c| c.status == "ok");

    match format {
        OutputFormat::Json => {
            let envelope = DoctorEnvelope { checks, all_ok };
            println!("{}", format.serialize(&envelope)?);
        }
        OutputFormat::Text => {
            println!("sfci doctor");
            println!("===========");
            println!();

            for check in &checks {
                print_check(check);
            }

            println!();
            if all_ok {
                println!("All checks passed!");
            } else {
                println!("Some checks failed. See above for details.");
            }
        }
    }

    Ok(())
}

fn check_tool(name: &str, install_hint: &str) -> DoctorCheck {
    let fail = |message: String| DoctorCheck {
        name: name.to_owned(),
        status: "fail".to_owned(),
        message,
        fix: Some(format!("Install: {install_hint}")),
    };

    match Invocation::new(name)
        .arg("--version")
        .run(Deadline::after(TOOL_TIMEOUT))
    {
        Ok(output) if output.success() => {
            let stdout = output.stdout_lossy();
            let version = stdout.lines().next().unwrap_or("unknown").trim();
            DoctorCheck {
                name: name.to_owned(),
                status: "ok".to_owned(),
                message: format!("{name}: {version}"),
                fix: None,
            }
        }
        Ok(_) => fail(format!("{name}: found but returned error")),
        Err(e) => {
            tracing::debug!(tool = name, error = %e, "tool check failed");
            fail(format!("{name}: not found"))
        }
    }
}

fn check_config(path: &Path) -> DoctorCheck {
    let name = "config".to_owned();
    match SfciConfig::load(path) {
        Ok(_) if path.exists() => DoctorCheck {
            name,
            status: "ok".to_owned(),
            message: format!("config: {} is valid", path.display()),
            fix: None,
        },
        Ok(_) => DoctorCheck {
            name,
            status: "ok".to_owned(),
            message: format!("config: {} not found, using defaults", path.display()),
            fix: None,
        },
        Err(e) => DoctorCheck {
            name,
            status: "fail".to_owned(),
            message: format!("config: {e}"),
            fix: Some("Fix or remove the config file".to_owned()),
        },
    }
}
