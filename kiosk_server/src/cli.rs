use std::{env, env::VarError};

/// The server takes no arguments. If any are given, print the help text and the current configuration instead.
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // KIOSK_API_KEY is left out on purpose
    const DISPLAY_ENVS: [&str; 7] = [
        "RUST_LOG",
        "KIOSK_HOST",
        "KIOSK_PORT",
        "KIOSK_SESSION_RETENTION_MINS",
        "KIOSK_PRINT_JOB_TIMEOUT_SECS",
        "KIOSK_PRINT_MAX_ATTEMPTS",
        "KIOSK_SWEEP_INTERVAL_SECS",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    });
    let key_status = if env::var("KIOSK_API_KEY").map(|k| !k.is_empty()).unwrap_or(false) { "Set" } else { "Not set" };
    println!("  {:<35} {key_status:<15}", "KIOSK_API_KEY");
}
