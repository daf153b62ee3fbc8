use std::process::Command;

fn main() {
    // Stamped into `chatpoll version`
    let git_hash = command_output("git", &["rev-parse", "--short", "HEAD"]);
    let build_date = command_output("date", &["+%Y-%m-%d"]);

    println!("cargo:rustc-env=CHATPOLL_GIT_HASH={}", git_hash);
    println!("cargo:rustc-env=CHATPOLL_BUILD_DATE={}", build_date);

    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/");
}

/// Run a command and return its trimmed stdout, or "unknown" if it fails.
fn command_output(program: &str, args: &[&str]) -> String {
    Command::new(program)
        .args(args)
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}
