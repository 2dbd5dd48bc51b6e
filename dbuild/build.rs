use std::{env, fs, io::BufRead, path::PathBuf};

/// Runs git and returns its stdout, or `None` when git is missing or fails, e.g. when building from a source tarball.
fn git<'a, I: IntoIterator<Item = &'a str>>(args: I) -> Option<Vec<u8>> {
    let output = std::process::Command::new("git").args(args).output().ok()?;
    output.status.success().then_some(output.stdout)
}

fn git_commit_hash() -> Option<String> {
    let stdout = git(["rev-parse", "--short", "HEAD"])?;
    let mut lines = stdout.lines();
    let commit_hash = lines.next()?.ok()?;
    assert!(lines.next().is_none());
    Some(commit_hash)
}

fn git_is_clean() -> bool {
    git(["status", "--porcelain"]).is_some_and(|stdout| stdout.is_empty())
}

fn main() {
    let doing_release = env::var("DBUILD_RELEASE")
        .map(|env| matches!(env.as_str(), "1" | "true"))
        .unwrap_or_default();

    let mut version = env!("CARGO_PKG_VERSION").to_owned();
    if !doing_release {
        if let Some(commit_hash) = git_commit_hash() {
            version.push('+');
            version.push_str(&commit_hash);
            if !git_is_clean() {
                version.push_str(".dirty");
            }
        }
    }

    let out_dir = PathBuf::from(env::var_os("OUT_DIR").unwrap());
    fs::write(
        out_dir.join("version.rs"),
        format!("pub const VERSION: &str = {version:?};"),
    )
    .unwrap();
}
