// Stamps the short git revision into the binary; verbose runs log it.
// Builds outside a checkout simply omit it.
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");

    let Ok(output) = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
    else {
        return;
    };
    if !output.status.success() {
        return;
    }
    if let Ok(revision) = String::from_utf8(output.stdout) {
        println!("cargo:rustc-env=ASCIIFILM_GIT_HASH={}", revision.trim());
    }
}
