use std::fs;
use std::path::Path;

fn main() {
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").expect("manifest dir");
    let workspace_root = Path::new(&manifest_dir)
        .ancestors()
        .nth(2)
        .expect("crate lives under <root>/crates/");
    let version_path = workspace_root.join("VERSION");
    println!("cargo:rerun-if-changed={}", version_path.display());

    let version = fs::read_to_string(&version_path).expect("read VERSION file");
    let version = version.trim();
    assert!(
        version.split('.').count() == 3 && version.split('.').all(|part| !part.is_empty()),
        "VERSION must be MAJOR.MINOR.PATCH, got {version:?}"
    );

    println!("cargo:rustc-env=VAULT_SESSION_VERSION={version}");
}
