//! Native builds through the real process runner.
//!
//! `native-image` is replaced by a shell script that checks its classpath
//! from inside the working directory, so these tests need a Unix shell.
#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use serial_test::serial;

use graal_native_lib::ToolchainError;
use graal_native_lib::artifact::{ArtifactBuilder, BuildInputs};
use graal_native_lib::platform;
use graal_native_lib::process::SystemRunner;
use graal_native_lib::toolchain::ToolchainVersion;

/// Fails with exit 7 unless every classpath entry is visible from the
/// directory it runs in, then writes the output file named by `-o`.
const CHECKING_NATIVE_IMAGE: &str = r#"#!/bin/sh
# --shared -cp <classpath> -o <name>
IFS=:
for jar in $3; do
  [ -f "$jar" ] || { echo "missing $jar in $(pwd)" >&2; exit 7; }
done
echo built > "$5"
"#;

const FAILING_NATIVE_IMAGE: &str = r#"#!/bin/sh
echo "Fatal error: image generation failed" >&2
exit 3
"#;

/// Restores the process working directory on drop.
struct CwdGuard {
    previous: PathBuf,
}

impl CwdGuard {
    fn enter(dir: &Path) -> Self {
        let previous = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir).unwrap();
        Self { previous }
    }
}

impl Drop for CwdGuard {
    fn drop(&mut self) {
        let _ = std::env::set_current_dir(&self.previous);
    }
}

fn install_fake_toolchain(install_dir: &Path, script: &str) {
    let bin = install_dir.join("graalvm-community-openjdk-25").join("bin");
    std::fs::create_dir_all(&bin).unwrap();
    let exe = bin.join("native-image");
    std::fs::write(&exe, script).unwrap();
    std::fs::set_permissions(&exe, std::fs::Permissions::from_mode(0o755)).unwrap();
}

fn touch(path: &Path) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, b"PK").unwrap();
}

fn relative_inputs() -> BuildInputs {
    BuildInputs {
        app_archive: PathBuf::from("build/libs/app.jar"),
        dependencies: vec![PathBuf::from(
            "libs/org.jetbrains.kotlin/kotlin-stdlib-2.1.0.jar",
        )],
    }
}

#[test]
#[serial]
fn relative_paths_survive_a_separate_working_dir() {
    let tmp = tempfile::tempdir().unwrap();
    install_fake_toolchain(&tmp.path().join(".toolchain/graalvm"), CHECKING_NATIVE_IMAGE);
    let inputs = relative_inputs();
    touch(&tmp.path().join(&inputs.app_archive));
    touch(&tmp.path().join(&inputs.dependencies[0]));

    let _cwd = CwdGuard::enter(tmp.path());
    let version = ToolchainVersion::parse("25.0.0").unwrap();
    let result = ArtifactBuilder::new(platform::identify().unwrap(), SystemRunner)
        .with_working_dir("build/native")
        .build_installed(Path::new(".toolchain/graalvm"), &version, &inputs, "kotlin-lib")
        .unwrap();

    assert!(result.output_path.is_absolute());
    assert!(result.output_path.ends_with("build/native/kotlin-lib"));
    assert_eq!(std::fs::read_to_string(&result.output_path).unwrap(), "built\n");
}

#[test]
#[serial]
fn failing_build_reports_exit_status_and_stderr() {
    let tmp = tempfile::tempdir().unwrap();
    install_fake_toolchain(&tmp.path().join(".toolchain/graalvm"), FAILING_NATIVE_IMAGE);
    let inputs = relative_inputs();

    let _cwd = CwdGuard::enter(tmp.path());
    let version = ToolchainVersion::parse("25.0.0").unwrap();
    let err = ArtifactBuilder::new(platform::identify().unwrap(), SystemRunner)
        .with_working_dir("build/native")
        .build_installed(Path::new(".toolchain/graalvm"), &version, &inputs, "kotlin-lib")
        .unwrap_err();

    match err {
        ToolchainError::NativeBuildFailed { status, stderr, .. } => {
            assert_eq!(status, Some(3));
            assert!(stderr.contains("image generation failed"), "{stderr}");
        }
        other => panic!("expected NativeBuildFailed, got {other:?}"),
    }
    assert!(tmp.path().join("build/native").is_dir());
}
