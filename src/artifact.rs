//! Shared library builds with `native-image`.
//!
//! The builder only drives a toolchain that is already installed. It never
//! provisions: a missing toolchain is reported as
//! [`ToolchainError::ToolchainNotProvisioned`] so the failure points at the
//! step that was skipped.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, ToolchainError};
use crate::output;
use crate::platform::{self, Os, PlatformTag};
use crate::process::{self, ProcessRunner, SystemRunner};
use crate::toolchain::{self, ToolchainVersion};

/// Launcher inside `<home>/bin`.
pub const TOOL_NAME: &str = "native-image";

/// Default marker identifying the runtime library that must be on the classpath.
pub const DEFAULT_RUNTIME_MARKER: &str = "org.jetbrains.kotlin";

/// How to pick the runtime dependency when several inputs match the marker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum DependencyPolicy {
    /// Take the first match in input order.
    #[default]
    FirstMatch,
    /// Fail unless exactly one input matches.
    Unique,
}

/// Compiled application plus its resolved runtime artifacts, in classpath order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildInputs {
    pub app_archive: PathBuf,
    pub dependencies: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildResult {
    /// `<working_dir>/<output_name>`, the name passed to `-o`.
    pub output_path: PathBuf,
    /// The shared library file written next to it, e.g. `kotlin-lib.so`.
    pub library_path: PathBuf,
}

/// `<home>/bin/native-image`, with `.cmd` on Windows.
pub fn entry_point_path(toolchain_home: &Path, os: Os) -> PathBuf {
    toolchain_home
        .join("bin")
        .join(format!("{TOOL_NAME}{}", platform::executable_suffix(os)))
}

/// [`entry_point_path`], failing when the launcher is not on disk.
pub fn resolve_entry_point(toolchain_home: &Path, os: Os) -> Result<PathBuf> {
    let path = entry_point_path(toolchain_home, os);
    if path.is_file() {
        Ok(path)
    } else {
        Err(ToolchainError::ToolchainEntryPointMissing { path })
    }
}

/// Picks the dependency whose path contains `marker`.
pub fn select_runtime_dependency<'a>(
    dependencies: &'a [PathBuf],
    marker: &str,
    policy: DependencyPolicy,
) -> Result<&'a Path> {
    let mut matches = dependencies
        .iter()
        .filter(|p| p.to_string_lossy().contains(marker));

    let first = matches
        .next()
        .ok_or_else(|| ToolchainError::RequiredDependencyMissing {
            marker: marker.to_string(),
        })?;
    let rest: Vec<&PathBuf> = matches.collect();
    if rest.is_empty() {
        return Ok(first.as_path());
    }

    match policy {
        DependencyPolicy::FirstMatch => {
            output::note(&format!(
                "{} dependencies match '{marker}', using {}",
                rest.len() + 1,
                first.display()
            ));
            Ok(first.as_path())
        }
        DependencyPolicy::Unique => Err(ToolchainError::AmbiguousDependency {
            marker: marker.to_string(),
            candidates: std::iter::once(first)
                .chain(rest)
                .cloned()
                .collect(),
        }),
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).map_err(|e| ToolchainError::io(path, e))
}

/// Application archive followed by the runtime dependency, joined with the
/// host path-list separator.
pub fn assemble_classpath(app_archive: &Path, runtime: &Path) -> Result<OsString> {
    std::env::join_paths([app_archive, runtime])
        .map_err(|e| ToolchainError::InvalidClasspath(e.to_string()))
}

/// `--shared -cp <classpath> -o <output_name>`, then any extra arguments.
pub fn native_image_args(classpath: &OsString, output_name: &str, extra: &[OsString]) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "--shared".into(),
        "-cp".into(),
        classpath.clone(),
        "-o".into(),
        output_name.into(),
    ];
    args.extend(extra.iter().cloned());
    args
}

pub struct ArtifactBuilder<R = SystemRunner> {
    platform: PlatformTag,
    runner: R,
    runtime_marker: String,
    policy: DependencyPolicy,
    working_dir: PathBuf,
    extra_args: Vec<OsString>,
}

impl ArtifactBuilder<SystemRunner> {
    /// Builder for the running host, spawning real processes.
    pub fn for_host() -> Result<Self> {
        Ok(Self::new(platform::identify()?, SystemRunner))
    }
}

impl<R: ProcessRunner> ArtifactBuilder<R> {
    pub fn new(platform: PlatformTag, runner: R) -> Self {
        Self {
            platform,
            runner,
            runtime_marker: DEFAULT_RUNTIME_MARKER.to_string(),
            policy: DependencyPolicy::default(),
            working_dir: PathBuf::from("."),
            extra_args: Vec::new(),
        }
    }

    pub fn with_runtime_marker(mut self, marker: impl Into<String>) -> Self {
        self.runtime_marker = marker.into();
        self
    }

    pub fn with_policy(mut self, policy: DependencyPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Directory `native-image` runs in and writes its output to.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn with_extra_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.extra_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Runs `native-image` once against `toolchain_home`. No retries.
    pub fn build(
        &self,
        toolchain_home: &Path,
        inputs: &BuildInputs,
        output_name: &str,
    ) -> Result<BuildResult> {
        // The child runs in `working_dir`, so every path handed to it is
        // anchored at our current directory first.
        let exe = absolute(&resolve_entry_point(toolchain_home, self.platform.os)?)?;
        let runtime =
            select_runtime_dependency(&inputs.dependencies, &self.runtime_marker, self.policy)?;
        let classpath = assemble_classpath(&absolute(&inputs.app_archive)?, &absolute(runtime)?)?;
        let args = native_image_args(&classpath, output_name, &self.extra_args);

        let working_dir = absolute(&self.working_dir)?;
        std::fs::create_dir_all(&working_dir).map_err(|e| ToolchainError::io(&working_dir, e))?;

        output::action("Building", &format!("shared library '{output_name}'"));
        output::verbose(&format!("runtime dependency: {}", runtime.display()));
        output::verbose(&process::display_command(&exe, &args));

        let out = self.runner.run(&exe, &args, Some(working_dir.as_path()))?;
        if !out.success {
            return Err(ToolchainError::NativeBuildFailed {
                status: out.status,
                stdout: out.stdout,
                stderr: out.stderr,
            });
        }

        let output_path = working_dir.join(output_name);
        let library_path = working_dir.join(format!(
            "{output_name}.{}",
            platform::shared_library_extension(self.platform.os)
        ));
        output::success("Built", &library_path.display().to_string());
        Ok(BuildResult {
            output_path,
            library_path,
        })
    }

    /// Resolves the installed toolchain for `version`, then [`build`](Self::build)s.
    ///
    /// Fails with [`ToolchainError::ToolchainNotProvisioned`] when nothing is
    /// installed; provisioning is a separate step.
    pub fn build_installed(
        &self,
        install_dir: &Path,
        version: &ToolchainVersion,
        inputs: &BuildInputs,
        output_name: &str,
    ) -> Result<BuildResult> {
        let installed = toolchain::locate(install_dir, version, self.platform)?.ok_or_else(|| {
            ToolchainError::ToolchainNotProvisioned {
                install_dir: install_dir.to_path_buf(),
                version: version.to_string(),
            }
        })?;
        self.build(&installed.home, inputs, output_name)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Arch;
    use crate::process::ProcessOutput;
    use std::cell::RefCell;
    use tempfile::TempDir;

    const LINUX: PlatformTag = PlatformTag {
        os: Os::Linux,
        arch: Arch::X64,
    };

    struct Call {
        program: PathBuf,
        args: Vec<OsString>,
        cwd: Option<PathBuf>,
    }

    struct FakeRunner {
        result: ProcessOutput,
        calls: RefCell<Vec<Call>>,
    }

    impl FakeRunner {
        fn exiting(code: i32, stderr: &str) -> Self {
            Self {
                result: ProcessOutput {
                    status: Some(code),
                    success: code == 0,
                    stdout: String::new(),
                    stderr: stderr.to_string(),
                },
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl ProcessRunner for &FakeRunner {
        fn run(
            &self,
            program: &Path,
            args: &[OsString],
            cwd: Option<&Path>,
        ) -> Result<ProcessOutput> {
            self.calls.borrow_mut().push(Call {
                program: program.to_path_buf(),
                args: args.to_vec(),
                cwd: cwd.map(Path::to_path_buf),
            });
            Ok(self.result.clone())
        }
    }

    /// A toolchain home with `bin/native-image` present.
    fn fake_home(tmp: &TempDir) -> PathBuf {
        let home = tmp.path().join("graalvm-community-openjdk-25");
        std::fs::create_dir_all(home.join("bin")).unwrap();
        std::fs::write(home.join("bin").join(TOOL_NAME), b"#!/bin/sh\n").unwrap();
        home
    }

    fn inputs() -> BuildInputs {
        BuildInputs {
            app_archive: PathBuf::from("/work/build/libs/app.jar"),
            dependencies: vec![
                PathBuf::from("/cache/org.graalvm.truffle/truffle-api-25.0.0.jar"),
                PathBuf::from("/cache/org.jetbrains.kotlin/kotlin-stdlib-2.1.0.jar"),
                PathBuf::from("/cache/org.jetbrains/annotations-13.0.jar"),
            ],
        }
    }

    // -- entry point ---------------------------------------------------------

    #[test]
    fn entry_point_uses_cmd_suffix_on_windows() {
        let home = Path::new("/opt/graalvm");
        assert_eq!(
            entry_point_path(home, Os::Windows),
            home.join("bin").join("native-image.cmd")
        );
        assert_eq!(
            entry_point_path(home, Os::MacOs),
            home.join("bin").join("native-image")
        );
    }

    #[test]
    fn build_fails_without_entry_point() {
        let tmp = TempDir::new().unwrap();
        let runner = FakeRunner::exiting(0, "");
        let err = ArtifactBuilder::new(LINUX, &runner)
            .build(tmp.path(), &inputs(), "kotlin-lib")
            .unwrap_err();

        assert!(
            matches!(err, ToolchainError::ToolchainEntryPointMissing { .. }),
            "{err:?}"
        );
        assert!(runner.calls.borrow().is_empty());
    }

    // -- dependency selection ------------------------------------------------

    #[test]
    fn selects_marker_dependency() {
        let deps = inputs().dependencies;
        let picked =
            select_runtime_dependency(&deps, DEFAULT_RUNTIME_MARKER, DependencyPolicy::Unique)
                .unwrap();
        assert_eq!(picked, deps[1]);
    }

    #[test]
    fn missing_marker_dependency_is_fatal() {
        let deps = vec![PathBuf::from("/cache/org.graalvm.truffle/truffle-api.jar")];
        let err =
            select_runtime_dependency(&deps, DEFAULT_RUNTIME_MARKER, DependencyPolicy::FirstMatch)
                .unwrap_err();
        assert!(matches!(err, ToolchainError::RequiredDependencyMissing { .. }));
    }

    #[test]
    fn ambiguous_marker_depends_on_policy() {
        let deps = vec![
            PathBuf::from("/cache/org.jetbrains.kotlin/kotlin-stdlib-2.1.0.jar"),
            PathBuf::from("/cache/org.jetbrains.kotlin/kotlin-reflect-2.1.0.jar"),
        ];

        let picked =
            select_runtime_dependency(&deps, DEFAULT_RUNTIME_MARKER, DependencyPolicy::FirstMatch)
                .unwrap();
        assert_eq!(picked, deps[0]);

        let err = select_runtime_dependency(&deps, DEFAULT_RUNTIME_MARKER, DependencyPolicy::Unique)
            .unwrap_err();
        match err {
            ToolchainError::AmbiguousDependency { candidates, .. } => {
                assert_eq!(candidates, deps);
            }
            other => panic!("expected AmbiguousDependency, got {other:?}"),
        }
    }

    // -- classpath and arguments ---------------------------------------------

    #[test]
    fn classpath_orders_app_before_runtime() {
        let cp = assemble_classpath(Path::new("app.jar"), Path::new("kotlin-stdlib.jar")).unwrap();
        let parts: Vec<PathBuf> = std::env::split_paths(&cp).collect();
        assert_eq!(
            parts,
            vec![PathBuf::from("app.jar"), PathBuf::from("kotlin-stdlib.jar")]
        );
    }

    #[cfg(unix)]
    #[test]
    fn classpath_rejects_embedded_separator() {
        let err = assemble_classpath(Path::new("a:b.jar"), Path::new("c.jar")).unwrap_err();
        assert!(matches!(err, ToolchainError::InvalidClasspath(_)));
    }

    #[test]
    fn build_invokes_native_image_with_shared_flags() {
        let tmp = TempDir::new().unwrap();
        let home = fake_home(&tmp);
        let work = tmp.path().join("out");
        let runner = FakeRunner::exiting(0, "");

        let result = ArtifactBuilder::new(LINUX, &runner)
            .with_working_dir(&work)
            .build(&home, &inputs(), "kotlin-lib")
            .unwrap();

        assert!(work.is_dir(), "working dir should be created");
        assert_eq!(result.output_path, work.join("kotlin-lib"));
        assert_eq!(result.library_path, work.join("kotlin-lib.so"));

        let calls = runner.calls.borrow();
        assert_eq!(calls.len(), 1);
        let call = &calls[0];
        assert_eq!(call.program, home.join("bin").join("native-image"));
        assert_eq!(call.cwd.as_deref(), Some(work.as_path()));

        let expected_cp = std::env::join_paths([
            "/work/build/libs/app.jar",
            "/cache/org.jetbrains.kotlin/kotlin-stdlib-2.1.0.jar",
        ])
        .unwrap();
        let expected: Vec<OsString> = vec![
            "--shared".into(),
            "-cp".into(),
            expected_cp,
            "-o".into(),
            "kotlin-lib".into(),
        ];
        assert_eq!(call.args, expected);
    }

    #[test]
    fn relative_paths_are_anchored_at_current_dir() {
        let tmp = TempDir::new().unwrap();
        let home = fake_home(&tmp);
        let runner = FakeRunner::exiting(0, "");
        let cwd = std::env::current_dir().unwrap();
        let relative = BuildInputs {
            app_archive: PathBuf::from("build/libs/app.jar"),
            dependencies: vec![PathBuf::from("libs/org.jetbrains.kotlin/kotlin-stdlib.jar")],
        };

        let result = ArtifactBuilder::new(LINUX, &runner)
            .with_working_dir(tmp.path().join("native"))
            .build(&home, &relative, "kotlin-lib")
            .unwrap();
        assert!(result.output_path.is_absolute());

        let calls = runner.calls.borrow();
        let parts: Vec<PathBuf> = std::env::split_paths(&calls[0].args[2]).collect();
        assert_eq!(
            parts,
            vec![
                cwd.join("build/libs/app.jar"),
                cwd.join("libs/org.jetbrains.kotlin/kotlin-stdlib.jar"),
            ]
        );
    }

    #[test]
    fn extra_args_follow_fixed_flags() {
        let tmp = TempDir::new().unwrap();
        let home = fake_home(&tmp);
        let runner = FakeRunner::exiting(0, "");

        ArtifactBuilder::new(LINUX, &runner)
            .with_working_dir(tmp.path())
            .with_extra_args(["--no-fallback", "-Ob"])
            .build(&home, &inputs(), "kotlin-lib")
            .unwrap();

        let calls = runner.calls.borrow();
        let args = &calls[0].args;
        assert_eq!(args[0], "--shared");
        assert_eq!(&args[5..], &[OsString::from("--no-fallback"), OsString::from("-Ob")]);
    }

    #[test]
    fn nonzero_exit_carries_captured_output() {
        let tmp = TempDir::new().unwrap();
        let home = fake_home(&tmp);
        let runner = FakeRunner::exiting(1, "Error: Main entry point class not found");

        let err = ArtifactBuilder::new(LINUX, &runner)
            .with_working_dir(tmp.path())
            .build(&home, &inputs(), "kotlin-lib")
            .unwrap_err();

        match err {
            ToolchainError::NativeBuildFailed { status, stderr, .. } => {
                assert_eq!(status, Some(1));
                assert!(stderr.contains("entry point class not found"));
            }
            other => panic!("expected NativeBuildFailed, got {other:?}"),
        }
    }

    // -- build_installed -----------------------------------------------------

    #[test]
    fn build_installed_requires_provisioning() {
        let tmp = TempDir::new().unwrap();
        let runner = FakeRunner::exiting(0, "");
        let version = ToolchainVersion::parse("25.0.0").unwrap();

        let err = ArtifactBuilder::new(LINUX, &runner)
            .build_installed(tmp.path(), &version, &inputs(), "kotlin-lib")
            .unwrap_err();

        assert!(
            matches!(err, ToolchainError::ToolchainNotProvisioned { .. }),
            "{err:?}"
        );
        assert!(runner.calls.borrow().is_empty());
        // Nothing was provisioned as a side effect.
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn build_installed_uses_located_home() {
        let tmp = TempDir::new().unwrap();
        let home = fake_home(&tmp);
        let runner = FakeRunner::exiting(0, "");
        let version = ToolchainVersion::parse("25.0.0").unwrap();

        ArtifactBuilder::new(LINUX, &runner)
            .with_working_dir(tmp.path().join("out"))
            .build_installed(tmp.path(), &version, &inputs(), "kotlin-lib")
            .unwrap();

        assert_eq!(
            runner.calls.borrow()[0].program,
            home.join("bin").join("native-image")
        );
    }
}
