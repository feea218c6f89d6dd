//! DockerRuntime tests against a scripted stand-in for the docker CLI.
//!
//! The script logs every invocation, so the tests can check that ephemeral
//! containers are removed on every exit path without a real daemon.

#[cfg(all(test, unix))]
mod tests {
    use crate::integration::common::*;
    use layerscope::{
        DockerRuntime, ExtractError, Inspector, Notifier, RuntimeConfig, DEFAULT_MAX_DEPTH,
    };
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::time::Duration;
    use tempfile::TempDir;

    struct FakeCli {
        dir: TempDir,
        log: PathBuf,
    }

    impl FakeCli {
        /// `cases` are extra `case "$1"` arms; `{dir}` expands to the fixture directory.
        fn new(cases: &str) -> Self {
            let dir = TempDir::new().unwrap();
            let log = dir.path().join("calls.log");
            let cases = cases.replace("{dir}", &dir.path().display().to_string());
            let script = format!(
                "#!/bin/sh\n\
                 echo \"$*\" >> \"{log}\"\n\
                 case \"$1\" in\n\
                 --version) echo \"Docker version 99.0.0, build fake\" ;;\n\
                 {cases}\n\
                 *) echo \"unsupported: $*\" >&2; exit 64 ;;\n\
                 esac\n",
                log = log.display(),
            );
            fs::write(dir.path().join("docker.sh"), script).unwrap();
            Self { dir, log }
        }

        fn path(&self) -> &Path {
            self.dir.path()
        }

        fn write(&self, name: &str, contents: &[u8]) {
            fs::write(self.dir.path().join(name), contents).unwrap();
        }

        fn config(&self) -> RuntimeConfig {
            RuntimeConfig {
                binary: "sh".to_string(),
                base_args: vec![self.dir.path().join("docker.sh").display().to_string()],
                command_timeout: Duration::from_secs(10),
                idle_timeout: Duration::from_secs(10),
                ..RuntimeConfig::default()
            }
        }

        fn inspector(&self) -> Inspector<DockerRuntime> {
            let runtime = DockerRuntime::with_config(self.config()).unwrap();
            Inspector::new(runtime, Notifier::new(1))
        }

        fn calls(&self) -> Vec<String> {
            fs::read_to_string(&self.log)
                .unwrap_or_default()
                .lines()
                .map(str::to_string)
                .collect()
        }

        fn was_called(&self, prefix: &str) -> bool {
            self.calls().iter().any(|c| c.starts_with(prefix))
        }
    }

    const PRESENT_IMAGE: &str = r#"
image) cat "{dir}/inspect.json" ;;
history) cat "{dir}/history.jsonl" ;;
create) echo c0ffee ;;
rm) ;;"#;

    fn present_image(export_arm: &str, rootfs: &[u8]) -> FakeCli {
        let cli = FakeCli::new(&format!("{PRESENT_IMAGE}\n{export_arm}"));
        cli.write("inspect.json", inspect_json("sha256:fake").as_bytes());
        cli.write("history.jsonl", HISTORY_LINES.as_bytes());
        cli.write("rootfs.tar", rootfs);
        cli
    }

    #[test]
    fn test_export_streams_tree_and_removes_container() {
        let cli = present_image(r#"export) exec cat "{dir}/rootfs.tar" ;;"#, &sample_rootfs());

        let tree = cli
            .inspector()
            .extract_file_tree("fake:latest", DEFAULT_MAX_DEPTH)
            .unwrap();

        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].child("sh").unwrap().size, 800);
        assert_eq!(tree[1].child("passwd").unwrap().size, 1200);
        assert!(cli.was_called("create fake:latest true"));
        assert!(cli.was_called("export c0ffee"));
        assert!(cli.was_called("rm -f c0ffee"));
    }

    #[test]
    fn test_container_removed_when_decoding_fails() {
        let mut rootfs = sample_rootfs();
        rootfs[512 + 148..512 + 156].copy_from_slice(b"0000001\0");
        let cli = present_image(r#"export) exec cat "{dir}/rootfs.tar" ;;"#, &rootfs);

        let err = cli
            .inspector()
            .extract_file_tree("fake:latest", DEFAULT_MAX_DEPTH)
            .unwrap_err();

        assert!(matches!(err, ExtractError::ArchiveCorrupt(_)), "{err:?}");
        assert!(cli.was_called("rm -f c0ffee"));
    }

    #[test]
    fn test_failed_export_is_transport_error() {
        let cli = present_image(
            r#"export) echo "Error response from daemon: write failed" >&2; exit 1 ;;"#,
            &sample_rootfs(),
        );

        let err = cli
            .inspector()
            .extract_file_tree("fake:latest", DEFAULT_MAX_DEPTH)
            .unwrap_err();

        assert!(matches!(err, ExtractError::Transport(_)), "{err:?}");
        assert!(cli.was_called("rm -f c0ffee"));
    }

    #[test]
    fn test_stalled_export_times_out() {
        let cli = present_image("export) exec sleep 5 ;;", &sample_rootfs());
        let runtime = DockerRuntime::with_config(RuntimeConfig {
            idle_timeout: Duration::from_millis(300),
            ..cli.config()
        })
        .unwrap();

        let err = Inspector::new(runtime, Notifier::new(1))
            .extract_file_tree("fake:latest", DEFAULT_MAX_DEPTH)
            .unwrap_err();

        assert!(matches!(err, ExtractError::Transport(_)), "{err:?}");
        assert!(cli.was_called("rm -f c0ffee"));
    }

    #[test]
    fn test_metadata_from_cli_output() {
        let cli = present_image("export) exit 1 ;;", &[]);

        let metadata = cli.inspector().extract_metadata("fake:latest").unwrap();

        assert_eq!(metadata.image_id, "sha256:fake");
        assert_eq!(metadata.history.len(), 2);
        assert_eq!(metadata.history[0].instruction(), "CMD [\"sh\"]");
        assert!(cli.was_called("history --no-trunc --human=false"));
        assert!(!cli.was_called("pull"));
        assert!(!cli.was_called("create"), "metadata must not create containers");
    }

    #[test]
    fn test_missing_image_is_pulled() {
        let cli = FakeCli::new(
            r#"
image) if [ -f "{dir}/pulled" ]; then cat "{dir}/inspect.json"; else echo "Error response from daemon: No such image: late:1" >&2; exit 1; fi ;;
pull) touch "{dir}/pulled" ;;
history) cat "{dir}/history.jsonl" ;;"#,
        );
        cli.write("inspect.json", inspect_json("sha256:late").as_bytes());
        cli.write("history.jsonl", HISTORY_LINES.as_bytes());

        let metadata = cli.inspector().extract_metadata("late:1").unwrap();
        assert_eq!(metadata.image_id, "sha256:late");
        assert!(cli.was_called("pull late:1"));
        assert!(cli.path().join("pulled").exists());
    }

    #[test]
    fn test_unresolvable_image_is_not_found() {
        let cli = FakeCli::new(
            r#"
image) echo "Error response from daemon: No such image: nope:1" >&2; exit 1 ;;
pull) echo "Error response from daemon: pull access denied for nope, repository does not exist or may require 'docker login'" >&2; exit 1 ;;"#,
        );

        let err = cli.inspector().extract_metadata("nope:1").unwrap_err();
        assert!(matches!(err, ExtractError::ImageNotFound(_)), "{err:?}");

        let err = cli
            .inspector()
            .extract_file_tree("nope:1", DEFAULT_MAX_DEPTH)
            .unwrap_err();
        assert!(matches!(err, ExtractError::ImageNotFound(_)), "{err:?}");
        assert!(!cli.was_called("create"));
    }

    #[test]
    fn test_registry_failure_during_pull_is_transport_error() {
        for pull_stderr in [
            "Error response from daemon: Get https://registry-1.docker.io/v2/: net/http: TLS handshake timeout",
            "Error response from daemon: toomanyrequests: You have reached your pull rate limit.",
        ] {
            let cli = FakeCli::new(&format!(
                r#"
image) echo "Error response from daemon: No such image: flaky:1" >&2; exit 1 ;;
pull) echo "{pull_stderr}" >&2; exit 1 ;;"#
            ));

            let err = cli.inspector().extract_metadata("flaky:1").unwrap_err();
            assert!(matches!(err, ExtractError::Transport(_)), "{err:?}");
            assert_eq!(err.status_code(), 500);
            assert!(cli.was_called("pull flaky:1"));
            assert!(!cli.was_called("history"));
        }
    }

    #[test]
    fn test_unreachable_daemon_is_runtime_unavailable() {
        let cli = FakeCli::new(
            r#"
image|pull|history|create) echo "Cannot connect to the Docker daemon at unix:///var/run/docker.sock. Is the docker daemon running?" >&2; exit 1 ;;"#,
        );

        let err = cli.inspector().extract_metadata("alpine:latest").unwrap_err();
        assert!(matches!(err, ExtractError::RuntimeUnavailable(_)), "{err:?}");
        assert!(!cli.was_called("pull"));
    }
}
