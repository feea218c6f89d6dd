//! Docker integration tests
//!
//! Run against a real Docker daemon with `--features docker`.

#[cfg(all(test, feature = "docker"))]
mod tests {
    use crate::integration::common::*;
    use layerscope::{DockerRuntime, EntryKind, ExtractError, Inspector, Notifier};

    fn inspector() -> Inspector<DockerRuntime> {
        let runtime = DockerRuntime::new().expect("Should create DockerRuntime");
        Inspector::new(runtime, Notifier::new(1))
    }

    #[test]
    fn test_docker_metadata_alpine() {
        let metadata = inspector()
            .extract_metadata("alpine:latest")
            .expect("Should extract Alpine metadata");

        assert!(metadata.image_id.starts_with("sha256:"));
        assert_eq!(metadata.os, "linux");
        assert!(!metadata.history.is_empty(), "Alpine has layer history");
        assert!(metadata.env_vars.iter().any(|e| e.starts_with("PATH=")));
    }

    #[test]
    fn test_docker_file_tree_alpine() {
        let tree = inspector()
            .extract_file_tree("alpine:latest", 2)
            .expect("Should list Alpine filesystem");

        let etc = tree.iter().find(|n| n.name == "etc").expect("etc exists");
        assert_eq!(etc.kind, EntryKind::Directory);
        assert!(etc.child("passwd").is_some());

        // Depth 2 keeps /bin/* but nothing below it.
        let bin = tree.iter().find(|n| n.name == "bin").unwrap();
        assert!(bin.children().iter().all(|c| c.children().is_empty()));
    }

    #[test]
    fn test_docker_nonexistent_image() {
        let err = inspector().extract_metadata(NONEXISTENT_IMAGE).unwrap_err();
        assert!(
            matches!(err, ExtractError::ImageNotFound(_)),
            "Error should indicate a missing image: {err}"
        );
    }
}
