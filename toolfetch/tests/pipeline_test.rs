//! End-to-end tests for the install pipeline against a local release feed.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde_json::json;
use tempfile::TempDir;
use toolfetch::tools::{AssetSource, LayoutRule, MatchRule};
use toolfetch::{
    CancelFlag, InstallOutcome, Installer, InstallerConfig, NoProgress, Platform, Tool,
    ToolFetchError, ToolSpec,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const REPO: &str = "example/payload";

/// Bytes large enough that the archive clears the minimum download size.
fn filler(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

fn zip_bytes(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut cursor);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        for (name, data) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }
    cursor.into_inner()
}

fn payload_spec(stale: &[&str]) -> ToolSpec {
    ToolSpec {
        tool: Tool::FFmpeg,
        display_name: "Payload".to_string(),
        dir_name: "Payload".to_string(),
        source: AssetSource::GithubLatest {
            repo: REPO.to_string(),
        },
        match_rule: MatchRule::Contains("linux64.zip".to_string()),
        layout: LayoutRule::SingleRootFolder {
            root_prefix: "payload-".to_string(),
            stale: stale.iter().map(|s| s.to_string()).collect(),
        },
        executable: "a".to_string(),
        search_names: vec![],
        releases_page: "https://github.com/example/payload/releases/".to_string(),
    }
}

fn installer(server: &MockServer, root: &Path) -> Installer {
    Installer::new(
        InstallerConfig::default()
            .with_api_base(server.uri())
            .with_data_root(root),
    )
    .unwrap()
    .with_platform(Platform::Windows64)
}

async fn publish(server: &MockServer, assets: &[(&str, Vec<u8>)]) {
    publish_to(server, REPO, assets).await;
}

async fn publish_to(server: &MockServer, repo: &str, assets: &[(&str, Vec<u8>)]) {
    let listing: Vec<_> = assets
        .iter()
        .map(|(name, body)| {
            json!({
                "name": name,
                "browser_download_url": format!("{}/download/{}", server.uri(), name),
                "size": body.len(),
            })
        })
        .collect();

    Mock::given(method("GET"))
        .and(path(format!("/repos/{repo}/releases/latest")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tag_name": "latest",
            "assets": listing,
        })))
        .mount(server)
        .await;

    for (name, body) in assets {
        Mock::given(method("GET"))
            .and(path(format!("/download/{name}")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(server)
            .await;
    }
}

/// Every file below `dir`, relative to it, sorted.
fn files_under(dir: &Path) -> Vec<String> {
    let mut files: Vec<String> = walkdir::WalkDir::new(dir)
        .min_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            e.path()
                .strip_prefix(dir)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect();
    files.sort();
    files
}

/// Entries directly inside `dir`, sorted.
fn top_level(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Shell script standing in for `7z e <archive> -o<dir> -y`; writes `files`
/// into the output directory.
#[cfg(unix)]
fn fake_seven_zip(dir: &Path, files: &[&str]) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let mut script = String::from(
        "#!/bin/sh\nfor a in \"$@\"; do case \"$a\" in -o*) out=\"${a#-o}\";; esac; done\n",
    );
    for file in files {
        script.push_str(&format!("echo {file} > \"$out/{file}\"\n"));
    }

    let fake = dir.join("fake7z");
    fs::write(&fake, script).unwrap();
    fs::set_permissions(&fake, fs::Permissions::from_mode(0o755)).unwrap();
    fake
}

fn recorder() -> (Arc<Mutex<Vec<u8>>>, impl Fn(u8) + Send + Sync) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let writer = seen.clone();
    (seen, move |p: u8| writer.lock().unwrap().push(p))
}

#[tokio::test]
async fn test_single_root_install_leaves_only_payload() {
    let server = MockServer::start().await;
    let archive = zip_bytes(&[
        ("payload-1.0/a", filler(1500, 1)),
        ("payload-1.0/b", filler(800, 2)),
    ]);
    publish(
        &server,
        &[
            ("payload-1.0-win64.zip", filler(2000, 9)),
            ("payload-1.0-linux64.zip", archive),
        ],
    )
    .await;

    let root = TempDir::new().unwrap();
    let installer = installer(&server, root.path());
    let (seen, sink) = recorder();

    let outcome = installer
        .install_spec(&payload_spec(&[]), &CancelFlag::new(), &sink)
        .await
        .unwrap();

    let install_dir = root.path().join("Payload");
    assert_eq!(
        outcome,
        InstallOutcome::Installed {
            executable: install_dir.join("a"),
            asset: "payload-1.0-linux64.zip".to_string(),
        }
    );
    assert_eq!(top_level(&install_dir), vec!["a", "b"]);
    assert_eq!(fs::read(install_dir.join("a")).unwrap(), filler(1500, 1));

    let seen = seen.lock().unwrap();
    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{seen:?}");
    assert_eq!(seen.last(), Some(&100));
    assert_eq!(seen.iter().filter(|p| **p == 100).count(), 1);
}

#[tokio::test]
async fn test_reinstall_replaces_previous_payload() {
    let server = MockServer::start().await;
    let first = zip_bytes(&[
        ("payload-1.0/a", filler(1200, 1)),
        ("payload-1.0/bin/old-helper", filler(600, 3)),
        ("payload-1.0/doc/manual.html", filler(400, 4)),
        ("payload-1.0/LICENSE.txt", b"v1 license".to_vec()),
    ]);
    publish(&server, &[("payload-1.0-linux64.zip", first)]).await;

    let root = TempDir::new().unwrap();
    let installer = installer(&server, root.path());
    let spec = payload_spec(&["bin", "doc", "LICENSE.txt"]);

    installer
        .install_spec(&spec, &CancelFlag::new(), &NoProgress)
        .await
        .unwrap();

    server.reset().await;
    let second = zip_bytes(&[
        ("payload-2.0/a", filler(1300, 5)),
        ("payload-2.0/bin/helper", filler(700, 6)),
    ]);
    publish(&server, &[("payload-2.0-linux64.zip", second)]).await;

    let outcome = installer
        .install_spec(&spec, &CancelFlag::new(), &NoProgress)
        .await
        .unwrap();

    assert!(matches!(outcome, InstallOutcome::Installed { .. }));
    let install_dir = root.path().join("Payload");
    assert_eq!(files_under(&install_dir), vec!["a", "bin/helper"]);
    assert_eq!(fs::read(install_dir.join("a")).unwrap(), filler(1300, 5));
}

#[tokio::test]
async fn test_no_matching_asset_creates_no_files() {
    let server = MockServer::start().await;
    publish(
        &server,
        &[
            ("payload-1.0-win64.zip", filler(2000, 1)),
            ("checksums.sha256", filler(100, 2)),
        ],
    )
    .await;

    let root = TempDir::new().unwrap();
    let err = installer(&server, root.path())
        .install_spec(&payload_spec(&[]), &CancelFlag::new(), &NoProgress)
        .await
        .unwrap_err();

    match err {
        ToolFetchError::NoMatchingAsset {
            releases_page,
            available,
            ..
        } => {
            assert_eq!(releases_page, "https://github.com/example/payload/releases/");
            assert!(available.contains("checksums.sha256"));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(files_under(root.path()).is_empty());
    assert!(!root.path().join("Payload").join("temp_download").exists());
}

#[tokio::test]
async fn test_undersized_asset_fails_integrity_check() {
    let server = MockServer::start().await;
    publish(&server, &[("payload-1.0-linux64.zip", filler(500, 1))]).await;

    let root = TempDir::new().unwrap();
    let err = installer(&server, root.path())
        .install_spec(&payload_spec(&[]), &CancelFlag::new(), &NoProgress)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ToolFetchError::DownloadIntegrity { size: 500, .. }
    ));
    assert!(files_under(root.path()).is_empty());
}

#[tokio::test]
async fn test_cancel_before_lookup_completes() {
    let server = MockServer::start().await;
    let archive = zip_bytes(&[("payload-1.0/a", filler(1500, 1))]);
    publish(&server, &[("payload-1.0-linux64.zip", archive)]).await;

    let root = TempDir::new().unwrap();
    let cancel = CancelFlag::new();
    cancel.request_cancel();

    let outcome = installer(&server, root.path())
        .install_spec(&payload_spec(&[]), &cancel, &NoProgress)
        .await
        .unwrap();

    assert_eq!(outcome, InstallOutcome::Cancelled);
    assert!(files_under(root.path()).is_empty());

    let downloads = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.url.path().starts_with("/download/"))
        .count();
    assert_eq!(downloads, 0);
}

#[tokio::test]
async fn test_cancel_during_download_never_reaches_100() {
    let server = MockServer::start().await;
    let archive = zip_bytes(&[("payload-1.0/a", filler(200_000, 1))]);
    publish(&server, &[("payload-1.0-linux64.zip", archive)]).await;

    let root = TempDir::new().unwrap();
    let installer = Installer::new(
        InstallerConfig::default()
            .with_api_base(server.uri())
            .with_data_root(root.path())
            .with_progress_every_chunks(1),
    )
    .unwrap();

    let cancel = CancelFlag::new();
    let trigger = cancel.clone();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let writer = seen.clone();
    let sink = move |p: u8| {
        writer.lock().unwrap().push(p);
        if p >= 20 {
            trigger.request_cancel();
        }
    };

    let outcome = installer
        .install_spec(&payload_spec(&[]), &cancel, &sink)
        .await
        .unwrap();

    assert_eq!(outcome, InstallOutcome::Cancelled);
    assert!(files_under(root.path()).is_empty());
    assert!(seen.lock().unwrap().iter().all(|p| *p < 100));
}

#[tokio::test]
async fn test_malformed_metadata_is_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/repos/{REPO}/releases/latest")))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>rate limited</html>"))
        .mount(&server)
        .await;

    let root = TempDir::new().unwrap();
    let err = installer(&server, root.path())
        .install_spec(&payload_spec(&[]), &CancelFlag::new(), &NoProgress)
        .await
        .unwrap_err();

    assert!(matches!(err, ToolFetchError::Parse { .. }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_leftover_scratch_that_cannot_be_removed_aborts() {
    let server = MockServer::start().await;
    let root = TempDir::new().unwrap();
    let install_dir = root.path().join("Payload");
    fs::create_dir_all(&install_dir).unwrap();
    // A file where the scratch directory should be cannot be removed as a tree.
    File::create(install_dir.join("temp_download")).unwrap();

    let err = installer(&server, root.path())
        .install_spec(&payload_spec(&[]), &CancelFlag::new(), &NoProgress)
        .await
        .unwrap_err();

    assert!(matches!(err, ToolFetchError::StaleState { .. }));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_executable_keeps_existing_install() {
    let server = MockServer::start().await;
    let first = zip_bytes(&[
        ("payload-1.0/a", filler(1500, 1)),
        ("payload-1.0/bin/helper", filler(600, 2)),
    ]);
    publish(&server, &[("payload-1.0-linux64.zip", first)]).await;

    let root = TempDir::new().unwrap();
    let installer = installer(&server, root.path());
    let spec = payload_spec(&["bin"]);
    installer
        .install_spec(&spec, &CancelFlag::new(), &NoProgress)
        .await
        .unwrap();

    server.reset().await;
    let broken = zip_bytes(&[("payload-2.0/readme.txt", filler(1500, 3))]);
    publish(&server, &[("payload-2.0-linux64.zip", broken)]).await;

    let err = installer
        .install_spec(&spec, &CancelFlag::new(), &NoProgress)
        .await
        .unwrap_err();

    assert!(matches!(err, ToolFetchError::ExecutableNotFound { .. }));
    let install_dir = root.path().join("Payload");
    assert_eq!(files_under(&install_dir), vec!["a", "bin/helper"]);
    assert_eq!(fs::read(install_dir.join("a")).unwrap(), filler(1500, 1));
}

#[tokio::test]
async fn test_update_with_unexpected_root_keeps_existing_install() {
    let server = MockServer::start().await;
    let first = zip_bytes(&[
        ("payload-1/a", filler(1500, 1)),
        ("payload-1/bin/tool", filler(900, 2)),
        ("payload-1/LICENSE.txt", b"v1 license".to_vec()),
    ]);
    publish(&server, &[("payload-1-linux64.zip", first)]).await;

    let root = TempDir::new().unwrap();
    let installer = installer(&server, root.path());
    let spec = payload_spec(&["bin", "doc", "LICENSE.txt"]);
    installer
        .install_spec(&spec, &CancelFlag::new(), &NoProgress)
        .await
        .unwrap();

    server.reset().await;
    let renamed = zip_bytes(&[
        ("renamed-2/a", filler(1500, 5)),
        ("renamed-2/bin/tool", filler(900, 6)),
    ]);
    publish(&server, &[("renamed-2-linux64.zip", renamed)]).await;

    let err = installer
        .install_spec(&spec, &CancelFlag::new(), &NoProgress)
        .await
        .unwrap_err();

    assert!(matches!(err, ToolFetchError::Extraction { .. }), "{err:?}");
    let install_dir = root.path().join("Payload");
    assert_eq!(files_under(&install_dir), vec!["LICENSE.txt", "a", "bin/tool"]);
    assert_eq!(fs::read(install_dir.join("bin/tool")).unwrap(), filler(900, 2));
}

#[tokio::test]
async fn test_cancel_after_extraction_leaves_install_untouched() {
    let server = MockServer::start().await;
    let first = zip_bytes(&[("payload-1.0/a", filler(1500, 1))]);
    publish(&server, &[("payload-1.0-linux64.zip", first)]).await;

    let root = TempDir::new().unwrap();
    let installer = installer(&server, root.path());
    let spec = payload_spec(&["bin"]);
    installer
        .install_spec(&spec, &CancelFlag::new(), &NoProgress)
        .await
        .unwrap();

    server.reset().await;
    let second = zip_bytes(&[
        ("payload-2.0/a", filler(1500, 7)),
        ("payload-2.0/bin/helper", filler(700, 8)),
    ]);
    publish(&server, &[("payload-2.0-linux64.zip", second)]).await;

    let cancel = CancelFlag::new();
    let trigger = cancel.clone();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let writer = seen.clone();
    // The last download emission is the 90% cap, after every chunk is written.
    let sink = move |p: u8| {
        writer.lock().unwrap().push(p);
        if p >= 90 {
            trigger.request_cancel();
        }
    };

    let outcome = installer.install_spec(&spec, &cancel, &sink).await.unwrap();

    assert_eq!(outcome, InstallOutcome::Cancelled);
    let seen = seen.lock().unwrap();
    assert_eq!(seen.last(), Some(&90), "{seen:?}");
    assert!(!seen.contains(&100));

    let install_dir = root.path().join("Payload");
    assert!(!install_dir.join("temp_download").exists());
    assert!(!install_dir.join("download-full.zip").exists());
    assert_eq!(files_under(&install_dir), vec!["a"]);
    assert_eq!(fs::read(install_dir.join("a")).unwrap(), filler(1500, 1));
}

#[cfg(unix)]
#[tokio::test]
async fn test_ensure_available_on_spawned_task() {
    let server = MockServer::start().await;
    publish_to(
        &server,
        "rigaya/NVEnc",
        &[
            ("NVEncC_7.50_x86.7z", filler(3000, 1)),
            ("NVEncC_7.50_x64.7z", filler(3000, 2)),
        ],
    )
    .await;

    let root = TempDir::new().unwrap();
    let fake = fake_seven_zip(root.path(), &["NVEncC64.exe", "NVEncCore64.dll"]);
    let installer = Arc::new(
        Installer::new(
            InstallerConfig::default()
                .with_api_base(server.uri())
                .with_data_root(root.path())
                .with_seven_zip(&fake),
        )
        .unwrap()
        .with_platform(Platform::Windows64),
    );
    let cancel = CancelFlag::new();

    let worker = installer.clone();
    let handle = tokio::spawn(async move {
        let confirm = |_: &ToolSpec| true;
        worker
            .ensure_available(Tool::NVEnc, &confirm, &cancel, &NoProgress)
            .await
    });
    let outcome = handle.await.unwrap().unwrap();

    let expected = root.path().join("NVEnc").join("NVEncC64.exe");
    assert_eq!(
        outcome,
        InstallOutcome::Installed {
            executable: expected.clone(),
            asset: "NVEncC_7.50_x64.7z".to_string(),
        }
    );
    assert_eq!(installer.locate(Tool::NVEnc).unwrap(), Some(expected));
}

#[tokio::test]
async fn test_direct_executable_download() {
    let server = MockServer::start().await;
    let exe = filler(4096, 7);
    Mock::given(method("GET"))
        .and(path("/a/7zr.exe"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(exe.clone()))
        .mount(&server)
        .await;

    let root = TempDir::new().unwrap();
    let installer = installer(&server, root.path());
    let mut spec = installer.spec(Tool::SevenZip).unwrap();
    spec.source = AssetSource::Direct {
        url: format!("{}/a/7zr.exe", server.uri()),
        file_name: "7zr.exe".to_string(),
    };

    let outcome = installer
        .install_spec(&spec, &CancelFlag::new(), &NoProgress)
        .await
        .unwrap();

    let expected: PathBuf = root.path().join("7-Zip").join("7zr.exe");
    assert_eq!(outcome.executable(), Some(expected.as_path()));
    assert_eq!(fs::read(&expected).unwrap(), exe);
    assert_eq!(top_level(&root.path().join("7-Zip")), vec!["7zr.exe"]);
}

#[tokio::test]
async fn test_seven_zip_layout_without_extractor() {
    let server = MockServer::start().await;
    let root = TempDir::new().unwrap();
    let installer = Installer::new(
        InstallerConfig::default()
            .with_api_base(server.uri())
            .with_data_root(root.path()),
    )
    .unwrap()
    .with_platform(Platform::Linux64);

    let mut spec = payload_spec(&[]);
    spec.layout = LayoutRule::FlatSevenZip {
        executable_pattern: r"^Payload.*64\.exe$".to_string(),
    };

    let err = installer
        .install_spec(&spec, &CancelFlag::new(), &NoProgress)
        .await
        .unwrap_err();

    assert!(matches!(err, ToolFetchError::MissingExtractor { .. }));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn test_seven_zip_layout_with_external_extractor() {
    let server = MockServer::start().await;
    publish(&server, &[("Payload_1.0_x64.7z", filler(3000, 1))]).await;

    let root = TempDir::new().unwrap();
    let fake = fake_seven_zip(root.path(), &["PayloadC64.exe", "PayloadCore64.dll"]);

    let installer = Installer::new(
        InstallerConfig::default()
            .with_api_base(server.uri())
            .with_data_root(root.path())
            .with_seven_zip(&fake),
    )
    .unwrap();

    let mut spec = payload_spec(&[]);
    spec.match_rule = MatchRule::Contains("x64.7z".to_string());
    spec.layout = LayoutRule::FlatSevenZip {
        executable_pattern: r"^Payload.*64\.exe$".to_string(),
    };

    let outcome = installer
        .install_spec(&spec, &CancelFlag::new(), &NoProgress)
        .await
        .unwrap();

    let install_dir = root.path().join("Payload");
    assert_eq!(
        outcome.executable(),
        Some(install_dir.join("PayloadC64.exe").as_path())
    );
    assert_eq!(
        top_level(&install_dir),
        vec!["PayloadC64.exe", "PayloadCore64.dll"]
    );
}

#[tokio::test]
async fn test_ensure_available_uses_existing_install() {
    let server = MockServer::start().await;
    let root = TempDir::new().unwrap();
    let installer = installer(&server, root.path());

    let existing = root.path().join("FFmpeg").join("bin").join("ffmpeg.exe");
    fs::create_dir_all(existing.parent().unwrap()).unwrap();
    fs::write(&existing, b"ffmpeg").unwrap();

    let outcome = installer
        .ensure_available(
            Tool::FFmpeg,
            &|_: &ToolSpec| -> bool { panic!("should not prompt when already installed") },
            &CancelFlag::new(),
            &NoProgress,
        )
        .await
        .unwrap();

    assert_eq!(outcome, InstallOutcome::AlreadyInstalled { executable: existing });
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_ensure_available_declined() {
    let server = MockServer::start().await;
    let root = TempDir::new().unwrap();
    let installer = installer(&server, root.path());
    let asked = Arc::new(Mutex::new(Vec::new()));
    let log = asked.clone();

    let outcome = installer
        .ensure_available(
            Tool::NVEnc,
            &move |spec: &ToolSpec| {
                log.lock().unwrap().push(spec.display_name.clone());
                false
            },
            &CancelFlag::new(),
            &NoProgress,
        )
        .await
        .unwrap();

    assert_eq!(outcome, InstallOutcome::Declined);
    assert_eq!(*asked.lock().unwrap(), vec!["NVEnc".to_string()]);
    assert!(fs::read_dir(root.path()).unwrap().next().is_none());
}
