#![cfg(all(unix, feature = "cli"))]

//! Cross-process tests driving the `objhost` binary as a real owner process.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use objhost::registry::{FileRegistry, Registry};
use objhost::runtime::{get_proxy_with, ObjectProxy, ProxyConfig, RuntimeError};
use serde_json::json;

fn unique_registry_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/objhost-cli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn objhost_cmd(registry_dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_objhost"));
    cmd.arg("--registry")
        .arg(registry_dir)
        .arg("--log-level")
        .arg("error")
        .env_remove("OBJHOST_REGISTRY_DIR");
    cmd
}

fn spawn_server(registry_dir: &Path, name: &str, initial: &str) -> Child {
    objhost_cmd(registry_dir)
        .arg("serve")
        .arg(name)
        .arg("--initial")
        .arg(initial)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("serve command should start")
}

fn wait_for_proxy(registry_dir: &Path, name: &str, timeout: Duration) -> ObjectProxy {
    let registry = FileRegistry::open(registry_dir).expect("registry should open");
    let config = ProxyConfig {
        call_timeout: Duration::from_secs(2),
        ..ProxyConfig::default()
    };
    let start = Instant::now();
    loop {
        match get_proxy_with(name, &registry, &config) {
            Ok(proxy) => return proxy,
            Err(err) => {
                if start.elapsed() >= timeout {
                    panic!("owner for '{name}' did not come up: {err}");
                }
                thread::sleep(Duration::from_millis(25));
            }
        }
    }
}

fn wait_for_exit(child: &mut Child, timeout: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        match child.try_wait() {
            Ok(Some(_)) => return true,
            Ok(None) => thread::sleep(Duration::from_millis(25)),
            Err(_) => return false,
        }
    }
    false
}

#[test]
fn serve_set_get_release_roundtrip() {
    let dir = unique_registry_dir("roundtrip");
    let mut server = spawn_server(&dir, "shared_dict", r#"{"shared": 2}"#);

    let proxy = wait_for_proxy(&dir, "shared_dict", Duration::from_secs(5));
    assert_eq!(proxy.get_item("shared").unwrap(), json!(2));

    // Mutate through a second OS process (the CLI) and observe it here.
    let status = objhost_cmd(&dir)
        .args(["set", "shared_dict", "another_attr", "3"])
        .status()
        .expect("set command should run");
    assert!(status.success());
    assert_eq!(proxy.get_item("another_attr").unwrap(), json!(3));

    // `get` from yet another process sees the same state.
    let output = objhost_cmd(&dir)
        .args(["--format", "json", "get", "shared_dict", "another_attr"])
        .output()
        .expect("get command should run");
    assert!(output.status.success());
    let printed: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("get output should be JSON");
    assert_eq!(printed, json!(3));

    // `ls` shows the live registration.
    let output = objhost_cmd(&dir)
        .args(["--format", "json", "ls"])
        .output()
        .expect("ls command should run");
    assert!(output.status.success());
    let listing: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("ls output should be JSON");
    assert_eq!(listing[0]["name"], json!("shared_dict"));
    assert_eq!(listing[0]["alive"], json!(true));

    // Graceful release shuts the server process down and clears the name.
    let status = objhost_cmd(&dir)
        .args(["release", "shared_dict"])
        .status()
        .expect("release command should run");
    assert!(status.success());
    assert!(
        wait_for_exit(&mut server, Duration::from_secs(5)),
        "server should exit after release"
    );

    let registry = FileRegistry::open(&dir).expect("registry should open");
    assert!(registry.resolve("shared_dict").is_err());

    let _ = server.kill();
    let _ = server.wait();
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn concurrent_clients_share_one_serialized_owner() {
    let dir = unique_registry_dir("counter");
    let mut server = spawn_server(&dir, "tally", r#"{"counter": 0}"#);
    let _ = wait_for_proxy(&dir, "tally", Duration::from_secs(5));

    const CLIENTS: usize = 4;
    const INCREMENTS: usize = 25;

    let mut workers = Vec::new();
    for _ in 0..CLIENTS {
        let dir = dir.clone();
        workers.push(thread::spawn(move || {
            let registry = FileRegistry::open(&dir).expect("registry should open");
            let config = ProxyConfig {
                call_timeout: Duration::from_secs(2),
                ..ProxyConfig::default()
            };
            let proxy =
                get_proxy_with("tally", &registry, &config).expect("worker proxy should resolve");
            for _ in 0..INCREMENTS {
                proxy
                    .call_at(
                        objhost::wire::TargetPath::root().item("counter"),
                        "incr",
                        vec![json!(1)],
                        serde_json::Map::new(),
                    )
                    .expect("increment should succeed");
            }
        }));
    }
    for worker in workers {
        worker.join().expect("worker should finish");
    }

    let proxy = wait_for_proxy(&dir, "tally", Duration::from_secs(2));
    assert_eq!(
        proxy.get_item("counter").unwrap(),
        json!((CLIENTS * INCREMENTS) as i64)
    );

    let _ = server.kill();
    let _ = server.wait();
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn get_against_unregistered_name_fails() {
    let dir = unique_registry_dir("missing");

    let output = objhost_cmd(&dir)
        .args(["get", "nobody"])
        .output()
        .expect("get command should run");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("not registered") || stderr.contains("not found"),
        "stderr should name the failure: {stderr}"
    );

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn killed_server_is_swept_from_the_registry() {
    let dir = unique_registry_dir("sweep");
    let mut server = spawn_server(&dir, "doomed", "{}");
    let _ = wait_for_proxy(&dir, "doomed", Duration::from_secs(5));

    // Crash the owner without any goodbye.
    server.kill().expect("kill should succeed");
    server.wait().expect("wait should succeed");

    // Resolving the name now cleans the stale entry and reports NotFound.
    let registry = FileRegistry::open(&dir).expect("registry should open");
    let config = ProxyConfig::default();
    match get_proxy_with("doomed", &registry, &config) {
        Err(RuntimeError::NotFound(_)) => {}
        other => panic!("expected NotFound after owner crash, got {other:?}"),
    }
    assert!(registry.list().expect("list should work").is_empty());

    let _ = std::fs::remove_dir_all(&dir);
}
