//! Shared test doubles: a scripted command runner and a fake peer panel
//! speaking just enough HTTP for the signed client.
#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use panel_migrate::exec::{CommandOutput, CommandRunner, CommandSpec, ExecError};

/// Command runner that records every invocation and can be scripted to
/// fail, block, or (for ssh-keygen) materialize key files.
#[derive(Default)]
pub struct FakeRunner {
    calls: Mutex<Vec<CommandSpec>>,
    failures: Mutex<Vec<(String, String)>>,
    gates: Mutex<Vec<(String, Receiver<()>)>>,
}

/// Releases a command held by [`FakeRunner::hold_when`]. Dropping the
/// gate releases it too, so a panicking test cannot deadlock the job.
pub struct Gate {
    tx: Sender<()>,
}

impl Gate {
    pub fn release(self) {
        let _ = self.tx.send(());
    }
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands whose rendered line contains `needle` fail with `stderr`.
    pub fn fail_when(&self, needle: &str, stderr: &str) {
        self.failures.lock().unwrap().push((needle.into(), stderr.into()));
    }

    /// The next command whose rendered line contains `needle` blocks until
    /// the returned gate is released.
    pub fn hold_when(&self, needle: &str) -> Gate {
        let (tx, rx) = channel();
        self.gates.lock().unwrap().push((needle.into(), rx));
        Gate { tx }
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    /// Rendered `program arg arg ...` lines, in invocation order.
    pub fn command_lines(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(|spec| format!("{} {}", spec.program, spec.args.join(" ")))
            .collect()
    }

    /// Poll until a command line containing `needle` has been run.
    pub fn wait_for_call(&self, needle: &str, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.command_lines().iter().any(|line| line.contains(needle)) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ExecError> {
        self.calls.lock().unwrap().push(spec.clone());
        let line = format!("{} {}", spec.program, spec.args.join(" "));

        let gate = {
            let mut gates = self.gates.lock().unwrap();
            gates
                .iter()
                .position(|(needle, _)| line.contains(needle))
                .map(|idx| gates.remove(idx).1)
        };
        if let Some(rx) = gate {
            let _ = rx.recv();
        }

        for (needle, stderr) in self.failures.lock().unwrap().iter() {
            if line.contains(needle) {
                return Err(ExecError::Failed {
                    program: spec.program.clone(),
                    code: 1,
                    stderr: stderr.clone(),
                });
            }
        }

        if spec.program == "ssh-keygen" {
            write_fake_key_pair(spec);
        }

        if let Some(path) = &spec.stdout_file {
            std::fs::write(path, "-- fake dump --\n").map_err(|source| ExecError::Redirect {
                path: path.clone(),
                source,
            })?;
        }

        Ok(CommandOutput::default())
    }
}

fn write_fake_key_pair(spec: &CommandSpec) {
    if let Some(idx) = spec.args.iter().position(|a| a == "-f")
        && let Some(path) = spec.args.get(idx + 1)
    {
        let _ = std::fs::write(path, "-----FAKE PRIVATE KEY-----\n");
        let _ = std::fs::write(
            format!("{path}.pub"),
            "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIFakeKeyForTests migration@panel\n",
        );
    }
}

/// One request the fake panel saw.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub body: String,
    pub timestamp: Option<String>,
    pub authorization: Option<String>,
}

/// Minimal peer panel: accepts HTTP on a loopback port, records every
/// request, answers the installed-environment probe with a configured map
/// and everything else with an empty success envelope.
pub struct FakePanel {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    failures: Arc<Mutex<Vec<(String, String)>>>,
    environment: Arc<serde_json::Value>,
}

impl FakePanel {
    pub fn start(environment: serde_json::Value) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
        let addr = listener.local_addr().expect("local addr");
        let requests: Arc<Mutex<Vec<RecordedRequest>>> = Arc::default();
        let failures: Arc<Mutex<Vec<(String, String)>>> = Arc::default();
        let environment = Arc::new(environment);

        let panel = Self {
            addr,
            requests: requests.clone(),
            failures: failures.clone(),
            environment: environment.clone(),
        };

        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let requests = requests.clone();
                let failures = failures.clone();
                let environment = environment.clone();
                std::thread::spawn(move || {
                    handle_connection(stream, &requests, &failures, &environment);
                });
            }
        });

        panel
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Respond 500 to `method path` from now on.
    pub fn fail_endpoint(&self, method: &str, path: &str) {
        self.failures.lock().unwrap().push((method.into(), path.into()));
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_for(&self, method: &str, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path == path)
            .collect()
    }
}

fn handle_connection(
    mut stream: TcpStream,
    requests: &Mutex<Vec<RecordedRequest>>,
    failures: &Mutex<Vec<(String, String)>>,
    environment: &serde_json::Value,
) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));

    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        match stream.read(&mut chunk) {
            Ok(0) => return,
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                if let Some(pos) = find_header_end(&buf) {
                    break pos;
                }
            }
            Err(_) => return,
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let mut lines = head.lines();
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    let mut content_length = 0usize;
    let mut timestamp = None;
    let mut authorization = None;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else { continue };
        let value = value.trim();
        match name.to_ascii_lowercase().as_str() {
            "content-length" => content_length = value.parse().unwrap_or(0),
            "x-timestamp" => timestamp = Some(value.to_string()),
            "authorization" => authorization = Some(value.to_string()),
            _ => {}
        }
    }

    let mut body_bytes = buf[header_end + 4..].to_vec();
    while body_bytes.len() < content_length {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => body_bytes.extend_from_slice(&chunk[..n]),
            Err(_) => break,
        }
    }
    let body = String::from_utf8_lossy(&body_bytes).into_owned();

    requests.lock().unwrap().push(RecordedRequest {
        method: method.clone(),
        path: path.clone(),
        body,
        timestamp,
        authorization,
    });

    let failed = failures
        .lock()
        .unwrap()
        .iter()
        .any(|(m, p)| *m == method && *p == path);

    let (status, payload) = if failed {
        ("500 Internal Server Error", serde_json::json!({"msg": "injected failure"}))
    } else if path == "/api/home/installed_environment" {
        ("200 OK", serde_json::json!({"msg": "", "data": environment}))
    } else {
        ("200 OK", serde_json::json!({"msg": "", "data": null}))
    };

    let payload = payload.to_string();
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{payload}",
        payload.len()
    );
    let _ = stream.write_all(response.as_bytes());
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

/// A fully wired service over fakes, plus handles to everything a test
/// wants to script or inspect.
pub struct TestHarness {
    pub service: panel_migrate::migration::MigrationService,
    pub runner: Arc<FakeRunner>,
    pub panel: FakePanel,
    pub tmp: tempfile::TempDir,
}

impl TestHarness {
    pub fn connection(&self) -> panel_migrate::remote::ConnectionInfo {
        panel_migrate::remote::ConnectionInfo {
            url: self.panel.url(),
            token_id: 7,
            token: "secret".into(),
        }
    }

    pub fn key_path(&self) -> std::path::PathBuf {
        self.tmp.path().join("mig_key")
    }
}

pub fn harness(inventory: panel_migrate::inventory::MemoryInventory) -> TestHarness {
    harness_with_env(inventory, serde_json::json!({"os": "Debian 12"}))
}

pub fn harness_with_env(
    inventory: panel_migrate::inventory::MemoryInventory,
    environment: serde_json::Value,
) -> TestHarness {
    use panel_migrate::config::MigrateConfig;
    use panel_migrate::migration::MigrationService;

    let tmp = tempfile::tempdir().expect("tempdir");
    let panel = FakePanel::start(environment);
    let runner = Arc::new(FakeRunner::new());

    let config = MigrateConfig {
        key_path: tmp.path().join("mig_key"),
        authorized_keys_path: tmp.path().join(".ssh/authorized_keys"),
        sites_root: tmp.path().join("sites"),
        http_timeout: Duration::from_secs(5),
        ssh_connect_timeout: 10,
        progress_tick: Duration::from_millis(10),
    };

    let inventory = Arc::new(inventory);
    let service = MigrationService::new(
        config,
        runner.clone(),
        inventory.clone(),
        inventory.clone(),
        inventory.clone(),
        inventory,
    );

    TestHarness {
        service,
        runner,
        panel,
        tmp,
    }
}
