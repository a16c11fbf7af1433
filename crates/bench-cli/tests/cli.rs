use std::path::{Path, PathBuf};
use std::process::{Command, Output};

const CASE_NAMES: [&str; 5] = [
    "0% duplicates 1K members 10 properties",
    "25% duplicates 1K members 10 properties",
    "50% duplicates 1K members 10 properties",
    "75% duplicates 1K members 10 properties",
    "100% duplicates 1K members 10 properties",
];

fn bench_cmd() -> Command {
    Command::new(env!("CARGO_BIN_EXE_bench"))
}

struct TestDir {
    path: PathBuf,
}

impl TestDir {
    fn new(label: &str) -> Self {
        let path = std::env::temp_dir().join(format!(
            "bench_cli_test_{}_{}_{}",
            std::process::id(),
            label,
            chrono::Utc::now().timestamp_micros()
        ));
        let _ = std::fs::remove_dir_all(&path);
        std::fs::create_dir_all(&path).expect("create temp dir");
        Self { path }
    }

    fn join(&self, rel: &str) -> PathBuf {
        self.path.join(rel)
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TestDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.path);
    }
}

/// Five cases with one local step each, declared (and sorted) in order.
fn scenario_fixture(label: &str) -> TestDir {
    let dir = TestDir::new(label);
    for (i, name) in CASE_NAMES.iter().enumerate() {
        let case_dir = dir.join(&format!("cases/case_{}", i + 1));
        std::fs::create_dir_all(&case_dir).expect("case dir");
        let metadata = format!(
            r#"{{
  "@id": "http://example.com/scenario/{i}",
  "name": "{name}",
  "description": "duplicates scenario",
  "steps": [
    {{"@id": "gen", "name": "Generate", "resource": "local", "command": ["sh", "-c", "echo ok > out.txt"], "parameters": {{}}}}
  ]
}}"#
        );
        std::fs::write(case_dir.join("metadata.json"), metadata).expect("metadata");
    }
    let scratch = dir.join("scratch");
    std::fs::write(
        dir.join("bench.yaml"),
        format!(
            "skip_security_check: true\nscratch_dir: {}\n",
            scratch.display()
        ),
    )
    .expect("bench.yaml");
    dir
}

fn bench(root: &Path, args: &[&str]) -> Output {
    bench_cmd()
        .arg("--root")
        .arg(root)
        .args(args)
        .output()
        .expect("run bench")
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).to_string()
}

#[test]
fn list_prints_cases_in_declaration_order() {
    let dir = scenario_fixture("list");
    let out = bench(dir.path(), &["list"]);
    assert_eq!(out.status.code(), Some(0));
    let text = stdout(&out);
    let lines: Vec<&str> = text.lines().collect();
    let expected: Vec<String> = CASE_NAMES
        .iter()
        .enumerate()
        .map(|(i, name)| format!("{}. {}", i + 1, name))
        .collect();
    assert_eq!(lines, expected);
}

#[test]
fn run_reports_one_checkmark_per_case_then_resumes_as_skips() {
    let dir = scenario_fixture("run");
    let out = bench(dir.path(), &["run", "--runs", "1", "--interval", "0.01"]);
    assert_eq!(out.status.code(), Some(0), "{}", stdout(&out));
    let text = stdout(&out);
    let done: Vec<&str> = text
        .lines()
        .filter(|l| l.contains('\u{2705}') && !l.contains("cases completed"))
        .collect();
    assert_eq!(done.len(), CASE_NAMES.len());
    for (line, name) in done.iter().zip(CASE_NAMES) {
        assert!(line.ends_with(&format!("\u{2705} {}", name)), "{}", line);
    }
    assert!(dir.join("cases/case_3/.done").exists());
    assert!(dir.join("cases/case_3/results/run_1/.done").exists());
    assert!(dir.join("cases/case_3/out.txt").exists());

    let again = bench(dir.path(), &["run", "--runs", "1", "--interval", "0.01"]);
    assert_eq!(again.status.code(), Some(0));
    assert_eq!(stdout(&again).matches("skipped, already done").count(), 5);
}

#[test]
fn stats_builds_archive_after_run() {
    let dir = scenario_fixture("stats");
    let run = bench(dir.path(), &["run", "--runs", "1", "--interval", "0.01"]);
    assert_eq!(run.status.code(), Some(0));
    let out = bench(dir.path(), &["stats"]);
    assert_eq!(out.status.code(), Some(0), "{}", stdout(&out));
    let file = std::fs::File::open(dir.join("results.zip")).expect("archive");
    let archive = zip::ZipArchive::new(file).expect("zip");
    let names: Vec<&str> = archive.file_names().collect();
    assert!(names.contains(&"cases/case_1/aggregated.csv"));
    assert!(names.contains(&"cases/case_1/summary.csv"));
    assert!(!names.iter().any(|n| n.ends_with("stats.csv")));

    let clean = bench(dir.path(), &["clean"]);
    assert_eq!(clean.status.code(), Some(0));
    assert!(!dir.join("results.zip").exists());
    assert!(!dir.join("cases/case_1/.done").exists());
}

#[test]
fn failing_case_is_reported_and_exits_253() {
    let dir = scenario_fixture("failing");
    let broken = dir.join("cases/case_2/metadata.json");
    std::fs::write(
        &broken,
        r#"{"name": "broken", "steps": [{"name": "explode", "command": ["sh", "-c", "exit 1"]}]}"#,
    )
    .expect("rewrite metadata");
    let out = bench(dir.path(), &["run", "--runs", "3", "--interval", "0.01"]);
    assert_eq!(out.status.code(), Some(253));
    let text = stdout(&out);
    assert!(text.contains("1 case(s) failed"));
    assert!(text.contains("  1. broken"));
    assert!(dir.join("cases/case_5/.done").exists());
    assert!(!dir.join("cases/case_2/results/run_2").exists());
}

#[test]
fn missing_root_exits_253() {
    let dir = TestDir::new("missing");
    let out = bench(&dir.join("does-not-exist"), &["list"]);
    assert_eq!(out.status.code(), Some(253));
}

#[test]
fn empty_root_exits_254() {
    let dir = TestDir::new("empty");
    let out = bench(dir.path(), &["run"]);
    assert_eq!(out.status.code(), Some(254));
}

#[test]
fn even_interval_is_rejected_with_250() {
    let dir = scenario_fixture("even");
    let out = bench(dir.path(), &["run", "--interval", "2"]);
    assert_eq!(out.status.code(), Some(250));
    assert!(!dir.join("cases/case_1/results").exists());
}

#[test]
fn unknown_command_exits_255() {
    let out = bench_cmd().arg("frobnicate").output().expect("run bench");
    assert_eq!(out.status.code(), Some(255));
}

#[test]
fn unknown_flag_keeps_usage_exit_code() {
    let out = bench_cmd().arg("list").arg("--bogus").output().expect("run bench");
    assert_eq!(out.status.code(), Some(2));
}

#[test]
fn infinite_interval_is_rejected_with_250() {
    let dir = scenario_fixture("inf");
    let out = bench(dir.path(), &["run", "--interval", "inf"]);
    assert_eq!(out.status.code(), Some(250));
    assert!(!dir.join("cases/case_1/results").exists());
}

#[test]
fn case_without_steps_fails_before_any_run() {
    let dir = scenario_fixture("no_steps");
    std::fs::write(
        dir.join("cases/case_4/metadata.json"),
        r#"{"name": "hollow", "steps": []}"#,
    )
    .expect("rewrite metadata");
    let out = bench(dir.path(), &["run", "--runs", "1", "--interval", "0.01"]);
    assert_eq!(out.status.code(), Some(253));
    assert!(!dir.join("cases/case_1/.done").exists());
    assert!(!dir.join("cases/case_4/.done").exists());
}

/// Replaces the first case's step with a shell script that takes a while.
#[cfg(unix)]
fn slow_first_case(dir: &TestDir, script: &str) {
    let metadata = format!(
        r#"{{"name": "{}", "steps": [{{"name": "slow", "resource": "local", "command": ["sh", "-c", "{}"]}}]}}"#,
        CASE_NAMES[0], script
    );
    std::fs::write(dir.join("cases/case_1/metadata.json"), metadata).expect("rewrite metadata");
}

#[cfg(unix)]
fn wait_for(path: &Path) {
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
    while !path.exists() {
        assert!(std::time::Instant::now() < deadline, "timed out waiting for {}", path.display());
        std::thread::sleep(std::time::Duration::from_millis(20));
    }
    // Give the signal listener time to come up.
    std::thread::sleep(std::time::Duration::from_millis(300));
}

#[cfg(unix)]
fn send_sigint(target: &str) {
    let status = Command::new("kill")
        .args(["-s", "INT", "--", target])
        .status()
        .expect("kill");
    assert!(status.success(), "kill -s INT {}", target);
}

#[cfg(unix)]
#[test]
fn terminal_interrupt_lets_the_running_step_finish() {
    use std::os::unix::process::CommandExt;

    let dir = scenario_fixture("ctrl_c_group");
    slow_first_case(&dir, "sleep 2; echo finished > done.txt");
    // Lead a fresh group, as an interactive shell would, and signal all of it.
    let child = bench_cmd()
        .arg("--root")
        .arg(dir.path())
        .args(["run", "--runs", "1", "--interval", "0.05"])
        .stdout(std::process::Stdio::piped())
        .process_group(0)
        .spawn()
        .expect("spawn bench");
    wait_for(&dir.join("cases/case_1/results/run_1/step_1.log"));
    send_sigint(&format!("-{}", child.id()));

    let out = child.wait_with_output().expect("wait bench");
    assert_eq!(out.status.code(), Some(252), "{}", stdout(&out));
    assert!(dir.join("cases/case_1/done.txt").exists());
    assert!(dir.join("cases/case_1/results/run_1/.done").exists());
    assert!(!dir.join("cases/case_2/results").exists());
}

#[cfg(unix)]
#[test]
fn second_interrupt_exits_immediately() {
    let dir = scenario_fixture("ctrl_c_twice");
    slow_first_case(&dir, "sleep 3");
    let child = bench_cmd()
        .arg("--root")
        .arg(dir.path())
        .args(["run", "--runs", "2", "--interval", "0.05"])
        .stdout(std::process::Stdio::piped())
        .spawn()
        .expect("spawn bench");
    wait_for(&dir.join("cases/case_1/results/run_1/step_1.log"));
    let pid = child.id().to_string();
    send_sigint(&pid);
    std::thread::sleep(std::time::Duration::from_millis(200));
    send_sigint(&pid);

    let started = std::time::Instant::now();
    let out = child.wait_with_output().expect("wait bench");
    assert_eq!(out.status.code(), Some(252));
    assert!(started.elapsed() < std::time::Duration::from_secs(2));
    assert!(!dir.join("cases/case_1/results/run_1/.done").exists());
    assert!(!dir.join("cases/case_1/results/run_2").exists());
}
