use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn snpcheck() -> Command {
    Command::new(env!("CARGO_BIN_EXE_snpcheck"))
}

fn run(command: &mut Command) -> Output {
    command.output().expect("snpcheck should spawn")
}

fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("parent directory should be created");
    }
    fs::write(path, content).expect("file should be written");
}

#[test]
fn compare_calls_exits_zero_for_identical_files() {
    let temp = TempDir::new().expect("tempdir should be created");
    let expected = temp.path().join("expected.calls");
    let actual = temp.path().join("actual.calls");
    write_file(&expected, "SNP_A-1\t0\t1\t2\n");
    write_file(&actual, "SNP_A-1\t0\t1\t2\n");

    let output = run(snpcheck()
        .arg("compare")
        .args(["--mode", "calls"])
        .arg(&expected)
        .arg(&actual));

    assert_eq!(output.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&output.stdout).contains("PASS"));
}

#[test]
fn compare_confidences_exits_one_on_drift() {
    let temp = TempDir::new().expect("tempdir should be created");
    let expected = temp.path().join("expected.confidences");
    let actual = temp.path().join("actual.confidences");
    write_file(&expected, "probeset_id\tS1\nSNP_A-1\t0.001000\n");
    write_file(&actual, "probeset_id\tS1\nSNP_A-1\t0.002000\n");

    let output = run(snpcheck()
        .arg("compare")
        .args(["--mode", "confidences"])
        .arg(&expected)
        .arg(&actual));

    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("out of tolerance"));
    assert!(stdout.contains("FAIL"));
}

#[test]
fn compare_calls_rejects_epsilon_override() {
    let temp = TempDir::new().expect("tempdir should be created");
    let expected = temp.path().join("expected.calls");
    let actual = temp.path().join("actual.calls");
    write_file(&expected, "SNP_A-1\t0\n");
    write_file(&actual, "SNP_A-1\t0\n");

    let output = run(snpcheck()
        .arg("compare")
        .args(["--mode", "calls", "--epsilon", "0.5"])
        .arg(&expected)
        .arg(&actual));

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("ERROR: [INPUT.CLI_USAGE]"));
    assert!(stderr.contains("FATAL EXIT CODE: 2"));
}

#[test]
fn run_rejects_unknown_scenario_filter() {
    let output = run(snpcheck().args(["run", "--scenario", "no_such_scenario"]));

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown scenario 'no_such_scenario'"));
    assert!(stderr.contains("FATAL EXIT CODE: 2"));
}

#[test]
fn scenarios_command_lists_standard_matrix() {
    let output = run(snpcheck().arg("scenarios"));

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.lines().count(), 9);
    assert!(stdout.contains("nogender: expects success"));
    assert!(stdout.contains("gender_special_forced: expects success"));
    assert!(stdout.contains("one_sample: expects engine failure"));
}

#[cfg(unix)]
mod engine_runs {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;

    const DATA_NAMES: [&str; 4] = [
        "nogender",
        "gender_mono",
        "gender_two_cluster",
        "gender_special",
    ];

    #[test]
    fn run_command_passes_and_writes_report_when_outputs_match_goldens() {
        let temp = TempDir::new().expect("tempdir should be created");
        let expected_dir = temp.path().join("expected");
        write_goldens(&expected_dir, 0.0);
        let engine = write_replay_engine(&temp, &expected_dir);
        let report_path = temp.path().join("artifacts/report.json");

        let output = run(snpcheck()
            .env("RUST_LOG", "info")
            .arg("run")
            .arg("--engine")
            .arg(&engine)
            .arg("--input-dir")
            .arg(temp.path().join("inputs"))
            .arg("--expected-dir")
            .arg(&expected_dir)
            .arg("--scratch-dir")
            .arg(temp.path().join("scratch"))
            .arg("--report")
            .arg(&report_path));

        let stdout = String::from_utf8_lossy(&output.stdout);
        assert_eq!(output.status.code(), Some(0), "stdout: {stdout}");
        assert!(stdout.contains("Suite status: PASS"));
        assert!(stdout.contains("Scenarios: 9 total (9 passed, 0 failed)"));

        // Logs go to stderr so the summary on stdout stays machine-friendly.
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("starting suite"));

        let report: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(&report_path).expect("report should be written"),
        )
        .expect("report should be valid JSON");
        assert_eq!(report["passed"], serde_json::Value::Bool(true));
        assert_eq!(report["scenario_count"], serde_json::json!(9));
    }

    #[test]
    fn run_command_fails_on_confidence_drift() {
        let temp = TempDir::new().expect("tempdir should be created");
        let expected_dir = temp.path().join("expected");
        let engine_src = temp.path().join("engine-src");
        write_goldens(&expected_dir, 0.0);
        write_goldens(&engine_src, 0.001);
        let engine = write_replay_engine(&temp, &engine_src);

        let output = run(snpcheck()
            .arg("run")
            .arg("--engine")
            .arg(&engine)
            .arg("--input-dir")
            .arg(temp.path().join("inputs"))
            .arg("--expected-dir")
            .arg(&expected_dir)
            .arg("--scratch-dir")
            .arg(temp.path().join("scratch"))
            .arg("--report")
            .arg(temp.path().join("artifacts/report.json"))
            .args(["--scenario", "nogender"]));

        assert_eq!(output.status.code(), Some(1));
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("Suite status: FAIL"));
        assert!(stdout.contains("Scenario nogender: FAIL"));
    }

    #[test]
    fn run_command_passes_with_widened_confidence_epsilon() {
        let temp = TempDir::new().expect("tempdir should be created");
        let expected_dir = temp.path().join("expected");
        let engine_src = temp.path().join("engine-src");
        write_goldens(&expected_dir, 0.0);
        write_goldens(&engine_src, 0.001);
        let engine = write_replay_engine(&temp, &engine_src);

        let output = run(snpcheck()
            .arg("run")
            .arg("--engine")
            .arg(&engine)
            .arg("--input-dir")
            .arg(temp.path().join("inputs"))
            .arg("--expected-dir")
            .arg(&expected_dir)
            .arg("--scratch-dir")
            .arg(temp.path().join("scratch"))
            .arg("--report")
            .arg(temp.path().join("artifacts/report.json"))
            .args(["--confidence-epsilon", "0.01"])
            .args(["--scenario", "nogender"]));

        assert_eq!(output.status.code(), Some(0));
    }

    fn write_replay_engine(temp: &TempDir, src_dir: &Path) -> PathBuf {
        let script = format!(
            "#!/bin/sh\n\
             intensities=\"$1\"; calls_out=\"$2\"; conf_out=\"$3\"; shift 3\n\
             clusters_out=\"\"\n\
             while [ \"$#\" -gt 0 ]; do\n\
             \x20 case \"$1\" in\n\
             \x20   --write-clusters) clusters_out=\"$2\"; shift 2 ;;\n\
             \x20   --chrX-snps|--special-snps|--clusters|--priors-text|--gender-file|-c|-v) shift 2 ;;\n\
             \x20   *) shift ;;\n\
             \x20 esac\n\
             done\n\
             base=$(basename \"$intensities\" .intensities)\n\
             if [ \"$base\" = \"one_sample\" ]; then\n\
             \x20 echo \"Not enough samples to clusters.  6 are needed but there are only 1.\" >&2\n\
             \x20 exit 1\n\
             fi\n\
             cp \"{src}/$base.calls\" \"$calls_out\" || exit 2\n\
             cp \"{src}/$base.confidences\" \"$conf_out\" || exit 2\n\
             if [ -n \"$clusters_out\" ]; then\n\
             \x20 cp \"{src}/$base.clusters\" \"$clusters_out\" || exit 2\n\
             fi\n\
             exit 0\n",
            src = src_dir.display()
        );
        let path = temp.path().join("replay-engine.sh");
        fs::write(&path, script).expect("script should be written");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
            .expect("script should be executable");
        path
    }

    fn write_goldens(dir: &Path, confidence_shift: f64) {
        fs::create_dir_all(dir).expect("golden dir should be created");
        for name in DATA_NAMES {
            write_file(
                &dir.join(format!("{name}.calls")),
                "SNP_A-1\t0\t1\t2\nSNP_A-2\t2\t-1\t0\n",
            );
            write_file(
                &dir.join(format!("{name}.confidences")),
                &format!(
                    "probeset_id\tS1\tS2\tS3\nSNP_A-1\t{:.6}\t{:.6}\t{:.6}\n",
                    0.001 + confidence_shift,
                    0.002,
                    0.003,
                ),
            );
            write_file(
                &dir.join(format!("{name}.clusters")),
                "SNP_A-1 1.0000 2.0000;3.0000 4.0000\n",
            );
        }
    }
}
