//! End-to-end tests: scripts driving a fake simulator over loopback, and the
//! `simscript` binary's process contract.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::process::Command;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use simscript::config::Catalog;
use simscript::link::LinkError;
use simscript::script::{Interpreter, ScriptError};

fn catalog(paths: &[&str]) -> Catalog {
    Catalog::new(paths.iter().map(|&p| p.to_owned()).collect())
}

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port()
}

/// Connect to `port`, retrying until the data server is listening.
fn dial(port: u16) -> TcpStream {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        match TcpStream::connect(("127.0.0.1", port)) {
            Ok(s) => return s,
            Err(e) if Instant::now() > deadline => panic!("cannot reach data server: {e}"),
            Err(_) => thread::sleep(Duration::from_millis(10)),
        }
    }
}

fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}

/// Accept one control connection and collect everything written to it.
fn fake_control_port() -> (u16, thread::JoinHandle<String>) {
    let sim = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = sim.local_addr().unwrap().port();
    let reader = thread::spawn(move || {
        let (mut conn, _) = sim.accept().unwrap();
        let mut got = String::new();
        conn.read_to_string(&mut got).unwrap();
        got
    });
    (port, reader)
}

// ── Simulator link ────────────────────────────────────────────────────────────

#[test]
fn push_on_write_assignment_reaches_simulator() {
    let (port, reader) = fake_control_port();
    let mut interp = Interpreter::with_writer(Catalog::default(), Vec::new());
    let src = format!(
        "connectControlClient(\"127.0.0.1\", {port})\n\
         var r -> sim(\"/controls/flight/rudder\")\n\
         r = 0.5\n"
    );
    interp.run_source(&src).unwrap();
    interp.shutdown();

    assert_eq!(reader.join().unwrap(), "set /controls/flight/rudder 0.500000\r\n");
}

#[test]
fn data_server_feeds_pull_on_read_variables() {
    let port = free_port();
    let (done_tx, done_rx) = mpsc::channel::<()>();
    let feeder = thread::spawn(move || {
        let mut sock = dial(port);
        sock.write_all(b"1.0,2.0,3.0\n").unwrap();
        // Hold the connection until the script has looked.
        let _ = done_rx.recv_timeout(Duration::from_secs(5));
    });

    let mut interp = Interpreter::with_writer(catalog(&["/a", "/b", "/c", "/d"]), Vec::new());
    interp
        .run_source(&format!(
            "openDataServer({port})\nvar b <- sim(\"/b\")\nvar d <- sim(\"/d\")\n"
        ))
        .unwrap();

    assert!(wait_until(|| interp.var("b") == Some(2.0)));
    assert_eq!(interp.var("d"), Some(0.0));

    interp.run_source("Print(b*10)\n").unwrap();
    assert_eq!(interp.writer().as_slice(), b"20\n");

    done_tx.send(()).unwrap();
    interp.shutdown();
    feeder.join().unwrap();
}

#[test]
fn script_reacts_to_telemetry() {
    let data_port = free_port();
    let (control_port, reader) = fake_control_port();

    let feeder = thread::spawn(move || {
        let mut sock = dial(data_port);
        sock.write_all(b"5\n").unwrap();
        thread::sleep(Duration::from_millis(150));
        sock.write_all(b"20\n").unwrap();
        sock
    });

    let src = format!(
        "openDataServer({data_port})\n\
         connectControlClient(\"127.0.0.1\", {control_port})\n\
         var alt <- sim(\"/alt\")\n\
         var thr -> sim(\"/thr\")\n\
         while alt < 1 {{\n\tSleep(5)\n}}\n\
         while alt < 10 {{\n\tthr = alt\n\tSleep(20)\n}}\n\
         Print(alt)\n"
    );
    let mut interp = Interpreter::with_writer(catalog(&["/alt"]), Vec::new());
    interp.run_source(&src).unwrap();
    interp.shutdown();
    let _sock = feeder.join().unwrap();

    assert_eq!(interp.writer().as_slice(), b"20\n");
    let sent = reader.join().unwrap();
    let lines: Vec<&str> = sent.split_inclusive("\r\n").collect();
    assert!(!lines.is_empty());
    assert_eq!(lines[0], "set /thr 5.000000\r\n");
    assert!(lines
        .iter()
        .all(|l| *l == "set /thr 5.000000\r\n" || *l == "set /thr 20.000000\r\n"));
}

#[test]
fn port_in_use_is_a_connection_error() {
    let taken = TcpListener::bind("0.0.0.0:0").unwrap();
    let port = taken.local_addr().unwrap().port();

    let mut interp = Interpreter::with_writer(Catalog::default(), Vec::new());
    let err = interp
        .run_source(&format!("openDataServer({port})\nPrint(\"unreachable\")\n"))
        .unwrap_err();

    assert!(matches!(err, ScriptError::Connection(LinkError::Bind { port: p, .. }) if p == port));
    assert!(interp.writer().is_empty());
}

// ── Binary ────────────────────────────────────────────────────────────────────

fn simscript() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_simscript"));
    cmd.env_remove("RUST_LOG").env_remove("SIMSCRIPT_CATALOG");
    cmd
}

#[test]
fn missing_argument_prints_no_file() {
    let out = simscript().output().unwrap();
    assert!(out.status.success());
    assert_eq!(String::from_utf8_lossy(&out.stdout), "No file\n");
}

#[test]
fn unreadable_script_prints_file_not_found() {
    let out = simscript().arg("/definitely/not/a/script.txt").output().unwrap();
    assert!(out.status.success());
    assert_eq!(String::from_utf8_lossy(&out.stdout), "File not found\n");
}

#[test]
fn runs_script_file() {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    write!(f, "var x = 6\nwhile x < 8 {{\nx = x+1\n}}\nPrint(x)\nPrint(\"ok\")\n").unwrap();
    let out = simscript().arg("-q").arg(f.path()).output().unwrap();
    assert!(out.status.success());
    assert_eq!(String::from_utf8_lossy(&out.stdout), "8\nok\n");
}

#[test]
fn fatal_error_exits_nonzero() {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    write!(f, "Print(1)\nnope = 2\n").unwrap();
    let out = simscript().arg("-q").arg(f.path()).output().unwrap();
    assert_eq!(out.status.code(), Some(1));
    assert_eq!(String::from_utf8_lossy(&out.stdout), "1\n");
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("simscript: token 5: unknown variable `nope`"), "{stderr}");
}

#[test]
fn bad_option_exits_nonzero() {
    let out = simscript().arg("-z").output().unwrap();
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("Usage:"));
}
