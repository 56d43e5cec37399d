/*!
 * Sandbox Lifecycle Tests
 * Boot, exec, spawn, kill and dispose against real execution contexts
 */

use crate::common::{guests, MockHttp};
use pretty_assertions::assert_eq;
use sandbox_kernel::core::errors::Errno;
use sandbox_kernel::network::{HostPolicy, HttpSocketProxy};
use sandbox_kernel::syscalls::{GuestMemoryExt, LinearMemory, Trap};
use sandbox_kernel::{Sandbox, SandboxConfig, SandboxError, SandboxState};
use std::sync::Arc;
use std::time::Duration;

async fn boot() -> Sandbox {
    Sandbox::boot(SandboxConfig::default(), guests()).await.unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_boot_reaches_ready() -> anyhow::Result<()> {
    let sandbox = boot().await;
    assert_eq!(sandbox.state(), SandboxState::Ready);
    assert_eq!(sandbox.running(), 0);
    assert!(!sandbox.id().is_empty());
    assert!(sandbox.router().is_registered(sandbox.id()));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_exec_exit_codes() -> anyhow::Result<()> {
    let sandbox = boot().await;
    assert_eq!(sandbox.exec("echo", &["hi"]).await?, 0);
    assert_eq!(sandbox.exec("exit3", &[]).await?, 3);
    assert_eq!(sandbox.exec("no-such-command", &[]).await?, 127);
    assert_eq!(sandbox.state(), SandboxState::Ready);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_exec_output_captures_streams() -> anyhow::Result<()> {
    let sandbox = boot().await;
    let output = sandbox.exec_output("echo", &["hello", "world"]).await?;
    assert!(output.success());
    assert_eq!(output.stdout_text(), "hello world\n");
    assert!(output.stderr.is_empty());

    let output = sandbox.exec_output("missing", &[]).await?;
    assert_eq!(output.code, 127);
    assert_eq!(output.stderr_text(), "missing: command not found\n");

    // exec closes stdin, so cat sees end of input at once
    let output = sandbox.exec_output("cat", &[]).await?;
    assert_eq!(output.code, 0);
    assert!(output.stdout.is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_guest_fault_is_an_error() {
    let sandbox = boot().await;
    let err = sandbox.exec("fail", &[]).await.unwrap_err();
    assert_eq!(err, SandboxError::GuestFault("boom".into()));
    assert_eq!(err.errno(), Errno::Notconn);

    // The instance survives a faulting guest
    assert_eq!(sandbox.exec("echo", &[]).await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_spawn_streams_stdin_to_stdout() -> anyhow::Result<()> {
    let sandbox = boot().await;
    let mut handle = sandbox.spawn("cat", &[])?;
    assert_eq!(sandbox.state(), SandboxState::Executing);

    handle.write_stdin("first ")?;
    let chunk = tokio::time::timeout(Duration::from_secs(5), handle.stdout().recv_async())
        .await??;
    assert_eq!(chunk, b"first ");

    handle.write_stdin(b"second".to_vec())?;
    handle.close_stdin()?;
    assert_eq!(handle.exited().await?, 0);
    assert_eq!(handle.drain_stdout(), b"second");

    // The exit code is remembered
    assert_eq!(handle.exited().await?, 0);
    assert_eq!(sandbox.state(), SandboxState::Ready);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_kill_exits_137() -> anyhow::Result<()> {
    let sandbox = boot().await;
    let mut handle = sandbox.spawn("spin", &[])?;
    assert_eq!(sandbox.running(), 1);
    handle.kill()?;
    let code = tokio::time::timeout(Duration::from_secs(5), handle.exited()).await??;
    assert_eq!(code, 137);
    assert_eq!(sandbox.running(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_abandoned_wait_keeps_exit_code() -> anyhow::Result<()> {
    let sandbox = boot().await;
    let mut handle = sandbox.spawn("spin", &[])?;

    let early = tokio::time::timeout(Duration::from_millis(20), handle.exited()).await;
    assert!(early.is_err(), "spin exited early: {early:?}");

    handle.kill()?;
    let code = tokio::time::timeout(Duration::from_secs(5), handle.exited()).await??;
    assert_eq!(code, 137);
    assert!(!sandbox.is_disposed());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_processes() -> anyhow::Result<()> {
    let sandbox = boot().await;
    let mut spinner = sandbox.spawn("spin", &[])?;
    let (a, b) = tokio::join!(
        sandbox.exec_output("echo", &["a"]),
        sandbox.exec_output("echo", &["b"])
    );
    assert_eq!(a?.stdout_text(), "a\n");
    assert_eq!(b?.stdout_text(), "b\n");
    assert_eq!(sandbox.state(), SandboxState::Executing);

    spinner.kill()?;
    assert_eq!(spinner.exited().await?, 137);
    assert_eq!(sandbox.state(), SandboxState::Ready);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dispose_fails_pending_and_later_calls() {
    let sandbox = boot().await;
    let id = sandbox.id().to_string();
    let mut handle = sandbox.spawn("spin", &[]).unwrap();

    sandbox.dispose();
    assert!(sandbox.is_disposed());
    assert!(!sandbox.router().is_registered(&id));
    assert_eq!(handle.exited().await, Err(SandboxError::Disposed));

    assert_eq!(sandbox.exec("echo", &[]).await, Err(SandboxError::Disposed));
    assert!(matches!(sandbox.spawn("echo", &[]), Err(SandboxError::Disposed)));
    assert!(matches!(sandbox.read_file("/x"), Err(SandboxError::Disposed)));
    assert_eq!(
        sandbox.write_file("/x", "data").await,
        Err(SandboxError::Disposed)
    );

    // Disposing twice is harmless
    sandbox.dispose();
    assert_eq!(sandbox.state(), SandboxState::Disposed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_guest_fetch_through_socket_proxy() -> anyhow::Result<()> {
    let transport = MockHttp::new();
    let proxy = Arc::new(HttpSocketProxy::new(
        HostPolicy::allowlist(["api.example.com"]),
        transport.clone(),
    ));
    let registry = guests().with_fn("fetch", |host| {
        let mut mem = LinearMemory::new(4096);
        let fault = |errno: Errno| Trap::fault(errno.to_string());
        let expect = |errno: Errno| match errno {
            Errno::Success => Ok(()),
            other => Err(Trap::Exit(other as i32)),
        };

        expect(host.sock_open(&mut mem, 0, 0, 0)?)?;
        let fd = mem.read_u32(0).map_err(fault)?;
        let name = host.args().get(1).cloned().unwrap_or_default();
        mem.write_bytes(16, name.as_bytes()).map_err(fault)?;
        expect(host.sock_connect(&mut mem, fd, 16, name.len() as u32, 80)?)?;

        let request = format!("GET /status HTTP/1.1\r\nHost: {name}\r\n\r\n");
        mem.write_bytes(128, request.as_bytes()).map_err(fault)?;
        expect(host.sock_send(&mut mem, fd, 128, request.len() as u32, 4)?)?;
        expect(host.sock_flush(fd)?)?;

        loop {
            expect(host.sock_recv(&mut mem, fd, 1024, 2048, 8)?)?;
            let n = mem.read_u32(8).map_err(fault)?;
            if n == 0 {
                break;
            }
            let chunk = mem.slice(1024, n).map_err(fault)?.to_vec();
            host.print(&chunk);
        }
        expect(host.sock_close(fd)?)
    });

    let sandbox = Sandbox::builder(SandboxConfig::default())
        .guests(registry)
        .socket_proxy(proxy)
        .boot()
        .await?;

    let output = sandbox.exec_output("fetch", &["api.example.com"]).await?;
    assert_eq!(output.code, 0);
    let text = output.stdout_text();
    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"), "{text}");
    assert!(text.ends_with("GET /status"), "{text}");
    assert_eq!(transport.count(), 1);

    // Blocked hosts surface as EACCES to the guest
    let code = sandbox.exec("fetch", &["evil.example.org"]).await?;
    assert_eq!(code, Errno::Acces as i32);
    assert_eq!(transport.count(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_boot_timeout() {
    let config = SandboxConfig::default().with_boot_timeout(Duration::ZERO);
    let err = Sandbox::boot(config, guests()).await.unwrap_err();
    assert_eq!(err, SandboxError::BootTimeout(Duration::ZERO));
}
