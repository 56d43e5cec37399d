/*!
 * Shared test fixtures
 * Host transports and guest programs
 */

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use sandbox_kernel::core::errors::Errno;
use sandbox_kernel::network::{
    FetchRequest, HttpResponse, HttpTransport, SocketError, SocketResult, StreamConnection,
    StreamTransport,
};
use sandbox_kernel::syscalls::{GuestHost, GuestMemoryExt, LinearMemory, Trap};
use sandbox_kernel::GuestRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use url::Url;

/// Records each fetch and answers with a fixed response
#[derive(Default)]
pub struct MockHttp {
    pub requests: Mutex<Vec<FetchRequest>>,
    pub delay: Option<Duration>,
    pub fail: Option<SocketError>,
    pub body: Option<Bytes>,
}

impl MockHttp {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(err: SocketError) -> Arc<Self> {
        Arc::new(Self {
            fail: Some(err),
            ..Default::default()
        })
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Default::default()
        })
    }

    /// Answer every fetch with `len` bytes of a repeating alphabet
    pub fn sized(len: usize) -> Arc<Self> {
        let body: Vec<u8> = (b'a'..=b'z').cycle().take(len).collect();
        Arc::new(Self {
            body: Some(Bytes::from(body)),
            ..Default::default()
        })
    }

    pub fn count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl HttpTransport for MockHttp {
    async fn fetch(&self, request: FetchRequest) -> SocketResult<HttpResponse> {
        let body = format!("{} {}", request.method, request.url.path());
        self.requests.lock().push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = &self.fail {
            return Err(err.clone());
        }
        let body = self.body.clone().unwrap_or_else(|| Bytes::from(body));
        Ok(HttpResponse::new(200, "OK", body).with_header("x-mock", "1"))
    }
}

/// Echo stream: every outgoing frame comes back prefixed with "echo:"
#[derive(Default)]
pub struct EchoStream {
    pub opened: Mutex<Vec<Url>>,
}

#[async_trait]
impl StreamTransport for EchoStream {
    async fn open(&self, url: &Url) -> SocketResult<StreamConnection> {
        self.opened.lock().push(url.clone());
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Bytes>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<Bytes>();
        let task = tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                let mut echoed = b"echo:".to_vec();
                echoed.extend_from_slice(&frame);
                if in_tx.send(Bytes::from(echoed)).is_err() {
                    break;
                }
            }
        });
        Ok(StreamConnection {
            outgoing: out_tx,
            incoming: in_rx,
            tasks: vec![task.abort_handle()],
        })
    }
}

/// Stream transport that refuses every connection
pub struct RefusingStream;

#[async_trait]
impl StreamTransport for RefusingStream {
    async fn open(&self, url: &Url) -> SocketResult<StreamConnection> {
        Err(SocketError::Refused(url.to_string()))
    }
}

// =============================================================================
// GUEST PROGRAMS
// =============================================================================

fn mem_fault(errno: Errno) -> Trap {
    Trap::fault(format!("memory access failed: {errno}"))
}

/// Prints its arguments separated by spaces
pub fn echo(host: &mut GuestHost) -> Result<(), Trap> {
    let line = format!("{}\n", host.args()[1..].join(" "));
    host.print(line.as_bytes());
    Ok(())
}

/// Copies stdin to stdout through `fd_read`
pub fn cat(host: &mut GuestHost) -> Result<(), Trap> {
    const IOV: u32 = 0;
    const NREAD: u32 = 8;
    const BUF: u32 = 64;
    let mut mem = LinearMemory::new(1024);
    mem.write_u32(IOV, BUF).map_err(mem_fault)?;
    mem.write_u32(IOV + 4, 256).map_err(mem_fault)?;
    loop {
        let errno = host.fd_read(&mut mem, 0, IOV, 1, NREAD)?;
        if errno != Errno::Success {
            return Err(Trap::Exit(errno as i32));
        }
        let n = mem.read_u32(NREAD).map_err(mem_fault)?;
        if n == 0 {
            return Ok(());
        }
        let chunk = mem.slice(BUF, n).map_err(mem_fault)?.to_vec();
        host.print(&chunk);
    }
}

/// Prints the file named by its first argument, or exits 1
pub fn show(host: &mut GuestHost) -> Result<(), Trap> {
    let path = host.args().get(1).cloned().unwrap_or_default();
    let contents = host.fs().lock().read_file(&path);
    match contents {
        Ok(text) => {
            host.print(text.as_bytes());
            Ok(())
        }
        Err(err) => {
            host.eprint(format!("{err}\n").as_bytes());
            Err(Trap::Exit(1))
        }
    }
}

/// Writes its second argument to the path in its first
pub fn touch(host: &mut GuestHost) -> Result<(), Trap> {
    let path = host.args().get(1).cloned().unwrap_or_default();
    let data = host.args().get(2).cloned().unwrap_or_default();
    host.fs()
        .lock()
        .write_file(&path, data)
        .map_err(|_| Trap::Exit(1))
}

/// Spins until killed, giving up after ten seconds
pub fn spin(host: &mut GuestHost) -> Result<(), Trap> {
    for _ in 0..2000 {
        host.check_killed()?;
        std::thread::sleep(Duration::from_millis(5));
    }
    Err(Trap::Exit(2))
}

/// Registry with every test guest plus `fail` and `exit3`
pub fn guests() -> GuestRegistry {
    GuestRegistry::new()
        .with_fn("echo", echo)
        .with_fn("cat", cat)
        .with_fn("show", show)
        .with_fn("touch", touch)
        .with_fn("spin", spin)
        .with_fn("pwd", |host| {
            let line = format!("{}\n", host.cwd());
            host.print(line.as_bytes());
            Ok(())
        })
        .with_fn("fail", |host| {
            host.eprint(b"about to fault\n");
            Err(Trap::fault("boom"))
        })
        .with_fn("exit3", |_| Err(Trap::Exit(3)))
}
