/*!
 * Sandbox Filesystem Tests
 * Mirror passthrough, guest visibility, snapshots and change events
 */

use crate::common::guests;
use pretty_assertions::assert_eq;
use sandbox_kernel::core::errors::Errno;
use sandbox_kernel::vfs::FsEvent;
use sandbox_kernel::{Sandbox, SandboxConfig, SandboxError, VfsSnapshot};
use std::time::Duration;

async fn boot_with(config: SandboxConfig) -> Sandbox {
    Sandbox::boot(config, guests()).await.unwrap()
}

async fn next_event(rx: &flume::Receiver<FsEvent>) -> FsEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv_async())
        .await
        .expect("fs event in time")
        .expect("watch stream open")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_seed_files_and_cwd() -> anyhow::Result<()> {
    let config = SandboxConfig {
        cwd: "/work".into(),
        ..Default::default()
    }
    .with_file("/work/readme.md", "# seeded");
    let sandbox = boot_with(config).await;

    assert_eq!(sandbox.read_file("/work/readme.md")?, "# seeded");
    assert_eq!(sandbox.readdir("/work")?, vec!["readme.md".to_string()]);

    let output = sandbox.exec_output("pwd", &[]).await?;
    assert_eq!(output.stdout_text(), "/work\n");
    let output = sandbox.exec_output("show", &["/work/readme.md"]).await?;
    assert_eq!(output.stdout_text(), "# seeded");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_controller_writes_reach_guests() -> anyhow::Result<()> {
    let sandbox = boot_with(SandboxConfig::default()).await;
    sandbox.mkdir("/app/src", true).await?;
    sandbox.write_file("/app/src/index.js", "console.log(1)").await?;

    assert!(sandbox.exists("/app/src/index.js")?);
    assert_eq!(sandbox.stat("/app/src/index.js")?.size, 14);
    let output = sandbox.exec_output("show", &["/app/src/index.js"]).await?;
    assert_eq!(output.stdout_text(), "console.log(1)");

    sandbox.rename("/app/src/index.js", "/app/main.js").await?;
    assert!(!sandbox.exists("/app/src/index.js")?);
    assert_eq!(sandbox.exec("show", &["/app/main.js"]).await?, 0);
    assert_eq!(sandbox.exec("show", &["/app/src/index.js"]).await?, 1);

    sandbox.unlink("/app/main.js").await?;
    assert_eq!(sandbox.exec("show", &["/app/main.js"]).await?, 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_fs_errors_carry_codes() {
    let sandbox = boot_with(SandboxConfig::default()).await;

    let err = sandbox.read_file("/missing").unwrap_err();
    assert_eq!(err.errno(), Errno::Noent);

    let err = sandbox.mkdir("/a/b", false).await.unwrap_err();
    assert_eq!(err.errno(), Errno::Noent);

    sandbox.mkdir("/dir", false).await.unwrap();
    let err = sandbox.mkdir("/dir", false).await.unwrap_err();
    assert_eq!(err.errno(), Errno::Exist);

    let err = sandbox.unlink("/dir").await.unwrap_err();
    assert_eq!(err.errno(), Errno::Isdir);
    assert!(matches!(err, SandboxError::Fs(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_guest_writes_need_sync() -> anyhow::Result<()> {
    let sandbox = boot_with(SandboxConfig::default()).await;
    assert_eq!(sandbox.exec("touch", &["/out.txt", "from guest"]).await?, 0);

    // Reads come from the mirror, which has not seen the guest's write
    assert!(!sandbox.exists("/out.txt")?);

    let snapshot = sandbox.save().await?;
    assert_eq!(snapshot.get("/out.txt").unwrap(), b"from guest");

    sandbox.sync().await?;
    assert_eq!(sandbox.read_file("/out.txt")?, "from guest");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_watch_sees_guest_changes() -> anyhow::Result<()> {
    let sandbox = boot_with(SandboxConfig::default()).await;
    let events = sandbox.watch()?;

    sandbox.exec("touch", &["/made.txt", "x"]).await?;
    assert_eq!(
        next_event(&events).await,
        FsEvent::Create {
            path: "/made.txt".into()
        }
    );

    sandbox.unlink("/missing").await.unwrap_err();
    sandbox.write_file("/made.txt", "y").await?;
    sandbox.rename("/made.txt", "/moved.txt").await?;
    assert_eq!(
        next_event(&events).await,
        FsEvent::Move {
            from: "/made.txt".into(),
            to: "/moved.txt".into()
        }
    );

    sandbox.dispose();
    assert!(events.recv_async().await.is_err());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_save_restore_and_mount() -> anyhow::Result<()> {
    let sandbox = boot_with(SandboxConfig::default().with_file("/keep.txt", "kept")).await;
    let project = VfsSnapshot::from_files([("/package.json", "{}"), ("/src/app.js", "app")]);

    sandbox.mount("/project", &project).await?;
    assert_eq!(sandbox.read_file("/project/src/app.js")?, "app");
    assert_eq!(sandbox.exec("show", &["/project/package.json"]).await?, 0);

    let saved = sandbox.save().await?;
    let mut paths: Vec<&str> = saved.files.keys().map(String::as_str).collect();
    paths.sort_unstable();
    assert_eq!(
        paths,
        vec!["/keep.txt", "/project/package.json", "/project/src/app.js"]
    );

    // Restore into a second instance
    let other = boot_with(SandboxConfig::default()).await;
    other.restore(&saved).await?;
    assert_eq!(other.read_file("/keep.txt")?, "kept");
    let output = other.exec_output("show", &["/project/src/app.js"]).await?;
    assert_eq!(output.stdout_text(), "app");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_module_cache_follows_writes() -> anyhow::Result<()> {
    let sandbox = boot_with(SandboxConfig::default()).await;
    sandbox.write_file("/lib.js", "export const v = 1;").await?;
    let first = sandbox.modules().load("/lib.js", None)?;
    assert!(first.source.contains("v = 1"));

    sandbox.write_file("/lib.js", "export const v = 2;").await?;
    let second = sandbox.modules().load("./lib.js", Some("/main.js"))?;
    assert!(second.source.contains("v = 2"));
    Ok(())
}
