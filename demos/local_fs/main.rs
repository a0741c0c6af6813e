//! Drives the cache engine against an ordinary local directory standing in
//! for a remote compiler share, the same shortcut `LocalUpstreamReader`
//! documents. Grounded on the teacher crate's `examples/shadow_fs/main.rs`,
//! which prints the directory a demo filesystem is rooted at before
//! driving it.

use std::path::PathBuf;
use std::sync::Arc;

use compiler_cache_fs::config::CrateConfig;
use compiler_cache_fs::context::Context;
use compiler_cache_fs::facade::{self, AccessFlags};
use compiler_cache_fs::upstream::LocalUpstreamReader;

#[tokio::main]
async fn main() {
    let dir = std::env::args().nth(1).expect("must supply a directory to expose as /compiler");
    let dir = PathBuf::from(dir);

    let toml =
        "[global]\ndownload_threads = 2\n\n[[compiler_root]]\nvirtual_root = \"/compiler\"\nupstream_root = \".\"\ncache_always = [\"bin/**/*\"]\n";
    let config = CrateConfig::parse(toml).expect("demo config is valid");

    println!("mounting {} at /compiler", dir.display());
    let upstream: Arc<dyn compiler_cache_fs::upstream::UpstreamReader + Send + Sync> =
        Arc::new(LocalUpstreamReader::new(&dir));
    let context = Arc::new(Context::build_with_defaults(config, upstream).await);
    let facade = compiler_cache_fs::Facade::new(context.clone());

    println!("directory tree has {} nodes", context.tree.node_count());
    for entry in facade::read_directory(&facade, "/compiler", None).expect("list root") {
        println!("  {} ({} bytes)", entry.name, entry.size);
    }

    if let Some(first_file) = facade::read_directory(&facade, "/compiler", None)
        .unwrap()
        .into_iter()
        .find(|e| !e.is_directory)
    {
        let path = format!("/compiler/{}", first_file.name);
        let handle = facade::open(&facade, &path, AccessFlags::read_only()).expect("open");

        loop {
            match facade::read(&facade, &handle, 0, 64).await.expect("read") {
                facade::ReadOutcome::Bytes(bytes) => {
                    println!("read {} bytes from {path}: {:?}", bytes.len(), String::from_utf8_lossy(&bytes));
                    break;
                }
                facade::ReadOutcome::Pending => {
                    println!("fetch pending, retrying shortly...");
                    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                }
            }
        }

        facade::close(&facade, handle);
    } else {
        println!("no files found under {}", dir.display());
    }

    context.shutdown().await;
}
