//! Concurrent clients sharing a small pool of connections to an in-memory key-value backend.
//!
//! Every tenth connection breaks after a couple of requests, so validation and eviction can be
//! seen in the logs.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use clap::Parser;
use dbpool::{Credentials, DbPoolConfig, ResourceFactory};
use parking_lot::Mutex;
use tracing::{info, warn};

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file.
    #[arg(
        short,
        long,
        value_name = "FILE",
        default_value = "demos/basic/config.yaml",
        env = "DBPOOL_DEMO_CONFIG_FILE"
    )]
    config_file: String,
    /// Number of client threads.
    #[arg(short, long, default_value_t = 8)]
    workers: usize,
    /// Number of requests sent by each client.
    #[arg(short, long, default_value_t = 50)]
    requests: usize,
}

/// Backend error type.
#[derive(Debug, thiserror::Error)]
enum KvError {
    #[error("connection {0} is broken")]
    Broken(usize),
    #[error("authentication required")]
    Auth,
}

/// Shared in-memory storage.
#[derive(Debug, Default)]
struct Storage {
    data: Mutex<HashMap<String, u64>>,
}

/// Connection to in-memory storage.
#[derive(Debug)]
struct KvConnection {
    serial: usize,
    storage: Arc<Storage>,
    uses: usize,
    breaks_after: Option<usize>,
}

impl KvConnection {
    fn is_broken(&self) -> bool {
        self.breaks_after.is_some_and(|limit| self.uses >= limit)
    }

    /// Increment a counter, returning its new value.
    fn incr(&mut self, key: &str) -> Result<u64, KvError> {
        self.uses += 1;
        if self.is_broken() {
            return Err(KvError::Broken(self.serial));
        }
        let mut data = self.storage.data.lock();
        let value = data.entry(key.to_owned()).or_default();
        *value += 1;
        Ok(*value)
    }
}

/// Opens connections to in-memory storage.
#[derive(Debug)]
struct KvFactory {
    storage: Arc<Storage>,
    opened: AtomicUsize,
}

impl ResourceFactory for KvFactory {
    type Handle = KvConnection;
    type Error = KvError;

    fn open(&self, credentials: Option<&Credentials>) -> Result<Self::Handle, Self::Error> {
        if credentials.is_none() {
            return Err(KvError::Auth);
        }
        let serial = self.opened.fetch_add(1, Ordering::Relaxed);
        Ok(KvConnection {
            serial,
            storage: self.storage.clone(),
            uses: 0,
            breaks_after: (serial % 10 == 9).then_some(3),
        })
    }

    fn is_valid(&self, handle: &mut Self::Handle, _timeout: Duration) -> bool {
        !handle.is_broken()
    }
}

/// Application entry point.
fn main() -> Result<(), anyhow::Error> {
    let args = Args::parse();
    // Merge, load and deserialize configuration.
    let config = DbPoolConfig::builder()
        .with_file(&args.config_file)
        .with_env("DBPOOL_DEMO")
        .build()?;
    // Logging works until the guards are dropped.
    let _guards = config.logging.init()?;
    let storage = Arc::new(Storage::default());
    let factory = KvFactory {
        storage: storage.clone(),
        opened: AtomicUsize::new(0),
    };
    let pool = config.build_pool("kv", factory)?;
    let pool = &pool;
    thread::scope(|s| {
        for worker in 0..args.workers {
            s.spawn(move || {
                for request in 0..args.requests {
                    let mut conn = match pool.acquire() {
                        Ok(conn) => conn,
                        Err(err) => {
                            warn!(worker, error = %err, "unable to get connection");
                            continue;
                        }
                    };
                    if let Err(err) = conn.incr(&format!("key-{}", request % 5)) {
                        warn!(worker, error = %err, "request failed, evicting connection");
                        conn.mark_evicted();
                    }
                    thread::sleep(Duration::from_millis(2));
                }
            });
        }
    });
    let state = pool.state();
    let served: u64 = storage.data.lock().values().sum();
    info!(
        served,
        total = state.size,
        idle = state.idle,
        in_use = state.in_use,
        "load finished"
    );
    pool.close();
    Ok(())
}
