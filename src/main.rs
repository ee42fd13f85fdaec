//! Worker binary
//!
//! Spawns the worker pool over an in-process transport and feeds it jobs
//! from stdin, one JSON envelope per line:
//!
//! ```text
//! {"id":"j1","queue":"analyze","payload":{"projectId":"p1","trackId":"t1","filePath":"projects/p1/t1.mp3"}}
//! ```
//!
//! Results are printed to stdout as JSON lines. The broker-backed transport
//! of a full deployment plugs in behind the same `JobTransport` seam. On
//! stdin EOF the job channel closes, workers drain and the process exits 0.

use std::io::BufRead;
use std::sync::Arc;

use serde::Deserialize;

use segue::config::SETTINGS;
use segue::worker::{spawn_workers, ChannelTransport, JobTransport, QueueName, Worker};

#[derive(Deserialize)]
struct StdinEnvelope {
    id: String,
    queue: QueueName,
    payload: serde_json::Value,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(SETTINGS.log_level.as_str()),
    )
    .init();

    log::info!(
        "starting segue workers: count={}, storage={}, model={}",
        SETTINGS.worker_count,
        SETTINGS.storage_root.display(),
        SETTINGS.separator_model
    );

    let (transport, handle) = ChannelTransport::new();
    let transport: Arc<dyn JobTransport> = Arc::new(transport);
    let worker = Arc::new(Worker::new(transport));
    let workers = spawn_workers(worker.clone(), SETTINGS.worker_count);

    // Print results as they arrive
    let results = handle.results_stream();
    let printer = std::thread::spawn(move || {
        while let Ok(message) = results.recv() {
            match serde_json::to_string(&message) {
                Ok(line) => println!("{}", line),
                Err(e) => log::error!("unserializable result: {}", e),
            }
        }
    });

    // Feed jobs from stdin until EOF
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<StdinEnvelope>(&line) {
            Ok(envelope) => {
                if let Err(e) = handle.enqueue(&envelope.id, envelope.queue, envelope.payload) {
                    log::error!("enqueue failed: {}", e);
                }
            }
            Err(e) => log::warn!("skipping malformed job line: {}", e),
        }
    }

    // Closing the handle drains the pool; dropping the last transport clone
    // then ends the result stream
    drop(handle);
    for join_handle in workers {
        let _ = join_handle.join();
    }
    drop(worker);
    let _ = printer.join();

    log::info!("clean shutdown");
    Ok(())
}
