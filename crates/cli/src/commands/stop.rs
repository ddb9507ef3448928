//! `nightshift stop`: ask the running worker to shut down.

use nightshift_config::AppConfig;
use nightshift_worker::{StopSignal, WorkerLock};

pub fn run(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let lock_path = config.worker.lock_path();
    if !lock_path.exists() {
        println!("ℹ️  No worker is running in {}", config.worker.state_dir.display());
        return Ok(());
    }

    let signal = StopSignal::new(config.worker.stop_path());
    signal.request()?;

    match WorkerLock::read(&lock_path) {
        Some(info) => println!("🛑 Stop requested for worker {} (pid {})", info.worker_id, info.pid),
        None => println!("🛑 Stop requested"),
    }
    println!("   The worker exits after its current cycle.");
    Ok(())
}
