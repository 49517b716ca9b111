//! Transcend a counter, bump it from several worker threads, read it back.
//!
//! Run with: cargo run --example shared-counter

use std::sync::Arc;
use std::thread;

use objhost::registry::MemoryRegistry;
use objhost::runtime::{
    get_proxy_with, transcend_object, JsonObject, OwnerMode, TranscendOptions,
};
use objhost::wire::TargetPath;
use serde_json::json;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let registry = Arc::new(MemoryRegistry::new());
    let options = TranscendOptions {
        mode: OwnerMode::Local,
        ..TranscendOptions::default()
    };

    let proxy = transcend_object(
        Box::new(JsonObject::new(json!({"counter": 0}))),
        "demo_counter",
        registry.clone(),
        options.clone(),
    )?;

    let mut workers = Vec::new();
    for worker in 0..4 {
        let registry = registry.clone();
        let config = options.proxy.clone();
        workers.push(thread::spawn(move || {
            let proxy = get_proxy_with("demo_counter", registry.as_ref(), &config)
                .expect("worker proxy should resolve");
            for _ in 0..100 {
                proxy
                    .call_at(
                        TargetPath::root().item("counter"),
                        "incr",
                        vec![json!(1)],
                        serde_json::Map::new(),
                    )
                    .expect("increment should succeed");
            }
            println!("worker {worker} done");
        }));
    }
    for worker in workers {
        let _ = worker.join();
    }

    println!("final counter: {}", proxy.get_item("counter")?);
    proxy.release()?;
    Ok(())
}
