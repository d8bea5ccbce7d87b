use std::cell::Cell;
use std::sync::Arc;

use recall::cache::{CachedFunction, CachedValue, InterpolatedFunction, InterpolationConfig};
use recall::core::{kwargs, Kwargs, RecallError, Storage};
use recall::sqlite::{SqliteStorage, SqliteStorageConfig};
use serde_json::{json, Value};

fn main() -> Result<(), RecallError> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // --- Setup: a slow function + a temporary storage file ---
    // The file is removed when the storage is dropped.
    let path = std::env::temp_dir().join(format!("recall-demo-{}.db", std::process::id()));
    let storage = Arc::new(SqliteStorage::new(
        SqliteStorageConfig::new(&path).truncate(true).temporary(true),
    )?);

    let evaluations = Cell::new(0);
    let power = |args: &[Value], kwargs: &Kwargs| -> Result<CachedValue, RecallError> {
        evaluations.set(evaluations.get() + 1);
        let x = args.first().and_then(Value::as_f64).unwrap_or(f64::NAN);
        let n = kwargs.get("n").and_then(Value::as_f64).unwrap_or(2.0);
        Ok(CachedValue::from(x.powf(n)))
    };

    let cached = CachedFunction::new(&power, storage.clone());

    // --- First call: cache miss ---
    println!("=== Cache Miss (first call) ===");
    let square = kwargs([("n", json!(2))]);
    let r1 = cached.call(&[json!(3)], &square)?;
    println!("3^2 = {:?}  (evaluations: {})", r1.as_scalar(), evaluations.get());

    // --- Second call with the same arguments: cache hit ---
    println!("\n=== Cache Hit (same arguments) ===");
    let r2 = cached.call(&[json!(3)], &square)?;
    println!("3^2 = {:?}  (evaluations: {})", r2.as_scalar(), evaluations.get());

    // --- Different keyword argument: cache miss ---
    println!("\n=== Cache Miss (different kwargs) ===");
    let cube = kwargs([("n", json!(3))]);
    let r3 = cached.call(&[json!(3)], &cube)?;
    println!("3^3 = {:?}  (evaluations: {})", r3.as_scalar(), evaluations.get());
    println!("Stored entries: {}", storage.len());

    // --- Interpolation between stored results ---
    println!("\n=== Interpolation ===");
    let interpolated = InterpolatedFunction::new(&power, storage.clone(), InterpolationConfig::new(0.75));
    interpolated.call(&[json!(4)], &square)?;
    println!("Stored 4^2, evaluations: {}", evaluations.get());
    let between = interpolated.call(&[json!(3.5)], &square)?;
    println!(
        "3.5^2 ~ {:?}  (exact {}, evaluations: {})",
        between.as_scalar(),
        3.5_f64.powi(2),
        evaluations.get()
    );
    let far = interpolated.call(&[json!(10)], &square)?;
    println!("10^2 = {:?}  (too far, computed; evaluations: {})", far.as_scalar(), evaluations.get());

    // --- Clear by keyword arguments ---
    println!("\n=== Clear Cache ===");
    let removed = cached.clear(None, Some(&square))?;
    println!("Removed {removed} entries with n=2, {} remain", storage.len());
    storage.repack()?;
    println!("Storage file repacked");

    println!("\nCaching demo completed successfully!");
    Ok(())
}
