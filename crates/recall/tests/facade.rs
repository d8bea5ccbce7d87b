use std::cell::Cell;
use std::sync::Arc;

use recall::prelude::*;
use serde_json::json;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

#[test]
fn prelude_wires_a_cached_function() {
    init_tracing();
    let calls = Cell::new(0);
    let f = CachedFunction::new(
        |args, kwargs| {
            calls.set(calls.get() + 1);
            let x = args[0].as_f64().unwrap_or_default();
            let k = kwargs["k"].as_f64().unwrap_or_default();
            Ok(CachedValue::from(Array::from_vec(vec![x, k * x])))
        },
        Arc::new(InMemoryStorage::new()),
    );

    let call = CallArgs::new().arg(2).unwrap().kwarg("k", 3).unwrap();
    let first = f.call_with(&call).unwrap();
    let second = f.call(&[json!(2)], &kwargs([("k", json!(3))])).unwrap();
    assert_eq!(first.into_raw(), second.into_raw());
    assert_eq!(calls.get(), 1);
}

#[test]
fn prelude_wires_an_interpolated_function() {
    init_tracing();
    let f = InterpolatedFunction::in_memory(
        |args, _| Ok(CachedValue::from(3.0 * args[0].as_f64().unwrap_or_default())),
        2.0,
    );
    f.call(&[json!(0)], &Kwargs::new()).unwrap();
    f.call(&[json!(4)], &Kwargs::new()).unwrap();

    let between = f.call(&[json!(1)], &Kwargs::new()).unwrap();
    assert_eq!(between.as_scalar(), Some(3.0));
    assert_eq!(f.storage().len(), 2);
    assert_eq!(f.interpolator(&Kwargs::new()).unwrap().len(), 2);
}

#[cfg(feature = "sqlite")]
#[test]
fn sqlite_backend_is_reachable() {
    let dir = tempfile::TempDir::new().unwrap();
    let storage = SqliteStorage::open(dir.path().join("cache.db")).unwrap();
    storage
        .store(&CachedValue::from(1.5), &[json!("a")], &Kwargs::new())
        .unwrap();
    let hit = storage.retrieve(&[json!("a")], &Kwargs::new()).unwrap();
    assert_eq!(hit.value.as_scalar(), Some(1.5));
}
