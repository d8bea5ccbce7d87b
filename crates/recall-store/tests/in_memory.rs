use recall_core::{
    kwargs, now_timestamp, Array, CacheKey, CachedValue, Kwargs, RecallError, Reconstruct,
    StorableObject, Storage,
};
use recall_store::InMemoryStorage;
use serde_json::{json, Value};

fn constant_key(_args: &[Value], _kwargs: &Kwargs) -> Result<CacheKey, RecallError> {
    Ok(CacheKey::new("fixed"))
}

// ---------------------------------------------------------------------------
// Store and retrieve
// ---------------------------------------------------------------------------

#[test]
fn store_then_retrieve_returns_value_and_arguments() {
    let storage = InMemoryStorage::new();
    let kw = kwargs([("e", json!(3))]);
    storage
        .store(&CachedValue::from(4.0), &[json!(2)], &kw)
        .unwrap();

    let hit = storage.retrieve(&[json!(2)], &kw).unwrap();
    assert_eq!(hit.value.as_scalar(), Some(4.0));
    assert_eq!(hit.args, vec![json!(2)]);
    assert_eq!(hit.kwargs, kw);
    assert!(hit.internal_data.time_stored <= now_timestamp());
    assert_eq!(storage.len(), 1);
}

#[test]
fn retrieve_missing_is_not_found() {
    let storage = InMemoryStorage::new();
    let err = storage.retrieve(&[json!(1)], &Kwargs::new()).unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn storing_same_arguments_replaces_entry() {
    let storage = InMemoryStorage::new();
    storage
        .store(&CachedValue::from(1.0), &[json!(1)], &Kwargs::new())
        .unwrap();
    storage
        .store(&CachedValue::from(2.0), &[json!(1)], &Kwargs::new())
        .unwrap();

    assert_eq!(storage.len(), 1);
    let hit = storage.retrieve(&[json!(1)], &Kwargs::new()).unwrap();
    assert_eq!(hit.value.as_scalar(), Some(2.0));
}

#[test]
fn arrays_keep_their_shape() {
    let storage = InMemoryStorage::new();
    let value = Array::from_shape_vec(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
    storage
        .store(&CachedValue::from(value.clone()), &[json!([1, 2])], &Kwargs::new())
        .unwrap();
    let hit = storage.retrieve(&[json!([1, 2])], &Kwargs::new()).unwrap();
    assert_eq!(hit.value.into_raw(), Some(value));
}

// ---------------------------------------------------------------------------
// Delete and clear
// ---------------------------------------------------------------------------

#[test]
fn delete_removes_entry() {
    let storage = InMemoryStorage::new();
    storage
        .store(&CachedValue::from(1.0), &[json!(1)], &Kwargs::new())
        .unwrap();
    let key = storage.key_for(&[json!(1)], &Kwargs::new()).unwrap();

    storage.delete(&key).unwrap();
    assert!(storage.is_empty());
    assert!(storage.retrieve(&[json!(1)], &Kwargs::new()).unwrap_err().is_not_found());
}

#[test]
fn delete_unknown_key_is_not_found() {
    let storage = InMemoryStorage::new();
    let err = storage.delete(&CacheKey::new("nothing")).unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn clear_without_filters_removes_everything() {
    let storage = InMemoryStorage::new();
    for i in 0..4 {
        storage
            .store(&CachedValue::from(i as f64), &[json!(i)], &Kwargs::new())
            .unwrap();
    }
    assert_eq!(storage.clear(None, None).unwrap(), 4);
    assert!(storage.is_empty());
}

#[test]
fn clear_by_kwargs_keeps_other_subspaces() {
    let storage = InMemoryStorage::new();
    let a = kwargs([("mode", json!("a"))]);
    let b = kwargs([("mode", json!("b"))]);
    storage.store(&CachedValue::from(1.0), &[json!(1)], &a).unwrap();
    storage.store(&CachedValue::from(2.0), &[json!(2)], &a).unwrap();
    storage.store(&CachedValue::from(3.0), &[json!(1)], &b).unwrap();

    assert_eq!(storage.clear(None, Some(&a)).unwrap(), 2);
    assert_eq!(storage.len(), 1);
    assert!(storage.retrieve(&[json!(1)], &b).is_ok());
}

#[test]
fn clear_by_time_only_removes_older_entries() {
    let storage = InMemoryStorage::new();
    storage
        .store(&CachedValue::from(1.0), &[json!(1)], &Kwargs::new())
        .unwrap();
    let cutoff = storage
        .retrieve(&[json!(1)], &Kwargs::new())
        .unwrap()
        .internal_data
        .time_stored;

    // Nothing is strictly older than the first entry.
    assert_eq!(storage.clear(Some(cutoff), None).unwrap(), 0);
    assert_eq!(storage.clear(Some(cutoff + 1.0), None).unwrap(), 1);
}

#[test]
fn clear_filters_are_conjunctive() {
    let storage = InMemoryStorage::new();
    let a = kwargs([("mode", json!("a"))]);
    storage.store(&CachedValue::from(1.0), &[json!(1)], &a).unwrap();
    storage
        .store(&CachedValue::from(2.0), &[json!(1)], &Kwargs::new())
        .unwrap();

    assert_eq!(storage.clear(Some(0.0), Some(&a)).unwrap(), 0);
    assert_eq!(storage.clear(Some(now_timestamp() + 1.0), Some(&a)).unwrap(), 1);
    assert_eq!(storage.len(), 1);
}

// ---------------------------------------------------------------------------
// Iteration
// ---------------------------------------------------------------------------

#[test]
fn iterate_matching_filters_by_exact_kwargs() {
    let storage = InMemoryStorage::new();
    let a = kwargs([("mode", json!("a"))]);
    storage.store(&CachedValue::from(1.0), &[json!(1)], &a).unwrap();
    storage.store(&CachedValue::from(2.0), &[json!(2)], &a).unwrap();
    storage
        .store(&CachedValue::from(3.0), &[json!(3)], &Kwargs::new())
        .unwrap();

    let args: Vec<Vec<Value>> = storage
        .iterate_matching(&a)
        .unwrap()
        .map(|entry| entry.args)
        .collect();
    assert_eq!(args, vec![vec![json!(1)], vec![json!(2)]]);

    let unfiltered: Vec<_> = storage.iterate_matching(&Kwargs::new()).unwrap().collect();
    assert_eq!(unfiltered.len(), 1);
    assert_eq!(unfiltered[0].data.as_scalar(), Some(3.0));
}

#[test]
fn iteration_is_a_snapshot() {
    let storage = InMemoryStorage::new();
    storage
        .store(&CachedValue::from(1.0), &[json!(1)], &Kwargs::new())
        .unwrap();
    let iter = storage.iterate_matching(&Kwargs::new()).unwrap();
    storage
        .store(&CachedValue::from(2.0), &[json!(2)], &Kwargs::new())
        .unwrap();
    assert_eq!(iter.count(), 1);
}

// ---------------------------------------------------------------------------
// Key collisions
// ---------------------------------------------------------------------------

#[test]
fn colliding_keys_get_suffixed_names() {
    let storage = InMemoryStorage::new().with_key_fn(constant_key);
    storage
        .store(&CachedValue::from(1.0), &[json!(1)], &Kwargs::new())
        .unwrap();
    storage
        .store(&CachedValue::from(2.0), &[json!(2)], &Kwargs::new())
        .unwrap();
    storage
        .store(&CachedValue::from(3.0), &[json!(3)], &Kwargs::new())
        .unwrap();

    let names: Vec<String> = storage
        .entries()
        .unwrap()
        .into_iter()
        .map(|stored| stored.name)
        .collect();
    assert_eq!(names, vec!["fixed", "fixed_000", "fixed_001"]);

    let hit = storage.retrieve(&[json!(2)], &Kwargs::new()).unwrap();
    assert_eq!(hit.value.as_scalar(), Some(2.0));
}

#[test]
fn unmatched_arguments_under_used_key_is_a_collision() {
    let storage = InMemoryStorage::new().with_key_fn(constant_key);
    storage
        .store(&CachedValue::from(1.0), &[json!(1)], &Kwargs::new())
        .unwrap();
    let err = storage.retrieve(&[json!(99)], &Kwargs::new()).unwrap_err();
    assert!(matches!(err, RecallError::HashCollision { key } if key == "fixed"));
}

#[test]
fn deleting_a_colliding_key_removes_all_its_records() {
    let storage = InMemoryStorage::new().with_key_fn(constant_key);
    storage
        .store(&CachedValue::from(1.0), &[json!(1)], &Kwargs::new())
        .unwrap();
    storage
        .store(&CachedValue::from(2.0), &[json!(2)], &Kwargs::new())
        .unwrap();
    storage.delete(&CacheKey::new("fixed")).unwrap();
    assert!(storage.is_empty());
}

// ---------------------------------------------------------------------------
// Structured objects
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq)]
struct Spectrum {
    intensities: Array,
    unit: String,
}

impl StorableObject for Spectrum {
    fn prepare_for_storage(&self) -> Result<(Array, Value), RecallError> {
        Ok((self.intensities.clone(), json!({ "unit": self.unit })))
    }
}

impl Reconstruct for Spectrum {
    const TAG: &'static str = "tests::Spectrum";

    fn reconstruct(data: Array, props: &Value) -> Result<Self, RecallError> {
        let unit = props["unit"]
            .as_str()
            .ok_or_else(|| RecallError::Deserialization("missing unit".into()))?;
        Ok(Self {
            intensities: data,
            unit: unit.to_string(),
        })
    }
}

#[test]
fn structured_objects_are_rebuilt_through_the_registry() {
    let storage = InMemoryStorage::new();
    storage.registry().register::<Spectrum>();

    let spectrum = Spectrum {
        intensities: Array::from_vec(vec![0.1, 0.2, 0.3]),
        unit: "counts".into(),
    };
    storage
        .store(&CachedValue::structured(spectrum), &[json!(7)], &Kwargs::new())
        .unwrap();

    let hit = storage.retrieve(&[json!(7)], &Kwargs::new()).unwrap();
    let meta = hit.internal_data.object.clone().unwrap();
    assert_eq!(meta.obj_class, "Spectrum");
    assert_eq!(meta.obj_props, json!({ "unit": "counts" }));

    let back = hit.value.downcast::<Spectrum>().unwrap();
    assert_eq!(back.unit, "counts");
    assert_eq!(back.intensities.as_slice(), &[0.1, 0.2, 0.3]);
}

#[test]
fn unregistered_object_type_fails_on_retrieve() {
    let storage = InMemoryStorage::new();
    let spectrum = Spectrum {
        intensities: Array::from_vec(vec![1.0]),
        unit: "counts".into(),
    };
    storage
        .store(&CachedValue::structured(spectrum), &[json!(1)], &Kwargs::new())
        .unwrap();
    let err = storage.retrieve(&[json!(1)], &Kwargs::new()).unwrap_err();
    assert!(matches!(err, RecallError::Deserialization(_)));
}
