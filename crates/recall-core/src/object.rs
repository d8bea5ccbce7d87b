use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Array, RecallError};

/// Upcasting helper implemented for every `'static` type.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// A result object that knows how to reduce itself to a storable array plus
/// side properties.
pub trait StorableObject: AsAny + fmt::Debug + Send + Sync {
    /// Split the object into its array payload and a JSON property map.
    fn prepare_for_storage(&self) -> Result<(Array, Value), RecallError>;
}

/// Class-level counterpart of [`StorableObject`]: rebuilds the object from
/// stored (or interpolated) data.
pub trait Reconstruct: StorableObject + Sized {
    /// Registry tag recorded with every stored instance. It must stay the
    /// same across builds and refactors, e.g. `"my_crate::Spectrum"` or
    /// `"spectrum/v1"`.
    const TAG: &'static str;

    fn reconstruct(data: Array, props: &Value) -> Result<Self, RecallError>;

    /// Rebuild from an interpolated array, which is synthetic rather than a
    /// literal stored payload. Defaults to [`Reconstruct::reconstruct`].
    fn reconstruct_from_interpolated(
        data: Array,
        _args: &[Value],
        props: &Value,
    ) -> Result<Self, RecallError> {
        Self::reconstruct(data, props)
    }
}

/// The value returned by a cached function.
#[derive(Debug)]
pub enum CachedValue {
    /// A plain numeric array, stored as is.
    Raw(Array),
    /// An object implementing the storage protocol, with its registry tag.
    Structured {
        tag: &'static str,
        object: Box<dyn StorableObject>,
    },
}

impl CachedValue {
    pub fn structured<T: Reconstruct>(object: T) -> Self {
        Self::Structured {
            tag: T::TAG,
            object: Box::new(object),
        }
    }

    pub fn as_raw(&self) -> Option<&Array> {
        match self {
            Self::Raw(array) => Some(array),
            Self::Structured { .. } => None,
        }
    }

    pub fn into_raw(self) -> Option<Array> {
        match self {
            Self::Raw(array) => Some(array),
            Self::Structured { .. } => None,
        }
    }

    /// The scalar value of a one-element raw array.
    pub fn as_scalar(&self) -> Option<f64> {
        self.as_raw().and_then(Array::as_scalar)
    }

    pub fn downcast_ref<T: StorableObject>(&self) -> Option<&T> {
        match self {
            Self::Structured { object, .. } => (**object).as_any().downcast_ref::<T>(),
            Self::Raw(_) => None,
        }
    }

    pub fn downcast<T: StorableObject>(self) -> Option<T> {
        match self {
            Self::Structured { object, .. } => object.into_any().downcast::<T>().ok().map(|b| *b),
            Self::Raw(_) => None,
        }
    }

    /// Split into the array payload and, for structured values, the
    /// metadata needed to reverse the transform.
    pub fn prepare_for_storage(&self) -> Result<(Array, Option<ObjectMeta>), RecallError> {
        match self {
            Self::Raw(array) => Ok((array.clone(), None)),
            Self::Structured { tag, object } => {
                let (data, props) = object.prepare_for_storage()?;
                Ok((data, Some(ObjectMeta::new(tag, props))))
            }
        }
    }
}

impl From<Array> for CachedValue {
    fn from(array: Array) -> Self {
        Self::Raw(array)
    }
}

impl From<f64> for CachedValue {
    fn from(value: f64) -> Self {
        Self::Raw(Array::scalar(value))
    }
}

impl From<Vec<f64>> for CachedValue {
    fn from(values: Vec<f64>) -> Self {
        Self::Raw(Array::from_vec(values))
    }
}

/// Reconstruction metadata recorded next to a structured result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub obj_module: String,
    pub obj_class: String,
    pub obj_props: Value,
}

impl ObjectMeta {
    /// Split a registry tag into module path and class name. Tags without a
    /// `::` separator keep an empty module.
    pub fn new(tag: &str, props: Value) -> Self {
        let base = tag.split('<').next().unwrap_or(tag);
        let (module, class) = match base.rsplit_once("::") {
            Some((module, _)) => (module.to_string(), tag[module.len() + 2..].to_string()),
            None => (String::new(), base.to_string()),
        };
        Self {
            obj_module: module,
            obj_class: class,
            obj_props: props,
        }
    }

    /// The registry tag the metadata was recorded under.
    pub fn tag(&self) -> String {
        if self.obj_module.is_empty() {
            self.obj_class.clone()
        } else {
            format!("{}::{}", self.obj_module, self.obj_class)
        }
    }
}

type ReconstructFn = fn(Array, &Value) -> Result<CachedValue, RecallError>;
type InterpolatedFn = fn(Array, &[Value], &Value) -> Result<CachedValue, RecallError>;

#[derive(Clone, Copy)]
struct Reconstructor {
    type_id: TypeId,
    reconstruct: ReconstructFn,
    from_interpolated: InterpolatedFn,
}

/// Maps type tags to reconstruction functions.
///
/// Every structured result type must be registered before a retrieval needs
/// to rebuild it; an unknown tag is a deserialization error.
#[derive(Default)]
pub struct ObjectRegistry {
    entries: RwLock<HashMap<String, Reconstructor>>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` under [`Reconstruct::TAG`]. A later registration of a
    /// different type under the same tag replaces the earlier one.
    pub fn register<T: Reconstruct>(&self) {
        let reconstructor = Reconstructor {
            type_id: TypeId::of::<T>(),
            reconstruct: |data, props| T::reconstruct(data, props).map(CachedValue::structured),
            from_interpolated: |data, args, props| {
                T::reconstruct_from_interpolated(data, args, props).map(CachedValue::structured)
            },
        };
        let previous = self.entries.write().insert(T::TAG.to_string(), reconstructor);
        if previous.is_some_and(|p| p.type_id != reconstructor.type_id) {
            tracing::warn!(tag = T::TAG, "storable object tag re-registered by a different type");
        }
        tracing::debug!(tag = T::TAG, "registered storable object type");
    }

    pub fn is_registered(&self, tag: &str) -> bool {
        self.entries.read().contains_key(tag)
    }

    fn lookup(&self, meta: &ObjectMeta) -> Result<Reconstructor, RecallError> {
        let tag = meta.tag();
        self.entries.read().get(&tag).copied().ok_or_else(|| {
            RecallError::Deserialization(format!("no reconstructor registered for `{tag}`"))
        })
    }

    /// Rebuild a stored value. Raw payloads pass through unchanged.
    pub fn reconstruct(
        &self,
        data: Array,
        meta: Option<&ObjectMeta>,
    ) -> Result<CachedValue, RecallError> {
        match meta {
            None => Ok(CachedValue::Raw(data)),
            Some(meta) => {
                let r = self.lookup(meta)?;
                (r.reconstruct)(data, &meta.obj_props)
            }
        }
    }

    /// Rebuild a value from interpolated data.
    pub fn reconstruct_from_interpolated(
        &self,
        data: Array,
        args: &[Value],
        meta: Option<&ObjectMeta>,
    ) -> Result<CachedValue, RecallError> {
        match meta {
            None => Ok(CachedValue::Raw(data)),
            Some(meta) => {
                let r = self.lookup(meta)?;
                (r.from_interpolated)(data, args, &meta.obj_props)
            }
        }
    }
}

impl fmt::Debug for ObjectRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<String> = self.entries.read().keys().cloned().collect();
        tags.sort();
        f.debug_struct("ObjectRegistry").field("tags", &tags).finish()
    }
}
