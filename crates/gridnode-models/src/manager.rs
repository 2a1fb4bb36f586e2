//! Model manager — save/get/delete/list over cache, durable records and
//! the object store.
//!
//! Every operation holds the cache mutex from start to finish, so two calls
//! for the same model id never interleave and a completed `save` is always
//! visible to the next `get`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use gridnode_core::{Model, ModelKind, ObjectCodec, ObjectId, StoredObject, Tensor};
use gridnode_state::ModelRecords;

use crate::cache::ModelCache;
use crate::error::{ModelError, ModelResult};
use crate::inference::InferenceEngine;
use crate::object_store::ObjectStore;

fn persistence(e: impl std::fmt::Display) -> ModelError {
    ModelError::Persistence(e.to_string())
}

/// Coordinates the model cache with durable storage.
pub struct ModelManager {
    cache: Mutex<ModelCache>,
    records: Arc<dyn ModelRecords>,
    objects: ObjectStore,
    codec: Arc<dyn ObjectCodec>,
    /// Suffix for inference input ids.
    next_input: AtomicU64,
}

/// Object registered for the length of one call; removed on drop, so an
/// unwinding engine does not leave it behind.
struct ScratchObject<'a> {
    objects: &'a ObjectStore,
    id: ObjectId,
}

impl Drop for ScratchObject<'_> {
    fn drop(&mut self) {
        self.objects.remove(&self.id);
    }
}

impl ModelManager {
    /// Create a manager over the given stores. The cache starts empty.
    pub fn new(
        records: Arc<dyn ModelRecords>,
        objects: ObjectStore,
        codec: Arc<dyn ObjectCodec>,
    ) -> Self {
        Self {
            cache: Mutex::new(ModelCache::new()),
            records,
            objects,
            codec,
            next_input: AtomicU64::new(0),
        }
    }

    fn lock_cache(&self) -> MutexGuard<'_, ModelCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The object store Plan state is rehydrated into.
    pub fn objects(&self) -> &ObjectStore {
        &self.objects
    }

    pub fn codec(&self) -> &dyn ObjectCodec {
        self.codec.as_ref()
    }

    pub fn is_cached(&self, model_id: &str) -> bool {
        self.lock_cache().contains(model_id)
    }

    /// Persist and cache a serialized model.
    ///
    /// A model already in the cache is rejected without a durable write. A
    /// durable duplicate the cache does not know about is loaded into the
    /// cache before the duplicate is reported. If the model is a Plan its
    /// state tensors are persisted after the model record; failure there is
    /// reported but the model record stays.
    pub fn save(&self, blob: &[u8], model_id: &str) -> ModelResult<String> {
        let mut cache = self.lock_cache();
        if cache.contains(model_id) {
            debug!(%model_id, "save rejected: model cached");
            return Err(ModelError::AlreadyExists(model_id.to_string()));
        }

        let model = self
            .codec
            .decode_model(blob)
            .map_err(|e| ModelError::Decode(e.to_string()))?;

        if let Err(e) = self.records.insert_model(model_id, blob) {
            if !e.is_duplicate() {
                warn!(%model_id, error = %e, "model persist failed");
                return Err(persistence(e));
            }
            // Stored durably but never cached, e.g. a crash between the two
            // writes. Bring the cache in line with the durable record.
            match self.load_from_store(model_id) {
                Ok(stored) => {
                    cache.insert(model_id, Arc::new(stored));
                    info!(%model_id, "cache repaired from durable record");
                }
                Err(repair) => {
                    warn!(%model_id, error = %repair, "cache repair failed");
                }
            }
            return Err(ModelError::AlreadyExists(model_id.to_string()));
        }

        let model = cache.insert(model_id, Arc::new(model));
        if let ModelKind::Plan { state_ids } = &model.kind {
            self.persist_state(model_id, state_ids)?;
        }

        info!(%model_id, plan = model.is_plan(), "model saved");
        Ok(format!("Model saved with id: {model_id}"))
    }

    /// Fetch a model, loading and rehydrating it on a cache miss.
    pub fn get(&self, model_id: &str) -> ModelResult<Arc<Model>> {
        let mut cache = self.lock_cache();
        if let Some(model) = cache.get(model_id) {
            debug!(%model_id, "model cache hit");
            return Ok(model);
        }

        let model = self.load_from_store(model_id)?;
        debug!(%model_id, "model loaded from durable store");
        Ok(cache.insert(model_id, Arc::new(model)))
    }

    /// Drop the cache entry, then the durable record.
    pub fn delete(&self, model_id: &str) -> ModelResult<String> {
        let mut cache = self.lock_cache();
        cache.remove(model_id);

        match self.records.delete_model(model_id) {
            Ok(true) => {
                info!(%model_id, "model deleted");
                Ok(format!("Model Deleted: {model_id}"))
            }
            Ok(false) => Err(ModelError::Persistence(format!(
                "no stored model with id {model_id}"
            ))),
            Err(e) => {
                warn!(%model_id, error = %e, "model delete failed");
                Err(persistence(e))
            }
        }
    }

    /// Ids of every durably stored model. Never consults the cache.
    pub fn list(&self) -> ModelResult<Vec<ObjectId>> {
        let _cache = self.lock_cache();
        self.records.list_model_ids().map_err(persistence)
    }

    pub fn clear_cache(&self) {
        let mut cache = self.lock_cache();
        if cache.is_empty() {
            return;
        }
        let dropped = cache.len();
        cache.clear();
        debug!(dropped, "model cache cleared");
    }

    /// Run `model_id` against `input` with the given engine.
    ///
    /// The input is registered in the object store for the duration of the
    /// run under a fresh `{model_id}:input:{n}` id, so it never shadows a
    /// stored object such as a Plan's state tensor.
    pub fn infer(
        &self,
        model_id: &str,
        mut input: Tensor,
        engine: &dyn InferenceEngine,
    ) -> ModelResult<Tensor> {
        let model = self.get(model_id)?;
        let _scratch = self.register_input(model_id, &mut input);
        Ok(engine.infer(&model, &input, &self.objects)?)
    }

    fn register_input(&self, model_id: &str, input: &mut Tensor) -> ScratchObject<'_> {
        loop {
            let n = self.next_input.fetch_add(1, Ordering::Relaxed);
            input.id = format!("{model_id}:input:{n}");
            if self.objects.register_new(StoredObject::Tensor(input.clone())) {
                return ScratchObject {
                    objects: &self.objects,
                    id: input.id.clone(),
                };
            }
        }
    }

    /// Decode a durable record and register its Plan state.
    fn load_from_store(&self, model_id: &str) -> ModelResult<Model> {
        let blob = self
            .records
            .get_model(model_id)
            .map_err(persistence)?
            .ok_or_else(|| ModelError::NotFound(format!("model {model_id}")))?;

        let model = self
            .codec
            .decode_model(&blob)
            .map_err(|e| ModelError::Decode(e.to_string()))?;

        self.rehydrate(model_id, &model)?;
        Ok(model)
    }

    /// Register every state tensor of a Plan in the object store.
    ///
    /// All tensors are fetched before any is registered.
    fn rehydrate(&self, model_id: &str, model: &Model) -> ModelResult<()> {
        let mut tensors = Vec::with_capacity(model.state_ids().len());
        for state_id in model.state_ids() {
            let tensor = self
                .records
                .get_tensor(state_id)
                .map_err(persistence)?
                .ok_or_else(|| ModelError::NotFound(format!("state tensor {state_id}")))?;
            tensors.push(tensor);
        }

        let count = tensors.len();
        for tensor in tensors {
            self.objects.register_tensor(tensor);
        }
        if count > 0 {
            debug!(%model_id, tensors = count, "plan state rehydrated");
        }
        Ok(())
    }

    fn persist_state(&self, model_id: &str, state_ids: &[ObjectId]) -> ModelResult<()> {
        let mut tensors = Vec::with_capacity(state_ids.len());
        for state_id in state_ids {
            let tensor = self.objects.get_tensor(state_id).ok_or_else(|| {
                ModelError::Persistence(format!(
                    "state tensor {state_id} is not registered in the object store"
                ))
            })?;
            tensors.push(tensor);
        }

        self.records.insert_tensors(&tensors).map_err(|e| {
            warn!(%model_id, error = %e, "plan state persist failed; model record kept");
            persistence(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::sync::atomic::AtomicUsize;

    use gridnode_core::JsonCodec;
    use gridnode_state::{StateError, StateResult, StateStore};

    /// Counts every call that reaches durable storage.
    struct CountingRecords {
        inner: StateStore,
        calls: AtomicUsize,
    }

    impl CountingRecords {
        fn new() -> Self {
            Self {
                inner: StateStore::open_in_memory().unwrap(),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn tick(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl ModelRecords for CountingRecords {
        fn insert_model(&self, id: &str, blob: &[u8]) -> StateResult<()> {
            self.tick();
            self.inner.insert_model(id, blob)
        }
        fn get_model(&self, id: &str) -> StateResult<Option<Vec<u8>>> {
            self.tick();
            self.inner.get_model(id)
        }
        fn delete_model(&self, id: &str) -> StateResult<bool> {
            self.tick();
            self.inner.delete_model(id)
        }
        fn list_model_ids(&self) -> StateResult<Vec<ObjectId>> {
            self.tick();
            self.inner.list_model_ids()
        }
        fn insert_tensors(&self, tensors: &[Tensor]) -> StateResult<()> {
            self.tick();
            self.inner.insert_tensors(tensors)
        }
        fn get_tensor(&self, id: &str) -> StateResult<Option<Tensor>> {
            self.tick();
            self.inner.get_tensor(id)
        }
    }

    /// Storage whose writes always fail.
    struct BrokenRecords;

    impl ModelRecords for BrokenRecords {
        fn insert_model(&self, _: &str, _: &[u8]) -> StateResult<()> {
            Err(StateError::Write("disk full".into()))
        }
        fn get_model(&self, _: &str) -> StateResult<Option<Vec<u8>>> {
            Err(StateError::Read("disk gone".into()))
        }
        fn delete_model(&self, _: &str) -> StateResult<bool> {
            Err(StateError::Write("disk full".into()))
        }
        fn list_model_ids(&self) -> StateResult<Vec<ObjectId>> {
            Err(StateError::Read("disk gone".into()))
        }
        fn insert_tensors(&self, _: &[Tensor]) -> StateResult<()> {
            Err(StateError::Write("disk full".into()))
        }
        fn get_tensor(&self, _: &str) -> StateResult<Option<Tensor>> {
            Err(StateError::Read("disk gone".into()))
        }
    }

    fn manager_with(records: Arc<dyn ModelRecords>) -> ModelManager {
        ModelManager::new(records, ObjectStore::new(), Arc::new(JsonCodec))
    }

    fn blob(model: &Model) -> Vec<u8> {
        JsonCodec.encode_model(model).unwrap()
    }

    fn plan_with_state(objects: &ObjectStore) -> Model {
        objects.register_tensor(Tensor::new("t1", vec![2], vec![1.0, 2.0]));
        objects.register_tensor(Tensor::new("t2", vec![1], vec![3.0]));
        Model::plan(vec!["t1".into(), "t2".into()], b"plan".to_vec())
    }

    #[test]
    fn save_then_duplicate_keeps_first_content() {
        let mgr = manager_with(Arc::new(StateStore::open_in_memory().unwrap()));
        let first = Model::plain(b"first".to_vec());
        let second = Model::plain(b"second".to_vec());

        assert_eq!(mgr.save(&blob(&first), "A").unwrap(), "Model saved with id: A");
        let err = mgr.save(&blob(&second), "A").unwrap_err();
        assert_eq!(err, ModelError::AlreadyExists("A".into()));
        assert!(err.to_string().contains("already exists"));

        assert_eq!(*mgr.get("A").unwrap(), first);
    }

    #[test]
    fn duplicate_in_cache_skips_durable_write() {
        let records = Arc::new(CountingRecords::new());
        let mgr = manager_with(records.clone());
        let model = Model::plain(vec![]);

        mgr.save(&blob(&model), "A").unwrap();
        let after_first = records.calls();
        mgr.save(&blob(&model), "A").unwrap_err();
        assert_eq!(records.calls(), after_first);
    }

    #[test]
    fn get_after_save_is_cache_only() {
        let records = Arc::new(CountingRecords::new());
        let mgr = manager_with(records.clone());
        let model = Model::plain(b"net".to_vec());
        let bytes = blob(&model);

        mgr.save(&bytes, "m1").unwrap();
        let before = records.calls();
        let fetched = mgr.get("m1").unwrap();
        assert_eq!(records.calls(), before);
        assert_eq!(*fetched, JsonCodec.decode_model(&bytes).unwrap());
    }

    #[test]
    fn cache_miss_reads_store_once_then_caches() {
        let records = Arc::new(CountingRecords::new());
        records.inner.insert_model("m1", &blob(&Model::plain(vec![]))).unwrap();
        let mgr = manager_with(records.clone());

        mgr.get("m1").unwrap();
        let after_miss = records.calls();
        assert!(after_miss > 0);
        mgr.get("m1").unwrap();
        assert_eq!(records.calls(), after_miss);
        assert!(mgr.is_cached("m1"));
    }

    #[test]
    fn get_unknown_is_not_found() {
        let mgr = manager_with(Arc::new(StateStore::open_in_memory().unwrap()));
        let err = mgr.get("ghost").unwrap_err();
        assert!(matches!(err, ModelError::NotFound(_)));
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn delete_removes_from_get_and_list() {
        let mgr = manager_with(Arc::new(StateStore::open_in_memory().unwrap()));
        mgr.save(&blob(&Model::plain(vec![])), "m1").unwrap();
        mgr.save(&blob(&Model::plain(vec![])), "m2").unwrap();

        assert_eq!(mgr.delete("m1").unwrap(), "Model Deleted: m1");
        assert!(matches!(mgr.get("m1"), Err(ModelError::NotFound(_))));
        assert_eq!(mgr.list().unwrap(), vec!["m2"]);
    }

    #[test]
    fn delete_missing_is_persistence_error() {
        let mgr = manager_with(Arc::new(StateStore::open_in_memory().unwrap()));
        assert!(matches!(mgr.delete("nope"), Err(ModelError::Persistence(_))));
    }

    #[test]
    fn list_reflects_durable_state_with_cold_cache() {
        let store = StateStore::open_in_memory().unwrap();
        store.insert_model("durable", &blob(&Model::plain(vec![]))).unwrap();
        let mgr = manager_with(Arc::new(store));

        assert_eq!(mgr.list().unwrap(), vec!["durable"]);
        assert!(!mgr.is_cached("durable"));
    }

    #[test]
    fn plan_state_rehydrated_after_cache_clear() {
        let store = StateStore::open_in_memory().unwrap();
        let objects = ObjectStore::new();
        let mgr = ModelManager::new(Arc::new(store.clone()), objects.clone(), Arc::new(JsonCodec));

        let plan = plan_with_state(&objects);
        mgr.save(&blob(&plan), "p").unwrap();
        assert!(store.get_tensor("t1").unwrap().is_some());
        assert!(store.get_tensor("t2").unwrap().is_some());

        // Simulate a restart: cold cache, empty object store.
        mgr.clear_cache();
        objects.clear();

        let fetched = mgr.get("p").unwrap();
        assert_eq!(*fetched, plan);
        assert_eq!(objects.get_tensor("t1").unwrap().data, vec![1.0, 2.0]);
        assert_eq!(objects.get_tensor("t2").unwrap().data, vec![3.0]);
    }

    #[test]
    fn plan_missing_state_tensor_reports_persistence_but_keeps_model() {
        let store = StateStore::open_in_memory().unwrap();
        let mgr = manager_with(Arc::new(store.clone()));
        let plan = Model::plan(vec!["absent".into()], vec![]);

        let err = mgr.save(&blob(&plan), "p").unwrap_err();
        assert!(matches!(err, ModelError::Persistence(_)));
        assert!(store.get_model("p").unwrap().is_some());
        assert!(mgr.is_cached("p"));
    }

    #[test]
    fn plan_get_with_missing_durable_tensor_is_not_found() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .insert_model("p", &blob(&Model::plan(vec!["lost".into()], vec![])))
            .unwrap();
        let mgr = manager_with(Arc::new(store));

        let err = mgr.get("p").unwrap_err();
        assert_eq!(err, ModelError::NotFound("state tensor lost".into()));
        assert!(!mgr.is_cached("p"));
    }

    #[test]
    fn durable_duplicate_repairs_cache() {
        let store = StateStore::open_in_memory().unwrap();
        let durable = Model::plain(b"durable".to_vec());
        // Left behind by a crash before the cache write.
        store.insert_model("m", &blob(&durable)).unwrap();

        let records = Arc::new(CountingRecords {
            inner: store,
            calls: AtomicUsize::new(0),
        });
        let mgr = manager_with(records.clone());

        let err = mgr.save(&blob(&Model::plain(b"new".to_vec())), "m").unwrap_err();
        assert_eq!(err, ModelError::AlreadyExists("m".into()));
        assert!(mgr.is_cached("m"));

        let before = records.calls();
        assert_eq!(*mgr.get("m").unwrap(), durable);
        assert_eq!(records.calls(), before);
    }

    #[test]
    fn durable_duplicate_plan_repair_rehydrates_state() {
        let store = StateStore::open_in_memory().unwrap();
        let objects = ObjectStore::new();
        let plan = plan_with_state(&objects);
        store.insert_model("p", &blob(&plan)).unwrap();
        store
            .insert_tensors(&[objects.get_tensor("t1").unwrap(), objects.get_tensor("t2").unwrap()])
            .unwrap();
        objects.clear();

        let mgr = ModelManager::new(Arc::new(store), objects.clone(), Arc::new(JsonCodec));
        assert!(mgr.save(&blob(&plan), "p").is_err());
        assert!(objects.contains("t1"));
        assert!(objects.contains("t2"));
    }

    #[test]
    fn undecodable_blob_is_not_persisted() {
        let store = StateStore::open_in_memory().unwrap();
        let mgr = manager_with(Arc::new(store.clone()));

        let err = mgr.save(b"\xffnot a model", "bad").unwrap_err();
        assert!(matches!(err, ModelError::Decode(_)));
        assert!(store.get_model("bad").unwrap().is_none());
    }

    #[test]
    fn broken_storage_surfaces_persistence_without_cache_mutation() {
        let mgr = manager_with(Arc::new(BrokenRecords));

        let err = mgr.save(&blob(&Model::plain(vec![])), "m").unwrap_err();
        assert_eq!(err, ModelError::Persistence("write error: disk full".into()));
        assert!(!mgr.is_cached("m"));
        assert!(matches!(mgr.list(), Err(ModelError::Persistence(_))));
        assert!(matches!(mgr.get("m"), Err(ModelError::Persistence(_))));
    }

    #[test]
    fn delete_with_broken_storage_still_drops_cache() {
        let mgr = manager_with(Arc::new(BrokenRecords));
        mgr.lock_cache().insert("m", Arc::new(Model::plain(vec![])));

        assert!(matches!(mgr.delete("m"), Err(ModelError::Persistence(_))));
        assert!(!mgr.is_cached("m"));
    }

    #[test]
    fn infer_registers_input_only_for_the_run() {
        struct Echo;
        impl InferenceEngine for Echo {
            fn infer(
                &self,
                _model: &Model,
                input: &Tensor,
                objects: &ObjectStore,
            ) -> Result<Tensor, crate::error::EngineError> {
                assert!(objects.contains(&input.id));
                Ok(input.clone())
            }
        }

        let mgr = manager_with(Arc::new(StateStore::open_in_memory().unwrap()));
        mgr.save(&blob(&Model::plain(vec![])), "m").unwrap();

        let out = mgr
            .infer("m", Tensor::new("x", vec![1], vec![4.0]), &Echo)
            .unwrap();
        assert_eq!(out.data, vec![4.0]);
        assert!(!mgr.objects().contains("x"));
        assert!(matches!(
            mgr.infer("ghost", Tensor::new("x", vec![1], vec![4.0]), &Echo),
            Err(ModelError::NotFound(_))
        ));
    }

    #[test]
    fn infer_input_never_shadows_plan_state() {
        let store = StateStore::open_in_memory().unwrap();
        let objects = ObjectStore::new();
        let mgr = ModelManager::new(Arc::new(store), objects.clone(), Arc::new(JsonCodec));
        objects.register_tensor(Tensor::new("w", vec![1, 2], vec![2.0, 3.0]));
        mgr.save(&blob(&Model::plan(vec!["w".into()], vec![])), "p").unwrap();

        let engine = crate::inference::DenseEngine;
        let plain = mgr
            .infer("p", Tensor::new("x", vec![2], vec![1.0, 1.0]), &engine)
            .unwrap();
        let same_id = mgr
            .infer("p", Tensor::new("w", vec![2], vec![1.0, 1.0]), &engine)
            .unwrap();

        assert_eq!(plain.data, vec![5.0]);
        assert_eq!(same_id.data, vec![5.0]);
        assert_eq!(objects.get_tensor("w").unwrap().shape, vec![1, 2]);
        assert_eq!(objects.ids(), vec!["w"]);
    }

    #[test]
    fn infer_cleans_up_when_engine_panics() {
        struct Exploding;
        impl InferenceEngine for Exploding {
            fn infer(
                &self,
                _model: &Model,
                _input: &Tensor,
                _objects: &ObjectStore,
            ) -> Result<Tensor, crate::error::EngineError> {
                panic!("boom")
            }
        }

        let mgr = manager_with(Arc::new(StateStore::open_in_memory().unwrap()));
        mgr.save(&blob(&Model::plain(vec![])), "m").unwrap();

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            mgr.infer("m", Tensor::new("x", vec![1], vec![1.0]), &Exploding)
        }));
        assert!(outcome.is_err());
        assert!(mgr.objects().is_empty());
    }

    #[test]
    fn plan_resave_after_delete_hits_kept_state_records() {
        let store = StateStore::open_in_memory().unwrap();
        let objects = ObjectStore::new();
        let mgr = ModelManager::new(Arc::new(store.clone()), objects.clone(), Arc::new(JsonCodec));
        let plan = plan_with_state(&objects);
        mgr.save(&blob(&plan), "p").unwrap();

        mgr.delete("p").unwrap();
        // State tensor records outlive the model record.
        assert!(store.get_tensor("t1").unwrap().is_some());

        objects.register_tensor(Tensor::new("t1", vec![2], vec![8.0, 9.0]));
        let err = mgr.save(&blob(&plan), "p").unwrap_err();
        assert!(matches!(err, ModelError::Persistence(_)));
        assert!(store.get_model("p").unwrap().is_some());

        // A cold load brings back the original state values.
        mgr.clear_cache();
        objects.clear();
        mgr.get("p").unwrap();
        assert_eq!(objects.get_tensor("t1").unwrap().data, vec![1.0, 2.0]);
    }
}
