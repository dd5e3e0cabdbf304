//! In-memory object store that records every put

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ghibli_image_gen::storage::{BucketTarget, ObjectStore, PutObject};

pub struct RecordingStore {
    events: Arc<Mutex<Vec<String>>>,
    objects: Mutex<Vec<(BucketTarget, PutObject)>>,
}

impl RecordingStore {
    pub fn new(events: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            events,
            objects: Mutex::new(Vec::new()),
        }
    }

    pub fn objects(&self) -> Vec<(BucketTarget, PutObject)> {
        self.objects.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStore for RecordingStore {
    async fn put_object(&self, target: &BucketTarget, object: PutObject) -> anyhow::Result<()> {
        self.events
            .lock()
            .unwrap()
            .push(format!("upload {}", object.key));
        self.objects.lock().unwrap().push((target.clone(), object));
        Ok(())
    }
}
