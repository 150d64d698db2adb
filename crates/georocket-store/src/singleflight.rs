//! Single-flight computation cache
//!
//! Concurrent requests for the same key await one in-flight computation
//! instead of racing duplicates. The computation itself is responsible for
//! storing its durable result; this type only coalesces the in-flight
//! phase.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Mutex;

use futures::future::{BoxFuture, FutureExt, Shared};

pub struct SingleFlight<K, V> {
    in_flight: Mutex<HashMap<K, Shared<BoxFuture<'static, V>>>>,
}

impl<K, V> Default for SingleFlight<K, V> {
    fn default() -> Self {
        Self {
            in_flight: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> SingleFlight<K, V>
where
    K: Clone + Eq + Hash,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `load` for `key`, or join a load already in flight
    ///
    /// The first caller becomes the leader and removes the entry once the
    /// computation settles; waiters that arrived in between receive a clone
    /// of the same result.
    pub async fn get_or_load<F, Fut>(&self, key: K, load: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        let (shared, leader) = {
            let mut in_flight = self.in_flight.lock().unwrap();
            match in_flight.get(&key) {
                Some(shared) => (shared.clone(), false),
                None => {
                    let shared = load().boxed().shared();
                    in_flight.insert(key.clone(), shared.clone());
                    (shared, true)
                }
            }
        };
        let value = shared.await;
        if leader {
            self.in_flight.lock().unwrap().remove(&key);
        }
        value
    }
}
