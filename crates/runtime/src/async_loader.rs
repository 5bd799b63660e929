use std::sync::Arc;

use futures_util::future::{FutureExt, Shared};
use parking_lot::Mutex;

use crate::BoxFuture;

pub type SharedLoad = Shared<BoxFuture<'static, ()>>;

#[derive(Default)]
struct LoaderState {
    in_flight: Option<SharedLoad>,
    rerun: bool,
}

/// Single-flight wrapper around a repeatable async load.
///
/// While a load is in flight every `load` call returns the same shared future.
/// A call that joins a running load also asks for one more run, so whatever
/// changed since the running load started is picked up before the shared
/// future resolves. Once it finishes the next `load` starts afresh.
#[derive(Clone, Default)]
pub struct AsyncLoader {
    state: Arc<Mutex<LoaderState>>,
}

impl AsyncLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_loading(&self) -> bool {
        self.state.lock().in_flight.is_some()
    }

    /// Joins the in-flight load, or starts one that runs `start` until no
    /// further run was requested.
    ///
    /// When a load is already in flight `start` is dropped and the running
    /// load's own `start` is called again. It must not call back into this
    /// loader.
    pub fn load<F>(&self, start: F) -> SharedLoad
    where
        F: Fn() -> BoxFuture<'static, ()> + Send + 'static,
    {
        let mut state = self.state.lock();
        if let Some(existing) = state.in_flight.clone() {
            state.rerun = true;
            return existing;
        }

        let slot = Arc::clone(&self.state);
        let shared = async move {
            loop {
                let run = start();
                run.await;
                let again = {
                    let mut state = slot.lock();
                    if !state.rerun {
                        state.in_flight = None;
                    }
                    std::mem::take(&mut state.rerun)
                };
                if !again {
                    break;
                }
            }
        }
        .boxed()
        .shared();

        state.in_flight = Some(shared.clone());
        shared
    }
}
