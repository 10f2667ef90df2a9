// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! External collaborator traits.
//!
//! The content scripts, popup UI, injected-script runtime, and persistent
//! key-value storage are out of scope (spec.md §1, §6); these traits are
//! the minimal interfaces the in-scope engine calls through so it can be
//! constructed and exercised without a real browser. No browser behavior
//! is reimplemented here — fakes live in `#[cfg(test)]` only.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use crate::error::AppError;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A single frame's root document identity, returned by frame probes.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameHandle {
    pub frame_id: u64,
    pub is_main: bool,
    pub url: String,
}

/// Message round-trip with a content script running in a tab (spec.md §6
/// content-script message protocol).
pub trait ContentScriptChannel: Send + Sync {
    fn dom_query<'a>(
        &'a self,
        tab_id: u64,
        frame_id: u64,
        message: Value,
    ) -> BoxFuture<'a, Result<Value, AppError>>;

    fn ping<'a>(&'a self, tab_id: u64, frame_id: u64) -> BoxFuture<'a, bool>;

    fn probe_frames<'a>(
        &'a self,
        tab_id: u64,
        selector: Option<&'a str>,
    ) -> BoxFuture<'a, Vec<FrameHandle>>;
}

/// The extension's native script-injection API (spec.md §6 injected-script
/// contract): runs a self-contained function in a given world.
pub trait ScriptInjector: Send + Sync {
    fn execute<'a>(
        &'a self,
        tab_id: u64,
        frame_id: u64,
        world: ExecutionWorld,
        script: &'a str,
    ) -> BoxFuture<'a, Result<Value, AppError>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionWorld {
    Main,
    Isolated,
}

/// Persistent key-value storage (spec.md §6): `serverUrl`, `sourceMapEnabled`,
/// `trackedTabId`/`Url`/`Title`, `gasoline_state_snapshots`, etc.
pub trait KeyValueStore: Send + Sync {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Option<Value>>;
    fn set<'a>(&'a self, key: &'a str, value: Value) -> BoxFuture<'a, ()>;
    fn remove<'a>(&'a self, key: &'a str) -> BoxFuture<'a, ()>;
}

/// Tab metadata lookups backed by the browser's tabs API.
pub trait TabsApi: Send + Sync {
    fn active_tab_id(&self) -> BoxFuture<'_, Option<u64>>;
    fn tab_exists(&self, tab_id: u64) -> BoxFuture<'_, bool>;
    fn tab_url(&self, tab_id: u64) -> BoxFuture<'_, Option<String>>;
    fn tab_title(&self, tab_id: u64) -> BoxFuture<'_, Option<String>>;
}

#[cfg(test)]
pub mod fakes {
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct FakeContentScriptChannel {
        pub loaded: Mutex<HashSet<u64>>,
        pub frames: Mutex<HashMap<u64, Vec<FrameHandle>>>,
    }

    impl ContentScriptChannel for FakeContentScriptChannel {
        fn dom_query<'a>(
            &'a self,
            tab_id: u64,
            _frame_id: u64,
            message: Value,
        ) -> BoxFuture<'a, Result<Value, AppError>> {
            let loaded = self.loaded.lock().unwrap().contains(&tab_id);
            Box::pin(async move {
                if !loaded {
                    return Err(AppError::new(
                        crate::error::ErrorCode::ContentScriptNotLoaded,
                        "Receiving end does not exist",
                    ));
                }
                Ok(message)
            })
        }

        fn ping<'a>(&'a self, tab_id: u64, _frame_id: u64) -> BoxFuture<'a, bool> {
            let loaded = self.loaded.lock().unwrap().contains(&tab_id);
            Box::pin(async move { loaded })
        }

        fn probe_frames<'a>(
            &'a self,
            tab_id: u64,
            _selector: Option<&'a str>,
        ) -> BoxFuture<'a, Vec<FrameHandle>> {
            let frames = self.frames.lock().unwrap().get(&tab_id).cloned().unwrap_or_default();
            Box::pin(async move { frames })
        }
    }

    #[derive(Default)]
    pub struct FakeScriptInjector {
        pub main_world_error: Mutex<Option<AppError>>,
        pub isolated_world_error: Mutex<Option<AppError>>,
        pub result: Mutex<Value>,
    }

    impl ScriptInjector for FakeScriptInjector {
        fn execute<'a>(
            &'a self,
            _tab_id: u64,
            _frame_id: u64,
            world: ExecutionWorld,
            _script: &'a str,
        ) -> BoxFuture<'a, Result<Value, AppError>> {
            let failure = match world {
                ExecutionWorld::Main => self.main_world_error.lock().unwrap().clone(),
                ExecutionWorld::Isolated => self.isolated_world_error.lock().unwrap().clone(),
            };
            let result = self.result.lock().unwrap().clone();
            Box::pin(async move {
                if let Some(err) = failure {
                    return Err(err);
                }
                Ok(result)
            })
        }
    }

    #[derive(Default)]
    pub struct FakeKeyValueStore {
        pub map: Mutex<HashMap<String, Value>>,
    }

    impl KeyValueStore for FakeKeyValueStore {
        fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Option<Value>> {
            let value = self.map.lock().unwrap().get(key).cloned();
            Box::pin(async move { value })
        }

        fn set<'a>(&'a self, key: &'a str, value: Value) -> BoxFuture<'a, ()> {
            self.map.lock().unwrap().insert(key.to_string(), value);
            Box::pin(async move {})
        }

        fn remove<'a>(&'a self, key: &'a str) -> BoxFuture<'a, ()> {
            self.map.lock().unwrap().remove(key);
            Box::pin(async move {})
        }
    }

    #[derive(Default)]
    pub struct FakeTabsApi {
        pub active: Mutex<Option<u64>>,
        pub tabs: Mutex<HashMap<u64, (String, String)>>,
    }

    impl TabsApi for FakeTabsApi {
        fn active_tab_id(&self) -> BoxFuture<'_, Option<u64>> {
            let active = *self.active.lock().unwrap();
            Box::pin(async move { active })
        }

        fn tab_exists(&self, tab_id: u64) -> BoxFuture<'_, bool> {
            let exists = self.tabs.lock().unwrap().contains_key(&tab_id);
            Box::pin(async move { exists })
        }

        fn tab_url(&self, tab_id: u64) -> BoxFuture<'_, Option<String>> {
            let url = self.tabs.lock().unwrap().get(&tab_id).map(|(url, _)| url.clone());
            Box::pin(async move { url })
        }

        fn tab_title(&self, tab_id: u64) -> BoxFuture<'_, Option<String>> {
            let title = self.tabs.lock().unwrap().get(&tab_id).map(|(_, title)| title.clone());
            Box::pin(async move { title })
        }
    }
}
