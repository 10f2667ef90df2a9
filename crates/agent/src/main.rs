// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use clap::Parser;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::error;

use gasoline_agent::collaborators::{ContentScriptChannel, FrameHandle, KeyValueStore, ScriptInjector, TabsApi};
use gasoline_agent::config::Config;
use gasoline_agent::error::{AppError, ErrorCode};
use gasoline_agent::run::{self, Collaborators};
use gasoline_agent::util::lock;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Plain in-memory key-value store. A real build would back this with the
/// extension's `chrome.storage.local`; this process has no such storage, so
/// persisted state (pilot opt-in, tracked tab, snapshots) resets every run.
#[derive(Default)]
struct ProcessLocalKeyValueStore {
    map: Mutex<HashMap<String, Value>>,
}

impl KeyValueStore for ProcessLocalKeyValueStore {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Option<Value>> {
        let value = lock(&self.map).get(key).cloned();
        Box::pin(async move { value })
    }

    fn set<'a>(&'a self, key: &'a str, value: Value) -> BoxFuture<'a, ()> {
        lock(&self.map).insert(key.to_string(), value);
        Box::pin(async move {})
    }

    fn remove<'a>(&'a self, key: &'a str) -> BoxFuture<'a, ()> {
        lock(&self.map).remove(key);
        Box::pin(async move {})
    }
}

/// No tabs are visible from a standalone process; browser-tab plumbing is
/// out of scope for this build (spec.md §1).
struct NoTabsApi;

impl TabsApi for NoTabsApi {
    fn active_tab_id(&self) -> BoxFuture<'_, Option<u64>> {
        Box::pin(async move { None })
    }

    fn tab_exists(&self, _tab_id: u64) -> BoxFuture<'_, bool> {
        Box::pin(async move { false })
    }

    fn tab_url(&self, _tab_id: u64) -> BoxFuture<'_, Option<String>> {
        Box::pin(async move { None })
    }

    fn tab_title(&self, _tab_id: u64) -> BoxFuture<'_, Option<String>> {
        Box::pin(async move { None })
    }
}

/// No content script is ever loaded outside a real browser tab; `dom`
/// commands always fail with `content_script_not_loaded`.
struct NoContentScriptChannel;

impl ContentScriptChannel for NoContentScriptChannel {
    fn dom_query<'a>(&'a self, _tab_id: u64, _frame_id: u64, _message: Value) -> BoxFuture<'a, Result<Value, AppError>> {
        Box::pin(async move { Err(AppError::new(ErrorCode::ContentScriptNotLoaded, "no content script in a headless build")) })
    }

    fn ping<'a>(&'a self, _tab_id: u64, _frame_id: u64) -> BoxFuture<'a, bool> {
        Box::pin(async move { false })
    }

    fn probe_frames<'a>(&'a self, _tab_id: u64, _selector: Option<&'a str>) -> BoxFuture<'a, Vec<FrameHandle>> {
        Box::pin(async move { Vec::new() })
    }
}

/// No script injection surface exists outside a real browser tab.
struct NoScriptInjector;

impl ScriptInjector for NoScriptInjector {
    fn execute<'a>(
        &'a self,
        _tab_id: u64,
        _frame_id: u64,
        _world: gasoline_agent::collaborators::ExecutionWorld,
        _script: &'a str,
    ) -> BoxFuture<'a, Result<Value, AppError>> {
        Box::pin(async move { Err(AppError::new(ErrorCode::ContentScriptNotLoaded, "no script injector in a headless build")) })
    }
}

#[tokio::main]
async fn main() {
    let config = Config::parse();

    if let Err(e) = config.validate() {
        eprintln!("error: {e}");
        std::process::exit(2);
    }

    run::init_tracing(&config);

    let collaborators = Collaborators {
        kv: Arc::new(ProcessLocalKeyValueStore::default()),
        tabs: Arc::new(NoTabsApi),
        content: Arc::new(NoContentScriptChannel),
        injector: Arc::new(NoScriptInjector),
    };

    if let Err(e) = run::run(config, collaborators, CancellationToken::new()).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}
