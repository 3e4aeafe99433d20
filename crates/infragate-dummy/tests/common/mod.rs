//! Shared helpers for the dummy backend tests

#![allow(dead_code)]

use infragate_core::catalog::{os_tpl_id, resource_tpl_id};
use infragate_core::{BackendProxy, Mixin, RequestContext};
use infragate_dummy::DummyBackend;
use std::path::PathBuf;

pub const WEB_1: &str = "87f3bfc3-42d4-4474-b45c-757e55e093e9";
pub const DB_1: &str = "0b9a1fd7-5c64-4a2d-a3a4-10c1b25e7d0e";

pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

pub async fn seeded() -> (DummyBackend, BackendProxy) {
    let backend = DummyBackend::load(Some(fixtures_dir().as_path()))
        .await
        .unwrap();
    let proxy = backend.proxy().await.unwrap();
    (backend, proxy)
}

pub fn cx() -> RequestContext {
    RequestContext::new("test")
}

pub fn ubuntu(proxy: &BackendProxy) -> Mixin {
    proxy
        .catalog()
        .mixin(&os_tpl_id("ubuntu-24-04"))
        .cloned()
        .unwrap()
}

pub fn small(proxy: &BackendProxy) -> Mixin {
    proxy
        .catalog()
        .mixin(&resource_tpl_id("small"))
        .cloned()
        .unwrap()
}
