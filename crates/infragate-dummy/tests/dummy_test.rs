mod common;

use common::*;
use infragate_core::catalog::{actions, attrs, kinds, mixins, os_tpl_id};
use infragate_core::{
    ActionInstance, BackendError, Entity, ErrorClass, Identifier, MixinFilter,
};
use infragate_dummy::{DummyBackend, DummyStore};
use serde_json::json;

#[tokio::test]
async fn test_fixtures_are_loaded() {
    let (_, proxy) = seeded().await;
    let cx = cx();

    let computes = proxy.list("compute", &MixinFilter::new(), &cx).await.unwrap();
    assert_eq!(computes.len(), 2);

    let networks = proxy.identifiers("network", &MixinFilter::new(), &cx).await.unwrap();
    assert_eq!(networks, vec![Identifier::new("public")]);

    // storage.json is absent
    let storages = proxy.list("storage", &MixinFilter::new(), &cx).await.unwrap();
    assert!(storages.is_empty());

    let web = proxy
        .instance("compute", &Identifier::new(WEB_1), &cx)
        .await
        .unwrap();
    assert_eq!(web.attribute_str(attrs::TITLE), Some("web-1"));
    assert_eq!(web.attribute_str(attrs::ID), Some(WEB_1));
}

#[tokio::test]
async fn test_templates_are_registered_in_catalog() {
    let (_, proxy) = seeded().await;
    let catalog = proxy.catalog();

    assert_eq!(catalog.mixins_related_to(mixins::OS_TPL).count(), 1);
    assert_eq!(catalog.mixins_related_to(mixins::RESOURCE_TPL).count(), 1);
    assert!(catalog.mixin(&os_tpl_id("ubuntu-24-04")).is_some());
}

#[tokio::test]
async fn test_create_compute_without_os_tpl_is_rejected() {
    let (backend, proxy) = seeded().await;
    let cx = cx();

    let bare = Entity::new(kinds::COMPUTE).with_attribute(attrs::COMPUTE_CORES, json!(2));
    let err = proxy.create("compute", &bare, &cx).await.unwrap_err();

    assert!(matches!(err, BackendError::ResourceNotValid(_)));
    assert_eq!(err.class(), ErrorClass::Validation);
    // nothing was written
    assert_eq!(backend.store().read().await.compute.len(), 2);
}

#[tokio::test]
async fn test_create_compute_with_only_the_base_os_tpl_is_rejected() {
    let (backend, proxy) = seeded().await;
    let base = proxy.catalog().mixin(mixins::OS_TPL).unwrap().clone();

    let entity = Entity::new(kinds::COMPUTE).with_mixin(base);
    let err = proxy.create("compute", &entity, &cx()).await.unwrap_err();

    assert!(matches!(err, BackendError::ResourceNotValid(_)));
    assert_eq!(backend.store().read().await.compute.len(), 2);
}

#[tokio::test]
async fn test_create_compute_with_templates() {
    let (_, proxy) = seeded().await;
    let cx = cx();

    let entity = Entity::new(kinds::COMPUTE)
        .with_attribute(attrs::TITLE, json!("worker"))
        .with_attribute(attrs::COMPUTE_CORES, json!(8))
        .with_mixin(ubuntu(&proxy))
        .with_mixin(small(&proxy));

    let id = proxy.create("compute", &entity, &cx).await.unwrap();
    let created = proxy.instance("compute", &id, &cx).await.unwrap();

    assert_eq!(created.attribute_str(attrs::ID), Some(id.as_str()));
    assert_eq!(created.attribute_str(attrs::COMPUTE_STATE), Some("active"));
    // client value wins over the template default
    assert_eq!(created.attribute_i64(attrs::COMPUTE_CORES), Some(8));
    assert_eq!(created.attribute_f64(attrs::COMPUTE_MEMORY), Some(1.0));
    assert_eq!(
        proxy.identifiers("compute", &MixinFilter::new(), &cx).await.unwrap().len(),
        3
    );
}

#[tokio::test]
async fn test_create_with_unknown_template_is_rejected() {
    let (_, proxy) = seeded().await;
    let cx = cx();

    let ghost = infragate_core::catalog::os_tpl_mixin("ghost", "Not offered");
    let entity = Entity::new(kinds::COMPUTE).with_mixin(ghost);

    let err = proxy.create("compute", &entity, &cx).await.unwrap_err();
    assert!(matches!(err, BackendError::ResourceNotValid(_)));
}

#[tokio::test]
async fn test_suggested_id_is_kept_unless_taken() {
    let (_, proxy) = seeded().await;
    let cx = cx();

    let fresh = Entity::new(kinds::NETWORK).with_id(Identifier::new("private"));
    let id = proxy.create("network", &fresh, &cx).await.unwrap();
    assert_eq!(id.as_str(), "private");

    let taken = Entity::new(kinds::NETWORK).with_id(Identifier::new("public"));
    let id = proxy.create("network", &taken, &cx).await.unwrap();
    assert_ne!(id.as_str(), "public");
}

#[tokio::test]
async fn test_delete_unknown_id_is_not_found_for_every_kind() {
    let (_, proxy) = seeded().await;
    let cx = cx();

    for kind in ["compute", "network", "storage"] {
        let err = proxy
            .delete(kind, &Identifier::new("does-not-exist"), &cx)
            .await
            .unwrap_err();
        assert!(
            matches!(err, BackendError::EntityNotFound(_)),
            "{}: {:?}",
            kind,
            err
        );
    }
}

#[tokio::test]
async fn test_delete_and_exists() {
    let (_, proxy) = seeded().await;
    let cx = cx();
    let id = Identifier::new(DB_1);

    assert!(proxy.exists("compute", &id, &cx).await.unwrap());
    proxy.delete("compute", &id, &cx).await.unwrap();
    assert!(!proxy.exists("compute", &id, &cx).await.unwrap());
    assert!(matches!(
        proxy.instance("compute", &id, &cx).await,
        Err(BackendError::EntityNotFound(_))
    ));
}

#[tokio::test]
async fn test_filtered_list_and_delete_all() {
    let (_, proxy) = seeded().await;
    let cx = cx();
    let filter = MixinFilter::new().with(os_tpl_id("ubuntu-24-04"));

    let matching = proxy.list("compute", &filter, &cx).await.unwrap();
    assert_eq!(matching.len(), 1);
    assert_eq!(matching[0].id_str(), WEB_1);

    proxy.delete_all("compute", &filter, &cx).await.unwrap();
    let left = proxy.identifiers("compute", &MixinFilter::new(), &cx).await.unwrap();
    assert_eq!(left, vec![Identifier::new(DB_1)]);
}

#[tokio::test]
async fn test_every_declared_action_is_dispatched() {
    let (_, proxy) = seeded().await;

    for kind in proxy.served_kinds() {
        let adapter = proxy.adapter_for(&kind.term).unwrap();
        let mut supported = adapter.supported_actions();
        supported.sort();
        let mut declared = kind.actions.clone();
        declared.sort();
        assert_eq!(supported, declared, "{}", kind.term);
    }
}

#[tokio::test]
async fn test_compute_actions_change_state() {
    let (_, proxy) = seeded().await;
    let cx = cx();
    let id = Identifier::new(WEB_1);

    let expectations = [
        (actions::COMPUTE_STOP, "inactive"),
        (actions::COMPUTE_START, "active"),
        (actions::COMPUTE_SUSPEND, "suspended"),
        (actions::COMPUTE_RESTART, "active"),
    ];
    for (action, state) in expectations {
        proxy
            .trigger("compute", &id, &ActionInstance::new(action), &cx)
            .await
            .unwrap();
        let entity = proxy.instance("compute", &id, &cx).await.unwrap();
        assert_eq!(entity.attribute_str(attrs::COMPUTE_STATE), Some(state));
    }
}

#[tokio::test]
async fn test_trigger_all_on_network() {
    let (_, proxy) = seeded().await;
    let cx = cx();

    proxy
        .trigger_all(
            "network",
            &MixinFilter::new(),
            &ActionInstance::new(actions::NETWORK_DOWN),
            &cx,
        )
        .await
        .unwrap();

    let public = proxy
        .instance("network", &Identifier::new("public"), &cx)
        .await
        .unwrap();
    assert_eq!(public.attribute_str(attrs::NETWORK_STATE), Some("inactive"));
}

#[tokio::test]
async fn test_trigger_errors() {
    let (_, proxy) = seeded().await;
    let cx = cx();

    let err = proxy
        .trigger(
            "network",
            &Identifier::new("public"),
            &ActionInstance::new(actions::COMPUTE_START),
            &cx,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::ActionNotImplemented(_)));

    let err = proxy
        .trigger(
            "compute",
            &Identifier::new("missing"),
            &ActionInstance::new(actions::COMPUTE_START),
            &cx,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::EntityNotFound(_)));
}

#[tokio::test]
async fn test_partial_update_attaches_template() {
    let (_, proxy) = seeded().await;
    let cx = cx();

    let updated = proxy
        .partial_update("compute", &Identifier::new(DB_1), &[small(&proxy)], &cx)
        .await
        .unwrap();

    assert!(updated.mixins.related_to(mixins::RESOURCE_TPL).next().is_some());
    // cores came from the fixture, memory from the template
    assert_eq!(updated.attribute_i64(attrs::COMPUTE_CORES), Some(4));
    assert_eq!(updated.attribute_f64(attrs::COMPUTE_MEMORY), Some(1.0));
}

#[tokio::test]
async fn test_update_is_not_implemented() {
    let (_, proxy) = seeded().await;
    let err = proxy
        .update("compute", &Entity::new(kinds::COMPUTE), &cx())
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::MethodNotImplemented(_)));
}

#[tokio::test]
async fn test_reset_drops_resources_but_keeps_templates() {
    let (backend, proxy) = seeded().await;
    backend.store().reset().await;

    let computes = proxy.list("compute", &MixinFilter::new(), &cx()).await.unwrap();
    assert!(computes.is_empty());
    assert_eq!(backend.store().read().await.os_tpl.len(), 1);
}

#[tokio::test]
async fn test_empty_backend_without_fixtures_dir() {
    let backend = DummyBackend::load(None).await.unwrap();
    let proxy = backend.proxy().await.unwrap();

    assert!(proxy.serves("compute"));
    assert!(!proxy.serves("networkinterface"));
    let ids = proxy.identifiers("storage", &MixinFilter::new(), &cx()).await.unwrap();
    assert!(ids.is_empty());
}

#[tokio::test]
async fn test_fixture_of_wrong_kind_is_rejected() {
    let temp_dir = tempfile::tempdir().unwrap();
    std::fs::write(
        temp_dir.path().join("storage.json"),
        r#"[{"kind": "http://schemas.ogf.org/occi/infrastructure#network"}]"#,
    )
    .unwrap();

    let result = DummyStore::load(temp_dir.path()).await;
    assert!(matches!(result, Err(BackendError::Configuration(_))));
}

#[tokio::test]
async fn test_fixture_without_id_gets_one() {
    let temp_dir = tempfile::tempdir().unwrap();
    std::fs::write(
        temp_dir.path().join("storage.json"),
        r#"[{"kind": "http://schemas.ogf.org/occi/infrastructure#storage",
             "attributes": {"occi.storage.size": 10.0}}]"#,
    )
    .unwrap();

    let store = DummyStore::load(temp_dir.path()).await.unwrap();
    let fixtures = store.read().await;
    assert!(fixtures.storage[0].id.is_some());
    assert!(fixtures.storage[0].attribute_str(attrs::ID).is_some());
}
