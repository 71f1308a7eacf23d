use std::sync::Arc;

use realmstore_schema::metadata::IdentityScope;
use uuid::Uuid;

use crate::graph::GraphObject;
use crate::model::{ACCOUNT, ITEM_DEFINITION};
use crate::resolver::{ConfigurationResolver, IdentityConflict, LoadScope};

#[test]
fn register_is_idempotent_for_the_same_object() {
    let resolver = ConfigurationResolver::new();
    let definition = GraphObject::new(&ITEM_DEFINITION, Uuid::new_v4(), IdentityScope::Configuration);

    resolver.register(definition.clone()).unwrap();
    resolver.register(definition.clone()).unwrap();

    assert_eq!(resolver.len(), 1);
    assert!(Arc::ptr_eq(&resolver.resolve(definition.id()).unwrap(), &definition));
}

#[test]
fn register_rejects_a_second_instance() {
    let resolver = ConfigurationResolver::new();
    let id = Uuid::new_v4();
    resolver
        .register(GraphObject::new(&ITEM_DEFINITION, id, IdentityScope::Configuration))
        .unwrap();

    let result = resolver.register(GraphObject::new(&ITEM_DEFINITION, id, IdentityScope::Configuration));
    assert_eq!(
        result,
        Err(IdentityConflict {
            id,
            entity: "ItemDefinition"
        })
    );
}

#[test]
fn evict_forgets_the_object() {
    let resolver = ConfigurationResolver::new();
    let definition = GraphObject::new(&ITEM_DEFINITION, Uuid::new_v4(), IdentityScope::Configuration);
    resolver.register(definition.clone()).unwrap();

    let evicted = resolver.evict(definition.id()).unwrap();
    assert!(Arc::ptr_eq(&evicted, &definition));
    assert!(!resolver.contains(definition.id()));
    assert!(resolver.evict(definition.id()).is_none());
    assert!(resolver.is_empty());
}

#[test]
fn staged_objects_are_private_until_the_row_finishes() {
    let resolver = ConfigurationResolver::new();
    let definition = GraphObject::new(&ITEM_DEFINITION, Uuid::new_v4(), IdentityScope::Configuration);

    let mut scope = LoadScope::new(&resolver);
    assert!(scope.resolve_inline(IdentityScope::Configuration, definition.id()).is_none());
    scope.register(definition.clone());

    assert!(scope.resolve(IdentityScope::Configuration, definition.id()).is_some());
    assert!(!resolver.contains(definition.id()));

    scope.finish_row();
    assert!(resolver.contains(definition.id()));
}

#[test]
fn abandoned_rows_publish_nothing() {
    let resolver = ConfigurationResolver::new();
    let definition = GraphObject::new(&ITEM_DEFINITION, Uuid::new_v4(), IdentityScope::Configuration);

    let mut scope = LoadScope::new(&resolver);
    scope.register(definition.clone());
    scope.abandon_row();

    assert!(!resolver.contains(definition.id()));
    assert!(scope.resolve(IdentityScope::Configuration, definition.id()).is_none());
    // the population lock has been released again
    resolver.register(definition).unwrap();
}

#[test]
fn instance_objects_stay_in_their_load() {
    let resolver = ConfigurationResolver::new();
    let account = GraphObject::new(&ACCOUNT, Uuid::new_v4(), IdentityScope::Instance);

    let mut first = LoadScope::new(&resolver);
    first.register(account.clone());
    first.finish_row();

    let second = LoadScope::new(&resolver);
    assert!(first.resolve(IdentityScope::Instance, account.id()).is_some());
    assert!(second.resolve(IdentityScope::Instance, account.id()).is_none());
    assert!(first.resolve(IdentityScope::Configuration, account.id()).is_none());
    assert_eq!(first.instance().len(), 1);
    assert!(resolver.is_empty());
}
