use std::sync::Arc;

use chrono::{TimeZone, Utc};
use realmstore_schema::metadata::IdentityScope;
use serde_json::json;
use uuid::Uuid;

use crate::graph::{Entity, GraphObject, Link, Slot, UnknownMember, Value};
use crate::model::{self, ACCOUNT, CHARACTER, CHARACTER_CLASS, ITEM_STORAGE};

fn instance(entity: &'static realmstore_schema::metadata::EntityType) -> crate::graph::ObjectRef {
    GraphObject::new(entity, Uuid::new_v4(), IdentityScope::Instance)
}

#[test]
fn new_objects_start_empty() {
    let account = instance(&ACCOUNT);

    assert_eq!(account.get("loginName"), Some(Value::Null));
    assert_eq!(account.get("nope"), None);
    assert!(account.collection("characters").is_empty());
    assert!(account.reference("vault").is_none());
}

#[test]
fn typed_accessors() {
    let account = instance(&ACCOUNT);
    let registered = Utc.with_ymd_and_hms(2024, 2, 29, 12, 30, 0).unwrap();
    account.set("loginName", Value::Text("tester".into())).unwrap();
    account.set("registrationDate", Value::Timestamp(registered)).unwrap();
    account.set("state", Value::Integer(2)).unwrap();

    assert_eq!(account.text("loginName").as_deref(), Some("tester"));
    assert_eq!(account.timestamp("registrationDate"), Some(registered));
    assert_eq!(account.integer("state"), Some(2));
    assert_eq!(account.float("state"), Some(2.0));
    assert_eq!(account.text("state"), None);
}

#[test]
fn unknown_members_are_rejected() {
    let account = instance(&ACCOUNT);

    assert_eq!(
        account.set("password", Value::Null),
        Err(UnknownMember {
            entity: "Account",
            member: "password".into()
        })
    );
    // wrong cardinality counts as unknown as well
    assert!(account.set_reference("characters", None).is_err());
    assert!(account.set_collection("vault", Vec::new()).is_err());
}

#[test]
fn link_strength_follows_ownership_and_scope() {
    let account = instance(&ACCOUNT);
    let character = instance(&CHARACTER);
    let class = GraphObject::new(&CHARACTER_CLASS, Uuid::new_v4(), IdentityScope::Configuration);

    account.set_collection("characters", vec![character.clone()]).unwrap();
    character.set_reference("account", Some(account.clone())).unwrap();
    character.set_reference("characterClass", Some(class.clone())).unwrap();

    let Some(Slot::Many(characters)) = account.link("characters") else {
        panic!("characters is a collection");
    };
    assert!(characters[0].is_strong());
    assert!(matches!(character.link("account"), Some(Slot::One(Some(Link::Weak(_))))));
    assert!(matches!(character.link("characterClass"), Some(Slot::One(Some(Link::Strong(_))))));

    // the back-reference does not keep the account alive
    let weak_account = Arc::downgrade(&account);
    drop(account);
    assert!(weak_account.upgrade().is_none());
    assert!(character.reference("account").is_none());

    // the configuration reference does
    drop(class);
    assert!(character.reference("characterClass").is_some());
}

#[test]
fn configuration_references_do_not_form_cycles() {
    let blade_knight = GraphObject::new(&CHARACTER_CLASS, Uuid::new_v4(), IdentityScope::Configuration);
    let dark_knight = GraphObject::new(&CHARACTER_CLASS, Uuid::new_v4(), IdentityScope::Configuration);
    blade_knight.set_reference("nextGenerationClass", Some(dark_knight.clone())).unwrap();
    dark_knight.set_reference("nextGenerationClass", Some(blade_knight.clone())).unwrap();

    assert!(matches!(
        blade_knight.link("nextGenerationClass"),
        Some(Slot::One(Some(Link::Weak(_))))
    ));
    assert_eq!(
        blade_knight.reference("nextGenerationClass").map(|next| next.id()),
        Some(dark_knight.id())
    );

    let weak_blade_knight = Arc::downgrade(&blade_knight);
    let weak_dark_knight = Arc::downgrade(&dark_knight);
    drop(blade_knight);
    drop(dark_knight);
    assert!(weak_blade_knight.upgrade().is_none());
    assert!(weak_dark_knight.upgrade().is_none());
}

#[test]
fn to_json_renders_the_document_shape() {
    let account = instance(&ACCOUNT);
    let vault = instance(&ITEM_STORAGE);
    let character = instance(&CHARACTER);
    vault.set("money", Value::Integer(1000)).unwrap();
    character.set("keyConfiguration", Value::Binary(vec![0x0a, 0xff])).unwrap();
    character.set_reference("account", Some(account.clone())).unwrap();
    account.set_reference("vault", Some(vault.clone())).unwrap();
    account.set_collection("characters", vec![character.clone()]).unwrap();

    let document = account.to_json();
    assert_eq!(document["id"], json!(account.id().to_string()));
    assert_eq!(document["loginName"], json!(null));
    assert_eq!(document["vault"]["money"], json!(1000));
    assert_eq!(document["vault"]["items"], json!([]));
    assert_eq!(document["characters"][0]["keyConfiguration"], json!("\\x0aff"));
    assert_eq!(
        document["characters"][0]["account"],
        json!({ "$ref": account.id().to_string() })
    );
    assert_eq!(document["characters"][0]["guilds"], json!([]));
}

#[test]
fn typed_views_check_the_entity_type() {
    let account = instance(&ACCOUNT);
    assert!(model::Character::from_object(account.clone()).is_none());

    let view = model::Account::from_object(account.clone()).unwrap();
    assert_eq!(view.id(), account.id());
    assert!(view.characters().is_empty());
}

#[test]
fn debug_output_survives_cycles() {
    let class = GraphObject::new(&CHARACTER_CLASS, Uuid::new_v4(), IdentityScope::Configuration);
    class.set("name", Value::Text("Dark Knight".into())).unwrap();
    class.set_reference("nextGenerationClass", Some(class.clone())).unwrap();

    let output = format!("{class:?}");
    assert!(output.starts_with("CharacterClass"));
    assert!(output.contains(&class.id().to_string()));
    assert!(output.contains("Dark Knight"));

    // a self-reference between configuration objects is weak
    let weak_class = Arc::downgrade(&class);
    drop(class);
    assert!(weak_class.upgrade().is_none());
}
