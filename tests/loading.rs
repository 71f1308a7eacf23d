use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use realmstore::graph::{Entity, GraphObject};
use realmstore::model::{self, Account, CHARACTER_CLASS, GameConfiguration};
use realmstore::rows::{Connection, MemoryConnection, RawRow, RowCursor, StoreError};
use realmstore::schema::metadata::IdentityScope;
use realmstore::schema::wire::binary::BinaryDecodeError;
use realmstore::{ConfigurationResolver, GraphLoader, IdentityConflict, LoadError, PayloadErrorKind};
use serde_json::{Value as Json, json};
use uuid::Uuid;

const CONFIGURATION: Uuid = Uuid::from_u128(0x1000);
const BLADE_KNIGHT: Uuid = Uuid::from_u128(0x1001);
const DARK_KNIGHT: Uuid = Uuid::from_u128(0x1002);
const KRIS: Uuid = Uuid::from_u128(0x1003);
const LORENCIA: Uuid = Uuid::from_u128(0x1004);
const LORENCIA_GATE: Uuid = Uuid::from_u128(0x1005);

const ACCOUNT: Uuid = Uuid::from_u128(0x2000);
const SECOND_ACCOUNT: Uuid = Uuid::from_u128(0x2001);
const HERO: Uuid = Uuid::from_u128(0x2002);
const INVENTORY: Uuid = Uuid::from_u128(0x2003);
const ITEM: Uuid = Uuid::from_u128(0x2004);
const VAULT: Uuid = Uuid::from_u128(0x2005);
const GUILD: Uuid = Uuid::from_u128(0x2006);

fn loader() -> GraphLoader {
    let registry = model::game_model().expect("valid game model");
    GraphLoader::new(Arc::new(registry), ConfigurationResolver::new())
}

fn marker(id: Uuid) -> Json {
    json!({ "$ref": id.to_string() })
}

fn configuration_document() -> Json {
    json!({
        "id": CONFIGURATION.to_string(),
        "maximumLevel": 400,
        "maximumInventoryMoney": 2_000_000_000,
        "experienceRate": 1.5,
        "characterClasses": [
            {
                "id": BLADE_KNIGHT.to_string(),
                "number": 0,
                "name": "Blade Knight",
                "canGetCreated": false,
                "nextGenerationClass": null
            },
            {
                "id": DARK_KNIGHT.to_string(),
                "number": 1,
                "name": "Dark Knight",
                "canGetCreated": true,
                "nextGenerationClass": marker(BLADE_KNIGHT)
            }
        ],
        "items": [
            {
                "id": KRIS.to_string(),
                "number": 0,
                "group": 0,
                "name": "Kris",
                "width": 1,
                "height": 2,
                "durability": 20,
                "qualifiedCharacters": [marker(BLADE_KNIGHT), marker(DARK_KNIGHT)]
            }
        ],
        "maps": [
            {
                "id": LORENCIA.to_string(),
                "number": 0,
                "name": "Lorencia",
                "experienceMultiplier": 1.0,
                "terrainData": "\\x0102",
                "exitGates": [
                    {
                        "id": LORENCIA_GATE.to_string(),
                        "x1": 130, "y1": 116, "x2": 151, "y2": 137,
                        "direction": 0,
                        "isSpawnGate": true
                    }
                ],
                "defaultSpawnGate": marker(LORENCIA_GATE)
            }
        ]
    })
}

fn character_document(id: Uuid, account: Uuid, key_configuration: &str) -> Json {
    json!({
        "id": id.to_string(),
        "name": "Hero",
        "characterSlot": 0,
        "experience": 1234,
        "positionX": 130,
        "positionY": 120,
        "createDate": "2024-03-01T10:05:00+00:00",
        "keyConfiguration": key_configuration,
        "inventory": {
            "id": INVENTORY.to_string(),
            "money": 100,
            "items": [
                {
                    "id": ITEM.to_string(),
                    "itemSlot": 12,
                    "level": 3,
                    "durability": 20.0,
                    "hasSkill": true,
                    "definition": marker(KRIS)
                }
            ]
        },
        "characterClass": marker(DARK_KNIGHT),
        "currentMap": marker(LORENCIA),
        "account": marker(account),
        "guilds": [marker(GUILD)]
    })
}

fn account_document(id: Uuid, characters: Json) -> Json {
    json!({
        "id": id.to_string(),
        "loginName": "tester",
        "eMail": "tester@example.com",
        "registrationDate": "2024-03-01T10:00:00.123456",
        "state": 0,
        "isTemplate": false,
        "characters": characters,
        "vault": { "id": VAULT.to_string(), "money": 0, "items": [] }
    })
}

fn hero_account() -> MemoryConnection {
    MemoryConnection::new().with_row(
        ACCOUNT,
        account_document(ACCOUNT, json!([character_document(HERO, ACCOUNT, "\\x0aff")])).to_string(),
    )
}

fn load_configuration(loader: &GraphLoader) -> GameConfiguration {
    let mut connection =
        MemoryConnection::new().with_row(CONFIGURATION, configuration_document().to_string());
    let mut configurations = loader
        .load_all_as::<GameConfiguration>(&mut connection)
        .expect("query");
    configurations.next().expect("one row").expect("valid row")
}

#[test_log::test]
fn loads_an_account_aggregate() -> Result<(), anyhow::Error> {
    let loader = loader();
    let configuration = load_configuration(&loader);

    let mut connection = hero_account();
    let accounts = loader
        .load_all_as::<Account>(&mut connection)?
        .collect::<Result<Vec<_>, _>>()?;
    assert_eq!(accounts.len(), 1);

    let account = &accounts[0];
    assert_eq!(account.login_name().as_deref(), Some("tester"));
    assert_eq!(
        account.registration_date().map(|date| date.to_rfc3339()),
        Some("2024-03-01T10:00:00.123456+00:00".to_string())
    );
    assert_eq!(account.vault().and_then(|vault| vault.money()), Some(0));

    let hero = &account.characters()[0];
    assert_eq!(hero.name().as_deref(), Some("Hero"));
    assert_eq!(hero.key_configuration(), Some(vec![0x0a, 0xff]));
    assert!(Arc::ptr_eq(hero.account().unwrap().object(), account.object()));

    let item = &hero.inventory().unwrap().items()[0];
    assert_eq!(item.item_slot(), Some(12));
    let kris = &configuration.items()[0];
    assert!(Arc::ptr_eq(item.definition().unwrap().object(), kris.object()));

    let class = hero.character_class().unwrap();
    assert_eq!(class.name().as_deref(), Some("Dark Knight"));
    assert_eq!(class.object().scope(), IdentityScope::Configuration);
    assert_eq!(hero.current_map().and_then(|map| map.name()).as_deref(), Some("Lorencia"));

    // the guild is not part of this load
    assert!(hero.guilds().is_empty());
    Ok(())
}

#[test_log::test]
fn configuration_objects_are_shared_across_loads() -> Result<(), anyhow::Error> {
    let loader = loader();
    let configuration = load_configuration(&loader);

    let mut first = hero_account();
    let mut second = hero_account();
    let first = loader.load_as::<Account>(&mut first, ACCOUNT)?.unwrap();
    let second = loader.load_as::<Account>(&mut second, ACCOUNT)?.unwrap();

    // instance objects are rebuilt per load
    assert!(!Arc::ptr_eq(first.object(), second.object()));

    let first_class = first.characters()[0].character_class().unwrap();
    let second_class = second.characters()[0].character_class().unwrap();
    assert!(Arc::ptr_eq(first_class.object(), second_class.object()));
    assert!(Arc::ptr_eq(
        first_class.object(),
        configuration.character_classes()[1].object()
    ));

    // loading the configuration again hands out the cached aggregate
    let again = load_configuration(&loader);
    assert!(Arc::ptr_eq(again.object(), configuration.object()));
    Ok(())
}

#[test_log::test]
fn many_to_many_and_reference_markers() {
    let loader = loader();
    let configuration = load_configuration(&loader);
    let classes = configuration.character_classes();

    let kris = &configuration.items()[0];
    let qualified = kris.qualified_characters();
    assert_eq!(qualified.len(), 2);
    assert!(Arc::ptr_eq(qualified[0].object(), classes[0].object()));
    assert!(Arc::ptr_eq(qualified[1].object(), classes[1].object()));

    let next = classes[1].next_generation_class().unwrap();
    assert!(Arc::ptr_eq(next.object(), classes[0].object()));
    assert!(classes[0].next_generation_class().is_none());
}

#[test_log::test]
fn exit_gates_are_rebuilt_before_the_spawn_gate_resolves() {
    let loader = loader();
    let configuration = load_configuration(&loader);

    let lorencia = &configuration.maps()[0];
    assert_eq!(lorencia.terrain_data(), Some(vec![0x01, 0x02]));
    let gates = lorencia.exit_gates();
    assert_eq!(gates.len(), 1);
    assert_eq!(gates[0].is_spawn_gate(), Some(true));

    let spawn = lorencia.default_spawn_gate().unwrap();
    assert!(Arc::ptr_eq(spawn.object(), gates[0].object()));
}

#[test_log::test]
fn dangling_references_are_tolerated() -> Result<(), anyhow::Error> {
    let loader = loader();
    let mut connection = hero_account();

    let account = loader.load_as::<Account>(&mut connection, ACCOUNT)?.unwrap();
    let hero = &account.characters()[0];
    assert!(hero.character_class().is_none());
    assert!(hero.current_map().is_none());
    assert!(hero.inventory().unwrap().items()[0].definition().is_none());
    assert!(Arc::ptr_eq(hero.account().unwrap().object(), account.object()));
    Ok(())
}

#[test_log::test]
fn identity_holds_across_rows_of_one_load() -> Result<(), anyhow::Error> {
    let loader = loader();
    // the second account's character points back at the first account
    let mut connection = hero_account().with_row(
        SECOND_ACCOUNT,
        account_document(
            SECOND_ACCOUNT,
            json!([character_document(Uuid::from_u128(0x3000), ACCOUNT, "\\x")]),
        )
        .to_string(),
    );

    let accounts = loader
        .load_all_as::<Account>(&mut connection)?
        .collect::<Result<Vec<_>, _>>()?;
    assert_eq!(accounts.len(), 2);

    let stranger = &accounts[1].characters()[0];
    assert_eq!(stranger.key_configuration(), Some(vec![]));
    assert!(Arc::ptr_eq(stranger.account().unwrap().object(), accounts[0].object()));

    // inventory and vault ids repeat in the fixture, the second row reuses the first row's objects
    assert!(Arc::ptr_eq(
        accounts[0].vault().unwrap().object(),
        accounts[1].vault().unwrap().object()
    ));
    Ok(())
}

#[test_log::test]
fn null_navigations_read_as_empty() -> Result<(), anyhow::Error> {
    let loader = loader();
    let document = json!({
        "id": ACCOUNT.to_string(),
        "loginName": null,
        "characters": null,
        "vault": null
    });
    let mut connection = MemoryConnection::new().with_row(ACCOUNT, document.to_string());

    let account = loader.load_as::<Account>(&mut connection, ACCOUNT)?.unwrap();
    assert!(account.characters().is_empty());
    assert!(account.vault().is_none());
    assert!(account.login_name().is_none());
    Ok(())
}

#[test_log::test]
fn malformed_binary_terminates_the_stream() {
    let loader = loader();
    let bad_character = Uuid::from_u128(0x3001);
    let mut connection = hero_account()
        .with_row(
            SECOND_ACCOUNT,
            account_document(
                SECOND_ACCOUNT,
                json!([character_document(bad_character, SECOND_ACCOUNT, "\\x0g")]),
            )
            .to_string(),
        )
        .with_row(Uuid::from_u128(0x2fff), account_document(Uuid::from_u128(0x2fff), json!([])).to_string());

    let mut accounts = loader.load_all(&mut connection, "Account").unwrap();
    assert!(accounts.next().unwrap().is_ok());

    match accounts.next() {
        Some(Err(LoadError::Payload(error))) => {
            assert_eq!(error.entity, "Account");
            assert_eq!(error.row, 1);
            assert_eq!(error.path, "characters[0]");
            assert!(matches!(
                error.kind,
                PayloadErrorKind::Binary {
                    column: "keyConfiguration",
                    source: BinaryDecodeError::InvalidCharacter { character: 'g', position: 3 }
                }
            ));
        }
        other => panic!("expected a payload error, got {other:?}"),
    }

    assert!(accounts.next().is_none());
    assert!(accounts.next().is_none());
}

#[test_log::test]
fn structural_payload_errors() {
    let loader = loader();
    let cases = [
        // unknown member
        (ACCOUNT, json!({ "id": ACCOUNT.to_string(), "password": "hunter2" })),
        // first member must be the id or a marker
        (ACCOUNT, json!({ "loginName": "tester", "id": ACCOUNT.to_string() })),
        // truncated document
        (ACCOUNT, json!("{\"id\":")),
    ];

    for (id, document) in cases {
        let json = match document {
            Json::String(raw) => raw,
            document => document.to_string(),
        };
        let mut connection = MemoryConnection::new().with_row(id, json);
        let error = loader.load_by_id(&mut connection, "Account", id).unwrap_err();
        assert!(
            matches!(&error, LoadError::Payload(payload) if matches!(payload.kind, PayloadErrorKind::Json(_))),
            "{error}"
        );
    }
}

#[test_log::test]
fn the_root_must_be_the_row_object() {
    let loader = loader();

    let mut connection = MemoryConnection::new().with_row(ACCOUNT, marker(ACCOUNT).to_string());
    let error = loader.load_by_id(&mut connection, "Account", ACCOUNT).unwrap_err();
    assert!(matches!(
        error,
        LoadError::Payload(payload) if matches!(payload.kind, PayloadErrorKind::RootNotInline)
    ));

    let mut connection = MemoryConnection::new().with_row(ACCOUNT, "null");
    let error = loader.load_by_id(&mut connection, "Account", ACCOUNT).unwrap_err();
    assert!(matches!(
        error,
        LoadError::Payload(payload) if matches!(payload.kind, PayloadErrorKind::RootNotInline)
    ));

    let mut connection = MemoryConnection::new().with_row(ACCOUNT, account_document(SECOND_ACCOUNT, json!([])).to_string());
    let error = loader.load_by_id(&mut connection, "Account", ACCOUNT).unwrap_err();
    assert!(matches!(
        error,
        LoadError::Payload(payload)
            if matches!(payload.kind, PayloadErrorKind::RowIdMismatch { row_id: ACCOUNT, payload_id: SECOND_ACCOUNT })
    ));
}

#[test_log::test]
fn load_by_id_reports_missing_rows_as_none() -> Result<(), anyhow::Error> {
    let loader = loader();
    let mut connection = hero_account();

    assert!(loader.load_by_id(&mut connection, "Account", Uuid::from_u128(0xdead))?.is_none());
    let executed = connection.executed().last().unwrap();
    assert!(executed.ends_with(" WHERE a.\"Id\" = $1"));
    assert_eq!(executed, loader.query_for("Account")?.by_id_sql());
    Ok(())
}

#[test_log::test]
fn unknown_entity_types_fail_before_querying() {
    let loader = loader();
    let mut connection = hero_account();

    assert!(matches!(
        loader.load_all(&mut connection, "Mount"),
        Err(LoadError::Metadata(_))
    ));
    assert!(connection.executed().is_empty());
}

#[test_log::test]
fn cancellation_is_checked_between_rows() {
    let loader = loader();
    let flag = Arc::new(AtomicBool::new(false));
    let mut connection = hero_account().with_row(
        SECOND_ACCOUNT,
        account_document(SECOND_ACCOUNT, json!([])).to_string(),
    );

    let mut accounts = loader
        .load_all(&mut connection, "Account")
        .unwrap()
        .cancel_on(flag.clone());
    assert!(accounts.next().unwrap().is_ok());

    flag.store(true, std::sync::atomic::Ordering::Relaxed);
    assert!(matches!(
        accounts.next(),
        Some(Err(LoadError::Cancelled { entity: "Account", rows: 1 }))
    ));
    assert!(accounts.next().is_none());
}

#[test_log::test]
fn concurrent_loads_publish_one_configuration() {
    let loader = loader();

    let configurations: Vec<GameConfiguration> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| load_configuration(&loader)))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("loader thread"))
            .collect()
    });

    let first = &configurations[0];
    for configuration in &configurations {
        assert!(Arc::ptr_eq(configuration.object(), first.object()));
        assert!(Arc::ptr_eq(
            configuration.character_classes()[0].object(),
            first.character_classes()[0].object()
        ));
    }
    assert!(loader.configuration().contains(DARK_KNIGHT));
}

#[test_log::test]
fn registering_and_evicting_configuration_objects() {
    let loader = loader();
    let configuration = load_configuration(&loader);

    let impostor = GraphObject::new(&CHARACTER_CLASS, DARK_KNIGHT, IdentityScope::Configuration);
    assert_eq!(
        loader.register_configuration_object(impostor),
        Err(IdentityConflict {
            id: DARK_KNIGHT,
            entity: "CharacterClass"
        })
    );
    let known = configuration.character_classes()[1].object().clone();
    assert_eq!(loader.register_configuration_object(known), Ok(()));

    let evicted = loader.evict_configuration_object(CONFIGURATION).unwrap();
    assert!(Arc::ptr_eq(&evicted, configuration.object()));

    // a new root is built, its still cached children are reused
    let reloaded = load_configuration(&loader);
    assert!(!Arc::ptr_eq(reloaded.object(), configuration.object()));
    assert!(Arc::ptr_eq(
        reloaded.character_classes()[1].object(),
        configuration.character_classes()[1].object()
    ));
}

struct BrokenConnection;

impl Connection for BrokenConnection {
    fn query(&mut self, _sql: &str, _id: Option<Uuid>) -> Result<Box<dyn RowCursor + '_>, StoreError> {
        Err("connection reset".into())
    }
}

#[test_log::test]
fn store_failures_surface_as_query_errors() {
    let loader = loader();
    let error = loader
        .load_by_id(&mut BrokenConnection, "Account", ACCOUNT)
        .unwrap_err();
    assert!(matches!(error, LoadError::Query { entity: "Account", .. }));
    assert_eq!(error.to_string(), "Querying Account failed: connection reset");
}

/// Serves one account, then loses the connection.
struct FlakyConnection;

struct FlakyCursor {
    served: bool,
}

impl RowCursor for FlakyCursor {
    fn next_row(&mut self) -> Result<Option<RawRow<'_>>, StoreError> {
        if self.served {
            return Err("connection reset".into());
        }
        self.served = true;
        let document = account_document(SECOND_ACCOUNT, json!([])).to_string();
        Ok(Some(RawRow {
            id: SECOND_ACCOUNT,
            json: Box::new(std::io::Cursor::new(document.into_bytes())),
        }))
    }
}

impl Connection for FlakyConnection {
    fn query(&mut self, _sql: &str, _id: Option<Uuid>) -> Result<Box<dyn RowCursor + '_>, StoreError> {
        Ok(Box::new(FlakyCursor { served: false }))
    }
}

#[test_log::test]
fn store_failures_in_the_middle_of_a_stream_end_it() {
    let loader = loader();
    let mut connection = FlakyConnection;
    let mut accounts = loader.load_all(&mut connection, "Account").unwrap();

    assert_eq!(accounts.next().unwrap().unwrap().id(), SECOND_ACCOUNT);
    let error = accounts.next().unwrap().unwrap_err();
    assert!(matches!(error, LoadError::Query { entity: "Account", .. }));
    assert_eq!(accounts.rows(), 1);
    assert!(accounts.next().is_none());
}

#[test_log::test]
fn bootstrapped_configuration_is_shared_between_rows() -> Result<(), anyhow::Error> {
    let loader = loader();
    let class = GraphObject::new(&CHARACTER_CLASS, DARK_KNIGHT, IdentityScope::Configuration);
    loader.register_configuration_object(class.clone())?;

    let first = Uuid::from_u128(0x4000);
    let second = Uuid::from_u128(0x4001);
    let row = |id: Uuid| json!({ "id": id.to_string(), "characterClass": marker(DARK_KNIGHT) }).to_string();
    let mut connection = MemoryConnection::new()
        .with_row(first, row(first))
        .with_row(second, row(second));

    let characters = loader
        .load_all_as::<model::Character>(&mut connection)?
        .collect::<Result<Vec<_>, _>>()?;
    assert_eq!(characters.len(), 2);
    for character in &characters {
        assert!(Arc::ptr_eq(character.character_class().unwrap().object(), &class));
    }
    Ok(())
}
