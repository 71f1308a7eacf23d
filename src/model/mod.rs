//! The game schema: configuration types in `config`, per-player aggregates in `data`.

use realmstore_schema::MetadataError;
use realmstore_schema::metadata::{
    Column, ColumnType, EntityRegistry, EntityType, IdentityScope, JoinTable, Navigation, TableName,
};

use crate::entity_view;
use crate::graph::{Entity, ObjectRef};

pub static GAME_CONFIGURATION: EntityType = EntityType {
    name: "GameConfiguration",
    table: TableName::new("config", "GameConfiguration"),
    primary_key: "Id",
    lifetime: IdentityScope::Configuration,
    columns: &[
        Column::new("maximumLevel", "MaximumLevel", ColumnType::Integer),
        Column::new("maximumInventoryMoney", "MaximumInventoryMoney", ColumnType::Integer),
        Column::new("experienceRate", "ExperienceRate", ColumnType::Float),
    ],
    navigations: &[
        Navigation::owned_many("characterClasses", "CharacterClass", "GameConfigurationId"),
        Navigation::owned_many("items", "ItemDefinition", "GameConfigurationId"),
        Navigation::owned_many("maps", "GameMapDefinition", "GameConfigurationId"),
    ],
    order_by: None,
    navigation_order: &[],
};

pub static CHARACTER_CLASS: EntityType = EntityType {
    name: "CharacterClass",
    table: TableName::new("config", "CharacterClass"),
    primary_key: "Id",
    lifetime: IdentityScope::Configuration,
    columns: &[
        Column::new("number", "Number", ColumnType::Integer),
        Column::new("name", "Name", ColumnType::Text),
        Column::new("canGetCreated", "CanGetCreated", ColumnType::Boolean),
    ],
    navigations: &[Navigation::reference(
        "nextGenerationClass",
        "CharacterClass",
        "NextGenerationClassId",
    )],
    order_by: Some("Number"),
    navigation_order: &[],
};

pub static ITEM_DEFINITION: EntityType = EntityType {
    name: "ItemDefinition",
    table: TableName::new("config", "ItemDefinition"),
    primary_key: "Id",
    lifetime: IdentityScope::Configuration,
    columns: &[
        Column::new("number", "Number", ColumnType::Integer),
        Column::new("group", "Group", ColumnType::Integer),
        Column::new("name", "Name", ColumnType::Text),
        Column::new("width", "Width", ColumnType::Integer),
        Column::new("height", "Height", ColumnType::Integer),
        Column::new("durability", "Durability", ColumnType::Integer),
    ],
    navigations: &[Navigation::many_to_many(
        "qualifiedCharacters",
        "CharacterClass",
        JoinTable {
            table: TableName::new("config", "ItemDefinitionCharacterClass"),
            owner_key: "ItemDefinitionId",
            target_key: "CharacterClassId",
        },
    )],
    order_by: Some("Number"),
    navigation_order: &[],
};

pub static GAME_MAP_DEFINITION: EntityType = EntityType {
    name: "GameMapDefinition",
    table: TableName::new("config", "GameMapDefinition"),
    primary_key: "Id",
    lifetime: IdentityScope::Configuration,
    columns: &[
        Column::new("number", "Number", ColumnType::Integer),
        Column::new("name", "Name", ColumnType::Text),
        Column::new("experienceMultiplier", "ExperienceMultiplier", ColumnType::Float),
        Column::new("terrainData", "TerrainData", ColumnType::Binary),
    ],
    navigations: &[
        Navigation::reference("defaultSpawnGate", "ExitGate", "DefaultSpawnGateId"),
        Navigation::owned_many("exitGates", "ExitGate", "GameMapDefinitionId"),
    ],
    order_by: Some("Number"),
    // the spawn gate points into the exit gates, which have to exist by then
    navigation_order: &["exitGates"],
};

pub static EXIT_GATE: EntityType = EntityType {
    name: "ExitGate",
    table: TableName::new("config", "ExitGate"),
    primary_key: "Id",
    lifetime: IdentityScope::Configuration,
    columns: &[
        Column::new("x1", "X1", ColumnType::Integer),
        Column::new("y1", "Y1", ColumnType::Integer),
        Column::new("x2", "X2", ColumnType::Integer),
        Column::new("y2", "Y2", ColumnType::Integer),
        Column::new("direction", "Direction", ColumnType::Integer),
        Column::new("isSpawnGate", "IsSpawnGate", ColumnType::Boolean),
    ],
    navigations: &[],
    order_by: None,
    navigation_order: &[],
};

pub static ACCOUNT: EntityType = EntityType {
    name: "Account",
    table: TableName::new("data", "Account"),
    primary_key: "Id",
    lifetime: IdentityScope::Instance,
    columns: &[
        Column::new("loginName", "LoginName", ColumnType::Text),
        Column::new("eMail", "EMail", ColumnType::Text),
        Column::new("registrationDate", "RegistrationDate", ColumnType::Timestamp),
        Column::new("state", "State", ColumnType::Integer),
        Column::new("isTemplate", "IsTemplate", ColumnType::Boolean),
    ],
    navigations: &[
        Navigation::owned_many("characters", "Character", "AccountId"),
        Navigation::owned_one("vault", "ItemStorage", "VaultId"),
    ],
    order_by: None,
    navigation_order: &[],
};

pub static CHARACTER: EntityType = EntityType {
    name: "Character",
    table: TableName::new("data", "Character"),
    primary_key: "Id",
    lifetime: IdentityScope::Instance,
    columns: &[
        Column::new("name", "Name", ColumnType::Text),
        Column::new("characterSlot", "CharacterSlot", ColumnType::Integer),
        Column::new("experience", "Experience", ColumnType::Integer),
        Column::new("positionX", "PositionX", ColumnType::Integer),
        Column::new("positionY", "PositionY", ColumnType::Integer),
        Column::new("createDate", "CreateDate", ColumnType::Timestamp),
        Column::new("keyConfiguration", "KeyConfiguration", ColumnType::Binary),
    ],
    navigations: &[
        Navigation::owned_one("inventory", "ItemStorage", "InventoryId"),
        Navigation::reference("characterClass", "CharacterClass", "CharacterClassId"),
        Navigation::reference("currentMap", "GameMapDefinition", "CurrentMapId"),
        Navigation::reference("account", "Account", "AccountId"),
        Navigation::many_to_many(
            "guilds",
            "Guild",
            JoinTable {
                table: TableName::new("data", "CharacterGuild"),
                owner_key: "CharacterId",
                target_key: "GuildId",
            },
        ),
    ],
    order_by: Some("CharacterSlot"),
    navigation_order: &[],
};

pub static ITEM_STORAGE: EntityType = EntityType {
    name: "ItemStorage",
    table: TableName::new("data", "ItemStorage"),
    primary_key: "Id",
    lifetime: IdentityScope::Instance,
    columns: &[Column::new("money", "Money", ColumnType::Integer)],
    navigations: &[Navigation::owned_many("items", "Item", "ItemStorageId")],
    order_by: None,
    navigation_order: &[],
};

pub static ITEM: EntityType = EntityType {
    name: "Item",
    table: TableName::new("data", "Item"),
    primary_key: "Id",
    lifetime: IdentityScope::Instance,
    columns: &[
        Column::new("itemSlot", "ItemSlot", ColumnType::Integer),
        Column::new("level", "Level", ColumnType::Integer),
        Column::new("durability", "Durability", ColumnType::Float),
        Column::new("hasSkill", "HasSkill", ColumnType::Boolean),
    ],
    navigations: &[Navigation::reference("definition", "ItemDefinition", "DefinitionId")],
    order_by: Some("ItemSlot"),
    navigation_order: &[],
};

pub static GUILD: EntityType = EntityType {
    name: "Guild",
    table: TableName::new("data", "Guild"),
    primary_key: "Id",
    lifetime: IdentityScope::Instance,
    columns: &[
        Column::new("name", "Name", ColumnType::Text),
        Column::new("logo", "Logo", ColumnType::Binary),
        Column::new("score", "Score", ColumnType::Integer),
    ],
    navigations: &[Navigation::many_to_many(
        "members",
        "Character",
        JoinTable {
            table: TableName::new("data", "CharacterGuild"),
            owner_key: "GuildId",
            target_key: "CharacterId",
        },
    )],
    order_by: None,
    navigation_order: &[],
};

pub fn game_model() -> Result<EntityRegistry, MetadataError> {
    EntityRegistry::new(&[
        &GAME_CONFIGURATION,
        &CHARACTER_CLASS,
        &ITEM_DEFINITION,
        &GAME_MAP_DEFINITION,
        &EXIT_GATE,
        &ACCOUNT,
        &CHARACTER,
        &ITEM_STORAGE,
        &ITEM,
        &GUILD,
    ])
}

fn views<T: Entity>(objects: Vec<ObjectRef>) -> Vec<T> {
    objects.into_iter().filter_map(T::from_object).collect()
}

entity_view!(pub GameConfiguration => GAME_CONFIGURATION);
entity_view!(pub CharacterClass => CHARACTER_CLASS);
entity_view!(pub ItemDefinition => ITEM_DEFINITION);
entity_view!(pub GameMapDefinition => GAME_MAP_DEFINITION);
entity_view!(pub ExitGate => EXIT_GATE);
entity_view!(pub Account => ACCOUNT);
entity_view!(pub Character => CHARACTER);
entity_view!(pub ItemStorage => ITEM_STORAGE);
entity_view!(pub Item => ITEM);
entity_view!(pub Guild => GUILD);

impl GameConfiguration {
    pub fn maximum_level(&self) -> Option<i64> {
        self.0.integer("maximumLevel")
    }

    pub fn character_classes(&self) -> Vec<CharacterClass> {
        views(self.0.collection("characterClasses"))
    }

    pub fn items(&self) -> Vec<ItemDefinition> {
        views(self.0.collection("items"))
    }

    pub fn maps(&self) -> Vec<GameMapDefinition> {
        views(self.0.collection("maps"))
    }
}

impl CharacterClass {
    pub fn name(&self) -> Option<String> {
        self.0.text("name")
    }

    pub fn next_generation_class(&self) -> Option<CharacterClass> {
        self.0
            .reference("nextGenerationClass")
            .and_then(CharacterClass::from_object)
    }
}

impl ItemDefinition {
    pub fn name(&self) -> Option<String> {
        self.0.text("name")
    }

    pub fn number(&self) -> Option<i64> {
        self.0.integer("number")
    }

    pub fn qualified_characters(&self) -> Vec<CharacterClass> {
        views(self.0.collection("qualifiedCharacters"))
    }
}

impl GameMapDefinition {
    pub fn name(&self) -> Option<String> {
        self.0.text("name")
    }

    pub fn terrain_data(&self) -> Option<Vec<u8>> {
        self.0.binary("terrainData")
    }

    pub fn exit_gates(&self) -> Vec<ExitGate> {
        views(self.0.collection("exitGates"))
    }

    pub fn default_spawn_gate(&self) -> Option<ExitGate> {
        self.0
            .reference("defaultSpawnGate")
            .and_then(ExitGate::from_object)
    }
}

impl ExitGate {
    pub fn is_spawn_gate(&self) -> Option<bool> {
        self.0.boolean("isSpawnGate")
    }
}

impl Account {
    pub fn login_name(&self) -> Option<String> {
        self.0.text("loginName")
    }

    pub fn registration_date(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.0.timestamp("registrationDate")
    }

    pub fn characters(&self) -> Vec<Character> {
        views(self.0.collection("characters"))
    }

    pub fn vault(&self) -> Option<ItemStorage> {
        self.0.reference("vault").and_then(ItemStorage::from_object)
    }
}

impl Character {
    pub fn name(&self) -> Option<String> {
        self.0.text("name")
    }

    pub fn key_configuration(&self) -> Option<Vec<u8>> {
        self.0.binary("keyConfiguration")
    }

    pub fn inventory(&self) -> Option<ItemStorage> {
        self.0
            .reference("inventory")
            .and_then(ItemStorage::from_object)
    }

    pub fn character_class(&self) -> Option<CharacterClass> {
        self.0
            .reference("characterClass")
            .and_then(CharacterClass::from_object)
    }

    pub fn current_map(&self) -> Option<GameMapDefinition> {
        self.0
            .reference("currentMap")
            .and_then(GameMapDefinition::from_object)
    }

    pub fn account(&self) -> Option<Account> {
        self.0.reference("account").and_then(Account::from_object)
    }

    pub fn guilds(&self) -> Vec<Guild> {
        views(self.0.collection("guilds"))
    }
}

impl ItemStorage {
    pub fn money(&self) -> Option<i64> {
        self.0.integer("money")
    }

    pub fn items(&self) -> Vec<Item> {
        views(self.0.collection("items"))
    }
}

impl Item {
    pub fn item_slot(&self) -> Option<i64> {
        self.0.integer("itemSlot")
    }

    pub fn definition(&self) -> Option<ItemDefinition> {
        self.0
            .reference("definition")
            .and_then(ItemDefinition::from_object)
    }
}

impl Guild {
    pub fn name(&self) -> Option<String> {
        self.0.text("name")
    }

    pub fn logo(&self) -> Option<Vec<u8>> {
        self.0.binary("logo")
    }

    pub fn members(&self) -> Vec<Character> {
        views(self.0.collection("members"))
    }
}
